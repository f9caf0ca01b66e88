// ==========================================
// 工艺成本核算系统 - 工艺目录仓储
// ==========================================
// 职责: 工艺/子工序/用料/替代组/成本项的持久化与快照装载
// 红线: 软删除 (active=0) 而非物理删除;结构性编辑递增工艺版本;
//       快照读取按 active=1 过滤
// ==========================================

use crate::domain::catalog::{
    CostItem, Process, ProcessSubprocess, Subprocess, SubstituteGroup, VariantUsage,
};
use crate::domain::snapshot::{ProcessSnapshot, SnapshotGroup, SnapshotSubprocess};
use crate::domain::types::{CostBasis, CostCategory, SelectionLogic};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Local;
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

/// 时间戳统一格式
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ==========================================
// CatalogRepository - 工艺目录仓储
// ==========================================
pub struct CatalogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CatalogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入接口 (目录管理边界调用)
    // ==========================================

    /// 创建工艺
    pub fn create_process(&self, process: &Process) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO process (
                process_id, process_name, description, version, active,
                created_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &process.process_id,
                &process.process_name,
                &process.description,
                &process.version,
                process.active,
                &process.created_by,
                &process.created_at.format(DATETIME_FMT).to_string(),
                &process.updated_at.format(DATETIME_FMT).to_string(),
            ],
        )?;
        Ok(process.process_id.clone())
    }

    /// 创建子工序模板
    pub fn create_subprocess(&self, subprocess: &Subprocess) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO subprocess (
                subprocess_id, subprocess_name, description, active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                &subprocess.subprocess_id,
                &subprocess.subprocess_name,
                &subprocess.description,
                subprocess.active,
                &subprocess.created_at.format(DATETIME_FMT).to_string(),
                &subprocess.updated_at.format(DATETIME_FMT).to_string(),
            ],
        )?;
        Ok(subprocess.subprocess_id.clone())
    }

    /// 挂接子工序到工艺
    ///
    /// 约束: sequence_order 必须严格大于该工艺当前最大序号 (追加式递增);
    /// 同一事务内递增工艺版本。
    pub fn link_subprocess(&self, link: &ProcessSubprocess) -> RepositoryResult<String> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let max_order: Option<i64> = tx.query_row(
            "SELECT MAX(sequence_order) FROM process_subprocess WHERE process_id = ? AND active = 1",
            params![&link.process_id],
            |row| row.get(0),
        )?;

        if let Some(max) = max_order {
            if link.sequence_order <= max {
                return Err(RepositoryError::BusinessRuleViolation(format!(
                    "序号必须严格递增: process_id={}, 当前最大序号={}, 请求序号={}",
                    link.process_id, max, link.sequence_order
                )));
            }
        }

        tx.execute(
            r#"INSERT INTO process_subprocess (
                link_id, process_id, subprocess_id, sequence_order, active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                &link.link_id,
                &link.process_id,
                &link.subprocess_id,
                &link.sequence_order,
                link.active,
                &link.created_at.format(DATETIME_FMT).to_string(),
            ],
        )?;

        Self::bump_process_version(&tx, &link.process_id)?;
        tx.commit()?;
        Ok(link.link_id.clone())
    }

    /// 添加物料变体用量
    pub fn add_variant_usage(&self, usage: &VariantUsage) -> RepositoryResult<String> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO variant_usage (
                usage_id, subprocess_id, variant_id, variant_name,
                quantity, unit, group_id, active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &usage.usage_id,
                &usage.subprocess_id,
                &usage.variant_id,
                &usage.variant_name,
                &usage.quantity,
                &usage.unit,
                &usage.group_id,
                usage.active,
                &usage.created_at.format(DATETIME_FMT).to_string(),
            ],
        )?;

        Self::bump_versions_for_subprocess(&tx, &usage.subprocess_id)?;
        tx.commit()?;
        Ok(usage.usage_id.clone())
    }

    /// 创建替代组并收编成员用料
    ///
    /// 构造校验 (拒绝即整体失败,不产生半成品组):
    /// - 成员数 ≥ 2
    /// - 全部成员属于组所在子工序
    /// - 成员变体不重复
    /// - 成员未加入其他替代组
    pub fn create_substitute_group(
        &self,
        group: &SubstituteGroup,
        member_usage_ids: &[String],
    ) -> RepositoryResult<String> {
        if member_usage_ids.len() < 2 {
            return Err(RepositoryError::ValidationError(format!(
                "替代组成员不足: group={}, 至少需要2个成员, 实际{}个",
                group.group_name,
                member_usage_ids.len()
            )));
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let mut seen_variants: Vec<String> = Vec::new();
        for usage_id in member_usage_ids {
            let (subprocess_id, existing_group, variant_id): (String, Option<String>, String) = tx
                .query_row(
                    "SELECT subprocess_id, group_id, variant_id FROM variant_usage
                     WHERE usage_id = ? AND active = 1",
                    params![usage_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                        entity: "VariantUsage".to_string(),
                        id: usage_id.clone(),
                    },
                    other => other.into(),
                })?;

            if subprocess_id != group.subprocess_id {
                return Err(RepositoryError::ValidationError(format!(
                    "替代组成员跨子工序: usage_id={}, 成员子工序={}, 组子工序={}",
                    usage_id, subprocess_id, group.subprocess_id
                )));
            }
            if let Some(g) = existing_group {
                return Err(RepositoryError::ValidationError(format!(
                    "用料已属于其他替代组: usage_id={}, group_id={}",
                    usage_id, g
                )));
            }
            if seen_variants.contains(&variant_id) {
                return Err(RepositoryError::ValidationError(format!(
                    "替代组内变体重复: variant_id={}",
                    variant_id
                )));
            }
            seen_variants.push(variant_id);
        }

        tx.execute(
            r#"INSERT INTO substitute_group (
                group_id, subprocess_id, group_name, selection_logic, active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                &group.group_id,
                &group.subprocess_id,
                &group.group_name,
                group.selection_logic.to_db_str(),
                group.active,
                &group.created_at.format(DATETIME_FMT).to_string(),
            ],
        )?;

        for usage_id in member_usage_ids {
            tx.execute(
                "UPDATE variant_usage SET group_id = ? WHERE usage_id = ?",
                params![&group.group_id, usage_id],
            )?;
        }

        Self::bump_versions_for_subprocess(&tx, &group.subprocess_id)?;
        tx.commit()?;
        Ok(group.group_id.clone())
    }

    /// 添加非材料成本项
    pub fn add_cost_item(&self, item: &CostItem) -> RepositoryResult<String> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO cost_item (
                cost_item_id, subprocess_id, cost_name, category, amount,
                cost_basis, hours_per_unit, batch_size, active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &item.cost_item_id,
                &item.subprocess_id,
                &item.cost_name,
                item.category.to_db_str(),
                &item.amount,
                item.cost_basis.to_db_str(),
                &item.hours_per_unit,
                &item.batch_size,
                item.active,
                &item.created_at.format(DATETIME_FMT).to_string(),
            ],
        )?;

        Self::bump_versions_for_subprocess(&tx, &item.subprocess_id)?;
        tx.commit()?;
        Ok(item.cost_item_id.clone())
    }

    /// 软删除工艺
    pub fn soft_delete_process(&self, process_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let now = Local::now().naive_local().format(DATETIME_FMT).to_string();
        let affected = conn.execute(
            "UPDATE process SET active = 0, version = version + 1, updated_at = ? WHERE process_id = ? AND active = 1",
            params![&now, process_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Process".to_string(),
                id: process_id.to_string(),
            });
        }
        Ok(())
    }

    /// 软删除子工序 (联动递增关联工艺版本)
    pub fn soft_delete_subprocess(&self, subprocess_id: &str) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = Local::now().naive_local().format(DATETIME_FMT).to_string();

        let affected = tx.execute(
            "UPDATE subprocess SET active = 0, updated_at = ? WHERE subprocess_id = ? AND active = 1",
            params![&now, subprocess_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Subprocess".to_string(),
                id: subprocess_id.to_string(),
            });
        }

        Self::bump_versions_for_subprocess(&tx, subprocess_id)?;
        tx.commit()?;
        Ok(())
    }

    /// 软删除用料
    pub fn soft_delete_variant_usage(&self, usage_id: &str) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let subprocess_id: String = tx
            .query_row(
                "SELECT subprocess_id FROM variant_usage WHERE usage_id = ? AND active = 1",
                params![usage_id],
                |row| row.get(0),
            )
            .map_err(|_| RepositoryError::NotFound {
                entity: "VariantUsage".to_string(),
                id: usage_id.to_string(),
            })?;

        tx.execute(
            "UPDATE variant_usage SET active = 0 WHERE usage_id = ?",
            params![usage_id],
        )?;

        Self::bump_versions_for_subprocess(&tx, &subprocess_id)?;
        tx.commit()?;
        Ok(())
    }

    // ==========================================
    // 读取接口
    // ==========================================

    /// 按ID查询工艺 (含软删除,供审计查询)
    pub fn find_process(&self, process_id: &str) -> RepositoryResult<Option<Process>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            r#"SELECT process_id, process_name, description, version, active,
                      created_by, created_at, updated_at
               FROM process WHERE process_id = ?"#,
            params![process_id],
            Self::map_process_row,
        );
        match result {
            Ok(process) => Ok(Some(process)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 装载工艺快照
    ///
    /// 遍历规则:
    /// - 仅包含 active=1 的挂接/子工序/用料/替代组/成本项
    /// - 子工序按 sequence_order 升序
    /// - 组成员按 usage_id 排序,保证重复装载产生相同快照
    pub fn load_snapshot(&self, process_id: &str) -> RepositoryResult<ProcessSnapshot> {
        let conn = self.get_conn()?;

        let process = conn
            .query_row(
                r#"SELECT process_id, process_name, description, version, active,
                          created_by, created_at, updated_at
                   FROM process WHERE process_id = ? AND active = 1"#,
                params![process_id],
                Self::map_process_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                    entity: "Process".to_string(),
                    id: process_id.to_string(),
                },
                other => other.into(),
            })?;

        let mut stmt = conn.prepare(
            r#"SELECT ps.link_id, ps.process_id, ps.subprocess_id, ps.sequence_order,
                      ps.active, ps.created_at,
                      sp.subprocess_id, sp.subprocess_name, sp.description,
                      sp.active, sp.created_at, sp.updated_at
               FROM process_subprocess ps
               JOIN subprocess sp ON sp.subprocess_id = ps.subprocess_id
               WHERE ps.process_id = ? AND ps.active = 1 AND sp.active = 1
               ORDER BY ps.sequence_order ASC"#,
        )?;

        let nodes: Vec<(ProcessSubprocess, Subprocess)> = stmt
            .query_map(params![process_id], |row| {
                Ok((
                    ProcessSubprocess {
                        link_id: row.get(0)?,
                        process_id: row.get(1)?,
                        subprocess_id: row.get(2)?,
                        sequence_order: row.get(3)?,
                        active: row.get(4)?,
                        created_at: row.get(5)?,
                    },
                    Subprocess {
                        subprocess_id: row.get(6)?,
                        subprocess_name: row.get(7)?,
                        description: row.get(8)?,
                        active: row.get(9)?,
                        created_at: row.get(10)?,
                        updated_at: row.get(11)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut subprocesses = Vec::with_capacity(nodes.len());
        for (link, subprocess) in nodes {
            let usages = self.load_usages(&conn, &subprocess.subprocess_id)?;
            let groups = self.load_groups(&conn, &subprocess.subprocess_id, &usages)?;
            let cost_items = self.load_cost_items(&conn, &subprocess.subprocess_id)?;
            subprocesses.push(SnapshotSubprocess {
                link,
                subprocess,
                usages,
                groups,
                cost_items,
            });
        }

        Ok(ProcessSnapshot {
            process,
            subprocesses,
        })
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    /// 递增单个工艺版本
    fn bump_process_version(conn: &Connection, process_id: &str) -> RepositoryResult<()> {
        let now = Local::now().naive_local().format(DATETIME_FMT).to_string();
        conn.execute(
            "UPDATE process SET version = version + 1, updated_at = ? WHERE process_id = ?",
            params![&now, process_id],
        )?;
        Ok(())
    }

    /// 递增挂接了指定子工序的全部工艺版本
    ///
    /// 子工序是可复用模板,结构性编辑会影响所有挂接它的工艺。
    fn bump_versions_for_subprocess(conn: &Connection, subprocess_id: &str) -> RepositoryResult<()> {
        let now = Local::now().naive_local().format(DATETIME_FMT).to_string();
        conn.execute(
            r#"UPDATE process SET version = version + 1, updated_at = ?
               WHERE process_id IN (
                   SELECT process_id FROM process_subprocess
                   WHERE subprocess_id = ? AND active = 1
               )"#,
            params![&now, subprocess_id],
        )?;
        Ok(())
    }

    fn map_process_row(row: &Row<'_>) -> rusqlite::Result<Process> {
        Ok(Process {
            process_id: row.get(0)?,
            process_name: row.get(1)?,
            description: row.get(2)?,
            version: row.get(3)?,
            active: row.get(4)?,
            created_by: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn load_usages(
        &self,
        conn: &Connection,
        subprocess_id: &str,
    ) -> RepositoryResult<Vec<VariantUsage>> {
        let mut stmt = conn.prepare(
            r#"SELECT usage_id, subprocess_id, variant_id, variant_name,
                      quantity, unit, group_id, active, created_at
               FROM variant_usage
               WHERE subprocess_id = ? AND active = 1
               ORDER BY usage_id ASC"#,
        )?;
        let usages = stmt
            .query_map(params![subprocess_id], |row| {
                Ok(VariantUsage {
                    usage_id: row.get(0)?,
                    subprocess_id: row.get(1)?,
                    variant_id: row.get(2)?,
                    variant_name: row.get(3)?,
                    quantity: row.get(4)?,
                    unit: row.get(5)?,
                    group_id: row.get(6)?,
                    active: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(usages)
    }

    fn load_groups(
        &self,
        conn: &Connection,
        subprocess_id: &str,
        usages: &[VariantUsage],
    ) -> RepositoryResult<Vec<SnapshotGroup>> {
        let mut stmt = conn.prepare(
            r#"SELECT group_id, subprocess_id, group_name, selection_logic, active, created_at
               FROM substitute_group
               WHERE subprocess_id = ? AND active = 1
               ORDER BY group_id ASC"#,
        )?;
        let groups: Vec<SubstituteGroup> = stmt
            .query_map(params![subprocess_id], |row| {
                let logic_str: String = row.get(3)?;
                Ok(SubstituteGroup {
                    group_id: row.get(0)?,
                    subprocess_id: row.get(1)?,
                    group_name: row.get(2)?,
                    selection_logic: SelectionLogic::from_db_str(&logic_str)
                        .unwrap_or(SelectionLogic::Manual),
                    active: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(groups
            .into_iter()
            .map(|group| {
                let members = usages
                    .iter()
                    .filter(|u| u.group_id.as_deref() == Some(group.group_id.as_str()))
                    .cloned()
                    .collect();
                SnapshotGroup { group, members }
            })
            .collect())
    }

    fn load_cost_items(
        &self,
        conn: &Connection,
        subprocess_id: &str,
    ) -> RepositoryResult<Vec<CostItem>> {
        let mut stmt = conn.prepare(
            r#"SELECT cost_item_id, subprocess_id, cost_name, category, amount,
                      cost_basis, hours_per_unit, batch_size, active, created_at
               FROM cost_item
               WHERE subprocess_id = ? AND active = 1
               ORDER BY cost_item_id ASC"#,
        )?;
        let items = stmt
            .query_map(params![subprocess_id], |row| {
                let category_str: String = row.get(3)?;
                let basis_str: String = row.get(5)?;
                Ok(CostItem {
                    cost_item_id: row.get(0)?,
                    subprocess_id: row.get(1)?,
                    cost_name: row.get(2)?,
                    category: CostCategory::from_db_str(&category_str)
                        .unwrap_or(CostCategory::Other),
                    amount: row.get(4)?,
                    cost_basis: CostBasis::from_db_str(&basis_str)
                        .unwrap_or(CostBasis::PerUnit),
                    hours_per_unit: row.get(6)?,
                    batch_size: row.get(7)?,
                    active: row.get(8)?,
                    created_at: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }
}
