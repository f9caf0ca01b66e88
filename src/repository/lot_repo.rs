// ==========================================
// 工艺成本核算系统 - 生产批次仓储
// ==========================================
// 职责: production_lot / lot_selection / lot_cost_line 的数据访问,
//       以及执行落账的单事务工作单元
// 红线: 状态转换一律条件 UPDATE + 影响行数判定 (乐观风格);
//       执行落账要么全部成功要么全部回滚,绝无部分扣减
// ==========================================

use crate::domain::lot::{LotCostLine, LotSelection, ProductionLot};
use crate::domain::types::LotStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ==========================================
// StockDeduction - 待扣减库存项
// ==========================================
// 执行引擎按解析后的物料清单汇总得出,同一变体合并为一条
#[derive(Debug, Clone, PartialEq)]
pub struct StockDeduction {
    pub variant_id: String,
    pub amount: f64,
}

// ==========================================
// ProductionLotRepository - 生产批次仓储
// ==========================================
pub struct ProductionLotRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionLotRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn now_str() -> String {
        Local::now().naive_local().format(DATETIME_FMT).to_string()
    }

    // ==========================================
    // 批次 CRUD
    // ==========================================

    /// 创建批次
    pub fn create(&self, lot: &ProductionLot) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO production_lot (
                lot_id, process_id, process_version, lot_quantity, status,
                estimated_total_cost, actual_total_cost, sales_price,
                config_snapshot_json, cancel_reason, fail_reason,
                created_by, created_at, updated_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &lot.lot_id,
                &lot.process_id,
                &lot.process_version,
                &lot.lot_quantity,
                lot.status.to_db_str(),
                &lot.estimated_total_cost,
                &lot.actual_total_cost,
                &lot.sales_price,
                &lot.config_snapshot_json,
                &lot.cancel_reason,
                &lot.fail_reason,
                &lot.created_by,
                &lot.created_at.format(DATETIME_FMT).to_string(),
                &lot.updated_at.format(DATETIME_FMT).to_string(),
                &lot.completed_at.map(|t| t.format(DATETIME_FMT).to_string()),
            ],
        )?;
        Ok(lot.lot_id.clone())
    }

    /// 按ID查询批次
    pub fn find_by_id(&self, lot_id: &str) -> RepositoryResult<Option<ProductionLot>> {
        let conn = self.get_conn()?;
        let result = conn
            .query_row(
                r#"SELECT lot_id, process_id, process_version, lot_quantity, status,
                          estimated_total_cost, actual_total_cost, sales_price,
                          config_snapshot_json, cancel_reason, fail_reason,
                          created_by, created_at, updated_at, completed_at
                   FROM production_lot WHERE lot_id = ?"#,
                params![lot_id],
                Self::map_lot_row,
            )
            .optional()?;
        Ok(result)
    }

    // ==========================================
    // 状态转换 (条件 UPDATE + 影响行数判定)
    // ==========================================

    /// 获取执行独占标记: PLANNING|READY → EXECUTING
    ///
    /// 返回执行前状态,供失败回滚使用。
    /// 竞争到的第二个执行请求在此处拿到 0 行更新,立即得到冲突错误。
    pub fn try_begin_execution(&self, lot_id: &str) -> RepositoryResult<LotStatus> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let status_str: String = tx
            .query_row(
                "SELECT status FROM production_lot WHERE lot_id = ?",
                params![lot_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                    entity: "ProductionLot".to_string(),
                    id: lot_id.to_string(),
                },
                other => other.into(),
            })?;

        let prior = LotStatus::from_db_str(&status_str).ok_or_else(|| {
            RepositoryError::FieldValueError {
                field: "status".to_string(),
                message: format!("未知批次状态: {}", status_str),
            }
        })?;

        if !prior.allows_execution() {
            return Err(RepositoryError::InvalidStateTransition {
                from: prior.to_db_str().to_string(),
                to: LotStatus::Executing.to_db_str().to_string(),
            });
        }

        let affected = tx.execute(
            r#"UPDATE production_lot SET status = 'EXECUTING', updated_at = ?
               WHERE lot_id = ? AND status = ?"#,
            params![&Self::now_str(), lot_id, prior.to_db_str()],
        )?;
        if affected == 0 {
            // 读取与更新之间状态已被并发修改
            return Err(RepositoryError::StatusTransitionConflict {
                lot_id: lot_id.to_string(),
                expected: prior.to_db_str().to_string(),
            });
        }

        tx.commit()?;
        Ok(prior)
    }

    /// 释放执行标记并回退到执行前状态 (可重试失败)
    pub fn rollback_execution(&self, lot_id: &str, to: LotStatus) -> RepositoryResult<()> {
        if !LotStatus::Executing.can_transition_to(to) {
            return Err(RepositoryError::InvalidStateTransition {
                from: LotStatus::Executing.to_db_str().to_string(),
                to: to.to_db_str().to_string(),
            });
        }

        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"UPDATE production_lot SET status = ?, updated_at = ?
               WHERE lot_id = ? AND status = 'EXECUTING'"#,
            params![to.to_db_str(), &Self::now_str(), lot_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::StatusTransitionConflict {
                lot_id: lot_id.to_string(),
                expected: LotStatus::Executing.to_db_str().to_string(),
            });
        }
        Ok(())
    }

    /// 执行中不可重试失败: EXECUTING → FAILED (终态,记录原因)
    pub fn mark_failed(&self, lot_id: &str, reason: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"UPDATE production_lot SET status = 'FAILED', fail_reason = ?, updated_at = ?
               WHERE lot_id = ? AND status = 'EXECUTING'"#,
            params![reason, &Self::now_str(), lot_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::StatusTransitionConflict {
                lot_id: lot_id.to_string(),
                expected: LotStatus::Executing.to_db_str().to_string(),
            });
        }
        Ok(())
    }

    /// 校验通过后的就绪标记: PLANNING → READY
    ///
    /// 就绪是派生状态,执行引擎不信任它,提交前必定重新校验。
    pub fn mark_ready(&self, lot_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"UPDATE production_lot SET status = 'READY', updated_at = ?
               WHERE lot_id = ? AND status = 'PLANNING'"#,
            params![&Self::now_str(), lot_id],
        )?;
        // PLANNING 以外的状态不变更也不算错误: READY 重复确认/终态由上层拦截
        Ok(())
    }

    /// 取消批次: PLANNING|READY → CANCELLED,原因必填
    pub fn cancel(&self, lot_id: &str, reason: &str) -> RepositoryResult<()> {
        if reason.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "取消原因不能为空".to_string(),
            ));
        }

        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"UPDATE production_lot SET status = 'CANCELLED', cancel_reason = ?, updated_at = ?
               WHERE lot_id = ? AND status IN ('PLANNING', 'READY')"#,
            params![reason.trim(), &Self::now_str(), lot_id],
        )?;
        if affected == 0 {
            let current = self.find_by_id(lot_id)?;
            return match current {
                None => Err(RepositoryError::NotFound {
                    entity: "ProductionLot".to_string(),
                    id: lot_id.to_string(),
                }),
                Some(lot) => Err(RepositoryError::InvalidStateTransition {
                    from: lot.status.to_db_str().to_string(),
                    to: LotStatus::Cancelled.to_db_str().to_string(),
                }),
            };
        }
        Ok(())
    }

    // ==========================================
    // 选型
    // ==========================================

    /// 写入/覆盖替代组选型 (每批次每组至多一条)
    pub fn upsert_selection(&self, selection: &LotSelection) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO lot_selection (
                selection_id, lot_id, group_id, usage_id, supplier_id,
                reason, selected_by, selected_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(lot_id, group_id) DO UPDATE SET
                usage_id = excluded.usage_id,
                supplier_id = excluded.supplier_id,
                reason = excluded.reason,
                selected_by = excluded.selected_by,
                selected_at = excluded.selected_at"#,
            params![
                &selection.selection_id,
                &selection.lot_id,
                &selection.group_id,
                &selection.usage_id,
                &selection.supplier_id,
                &selection.reason,
                &selection.selected_by,
                &selection.selected_at.format(DATETIME_FMT).to_string(),
            ],
        )?;
        Ok(selection.selection_id.clone())
    }

    /// 查询批次全部选型
    pub fn find_selections(&self, lot_id: &str) -> RepositoryResult<Vec<LotSelection>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT selection_id, lot_id, group_id, usage_id, supplier_id,
                      reason, selected_by, selected_at
               FROM lot_selection WHERE lot_id = ? ORDER BY group_id ASC"#,
        )?;
        let selections = stmt
            .query_map(params![lot_id], |row| {
                Ok(LotSelection {
                    selection_id: row.get(0)?,
                    lot_id: row.get(1)?,
                    group_id: row.get(2)?,
                    usage_id: row.get(3)?,
                    supplier_id: row.get(4)?,
                    reason: row.get(5)?,
                    selected_by: row.get(6)?,
                    selected_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(selections)
    }

    // ==========================================
    // 实际成本明细
    // ==========================================

    /// 查询批次实际成本明细
    pub fn find_cost_lines(&self, lot_id: &str) -> RepositoryResult<Vec<LotCostLine>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT line_id, lot_id, usage_id, variant_id, supplier_id,
                      actual_unit_price, actual_quantity, line_cost, created_at
               FROM lot_cost_line WHERE lot_id = ? ORDER BY line_id ASC"#,
        )?;
        let lines = stmt
            .query_map(params![lot_id], |row| {
                Ok(LotCostLine {
                    line_id: row.get(0)?,
                    lot_id: row.get(1)?,
                    usage_id: row.get(2)?,
                    variant_id: row.get(3)?,
                    supplier_id: row.get(4)?,
                    actual_unit_price: row.get(5)?,
                    actual_quantity: row.get(6)?,
                    line_cost: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    // ==========================================
    // 执行落账工作单元
    // ==========================================

    /// 执行落账: 扣库存 + 写成本明细 + 批次完成,单事务
    ///
    /// 原子性保证:
    /// - 每条扣减是条件 UPDATE (quantity >= 请求量),0 行即库存不足
    /// - 任一扣减失败 → 事务整体回滚,不产生部分扣减
    /// - 批次完成转换条件限定 status='EXECUTING',独占标记被意外破坏时拒绝提交
    pub fn commit_execution(
        &self,
        lot_id: &str,
        deductions: &[StockDeduction],
        cost_lines: &[LotCostLine],
        actual_total_cost: f64,
        completed_at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = Self::now_str();

        for deduction in deductions {
            let affected = tx.execute(
                r#"UPDATE inventory_stock
                   SET quantity = quantity - ?, updated_at = ?
                   WHERE variant_id = ? AND quantity >= ?"#,
                params![&deduction.amount, &now, &deduction.variant_id, &deduction.amount],
            )?;
            if affected == 0 {
                let available: Option<f64> = tx
                    .query_row(
                        "SELECT quantity FROM inventory_stock WHERE variant_id = ?",
                        params![&deduction.variant_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                // 事务随 tx 丢弃整体回滚
                return Err(RepositoryError::InsufficientStock {
                    variant_id: deduction.variant_id.clone(),
                    required: deduction.amount,
                    available: available.unwrap_or(0.0),
                });
            }
        }

        for line in cost_lines {
            tx.execute(
                r#"INSERT INTO lot_cost_line (
                    line_id, lot_id, usage_id, variant_id, supplier_id,
                    actual_unit_price, actual_quantity, line_cost, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    &line.line_id,
                    &line.lot_id,
                    &line.usage_id,
                    &line.variant_id,
                    &line.supplier_id,
                    &line.actual_unit_price,
                    &line.actual_quantity,
                    &line.line_cost,
                    &line.created_at.format(DATETIME_FMT).to_string(),
                ],
            )?;
        }

        let affected = tx.execute(
            r#"UPDATE production_lot
               SET status = 'COMPLETED', actual_total_cost = ?, completed_at = ?, updated_at = ?
               WHERE lot_id = ? AND status = 'EXECUTING'"#,
            params![
                &actual_total_cost,
                &completed_at.format(DATETIME_FMT).to_string(),
                &now,
                lot_id,
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::StatusTransitionConflict {
                lot_id: lot_id.to_string(),
                expected: LotStatus::Executing.to_db_str().to_string(),
            });
        }

        tx.commit()?;
        Ok(())
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn map_lot_row(row: &Row<'_>) -> rusqlite::Result<ProductionLot> {
        let status_str: String = row.get(4)?;
        Ok(ProductionLot {
            lot_id: row.get(0)?,
            process_id: row.get(1)?,
            process_version: row.get(2)?,
            lot_quantity: row.get(3)?,
            status: LotStatus::from_db_str(&status_str).unwrap_or(LotStatus::Planning),
            estimated_total_cost: row.get(5)?,
            actual_total_cost: row.get(6)?,
            sales_price: row.get(7)?,
            config_snapshot_json: row.get(8)?,
            cancel_reason: row.get(9)?,
            fail_reason: row.get(10)?,
            created_by: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
            completed_at: row.get(14)?,
        })
    }
}
