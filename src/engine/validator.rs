// ==========================================
// 工艺成本核算系统 - 批次就绪校验器
// ==========================================
// 职责: planning → ready 之间的纯校验闸门
// 红线: 只读不写;问题全量收集 (缺选型+缺库存),不在首个问题上短路;
//       就绪是派生结论,执行引擎提交前必须重新校验
// ==========================================

use crate::domain::catalog::VariantUsage;
use crate::domain::lot::{LotSelection, ProductionLot};
use crate::domain::snapshot::ProcessSnapshot;
use crate::repository::error::RepositoryResult;
use crate::repository::inventory_repo::InventoryRepository;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// ==========================================
// 校验结果结构
// ==========================================

/// 缺失/非法的替代组选型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingSelection {
    pub group_id: String,
    pub group_name: String,
    pub subprocess_id: String,
    /// 缺失原因 (未选型 / 选型指向非组内成员)
    pub reason: String,
}

/// 库存缺口
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockShortage {
    pub variant_id: String,
    pub required: f64,
    pub available: f64,
}

/// 就绪校验报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub is_ready: bool,
    pub missing_selections: Vec<MissingSelection>,
    pub stock_shortages: Vec<StockShortage>,
}

/// 已解析的用料 (物料清单条目)
#[derive(Debug, Clone)]
pub struct ResolvedUsage<'a> {
    pub usage: &'a VariantUsage,
    /// 选型时显式指定的供应商 (未入组用料为 None)
    pub supplier_id: Option<&'a str>,
}

/// 物料清单解析结果: 可解析部分 + 缺失选型
#[derive(Debug, Clone)]
pub struct BomResolution<'a> {
    pub resolved: Vec<ResolvedUsage<'a>>,
    pub missing: Vec<MissingSelection>,
}

// ==========================================
// LotSelectionValidator - 就绪校验器
// ==========================================
pub struct LotSelectionValidator {
    inventory_repo: Arc<InventoryRepository>,
}

impl LotSelectionValidator {
    pub fn new(inventory_repo: Arc<InventoryRepository>) -> Self {
        Self { inventory_repo }
    }

    /// 解析物料清单
    ///
    /// - 未入组用料直接进入清单
    /// - 每个可达替代组: 恰好一条指向组内成员的选型 → 选定成员进入清单;
    ///   否则记一条 MissingSelection
    /// - 指向已不可达替代组的多余选型被忽略 (组被软删除后选型失效)
    pub fn resolve_bill_of_materials<'a>(
        snapshot: &'a ProcessSnapshot,
        selections: &'a [LotSelection],
    ) -> BomResolution<'a> {
        let by_group: HashMap<&str, &LotSelection> = selections
            .iter()
            .map(|s| (s.group_id.as_str(), s))
            .collect();

        let mut resolved = Vec::new();
        let mut missing = Vec::new();

        for sp in &snapshot.subprocesses {
            for usage in sp.ungrouped_usages() {
                resolved.push(ResolvedUsage {
                    usage,
                    supplier_id: None,
                });
            }

            for group in &sp.groups {
                match by_group.get(group.group.group_id.as_str()) {
                    None => missing.push(MissingSelection {
                        group_id: group.group.group_id.clone(),
                        group_name: group.group.group_name.clone(),
                        subprocess_id: group.group.subprocess_id.clone(),
                        reason: "未选型".to_string(),
                    }),
                    Some(selection) => {
                        match group.members.iter().find(|m| m.usage_id == selection.usage_id) {
                            Some(member) => resolved.push(ResolvedUsage {
                                usage: member,
                                supplier_id: selection.supplier_id.as_deref(),
                            }),
                            None => missing.push(MissingSelection {
                                group_id: group.group.group_id.clone(),
                                group_name: group.group.group_name.clone(),
                                subprocess_id: group.group.subprocess_id.clone(),
                                reason: format!(
                                    "选型指向非组内成员: usage_id={}",
                                    selection.usage_id
                                ),
                            }),
                        }
                    }
                }
            }
        }

        BomResolution { resolved, missing }
    }

    /// 按批次数量汇总每个变体的需求量
    ///
    /// 同一变体跨子工序出现时先合并再比对库存。
    pub fn required_stock(
        resolved: &[ResolvedUsage<'_>],
        lot_quantity: f64,
    ) -> BTreeMap<String, f64> {
        let mut required: BTreeMap<String, f64> = BTreeMap::new();
        for item in resolved {
            *required.entry(item.usage.variant_id.clone()).or_insert(0.0) +=
                item.usage.quantity * lot_quantity;
        }
        required
    }

    /// 就绪校验
    ///
    /// 缺选型与缺库存同时收集;任一非空即未就绪。
    pub fn validate(
        &self,
        snapshot: &ProcessSnapshot,
        lot: &ProductionLot,
        selections: &[LotSelection],
    ) -> RepositoryResult<ReadinessReport> {
        let bom = Self::resolve_bill_of_materials(snapshot, selections);

        let mut stock_shortages = Vec::new();
        for (variant_id, required) in Self::required_stock(&bom.resolved, lot.lot_quantity) {
            let available = self.inventory_repo.get_stock(&variant_id)?;
            if available < required {
                stock_shortages.push(StockShortage {
                    variant_id,
                    required,
                    available,
                });
            }
        }

        Ok(ReadinessReport {
            is_ready: bom.missing.is_empty() && stock_shortages.is_empty(),
            missing_selections: bom.missing,
            stock_shortages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::domain::catalog::{
        Process, ProcessSubprocess, Subprocess, SubstituteGroup,
    };
    use crate::domain::snapshot::{SnapshotGroup, SnapshotSubprocess};
    use crate::domain::types::{LotStatus, SelectionLogic};
    use chrono::Utc;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn now() -> chrono::NaiveDateTime {
        Utc::now().naive_local()
    }

    fn usage(usage_id: &str, variant_id: &str, quantity: f64, group_id: Option<&str>) -> VariantUsage {
        VariantUsage {
            usage_id: usage_id.to_string(),
            subprocess_id: "SP-1".to_string(),
            variant_id: variant_id.to_string(),
            variant_name: variant_id.to_string(),
            quantity,
            unit: "个".to_string(),
            group_id: group_id.map(|s| s.to_string()),
            active: true,
            created_at: now(),
        }
    }

    fn snapshot() -> ProcessSnapshot {
        let members = vec![
            usage("U-A", "SCREW-A", 2.0, Some("G-1")),
            usage("U-B", "SCREW-B", 2.0, Some("G-1")),
        ];
        let mut usages = vec![usage("U-P", "PLATE-1", 1.0, None)];
        usages.extend(members.clone());

        ProcessSnapshot {
            process: Process {
                process_id: "PROC-1".to_string(),
                process_name: "装配工艺".to_string(),
                description: None,
                version: 1,
                active: true,
                created_by: "tester".to_string(),
                created_at: now(),
                updated_at: now(),
            },
            subprocesses: vec![SnapshotSubprocess {
                link: ProcessSubprocess {
                    link_id: "L-1".to_string(),
                    process_id: "PROC-1".to_string(),
                    subprocess_id: "SP-1".to_string(),
                    sequence_order: 10,
                    active: true,
                    created_at: now(),
                },
                subprocess: Subprocess {
                    subprocess_id: "SP-1".to_string(),
                    subprocess_name: "装配".to_string(),
                    description: None,
                    active: true,
                    created_at: now(),
                    updated_at: now(),
                },
                usages,
                groups: vec![SnapshotGroup {
                    group: SubstituteGroup {
                        group_id: "G-1".to_string(),
                        subprocess_id: "SP-1".to_string(),
                        group_name: "紧固件替代组".to_string(),
                        selection_logic: SelectionLogic::Manual,
                        active: true,
                        created_at: now(),
                    },
                    members,
                }],
                cost_items: vec![],
            }],
        }
    }

    fn lot(quantity: f64) -> ProductionLot {
        ProductionLot {
            lot_id: "LOT-1".to_string(),
            process_id: "PROC-1".to_string(),
            process_version: 1,
            lot_quantity: quantity,
            status: LotStatus::Planning,
            estimated_total_cost: 0.0,
            actual_total_cost: None,
            sales_price: None,
            config_snapshot_json: None,
            cancel_reason: None,
            fail_reason: None,
            created_by: "tester".to_string(),
            created_at: now(),
            updated_at: now(),
            completed_at: None,
        }
    }

    fn selection(group_id: &str, usage_id: &str) -> LotSelection {
        LotSelection {
            selection_id: format!("SEL-{}", group_id),
            lot_id: "LOT-1".to_string(),
            group_id: group_id.to_string(),
            usage_id: usage_id.to_string(),
            supplier_id: None,
            reason: None,
            selected_by: "tester".to_string(),
            selected_at: now(),
        }
    }

    fn validator_with_stock(stock: &[(&str, f64)]) -> LotSelectionValidator {
        let conn = Connection::open_in_memory().unwrap();
        db::configure_sqlite_connection(&conn).unwrap();
        db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repo = Arc::new(InventoryRepository::new(conn));
        for (variant_id, quantity) in stock {
            repo.upsert_stock(variant_id, *quantity).unwrap();
        }
        LotSelectionValidator::new(repo)
    }

    #[test]
    fn test_unselected_group_blocks_readiness() {
        // 场景: 一个未选型的替代组 → is_ready=false, missing_selections 长度 1
        let validator = validator_with_stock(&[("PLATE-1", 100.0)]);
        let report = validator.validate(&snapshot(), &lot(10.0), &[]).unwrap();

        assert!(!report.is_ready);
        assert_eq!(report.missing_selections.len(), 1);
        assert_eq!(report.missing_selections[0].group_id, "G-1");
    }

    #[test]
    fn test_ready_with_selection_and_stock() {
        // 批量10: PLATE-1 需 10, SCREW-A 需 20
        let validator = validator_with_stock(&[("PLATE-1", 10.0), ("SCREW-A", 20.0)]);
        let report = validator
            .validate(&snapshot(), &lot(10.0), &[selection("G-1", "U-A")])
            .unwrap();

        assert!(report.is_ready, "report={:?}", report);
        assert!(report.missing_selections.is_empty());
        assert!(report.stock_shortages.is_empty());
    }

    #[test]
    fn test_shortages_collected_not_fail_fast() {
        // PLATE-1 与 SCREW-A 都缺 → 两条缺口同时收集
        let validator = validator_with_stock(&[("PLATE-1", 5.0), ("SCREW-A", 3.0)]);
        let report = validator
            .validate(&snapshot(), &lot(10.0), &[selection("G-1", "U-A")])
            .unwrap();

        assert!(!report.is_ready);
        assert_eq!(report.stock_shortages.len(), 2);
        let plate = report
            .stock_shortages
            .iter()
            .find(|s| s.variant_id == "PLATE-1")
            .unwrap();
        assert_eq!(plate.required, 10.0);
        assert_eq!(plate.available, 5.0);
    }

    #[test]
    fn test_selection_pointing_outside_group_is_missing() {
        let validator = validator_with_stock(&[("PLATE-1", 100.0), ("SCREW-A", 100.0)]);
        // U-P 不是 G-1 成员
        let report = validator
            .validate(&snapshot(), &lot(1.0), &[selection("G-1", "U-P")])
            .unwrap();

        assert!(!report.is_ready);
        assert_eq!(report.missing_selections.len(), 1);
        assert!(report.missing_selections[0].reason.contains("非组内成员"));
    }

    #[test]
    fn test_unselected_member_stock_not_required() {
        // 选了 SCREW-A 后,SCREW-B 的库存与就绪无关
        let validator = validator_with_stock(&[("PLATE-1", 10.0), ("SCREW-A", 20.0)]);
        let report = validator
            .validate(&snapshot(), &lot(10.0), &[selection("G-1", "U-A")])
            .unwrap();
        assert!(report.is_ready);
    }

    #[test]
    fn test_required_stock_merges_same_variant() {
        let snap = snapshot();
        let selections = [selection("G-1", "U-A")];
        let bom = LotSelectionValidator::resolve_bill_of_materials(&snap, &selections);
        let required = LotSelectionValidator::required_stock(&bom.resolved, 3.0);
        assert_eq!(required.get("PLATE-1"), Some(&3.0));
        assert_eq!(required.get("SCREW-A"), Some(&6.0));
        assert_eq!(required.get("SCREW-B"), None);
    }
}
