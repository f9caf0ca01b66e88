// ==========================================
// 工艺成本核算系统 - 成本核算引擎
// ==========================================
// 职责: 在不可变工艺快照上自底向上聚合最坏情况成本,
//       派生盈利分析指标
// 红线: 可恢复问题一律结构化收集进报告,绝不抛异常;
//       纯函数,相同输入必产生相同报告 (可按版本缓存)
// ==========================================

use crate::domain::catalog::SupplierPrice;
use crate::domain::lot::Profitability;
use crate::domain::snapshot::{ProcessSnapshot, SnapshotSubprocess};
use crate::domain::types::BreakEvenQuantity;
use crate::engine::pricing::{PricingError, PricingResolver};
use crate::engine::substitute::{GroupConstructionIssue, SubstituteGroupResolver};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// 核算问题 (结构化收集)
// ==========================================

/// 核算过程中发现的问题
///
/// 报告一次性列出全部问题;total_cost 仅在无问题时给出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostingIssue {
    /// 变体无生效报价 (主数据缺失)
    PricingUnavailable {
        subprocess_id: String,
        variant_id: String,
    },
    /// 替代组结构违规 (如软删除后成员衰减至不足2个)
    MalformedGroup {
        subprocess_id: String,
        group_id: String,
        problems: Vec<GroupConstructionIssue>,
    },
    /// 成本项无法折算到单件口径 (归一参数缺失/非法)
    CostItemNotNormalizable {
        subprocess_id: String,
        cost_item_id: String,
        cost_name: String,
    },
}

// ==========================================
// 核算报告
// ==========================================

/// 子工序成本行 (按 sequence_order 排列,仅影响展示顺序)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubprocessCostRow {
    pub link_id: String,
    pub subprocess_id: String,
    pub subprocess_name: String,
    pub sequence_order: i64,
    /// 未入组用料最坏成本合计
    pub material_cost: f64,
    /// 替代组最坏成本合计
    pub group_cost: f64,
    /// 非材料成本合计 (单件口径)
    pub extra_cost: f64,
    /// 行小计
    pub subtotal: f64,
}

/// 工艺成本核算报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostingReport {
    pub process_id: String,
    /// 快照捕获时的工艺版本 (缓存键)
    pub process_version: i64,
    pub rows: Vec<SubprocessCostRow>,
    /// 单件总成本;存在任何问题时为 None,绝不给出低估的部分合计
    pub total_cost: Option<f64>,
    pub issues: Vec<CostingIssue>,
}

impl CostingReport {
    /// 是否无问题
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

// ==========================================
// CostingEngine - 成本核算引擎
// ==========================================
pub struct CostingEngine;

impl CostingEngine {
    /// 重算工艺最坏情况成本
    ///
    /// 纯函数: 只依赖传入的快照与报价映射,幂等可缓存,
    /// 缓存失效只由工艺版本递增驱动。
    pub fn recalculate(
        snapshot: &ProcessSnapshot,
        prices: &HashMap<String, Vec<SupplierPrice>>,
        today: NaiveDate,
    ) -> CostingReport {
        let mut issues = Vec::new();
        let mut rows = Vec::with_capacity(snapshot.subprocesses.len());

        for sp in &snapshot.subprocesses {
            rows.push(Self::subprocess_cost(sp, prices, today, &mut issues));
        }

        let total_cost = if issues.is_empty() {
            Some(rows.iter().map(|r| r.subtotal).sum())
        } else {
            None
        };

        CostingReport {
            process_id: snapshot.process.process_id.clone(),
            process_version: snapshot.version(),
            rows,
            total_cost,
            issues,
        }
    }

    /// 子工序成本 = Σ未入组用料最坏成本 + Σ替代组最坏成本 + Σ归一成本项
    fn subprocess_cost(
        sp: &SnapshotSubprocess,
        prices: &HashMap<String, Vec<SupplierPrice>>,
        today: NaiveDate,
        issues: &mut Vec<CostingIssue>,
    ) -> SubprocessCostRow {
        let subprocess_id = &sp.subprocess.subprocess_id;

        // 未入组用料
        let mut material_cost = 0.0;
        for usage in sp.ungrouped_usages() {
            let usage_prices = prices
                .get(&usage.variant_id)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            match PricingResolver::worst_case_unit_price(&usage.variant_id, usage_prices, today) {
                Ok(unit) => material_cost += unit * usage.quantity,
                Err(PricingError::PricingUnavailable { variant_id })
                | Err(PricingError::SelectedSupplierUnavailable { variant_id, .. }) => {
                    issues.push(CostingIssue::PricingUnavailable {
                        subprocess_id: subprocess_id.clone(),
                        variant_id,
                    });
                }
            }
        }

        // 替代组
        let mut group_cost = 0.0;
        for group in &sp.groups {
            let problems =
                SubstituteGroupResolver::validate_group(&group.group, &group.members);
            if !problems.is_empty() {
                issues.push(CostingIssue::MalformedGroup {
                    subprocess_id: subprocess_id.clone(),
                    group_id: group.group.group_id.clone(),
                    problems,
                });
                continue;
            }
            match SubstituteGroupResolver::group_worst_case_cost(group, prices, today) {
                Ok(cost) => group_cost += cost,
                Err(err) => issues.push(CostingIssue::PricingUnavailable {
                    subprocess_id: subprocess_id.clone(),
                    variant_id: err.variant_id().to_string(),
                }),
            }
        }

        // 非材料成本项
        let mut extra_cost = 0.0;
        for item in &sp.cost_items {
            match item.unit_amount() {
                Some(amount) => extra_cost += amount,
                None => issues.push(CostingIssue::CostItemNotNormalizable {
                    subprocess_id: subprocess_id.clone(),
                    cost_item_id: item.cost_item_id.clone(),
                    cost_name: item.cost_name.clone(),
                }),
            }
        }

        SubprocessCostRow {
            link_id: sp.link.link_id.clone(),
            subprocess_id: subprocess_id.clone(),
            subprocess_name: sp.subprocess.subprocess_name.clone(),
            sequence_order: sp.link.sequence_order,
            material_cost,
            group_cost,
            extra_cost,
            subtotal: material_cost + group_cost + extra_cost,
        }
    }

    // ==========================================
    // 盈利分析
    // ==========================================

    /// 毛利率 (%) = (售价 - 成本) / 售价 × 100
    ///
    /// 售价 ≤ 0 时无定义,返回 None,绝不除零。
    pub fn margin_pct(sales_price: f64, total_cost: f64) -> Option<f64> {
        if sales_price > 0.0 {
            Some((sales_price - total_cost) / sales_price * 100.0)
        } else {
            None
        }
    }

    /// 盈亏平衡数量 = 固定费用 / (售价 - 单件变动成本)
    ///
    /// 分母不为正时返回 Unbounded 哨兵。
    pub fn break_even_quantity(
        fixed_overhead: f64,
        sales_price: f64,
        variable_unit_cost: f64,
    ) -> BreakEvenQuantity {
        let denominator = sales_price - variable_unit_cost;
        if denominator > 0.0 {
            BreakEvenQuantity::Finite(fixed_overhead / denominator)
        } else {
            BreakEvenQuantity::Unbounded
        }
    }

    /// 盈利分析记录
    pub fn profitability(
        process_id: &str,
        sales_price: f64,
        total_cost: f64,
        fixed_overhead: f64,
    ) -> Profitability {
        Profitability {
            process_id: process_id.to_string(),
            sales_price,
            total_cost,
            margin_pct: Self::margin_pct(sales_price, total_cost),
            break_even: Self::break_even_quantity(fixed_overhead, sales_price, total_cost),
        }
    }
}
