// ==========================================
// 工艺成本核算系统 - 生产批次领域模型
// ==========================================
// 职责: 生产批次/替代组选型/实际成本明细实体
// 红线: 批次只经由校验器/执行引擎路径变更;终态不可变
// ==========================================

use crate::domain::types::{BreakEvenQuantity, LotStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ProductionLot - 生产批次
// ==========================================
// 从工艺快照实例化;estimated 在创建时按最坏情况锁定,
// actual 在执行完成后回填
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionLot {
    pub lot_id: String,                      // 批次ID
    pub process_id: String,                  // 来源工艺
    pub process_version: i64,                // 创建时捕获的工艺版本
    pub lot_quantity: f64,                   // 目标数量
    pub status: LotStatus,                   // 批次状态
    pub estimated_total_cost: f64,           // 预估总成本 (最坏情况)
    pub actual_total_cost: Option<f64>,      // 实际总成本 (执行后回填)
    pub sales_price: Option<f64>,            // 单件售价 (盈利分析用)
    pub config_snapshot_json: Option<String>, // 创建时的配置快照 (JSON)
    pub cancel_reason: Option<String>,       // 取消原因 (CANCELLED 必填)
    pub fail_reason: Option<String>,         // 失败原因 (FAILED 必填)
    pub created_by: String,                  // 创建人
    pub created_at: NaiveDateTime,           // 创建时间
    pub updated_at: NaiveDateTime,           // 更新时间
    pub completed_at: Option<NaiveDateTime>, // 完成时间
}

impl ProductionLot {
    /// 是否处于终态
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 成本差异 = 实际 - 预估 (执行完成前为 None)
    pub fn variance(&self) -> Option<f64> {
        self.actual_total_cost
            .map(|actual| actual - self.estimated_total_cost)
    }

    /// 成本差异率 (%);预估为 0 时为 None,不做除零
    pub fn variance_pct(&self) -> Option<f64> {
        let variance = self.variance()?;
        if self.estimated_total_cost == 0.0 {
            return None;
        }
        Some(variance / self.estimated_total_cost * 100.0)
    }
}

// ==========================================
// LotSelection - 替代组选型
// ==========================================
// 红线: 每个批次每个替代组至多一条 (UNIQUE(lot_id, group_id))
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotSelection {
    pub selection_id: String,        // 选型ID
    pub lot_id: String,              // 所属批次
    pub group_id: String,            // 替代组
    pub usage_id: String,            // 选定的组内用料
    pub supplier_id: Option<String>, // 显式指定的供应商 (SELECTED_SUPPLIER 模式取价用)
    pub reason: Option<String>,      // 选型理由
    pub selected_by: String,         // 操作人
    pub selected_at: NaiveDateTime,  // 选型时间
}

// ==========================================
// LotCostLine - 实际成本明细
// ==========================================
// 执行落账后的实际物料清单,合计必须与 actual_total_cost 精确一致
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotCostLine {
    pub line_id: String,             // 明细ID
    pub lot_id: String,              // 所属批次
    pub usage_id: String,            // 对应用料
    pub variant_id: String,          // 物料变体
    pub supplier_id: Option<String>, // 取价供应商 (按取价模式可为空)
    pub actual_unit_price: f64,      // 实际单价
    pub actual_quantity: f64,        // 实际数量 (用量 × 批次数量)
    pub line_cost: f64,              // 行成本 = 单价 × 数量
    pub created_at: NaiveDateTime,   // 落账时间
}

// ==========================================
// Profitability - 盈利分析 (派生记录,不落库)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profitability {
    pub process_id: String,            // 工艺ID
    pub sales_price: f64,              // 单件售价
    pub total_cost: f64,               // 单件总成本 (最坏情况)
    pub margin_pct: Option<f64>,       // 毛利率 (%);售价≤0 时为 None
    pub break_even: BreakEvenQuantity, // 盈亏平衡数量
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn lot(estimated: f64, actual: Option<f64>) -> ProductionLot {
        ProductionLot {
            lot_id: "LOT-1".to_string(),
            process_id: "P-1".to_string(),
            process_version: 1,
            lot_quantity: 10.0,
            status: LotStatus::Completed,
            estimated_total_cost: estimated,
            actual_total_cost: actual,
            sales_price: None,
            config_snapshot_json: None,
            cancel_reason: None,
            fail_reason: None,
            created_by: "tester".to_string(),
            created_at: Utc::now().naive_local(),
            updated_at: Utc::now().naive_local(),
            completed_at: None,
        }
    }

    #[test]
    fn test_variance() {
        let l = lot(500.0, Some(450.0));
        assert_eq!(l.variance(), Some(-50.0));
        assert_eq!(l.variance_pct(), Some(-10.0));
    }

    #[test]
    fn test_variance_zero_estimate_no_division() {
        // 预估为 0 时差异率为 None,不抛除零
        let l = lot(0.0, Some(10.0));
        assert_eq!(l.variance(), Some(10.0));
        assert_eq!(l.variance_pct(), None);
    }

    #[test]
    fn test_variance_before_completion() {
        let l = lot(500.0, None);
        assert_eq!(l.variance(), None);
        assert_eq!(l.variance_pct(), None);
    }
}
