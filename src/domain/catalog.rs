// ==========================================
// 工艺成本核算系统 - 工艺目录领域模型
// ==========================================
// 职责: 定义工艺/子工序/用料/替代组/报价/成本项实体
// 红线: 目录实体软删除 (active 标志),读取侧过滤,审计保留
// ==========================================

use crate::domain::types::{CostBasis, CostCategory, SelectionLogic};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// Process - 工艺
// ==========================================
// 结构性编辑 (挂接/用料/替代组/成本项变更) 必须递增 version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub process_id: String,          // 工艺ID
    pub process_name: String,        // 工艺名称
    pub description: Option<String>, // 描述
    pub version: i64,                // 单调版本号 (结构性编辑递增)
    pub active: bool,                // 软删除标志
    pub created_by: String,          // 创建人
    pub created_at: NaiveDateTime,   // 创建时间
    pub updated_at: NaiveDateTime,   // 更新时间
}

// ==========================================
// Subprocess - 子工序模板
// ==========================================
// 可被多个工艺通过 ProcessSubprocess 复用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subprocess {
    pub subprocess_id: String,       // 子工序ID
    pub subprocess_name: String,     // 子工序名称
    pub description: Option<String>, // 描述
    pub active: bool,                // 软删除标志
    pub created_at: NaiveDateTime,   // 创建时间
    pub updated_at: NaiveDateTime,   // 更新时间
}

// ==========================================
// ProcessSubprocess - 工艺-子工序挂接
// ==========================================
// 红线: sequence_order 在同一工艺内唯一且严格递增
// 注: 顺序只影响遍历/报表展示,不影响成本合计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSubprocess {
    pub link_id: String,           // 挂接ID
    pub process_id: String,        // 所属工艺
    pub subprocess_id: String,     // 挂接的子工序
    pub sequence_order: i64,       // 序号
    pub active: bool,              // 软删除标志
    pub created_at: NaiveDateTime, // 创建时间
}

// ==========================================
// VariantUsage - 物料变体用量
// ==========================================
// (子工序, 变体, 用量, 单位) 四元组;最多属于一个替代组
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantUsage {
    pub usage_id: String,         // 用量ID
    pub subprocess_id: String,    // 所属子工序
    pub variant_id: String,       // 物料变体ID
    pub variant_name: String,     // 物料变体名称
    pub quantity: f64,            // 单件用量
    pub unit: String,             // 计量单位
    pub group_id: Option<String>, // 所属替代组 (可选,至多一个)
    pub active: bool,             // 软删除标志
    pub created_at: NaiveDateTime, // 创建时间
}

impl VariantUsage {
    /// 是否属于某个替代组
    pub fn is_grouped(&self) -> bool {
        self.group_id.is_some()
    }
}

// ==========================================
// SubstituteGroup - 替代组 (OR组)
// ==========================================
// 红线: ≥2个成员,成员来自同一子工序,变体不重复
// 执行前必须恰好选定一个成员
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstituteGroup {
    pub group_id: String,                // 替代组ID
    pub subprocess_id: String,           // 所属子工序
    pub group_name: String,              // 组名
    pub selection_logic: SelectionLogic, // 选型逻辑标签
    pub active: bool,                    // 软删除标志
    pub created_at: NaiveDateTime,       // 创建时间
}

// ==========================================
// SupplierPrice - 供应商报价
// ==========================================
// 同一变体允许多条报价并存;最坏情况取最大,实际取价按配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierPrice {
    pub price_id: String,          // 报价ID
    pub variant_id: String,        // 物料变体ID
    pub supplier_id: String,       // 供应商ID
    pub supplier_name: String,     // 供应商名称
    pub unit_price: f64,           // 单价
    pub effective_date: NaiveDate, // 生效日期
    pub active: bool,              // 有效标志
    pub created_at: NaiveDateTime, // 创建时间
}

impl SupplierPrice {
    /// 判断报价在指定日期是否生效
    pub fn is_effective_on(&self, today: NaiveDate) -> bool {
        self.active && self.effective_date <= today
    }
}

// ==========================================
// CostItem - 非材料成本项
// ==========================================
// 人工/制造费用等,核算时统一折算到单件口径
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostItem {
    pub cost_item_id: String,        // 成本项ID
    pub subprocess_id: String,       // 所属子工序
    pub cost_name: String,           // 成本项名称
    pub category: CostCategory,      // 类别 (LABOR/OVERHEAD/OTHER)
    pub amount: f64,                 // 金额 (按 cost_basis 口径)
    pub cost_basis: CostBasis,       // 归一基准
    pub hours_per_unit: Option<f64>, // 单件工时 (PER_HOUR 必填)
    pub batch_size: Option<f64>,     // 批量 (PER_BATCH 必填)
    pub active: bool,                // 软删除标志
    pub created_at: NaiveDateTime,   // 创建时间
}

impl CostItem {
    /// 折算到单件口径的金额
    ///
    /// 返回 None 表示归一参数缺失或非法 (如 PER_BATCH 批量≤0),
    /// 由核算引擎收集为结构化问题,不在此处报错。
    pub fn unit_amount(&self) -> Option<f64> {
        match self.cost_basis {
            CostBasis::PerUnit => Some(self.amount),
            CostBasis::PerHour => self
                .hours_per_unit
                .filter(|h| *h > 0.0)
                .map(|h| self.amount * h),
            CostBasis::PerBatch => self
                .batch_size
                .filter(|b| *b > 0.0)
                .map(|b| self.amount / b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cost_item(basis: CostBasis, amount: f64, hours: Option<f64>, batch: Option<f64>) -> CostItem {
        CostItem {
            cost_item_id: "CI-1".to_string(),
            subprocess_id: "SP-1".to_string(),
            cost_name: "测试成本".to_string(),
            category: CostCategory::Labor,
            amount,
            cost_basis: basis,
            hours_per_unit: hours,
            batch_size: batch,
            active: true,
            created_at: Utc::now().naive_local(),
        }
    }

    #[test]
    fn test_cost_item_unit_amount() {
        // 按件: 原值
        assert_eq!(cost_item(CostBasis::PerUnit, 50.0, None, None).unit_amount(), Some(50.0));
        // 按工时: 金额 × 单件工时
        assert_eq!(
            cost_item(CostBasis::PerHour, 80.0, Some(0.5), None).unit_amount(),
            Some(40.0)
        );
        // 按批: 金额 / 批量
        assert_eq!(
            cost_item(CostBasis::PerBatch, 1000.0, None, Some(200.0)).unit_amount(),
            Some(5.0)
        );
        // 参数缺失 → None
        assert_eq!(cost_item(CostBasis::PerHour, 80.0, None, None).unit_amount(), None);
        // 批量非法 → None
        assert_eq!(
            cost_item(CostBasis::PerBatch, 1000.0, None, Some(0.0)).unit_amount(),
            None
        );
    }

    #[test]
    fn test_supplier_price_effective() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let mut price = SupplierPrice {
            price_id: "P-1".to_string(),
            variant_id: "V-1".to_string(),
            supplier_id: "S-1".to_string(),
            supplier_name: "测试供应商".to_string(),
            unit_price: 0.9,
            effective_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            active: true,
            created_at: Utc::now().naive_local(),
        };
        assert!(price.is_effective_on(today));

        // 未来生效的报价不参与取价
        price.effective_date = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        assert!(!price.is_effective_on(today));

        // 停用报价不参与取价
        price.effective_date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        price.active = false;
        assert!(!price.is_effective_on(today));
    }
}
