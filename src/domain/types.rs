// ==========================================
// 工艺成本核算系统 - 领域类型定义
// ==========================================
// 职责: 定义类型安全的枚举与状态机规则
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 批次状态 (Lot Status)
// ==========================================
// 状态机: PLANNING → READY → EXECUTING → {COMPLETED | FAILED}
//         PLANNING|READY → CANCELLED
//         EXECUTING → READY (可重试失败回退)
// 红线: 终态 (COMPLETED/FAILED/CANCELLED) 不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotStatus {
    Planning,  // 规划中,选型可自由调整
    Ready,     // 就绪,校验通过
    Executing, // 执行中,独占标记
    Completed, // 已完成(终态)
    Failed,    // 执行失败(终态,不可重试的失败)
    Cancelled, // 已取消(终态,人工发起)
}

impl fmt::Display for LotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl LotStatus {
    /// 从字符串解析批次状态
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLANNING" => Some(LotStatus::Planning),
            "READY" => Some(LotStatus::Ready),
            "EXECUTING" => Some(LotStatus::Executing),
            "COMPLETED" => Some(LotStatus::Completed),
            "FAILED" => Some(LotStatus::Failed),
            "CANCELLED" => Some(LotStatus::Cancelled),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            LotStatus::Planning => "PLANNING",
            LotStatus::Ready => "READY",
            LotStatus::Executing => "EXECUTING",
            LotStatus::Completed => "COMPLETED",
            LotStatus::Failed => "FAILED",
            LotStatus::Cancelled => "CANCELLED",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LotStatus::Completed | LotStatus::Failed | LotStatus::Cancelled
        )
    }

    /// 是否允许调整替代组选型
    pub fn allows_selection_change(&self) -> bool {
        matches!(self, LotStatus::Planning | LotStatus::Ready)
    }

    /// 是否允许发起执行
    pub fn allows_execution(&self) -> bool {
        matches!(self, LotStatus::Planning | LotStatus::Ready)
    }

    /// 状态机转换规则
    ///
    /// 注: EXECUTING → READY 是可重试失败的回退路径;
    ///     EXECUTING → PLANNING 同样允许(执行前状态为 PLANNING 时的回退)。
    pub fn can_transition_to(&self, to: LotStatus) -> bool {
        match (self, to) {
            (LotStatus::Planning, LotStatus::Ready) => true,
            (LotStatus::Planning, LotStatus::Executing) => true,
            (LotStatus::Planning, LotStatus::Cancelled) => true,
            (LotStatus::Ready, LotStatus::Executing) => true,
            (LotStatus::Ready, LotStatus::Cancelled) => true,
            (LotStatus::Ready, LotStatus::Planning) => true,
            (LotStatus::Executing, LotStatus::Completed) => true,
            (LotStatus::Executing, LotStatus::Failed) => true,
            (LotStatus::Executing, LotStatus::Ready) => true,
            (LotStatus::Executing, LotStatus::Planning) => true,
            _ => false,
        }
    }
}

// ==========================================
// 选型逻辑 (Selection Logic)
// ==========================================
// 替代组标签: 人工选择 / 最便宜 / 最快
// 注: 本核心无交期数据,FASTEST 仅保留标签,选型仍需人工落锤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionLogic {
    Manual,   // 人工选择
    Cheapest, // 最便宜优先
    Fastest,  // 最快优先
}

impl fmt::Display for SelectionLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl SelectionLogic {
    /// 从字符串解析选型逻辑
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MANUAL" => Some(SelectionLogic::Manual),
            "CHEAPEST" => Some(SelectionLogic::Cheapest),
            "FASTEST" => Some(SelectionLogic::Fastest),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            SelectionLogic::Manual => "MANUAL",
            SelectionLogic::Cheapest => "CHEAPEST",
            SelectionLogic::Fastest => "FASTEST",
        }
    }
}

// ==========================================
// 成本项类别 (Cost Category)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostCategory {
    Labor,    // 人工
    Overhead, // 制造费用
    Other,    // 其他
}

impl fmt::Display for CostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl CostCategory {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LABOR" => Some(CostCategory::Labor),
            "OVERHEAD" => Some(CostCategory::Overhead),
            "OTHER" => Some(CostCategory::Other),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            CostCategory::Labor => "LABOR",
            CostCategory::Overhead => "OVERHEAD",
            CostCategory::Other => "OTHER",
        }
    }
}

// ==========================================
// 成本归一基准 (Cost Basis)
// ==========================================
// 非材料成本的计量方式,核算时统一折算到单件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostBasis {
    PerUnit,  // 按件
    PerHour,  // 按工时
    PerBatch, // 按批
}

impl fmt::Display for CostBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl CostBasis {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PER_UNIT" => Some(CostBasis::PerUnit),
            "PER_HOUR" => Some(CostBasis::PerHour),
            "PER_BATCH" => Some(CostBasis::PerBatch),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            CostBasis::PerUnit => "PER_UNIT",
            CostBasis::PerHour => "PER_HOUR",
            CostBasis::PerBatch => "PER_BATCH",
        }
    }
}

// ==========================================
// 执行时定价模式 (Pricing Mode)
// ==========================================
// 批次执行时实际单价的取价口径,配置可选
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingMode {
    CheapestActive,   // 当前生效报价中最便宜(默认)
    SelectedSupplier, // 按选型时显式指定的供应商取价
}

impl fmt::Display for PricingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl PricingMode {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CHEAPEST_ACTIVE" => Some(PricingMode::CheapestActive),
            "SELECTED_SUPPLIER" => Some(PricingMode::SelectedSupplier),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PricingMode::CheapestActive => "CHEAPEST_ACTIVE",
            PricingMode::SelectedSupplier => "SELECTED_SUPPLIER",
        }
    }
}

// ==========================================
// 盈亏平衡数量 (Break-Even Quantity)
// ==========================================
// 分母不为正时返回 Unbounded 哨兵,绝不抛除零错误
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "quantity", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakEvenQuantity {
    Finite(f64), // 有限数量
    Unbounded,   // 无法回本(售价不高于变动成本)
}

impl BreakEvenQuantity {
    pub fn is_unbounded(&self) -> bool {
        matches!(self, BreakEvenQuantity::Unbounded)
    }
}
