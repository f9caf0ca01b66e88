// ==========================================
// 工艺成本核算系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、状态机规则
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod catalog;
pub mod lot;
pub mod snapshot;
pub mod types;

// 重导出核心类型
pub use catalog::{
    CostItem, Process, ProcessSubprocess, Subprocess, SubstituteGroup, SupplierPrice,
    VariantUsage,
};
pub use lot::{LotCostLine, LotSelection, ProductionLot, Profitability};
pub use snapshot::{ProcessSnapshot, SnapshotGroup, SnapshotSubprocess};
pub use types::{
    BreakEvenQuantity, CostBasis, CostCategory, LotStatus, PricingMode, SelectionLogic,
};
