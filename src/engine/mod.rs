// ==========================================
// 工艺成本核算系统 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎,不拼 SQL
// 红线: Engine 不拼 SQL, 可恢复问题必须输出结构化 reason
// ==========================================

pub mod costing;
pub mod events;
pub mod execution;
pub mod pricing;
pub mod substitute;
pub mod validator;

// 重导出核心引擎
pub use costing::{CostingEngine, CostingIssue, CostingReport, SubprocessCostRow};
pub use events::{
    LotEvent, LotEventPublisher, LotEventType, NoOpEventPublisher, OptionalEventPublisher,
};
pub use execution::{ExecutionError, ExecutionSummary, LotExecutionEngine};
pub use pricing::{PricingError, PricingResolver};
pub use substitute::{GroupConstructionIssue, SubstituteGroupResolver};
pub use validator::{
    LotSelectionValidator, MissingSelection, ReadinessReport, ResolvedUsage, StockShortage,
};
