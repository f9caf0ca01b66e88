// ==========================================
// 工艺成本核算系统 - API 层
// ==========================================
// 职责: 面向调用边界的业务接口;HTTP/会话/授权等属于外部边界
// ==========================================

pub mod costing_api;
pub mod error;
pub mod lot_api;

// 重导出核心类型
pub use costing_api::CostingApi;
pub use error::{ApiError, ApiResult};
pub use lot_api::{LotApi, VarianceReport};
