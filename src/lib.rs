// ==========================================
// 工艺成本核算系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 最坏情况成本核算与生产批次执行核心
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/schema）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    BreakEvenQuantity, CostBasis, CostCategory, LotStatus, PricingMode, SelectionLogic,
};

// 领域实体
pub use domain::{
    CostItem, LotCostLine, LotSelection, Process, ProcessSnapshot, ProcessSubprocess,
    ProductionLot, Profitability, Subprocess, SubstituteGroup, SupplierPrice, VariantUsage,
};

// 引擎
pub use engine::{
    CostingEngine, CostingReport, LotEventPublisher, LotExecutionEngine, LotSelectionValidator,
    PricingResolver, ReadinessReport, SubstituteGroupResolver,
};

// API
pub use api::{ApiError, ApiResult, CostingApi, LotApi};

// 配置
pub use config::CostingConfig;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "工艺成本核算系统";
