// ==========================================
// 工艺成本核算系统 - 数据仓储层
// ==========================================
// 职责: 全部 SQL 集中在本层;引擎层只消费实体与结果
// 红线: 写入走条件 UPDATE/事务,读取按 active=1 过滤软删除
// ==========================================

pub mod catalog_repo;
pub mod error;
pub mod inventory_repo;
pub mod lot_repo;
pub mod price_repo;

// 重导出核心类型
pub use catalog_repo::CatalogRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use inventory_repo::InventoryRepository;
pub use lot_repo::{ProductionLotRepository, StockDeduction};
pub use price_repo::SupplierPriceRepository;
