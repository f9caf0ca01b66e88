// ==========================================
// 工艺成本核算系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误分类,转换仓储/引擎错误为用户可解释的业务错误
// 分类约定:
// - ValidationFailed / CatalogValidationFailed: 结构化数据,无状态变更,调整输入即可恢复
// - Conflict / StaleReadiness: 并发竞争或过期就绪,重新校验后重试
// - DataIntegrity: 目录实体在校验与执行之间消失,需修目录,不可重试
// - PricingUnavailable: 主数据缺失,与库存耗尽严格区分
// ==========================================

use crate::engine::costing::CostingIssue;
use crate::engine::execution::ExecutionError;
use crate::engine::pricing::PricingError;
use crate::engine::validator::ReadinessReport;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    /// 目录结构问题 (如替代组衰减/成本项无法归一),结构化全量列出
    #[error("目录校验未通过: {}条问题", .issues.len())]
    CatalogValidationFailed { issues: Vec<CostingIssue> },

    // ==========================================
    // 并发控制错误
    // ==========================================
    /// 并发执行竞争: 同一批次同时只允许一个执行单元
    #[error("执行冲突: {0}")]
    Conflict(String),

    /// 提交时就绪结论已过期 (选型/库存被并发修改),重新校验后重试
    #[error("就绪状态已过期: 缺选型{}项, 缺库存{}项", .report.missing_selections.len(), .report.stock_shortages.len())]
    StaleReadiness { report: ReadinessReport },

    // ==========================================
    // 数据完整性错误
    // ==========================================
    /// 校验与执行之间目录实体被软删除,不可重试,需修复目录
    #[error("数据完整性错误: {0}")]
    DataIntegrity(String),

    // ==========================================
    // 取价错误
    // ==========================================
    /// 主数据缺失 (区别于库存耗尽)
    #[error("取价失败: {detail}")]
    PricingUnavailable { variant_id: String, detail: String },

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将仓储层的技术错误转换为用户可解释的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 并发控制错误
            RepositoryError::VersionConflict { message } => ApiError::Conflict(message),
            RepositoryError::StatusTransitionConflict { lot_id, expected } => {
                ApiError::Conflict(format!(
                    "批次{}状态已被并发修改（期望{}）",
                    lot_id, expected
                ))
            }
            RepositoryError::InsufficientStock {
                variant_id,
                required,
                available,
            } => ApiError::Conflict(format!(
                "库存不足: variant_id={}, required={}, available={}",
                variant_id, required, available
            )),

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            // 业务规则错误
            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }

            // 数据质量错误
            RepositoryError::ValidationError(msg) => ApiError::InvalidInput(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            // 通用错误
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 PricingError 转换
// ==========================================
impl From<PricingError> for ApiError {
    fn from(err: PricingError) -> Self {
        ApiError::PricingUnavailable {
            variant_id: err.variant_id().to_string(),
            detail: err.to_string(),
        }
    }
}

// ==========================================
// 从 ExecutionError 转换
// ==========================================
impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Conflict(msg) => ApiError::Conflict(msg),
            ExecutionError::NotReady { report } => ApiError::StaleReadiness { report },
            ExecutionError::DataIntegrity(msg) => ApiError::DataIntegrity(msg),
            ExecutionError::Pricing(e) => e.into(),
            ExecutionError::Repository(e) => e.into(),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        // NotFound错误转换
        let repo_err = RepositoryError::NotFound {
            entity: "ProductionLot".to_string(),
            id: "LOT-1".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("ProductionLot"));
                assert!(msg.contains("LOT-1"));
            }
            _ => panic!("Expected NotFound"),
        }

        // InsufficientStock → Conflict (竞争消耗)
        let repo_err = RepositoryError::InsufficientStock {
            variant_id: "SCREW-A".to_string(),
            required: 20.0,
            available: 5.0,
        };
        let api_err: ApiError = repo_err.into();
        assert!(matches!(api_err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_pricing_error_is_distinct_from_stock() {
        let api_err: ApiError = PricingError::PricingUnavailable {
            variant_id: "SCREW-A".to_string(),
        }
        .into();
        match api_err {
            ApiError::PricingUnavailable { variant_id, .. } => {
                assert_eq!(variant_id, "SCREW-A");
            }
            _ => panic!("Expected PricingUnavailable"),
        }
    }

    #[test]
    fn test_execution_not_ready_maps_to_stale_readiness() {
        let err = ExecutionError::NotReady {
            report: ReadinessReport {
                is_ready: false,
                missing_selections: vec![],
                stock_shortages: vec![],
            },
        };
        let api_err: ApiError = err.into();
        assert!(matches!(api_err, ApiError::StaleReadiness { .. }));
    }
}
