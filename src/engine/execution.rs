// ==========================================
// 工艺成本核算系统 - 批次执行引擎
// ==========================================
// 职责: 编排原子执行单元: 独占标记 → 重新校验 → 取价 →
//       扣库存/落成本明细/完成 (单事务) → 差异核算 → 事件
// 红线: 标记获取后任何失败都必须释放标记;
//       可重试失败回退到执行前状态,不可重试失败进 FAILED;
//       绝无部分扣减
// ==========================================

use crate::config::CostingConfig;
use crate::domain::lot::{LotCostLine, ProductionLot};
use crate::domain::snapshot::ProcessSnapshot;
use crate::domain::types::LotStatus;
use crate::engine::events::{LotEvent, LotEventPublisher, LotEventType, OptionalEventPublisher};
use crate::engine::pricing::{PricingError, PricingResolver};
use crate::engine::validator::{LotSelectionValidator, ReadinessReport};
use crate::repository::catalog_repo::CatalogRepository;
use crate::repository::error::RepositoryError;
use crate::repository::lot_repo::{ProductionLotRepository, StockDeduction};
use crate::repository::price_repo::SupplierPriceRepository;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

// ==========================================
// 执行错误
// ==========================================

/// 执行失败分类
///
/// - Conflict / NotReady: 可重试,批次已回退到执行前状态
/// - DataIntegrity: 不可重试,批次已进 FAILED
/// - Pricing: 主数据缺失,修复报价后可重试,批次已回退
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("执行冲突: {0}")]
    Conflict(String),

    #[error("就绪校验未通过: 缺选型{}项, 缺库存{}项", .report.missing_selections.len(), .report.stock_shortages.len())]
    NotReady { report: ReadinessReport },

    #[error("目录数据完整性错误: {0}")]
    DataIntegrity(String),

    #[error("取价失败: {0}")]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

// ==========================================
// 执行结果
// ==========================================

/// 执行成功摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub lot_id: String,
    pub estimated_total_cost: f64,
    pub actual_total_cost: f64,
    /// 差异 = 实际 - 预估
    pub variance: f64,
    /// 差异率 (%);预估为 0 时为 None
    pub variance_pct: Option<f64>,
    pub completed_at: NaiveDateTime,
    pub cost_lines: Vec<LotCostLine>,
}

// ==========================================
// LotExecutionEngine - 批次执行引擎
// ==========================================
pub struct LotExecutionEngine {
    catalog_repo: Arc<CatalogRepository>,
    price_repo: Arc<SupplierPriceRepository>,
    lot_repo: Arc<ProductionLotRepository>,
    validator: Arc<LotSelectionValidator>,
    config: CostingConfig,
    event_publisher: OptionalEventPublisher,
}

impl LotExecutionEngine {
    pub fn new(
        catalog_repo: Arc<CatalogRepository>,
        price_repo: Arc<SupplierPriceRepository>,
        lot_repo: Arc<ProductionLotRepository>,
        validator: Arc<LotSelectionValidator>,
        config: CostingConfig,
        event_publisher: Option<Arc<dyn LotEventPublisher>>,
    ) -> Self {
        let event_publisher = match event_publisher {
            Some(p) => OptionalEventPublisher::with_publisher(p),
            None => OptionalEventPublisher::none(),
        };

        Self {
            catalog_repo,
            price_repo,
            lot_repo,
            validator,
            config,
            event_publisher,
        }
    }

    /// 执行批次
    ///
    /// 前置条件: 批次状态 ∈ {PLANNING, READY};提交前重新校验,
    /// 绝不信任过期的就绪结论。
    pub fn execute(
        &self,
        lot_id: &str,
        operator: &str,
    ) -> Result<ExecutionSummary, ExecutionError> {
        let lot = self
            .lot_repo
            .find_by_id(lot_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "ProductionLot".to_string(),
                id: lot_id.to_string(),
            })?;

        // 1. 获取独占标记;竞争失败立即返回冲突,不阻塞等待
        let prior = match self.lot_repo.try_begin_execution(lot_id) {
            Ok(prior) => prior,
            Err(RepositoryError::InvalidStateTransition { ref from, .. })
                if from == LotStatus::Executing.to_db_str() =>
            {
                return Err(ExecutionError::Conflict(format!(
                    "批次正在执行中: lot_id={}",
                    lot_id
                )));
            }
            // 并发方先行完成/取消也按冲突上报,调用方重新校验即可看到终态
            Err(RepositoryError::InvalidStateTransition { from, .. }) => {
                return Err(ExecutionError::Conflict(format!(
                    "批次当前状态不允许执行: lot_id={}, status={}",
                    lot_id, from
                )));
            }
            Err(RepositoryError::StatusTransitionConflict { lot_id, expected }) => {
                return Err(ExecutionError::Conflict(format!(
                    "批次状态被并发修改: lot_id={}, expected={}",
                    lot_id, expected
                )));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            "批次执行开始: lot_id={}, operator={}, prior_status={}",
            lot_id,
            operator,
            prior
        );

        // 2. 标记保护下运行执行单元;失败路径统一处置
        match self.run_unit(&lot, operator) {
            Ok(summary) => {
                tracing::info!(
                    "批次执行完成: lot_id={}, actual={:.4}, variance={:.4}",
                    lot_id,
                    summary.actual_total_cost,
                    summary.variance
                );
                Ok(summary)
            }
            Err(err) => {
                self.dispose_failure(lot_id, prior, operator, &err);
                Err(err)
            }
        }
    }

    // ==========================================
    // 执行单元
    // ==========================================

    fn run_unit(
        &self,
        lot: &ProductionLot,
        operator: &str,
    ) -> Result<ExecutionSummary, ExecutionError> {
        // 重载快照: 工艺被软删除 → 不可重试
        let snapshot = match self.catalog_repo.load_snapshot(&lot.process_id) {
            Ok(snapshot) => snapshot,
            Err(RepositoryError::NotFound { .. }) => {
                return Err(ExecutionError::DataIntegrity(format!(
                    "工艺已被删除: process_id={}",
                    lot.process_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if snapshot.version() != lot.process_version {
            // 成本口径以创建时冻结的预估为准,扣料按当前结构执行
            tracing::warn!(
                "目录版本已漂移: lot_id={}, 创建时版本={}, 当前版本={}",
                lot.lot_id,
                lot.process_version,
                snapshot.version()
            );
        }

        let selections = self.lot_repo.find_selections(&lot.lot_id)?;

        // 选型引用的实体在就绪确认后被软删除 → 不可重试
        self.check_selection_integrity(&snapshot, &selections)?;

        // 重新校验就绪 (不信任过期读)
        let report = self.validator.validate(&snapshot, lot, &selections)?;
        if !report.is_ready {
            return Err(ExecutionError::NotReady { report });
        }

        // 解析物料清单并取实际价
        let bom = LotSelectionValidator::resolve_bill_of_materials(&snapshot, &selections);
        let today = Local::now().date_naive();
        let now = Local::now().naive_local();
        let mode = lot
            .config_snapshot_json
            .as_deref()
            .and_then(CostingConfig::from_snapshot_json)
            .map(|c| c.actual_pricing_mode)
            .unwrap_or(self.config.actual_pricing_mode);

        let mut cost_lines = Vec::with_capacity(bom.resolved.len());
        let mut deduction_map: BTreeMap<String, f64> = BTreeMap::new();
        for item in &bom.resolved {
            let prices = self
                .price_repo
                .active_prices(&item.usage.variant_id, today)?;
            let (unit_price, supplier_id) = PricingResolver::actual_unit_price(
                &item.usage.variant_id,
                &prices,
                today,
                mode,
                item.supplier_id,
            )?;

            let actual_quantity = item.usage.quantity * lot.lot_quantity;
            cost_lines.push(LotCostLine {
                line_id: uuid::Uuid::new_v4().to_string(),
                lot_id: lot.lot_id.clone(),
                usage_id: item.usage.usage_id.clone(),
                variant_id: item.usage.variant_id.clone(),
                supplier_id: Some(supplier_id),
                actual_unit_price: unit_price,
                actual_quantity,
                line_cost: unit_price * actual_quantity,
                created_at: now,
            });
            *deduction_map
                .entry(item.usage.variant_id.clone())
                .or_insert(0.0) += actual_quantity;
        }

        let actual_total_cost: f64 = cost_lines.iter().map(|l| l.line_cost).sum();
        let deductions: Vec<StockDeduction> = deduction_map
            .into_iter()
            .map(|(variant_id, amount)| StockDeduction { variant_id, amount })
            .collect();

        // 单事务提交: 条件扣库存 + 成本明细 + 批次完成
        let completed_at = Local::now().naive_local();
        match self.lot_repo.commit_execution(
            &lot.lot_id,
            &deductions,
            &cost_lines,
            actual_total_cost,
            completed_at,
        ) {
            Ok(()) => {}
            Err(RepositoryError::InsufficientStock {
                variant_id,
                required,
                available,
            }) => {
                // 校验之后库存被并发批次消耗 → 过期就绪,按冲突处理
                return Err(ExecutionError::Conflict(format!(
                    "库存被并发批次消耗: variant_id={}, required={}, available={}",
                    variant_id, required, available
                )));
            }
            Err(e) => return Err(e.into()),
        }

        // 差异核算
        let variance = actual_total_cost - lot.estimated_total_cost;
        let variance_pct = if lot.estimated_total_cost == 0.0 {
            None
        } else {
            Some(variance / lot.estimated_total_cost * 100.0)
        };

        let event = LotEvent::new(
            lot.lot_id.clone(),
            LotEventType::LotExecuted,
            operator.to_string(),
            serde_json::json!({
                "estimated_total_cost": lot.estimated_total_cost,
                "actual_total_cost": actual_total_cost,
                "variance": variance,
                "variance_pct": variance_pct,
                "cost_line_count": cost_lines.len(),
            }),
        );
        if let Err(e) = self.event_publisher.publish(event) {
            tracing::warn!("发布执行完成事件失败: {}", e);
        }

        Ok(ExecutionSummary {
            lot_id: lot.lot_id.clone(),
            estimated_total_cost: lot.estimated_total_cost,
            actual_total_cost,
            variance,
            variance_pct,
            completed_at,
            cost_lines,
        })
    }

    /// 选型完整性检查: 选型指向的用料从快照中消失 (软删除) 即数据完整性错误
    fn check_selection_integrity(
        &self,
        snapshot: &ProcessSnapshot,
        selections: &[crate::domain::lot::LotSelection],
    ) -> Result<(), ExecutionError> {
        for selection in selections {
            // 组本身不可达时选型自然失效,不算完整性错误
            let Some(group) = snapshot.find_group(&selection.group_id) else {
                continue;
            };
            if !group.contains_usage(&selection.usage_id)
                && snapshot.find_usage(&selection.usage_id).is_none()
            {
                return Err(ExecutionError::DataIntegrity(format!(
                    "选型引用的用料已被删除: group_id={}, usage_id={}",
                    selection.group_id, selection.usage_id
                )));
            }
        }
        Ok(())
    }

    /// 失败处置: 释放独占标记
    ///
    /// - 不可重试 (DataIntegrity) → FAILED + lot.failed 事件
    /// - 可重试 → 回退到执行前状态
    fn dispose_failure(
        &self,
        lot_id: &str,
        prior: LotStatus,
        operator: &str,
        err: &ExecutionError,
    ) {
        match err {
            ExecutionError::DataIntegrity(reason) => {
                tracing::error!("批次执行不可重试失败: lot_id={}, reason={}", lot_id, reason);
                if let Err(e) = self.lot_repo.mark_failed(lot_id, reason) {
                    tracing::error!("标记批次失败状态未成功: lot_id={}, err={}", lot_id, e);
                }
                let event = LotEvent::new(
                    lot_id.to_string(),
                    LotEventType::LotFailed,
                    operator.to_string(),
                    serde_json::json!({ "reason": reason }),
                );
                if let Err(e) = self.event_publisher.publish(event) {
                    tracing::warn!("发布执行失败事件失败: {}", e);
                }
            }
            _ => {
                tracing::warn!(
                    "批次执行回退: lot_id={}, to={}, err={}",
                    lot_id,
                    prior,
                    err
                );
                if let Err(e) = self.lot_repo.rollback_execution(lot_id, prior) {
                    tracing::error!("批次执行回退未成功: lot_id={}, err={}", lot_id, e);
                }
            }
        }
    }
}
