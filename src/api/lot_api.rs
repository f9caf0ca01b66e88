// ==========================================
// 工艺成本核算系统 - 生产批次接口
// ==========================================
// 职责: 批次生命周期操作入口 (创建/选型/校验/执行/取消/差异报告)
// 红线: 批次只经由本接口与执行引擎变更;角色越权等授权判断
//       属于调用边界,不在本层实现
// ==========================================

use crate::api::costing_api::CostingApi;
use crate::api::error::{ApiError, ApiResult};
use crate::config::CostingConfig;
use crate::domain::lot::{LotCostLine, LotSelection, ProductionLot};
use crate::domain::types::LotStatus;
use crate::engine::costing::CostingEngine;
use crate::engine::events::{LotEvent, LotEventPublisher, LotEventType, OptionalEventPublisher};
use crate::engine::execution::{ExecutionSummary, LotExecutionEngine};
use crate::engine::validator::{LotSelectionValidator, ReadinessReport};
use crate::repository::catalog_repo::CatalogRepository;
use crate::repository::error::RepositoryError;
use crate::repository::lot_repo::ProductionLotRepository;
use crate::repository::price_repo::SupplierPriceRepository;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ==========================================
// 差异报告 DTO
// ==========================================

/// 批次成本差异报告 (仅 COMPLETED 批次)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarianceReport {
    pub lot_id: String,
    pub process_id: String,
    pub lot_quantity: f64,
    pub estimated_total_cost: f64,
    pub actual_total_cost: f64,
    /// 差异 = 实际 - 预估
    pub variance: f64,
    /// 差异率 (%);预估为 0 时为 None
    pub variance_pct: Option<f64>,
    pub cost_lines: Vec<LotCostLine>,
}

// ==========================================
// LotApi - 生产批次接口
// ==========================================
pub struct LotApi {
    catalog_repo: Arc<CatalogRepository>,
    price_repo: Arc<SupplierPriceRepository>,
    lot_repo: Arc<ProductionLotRepository>,
    validator: Arc<LotSelectionValidator>,
    execution_engine: Arc<LotExecutionEngine>,
    config: CostingConfig,
    event_publisher: OptionalEventPublisher,
}

impl LotApi {
    pub fn new(
        catalog_repo: Arc<CatalogRepository>,
        price_repo: Arc<SupplierPriceRepository>,
        lot_repo: Arc<ProductionLotRepository>,
        validator: Arc<LotSelectionValidator>,
        execution_engine: Arc<LotExecutionEngine>,
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
            execution_engine,
            config,
            event_publisher,
        }
    }

    // ==========================================
    // 批次创建
    // ==========================================

    /// 从工艺快照创建生产批次
    ///
    /// 预估总成本 = 工艺最坏情况单件成本 × 批次数量,在创建时刻冻结;
    /// 同时固化工艺版本号与生效配置快照,后续目录/配置编辑不回溯影响本批次。
    pub fn create_lot(
        &self,
        process_id: &str,
        quantity: f64,
        sales_price: Option<f64>,
        operator: &str,
    ) -> ApiResult<ProductionLot> {
        if process_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("工艺ID不能为空".to_string()));
        }
        if quantity <= 0.0 {
            return Err(ApiError::InvalidInput(format!(
                "批次数量必须为正: {}",
                quantity
            )));
        }

        let snapshot = self.catalog_repo.load_snapshot(process_id)?;
        let today = Local::now().date_naive();
        let prices = self
            .price_repo
            .active_prices_map(&snapshot.variant_ids(), today)?;
        let report = CostingEngine::recalculate(&snapshot, &prices, today);
        let unit_cost = CostingApi::require_total(&report)?;

        let actor = if operator.trim().is_empty() { "system" } else { operator };
        let now = Local::now().naive_local();
        let lot = ProductionLot {
            lot_id: uuid::Uuid::new_v4().to_string(),
            process_id: process_id.to_string(),
            process_version: snapshot.version(),
            lot_quantity: quantity,
            status: LotStatus::Planning,
            estimated_total_cost: unit_cost * quantity,
            actual_total_cost: None,
            sales_price,
            config_snapshot_json: Some(self.config.to_snapshot_json()),
            cancel_reason: None,
            fail_reason: None,
            created_by: actor.to_string(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.lot_repo.create(&lot)?;

        let event = LotEvent::new(
            lot.lot_id.clone(),
            LotEventType::LotCreated,
            actor.to_string(),
            serde_json::json!({
                "process_id": process_id,
                "process_version": lot.process_version,
                "lot_quantity": quantity,
                "estimated_total_cost": lot.estimated_total_cost,
            }),
        );
        if let Err(e) = self.event_publisher.publish(event) {
            tracing::warn!("发布批次创建事件失败: {}", e);
        }

        tracing::info!(
            "批次创建: lot_id={}, process_id={}, quantity={}, estimated={:.4}",
            lot.lot_id,
            process_id,
            quantity,
            lot.estimated_total_cost
        );
        Ok(lot)
    }

    // ==========================================
    // 替代组选型
    // ==========================================

    /// 为批次的一个替代组落锤选型
    ///
    /// 仅 PLANNING/READY 状态允许;每组至多一条,重复选型覆盖。
    /// supplier_id 仅在 SELECTED_SUPPLIER 取价模式下参与执行取价。
    pub fn select_variant(
        &self,
        lot_id: &str,
        group_id: &str,
        usage_id: &str,
        supplier_id: Option<&str>,
        reason: Option<&str>,
        operator: &str,
    ) -> ApiResult<LotSelection> {
        if group_id.trim().is_empty() || usage_id.trim().is_empty() {
            return Err(ApiError::InvalidInput(
                "替代组ID与用料ID不能为空".to_string(),
            ));
        }

        let lot = self.require_lot(lot_id)?;
        if !lot.status.allows_selection_change() {
            return Err(ApiError::BusinessRuleViolation(format!(
                "仅 PLANNING/READY 状态允许调整选型,当前状态: {}",
                lot.status
            )));
        }

        let snapshot = self.catalog_repo.load_snapshot(&lot.process_id)?;
        let group = snapshot.find_group(group_id).ok_or_else(|| {
            ApiError::NotFound(format!("替代组不存在或不可达: group_id={}", group_id))
        })?;
        if !group.contains_usage(usage_id) {
            return Err(ApiError::InvalidInput(format!(
                "用料不是替代组成员: group_id={}, usage_id={}",
                group_id, usage_id
            )));
        }

        let actor = if operator.trim().is_empty() { "system" } else { operator };
        let selection = LotSelection {
            selection_id: uuid::Uuid::new_v4().to_string(),
            lot_id: lot_id.to_string(),
            group_id: group_id.to_string(),
            usage_id: usage_id.to_string(),
            supplier_id: supplier_id.map(|s| s.to_string()),
            reason: reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            selected_by: actor.to_string(),
            selected_at: Local::now().naive_local(),
        };
        self.lot_repo.upsert_selection(&selection)?;

        let event = LotEvent::new(
            lot_id.to_string(),
            LotEventType::LotSelected,
            actor.to_string(),
            serde_json::json!({
                "group_id": group_id,
                "usage_id": usage_id,
                "supplier_id": supplier_id,
                "reason": selection.reason,
            }),
        );
        if let Err(e) = self.event_publisher.publish(event) {
            tracing::warn!("发布选型事件失败: {}", e);
        }

        Ok(selection)
    }

    // ==========================================
    // 就绪校验
    // ==========================================

    /// 校验批次就绪度
    ///
    /// 纯校验,问题全量收集;校验通过时顺带把 PLANNING 批次推进到
    /// READY (派生状态,执行引擎提交前仍会重新校验)。
    /// 无锁只读,允许与在途执行并发;EXECUTING 批次只出报告不改状态。
    pub fn validate(&self, lot_id: &str) -> ApiResult<ReadinessReport> {
        let lot = self.require_lot(lot_id)?;
        if lot.is_terminal() {
            return Err(ApiError::BusinessRuleViolation(format!(
                "当前状态不支持就绪校验: {}",
                lot.status
            )));
        }

        let snapshot = match self.catalog_repo.load_snapshot(&lot.process_id) {
            Ok(snapshot) => snapshot,
            Err(RepositoryError::NotFound { .. }) => {
                return Err(ApiError::DataIntegrity(format!(
                    "工艺已被删除: process_id={}",
                    lot.process_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let selections = self.lot_repo.find_selections(lot_id)?;
        let report = self.validator.validate(&snapshot, &lot, &selections)?;

        if report.is_ready && lot.status == LotStatus::Planning {
            self.lot_repo.mark_ready(lot_id)?;
        }

        Ok(report)
    }

    // ==========================================
    // 执行
    // ==========================================

    /// 执行批次 (原子扣库存 + 实际成本落账 + 差异核算)
    pub fn execute(&self, lot_id: &str, operator: &str) -> ApiResult<ExecutionSummary> {
        let actor = if operator.trim().is_empty() { "system" } else { operator };
        let summary = self.execution_engine.execute(lot_id, actor)?;
        Ok(summary)
    }

    // ==========================================
    // 取消
    // ==========================================

    /// 取消批次 (PLANNING/READY 专属,原因必填)
    pub fn cancel(&self, lot_id: &str, reason: &str, operator: &str) -> ApiResult<()> {
        if reason.trim().is_empty() {
            return Err(ApiError::InvalidInput("取消原因不能为空".to_string()));
        }

        self.lot_repo.cancel(lot_id, reason)?;

        let actor = if operator.trim().is_empty() { "system" } else { operator };
        let event = LotEvent::new(
            lot_id.to_string(),
            LotEventType::LotCancelled,
            actor.to_string(),
            serde_json::json!({ "reason": reason.trim() }),
        );
        if let Err(e) = self.event_publisher.publish(event) {
            tracing::warn!("发布取消事件失败: {}", e);
        }

        tracing::info!("批次取消: lot_id={}, reason={}", lot_id, reason.trim());
        Ok(())
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 查询批次
    pub fn get_lot(&self, lot_id: &str) -> ApiResult<ProductionLot> {
        self.require_lot(lot_id)
    }

    /// 查询批次选型
    pub fn list_selections(&self, lot_id: &str) -> ApiResult<Vec<LotSelection>> {
        self.require_lot(lot_id)?;
        Ok(self.lot_repo.find_selections(lot_id)?)
    }

    /// 成本差异报告 (仅 COMPLETED 批次)
    ///
    /// 守恒: cost_lines 的行成本合计精确等于 actual_total_cost。
    pub fn variance_report(&self, lot_id: &str) -> ApiResult<VarianceReport> {
        let lot = self.require_lot(lot_id)?;
        if lot.status != LotStatus::Completed {
            return Err(ApiError::BusinessRuleViolation(format!(
                "仅已完成批次支持差异报告,当前状态: {}",
                lot.status
            )));
        }

        let actual = lot.actual_total_cost.ok_or_else(|| {
            ApiError::InternalError(format!("已完成批次缺少实际成本: lot_id={}", lot_id))
        })?;
        let cost_lines = self.lot_repo.find_cost_lines(lot_id)?;

        Ok(VarianceReport {
            lot_id: lot.lot_id.clone(),
            process_id: lot.process_id.clone(),
            lot_quantity: lot.lot_quantity,
            estimated_total_cost: lot.estimated_total_cost,
            actual_total_cost: actual,
            variance: actual - lot.estimated_total_cost,
            variance_pct: lot.variance_pct(),
            cost_lines,
        })
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn require_lot(&self, lot_id: &str) -> ApiResult<ProductionLot> {
        if lot_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("批次ID不能为空".to_string()));
        }
        self.lot_repo
            .find_by_id(lot_id)?
            .ok_or_else(|| ApiError::NotFound(format!("批次{}不存在", lot_id)))
    }
}
