// ==========================================
// 工艺成本核算系统 - 成本核算接口
// ==========================================
// 职责: 工艺级最坏情况成本重算与盈利分析查询
// 缓存: 报告按 (process_id, 工艺版本) 缓存;目录结构性编辑递增
//       版本即自然失效。报价单独变更不递增工艺版本,报价维护边界
//       需调用 invalidate 显式失效。
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::lot::Profitability;
use crate::engine::costing::{CostingEngine, CostingIssue, CostingReport};
use crate::repository::catalog_repo::CatalogRepository;
use crate::repository::price_repo::SupplierPriceRepository;
use chrono::Local;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ==========================================
// CostingApi - 成本核算接口
// ==========================================
pub struct CostingApi {
    catalog_repo: Arc<CatalogRepository>,
    price_repo: Arc<SupplierPriceRepository>,
    /// process_id → 最近一次报告 (含版本号,命中须版本一致)
    cache: Mutex<HashMap<String, CostingReport>>,
}

impl CostingApi {
    pub fn new(
        catalog_repo: Arc<CatalogRepository>,
        price_repo: Arc<SupplierPriceRepository>,
    ) -> Self {
        Self {
            catalog_repo,
            price_repo,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 重算工艺最坏情况成本
    ///
    /// 纯核算: 相同快照版本命中缓存直接返回,结果逐次一致。
    pub fn recalculate(&self, process_id: &str) -> ApiResult<CostingReport> {
        if process_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("工艺ID不能为空".to_string()));
        }

        let snapshot = self.catalog_repo.load_snapshot(process_id)?;

        // 版本一致的缓存命中
        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache.get(process_id) {
                if cached.process_version == snapshot.version() {
                    tracing::debug!(
                        "成本报告缓存命中: process_id={}, version={}",
                        process_id,
                        cached.process_version
                    );
                    return Ok(cached.clone());
                }
            }
        }

        let today = Local::now().date_naive();
        let prices = self
            .price_repo
            .active_prices_map(&snapshot.variant_ids(), today)?;
        let report = CostingEngine::recalculate(&snapshot, &prices, today);

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(process_id.to_string(), report.clone());
        }

        tracing::info!(
            "工艺成本重算完成: process_id={}, version={}, total={:?}, issues={}",
            process_id,
            report.process_version,
            report.total_cost,
            report.issues.len()
        );
        Ok(report)
    }

    /// 显式失效缓存 (报价维护边界在报价变更后调用)
    pub fn invalidate(&self, process_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(process_id);
        }
    }

    /// 盈利分析
    ///
    /// margin_pct 在售价 ≤ 0 时为 None;break_even 在售价不高于
    /// 单件变动成本时为 Unbounded 哨兵。
    pub fn profitability(
        &self,
        process_id: &str,
        sales_price: f64,
        fixed_overhead: f64,
    ) -> ApiResult<Profitability> {
        let report = self.recalculate(process_id)?;
        let total_cost = Self::require_total(&report)?;
        Ok(CostingEngine::profitability(
            process_id,
            sales_price,
            total_cost,
            fixed_overhead,
        ))
    }

    /// 从报告中取总成本;有问题时转换为对应的API错误
    pub(crate) fn require_total(report: &CostingReport) -> ApiResult<f64> {
        if let Some(total) = report.total_cost {
            return Ok(total);
        }

        // 取价缺失优先单独上报,与目录结构问题区分
        if let Some(CostingIssue::PricingUnavailable { variant_id, .. }) = report
            .issues
            .iter()
            .find(|i| matches!(i, CostingIssue::PricingUnavailable { .. }))
        {
            return Err(ApiError::PricingUnavailable {
                variant_id: variant_id.clone(),
                detail: format!("变体{}无生效报价,无法核算", variant_id),
            });
        }

        Err(ApiError::CatalogValidationFailed {
            issues: report.issues.clone(),
        })
    }
}
