// ==========================================
// 工艺成本核算系统 - 定价解析引擎
// ==========================================
// 职责: 从供应商报价集合解析最坏情况单价与执行时实际单价
// 红线: 报价集合为空必须显式报错,绝不静默按 0 计价
// ==========================================

use crate::domain::catalog::SupplierPrice;
use crate::domain::types::PricingMode;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==========================================
// 取价错误
// ==========================================

/// 取价失败 (主数据缺失,与库存耗尽是两类问题)
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingError {
    #[error("无生效报价: variant_id={variant_id}")]
    PricingUnavailable { variant_id: String },

    #[error("指定供应商无生效报价: variant_id={variant_id}, supplier_id={supplier_id}")]
    SelectedSupplierUnavailable {
        variant_id: String,
        supplier_id: String,
    },
}

impl PricingError {
    /// 关联的变体ID
    pub fn variant_id(&self) -> &str {
        match self {
            PricingError::PricingUnavailable { variant_id } => variant_id,
            PricingError::SelectedSupplierUnavailable { variant_id, .. } => variant_id,
        }
    }
}

// ==========================================
// PricingResolver - 定价解析器
// ==========================================
// 纯函数集合: 输入报价切片,输出单价,不触达数据访问
pub struct PricingResolver;

impl PricingResolver {
    /// 最坏情况单价 = 当前生效报价中的最大值
    ///
    /// 并列最大值任取其一,估算只关心量级。
    pub fn worst_case_unit_price(
        variant_id: &str,
        prices: &[SupplierPrice],
        today: NaiveDate,
    ) -> Result<f64, PricingError> {
        prices
            .iter()
            .filter(|p| p.is_effective_on(today))
            .map(|p| p.unit_price)
            .fold(None::<f64>, |acc, price| {
                Some(acc.map_or(price, |max| max.max(price)))
            })
            .ok_or_else(|| PricingError::PricingUnavailable {
                variant_id: variant_id.to_string(),
            })
    }

    /// 最便宜生效单价及其供应商
    pub fn cheapest_unit_price(
        variant_id: &str,
        prices: &[SupplierPrice],
        today: NaiveDate,
    ) -> Result<(f64, String), PricingError> {
        prices
            .iter()
            .filter(|p| p.is_effective_on(today))
            .min_by(|a, b| {
                a.unit_price
                    .partial_cmp(&b.unit_price)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|p| (p.unit_price, p.supplier_id.clone()))
            .ok_or_else(|| PricingError::PricingUnavailable {
                variant_id: variant_id.to_string(),
            })
    }

    /// 执行时实际单价
    ///
    /// 取价口径:
    /// - CHEAPEST_ACTIVE: 最便宜生效报价 (默认)
    /// - SELECTED_SUPPLIER: 按选型时显式指定的供应商取价;该供应商无生效
    ///   报价时显式报错,不静默降级为最便宜。未指定供应商的用料仍按最便宜取价。
    pub fn actual_unit_price(
        variant_id: &str,
        prices: &[SupplierPrice],
        today: NaiveDate,
        mode: PricingMode,
        selected_supplier: Option<&str>,
    ) -> Result<(f64, String), PricingError> {
        match (mode, selected_supplier) {
            (PricingMode::SelectedSupplier, Some(supplier_id)) => prices
                .iter()
                .filter(|p| p.is_effective_on(today) && p.supplier_id == supplier_id)
                .min_by(|a, b| {
                    a.unit_price
                        .partial_cmp(&b.unit_price)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|p| (p.unit_price, p.supplier_id.clone()))
                .ok_or_else(|| PricingError::SelectedSupplierUnavailable {
                    variant_id: variant_id.to_string(),
                    supplier_id: supplier_id.to_string(),
                }),
            _ => Self::cheapest_unit_price(variant_id, prices, today),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn price(supplier: &str, unit_price: f64, effective: &str, active: bool) -> SupplierPrice {
        SupplierPrice {
            price_id: format!("P-{}-{}", supplier, unit_price),
            variant_id: "SCREW-A".to_string(),
            supplier_id: supplier.to_string(),
            supplier_name: format!("供应商{}", supplier),
            unit_price,
            effective_date: NaiveDate::parse_from_str(effective, "%Y-%m-%d").unwrap(),
            active,
            created_at: Utc::now().naive_local(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 6).unwrap()
    }

    #[test]
    fn test_worst_case_takes_max() {
        // 场景: 报价 {0.50, 0.75, 0.90} → 最坏情况 0.90
        let prices = vec![
            price("S1", 0.50, "2026-01-01", true),
            price("S2", 0.75, "2026-01-01", true),
            price("S3", 0.90, "2026-01-01", true),
        ];
        let worst = PricingResolver::worst_case_unit_price("SCREW-A", &prices, today()).unwrap();
        assert_eq!(worst, 0.90);
    }

    #[test]
    fn test_worst_case_ignores_inactive_and_future() {
        let prices = vec![
            price("S1", 0.50, "2026-01-01", true),
            price("S2", 9.99, "2026-01-01", false),  // 停用
            price("S3", 8.88, "2026-12-01", true),   // 未来生效
        ];
        let worst = PricingResolver::worst_case_unit_price("SCREW-A", &prices, today()).unwrap();
        assert_eq!(worst, 0.50);
    }

    #[test]
    fn test_empty_price_set_is_an_error() {
        // 红线: 空报价集合显式报错,不默认 0
        let err = PricingResolver::worst_case_unit_price("SCREW-A", &[], today()).unwrap_err();
        assert_eq!(
            err,
            PricingError::PricingUnavailable {
                variant_id: "SCREW-A".to_string()
            }
        );
    }

    #[test]
    fn test_actual_price_cheapest_active() {
        let prices = vec![
            price("S1", 0.50, "2026-01-01", true),
            price("S2", 0.75, "2026-01-01", true),
        ];
        let (actual, supplier) = PricingResolver::actual_unit_price(
            "SCREW-A",
            &prices,
            today(),
            PricingMode::CheapestActive,
            None,
        )
        .unwrap();
        assert_eq!(actual, 0.50);
        assert_eq!(supplier, "S1");
    }

    #[test]
    fn test_actual_price_selected_supplier() {
        let prices = vec![
            price("S1", 0.50, "2026-01-01", true),
            price("S2", 0.75, "2026-01-01", true),
        ];
        let (actual, supplier) = PricingResolver::actual_unit_price(
            "SCREW-A",
            &prices,
            today(),
            PricingMode::SelectedSupplier,
            Some("S2"),
        )
        .unwrap();
        assert_eq!(actual, 0.75);
        assert_eq!(supplier, "S2");
    }

    #[test]
    fn test_selected_supplier_without_price_is_explicit_error() {
        // 指定供应商缺报价时不得静默降级
        let prices = vec![price("S1", 0.50, "2026-01-01", true)];
        let err = PricingResolver::actual_unit_price(
            "SCREW-A",
            &prices,
            today(),
            PricingMode::SelectedSupplier,
            Some("S9"),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PricingError::SelectedSupplierUnavailable {
                variant_id: "SCREW-A".to_string(),
                supplier_id: "S9".to_string(),
            }
        );
    }

    #[test]
    fn test_selected_mode_without_explicit_supplier_falls_back_to_cheapest() {
        let prices = vec![
            price("S1", 0.50, "2026-01-01", true),
            price("S2", 0.75, "2026-01-01", true),
        ];
        let (actual, _) = PricingResolver::actual_unit_price(
            "SCREW-A",
            &prices,
            today(),
            PricingMode::SelectedSupplier,
            None,
        )
        .unwrap();
        assert_eq!(actual, 0.50);
    }
}
