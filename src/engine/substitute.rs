// ==========================================
// 工艺成本核算系统 - 替代组解析引擎
// ==========================================
// 职责: 替代组构造校验与组级最坏情况成本
// 口径: 组最坏成本 = MAX(成员最坏单价 × 成员用量),
//       保证无论最终选哪个成员,估算都不会低估
// ==========================================

use crate::domain::catalog::{SupplierPrice, SubstituteGroup, VariantUsage};
use crate::domain::snapshot::SnapshotGroup;
use crate::engine::pricing::{PricingError, PricingResolver};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// 构造校验问题
// ==========================================

/// 替代组构造违规 (结构化收集,一次返回全部问题)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupConstructionIssue {
    /// 成员不足 2 个
    TooFewMembers { group_id: String, member_count: usize },
    /// 成员跨子工序
    CrossSubprocessMember {
        group_id: String,
        usage_id: String,
        member_subprocess_id: String,
        group_subprocess_id: String,
    },
    /// 组内变体重复
    DuplicateVariant { group_id: String, variant_id: String },
}

// ==========================================
// SubstituteGroupResolver - 替代组解析器
// ==========================================
pub struct SubstituteGroupResolver;

impl SubstituteGroupResolver {
    /// 校验替代组结构
    ///
    /// 返回发现的全部违规;空向量表示结构合法。
    pub fn validate_group(
        group: &SubstituteGroup,
        members: &[VariantUsage],
    ) -> Vec<GroupConstructionIssue> {
        let mut issues = Vec::new();

        if members.len() < 2 {
            issues.push(GroupConstructionIssue::TooFewMembers {
                group_id: group.group_id.clone(),
                member_count: members.len(),
            });
        }

        let mut seen_variants: Vec<&str> = Vec::new();
        for member in members {
            if member.subprocess_id != group.subprocess_id {
                issues.push(GroupConstructionIssue::CrossSubprocessMember {
                    group_id: group.group_id.clone(),
                    usage_id: member.usage_id.clone(),
                    member_subprocess_id: member.subprocess_id.clone(),
                    group_subprocess_id: group.subprocess_id.clone(),
                });
            }
            if seen_variants.contains(&member.variant_id.as_str()) {
                issues.push(GroupConstructionIssue::DuplicateVariant {
                    group_id: group.group_id.clone(),
                    variant_id: member.variant_id.clone(),
                });
            } else {
                seen_variants.push(member.variant_id.as_str());
            }
        }

        issues
    }

    /// 组级最坏情况成本 = MAX(成员最坏单价 × 成员用量)
    ///
    /// 任一成员取价失败即整组失败 (PricingUnavailable 向上传递)。
    pub fn group_worst_case_cost(
        group: &SnapshotGroup,
        prices: &HashMap<String, Vec<SupplierPrice>>,
        today: NaiveDate,
    ) -> Result<f64, PricingError> {
        let mut worst: Option<f64> = None;
        for member in &group.members {
            let member_prices = prices
                .get(&member.variant_id)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            let unit =
                PricingResolver::worst_case_unit_price(&member.variant_id, member_prices, today)?;
            let member_cost = unit * member.quantity;
            worst = Some(worst.map_or(member_cost, |w| w.max(member_cost)));
        }
        // 快照内的组恒有成员;空组在构造/装载侧已被拦截
        worst.ok_or_else(|| PricingError::PricingUnavailable {
            variant_id: format!("group:{}", group.group.group_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SelectionLogic;
    use chrono::Utc;

    fn usage(usage_id: &str, subprocess_id: &str, variant_id: &str, quantity: f64) -> VariantUsage {
        VariantUsage {
            usage_id: usage_id.to_string(),
            subprocess_id: subprocess_id.to_string(),
            variant_id: variant_id.to_string(),
            variant_name: variant_id.to_string(),
            quantity,
            unit: "个".to_string(),
            group_id: Some("G-1".to_string()),
            active: true,
            created_at: Utc::now().naive_local(),
        }
    }

    fn group(subprocess_id: &str) -> SubstituteGroup {
        SubstituteGroup {
            group_id: "G-1".to_string(),
            subprocess_id: subprocess_id.to_string(),
            group_name: "紧固件替代组".to_string(),
            selection_logic: SelectionLogic::Manual,
            active: true,
            created_at: Utc::now().naive_local(),
        }
    }

    fn price(variant_id: &str, unit_price: f64) -> SupplierPrice {
        SupplierPrice {
            price_id: format!("P-{}-{}", variant_id, unit_price),
            variant_id: variant_id.to_string(),
            supplier_id: "S1".to_string(),
            supplier_name: "供应商S1".to_string(),
            unit_price,
            effective_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            active: true,
            created_at: Utc::now().naive_local(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 6).unwrap()
    }

    #[test]
    fn test_validate_rejects_single_member() {
        let issues = SubstituteGroupResolver::validate_group(
            &group("SP-1"),
            &[usage("U-1", "SP-1", "SCREW-A", 2.0)],
        );
        assert_eq!(issues.len(), 1);
        assert!(matches!(
            issues[0],
            GroupConstructionIssue::TooFewMembers { member_count: 1, .. }
        ));
    }

    #[test]
    fn test_validate_rejects_cross_subprocess_and_duplicate() {
        let issues = SubstituteGroupResolver::validate_group(
            &group("SP-1"),
            &[
                usage("U-1", "SP-1", "SCREW-A", 2.0),
                usage("U-2", "SP-2", "SCREW-B", 2.0), // 跨子工序
                usage("U-3", "SP-1", "SCREW-A", 1.0), // 变体重复
            ],
        );
        assert!(issues
            .iter()
            .any(|i| matches!(i, GroupConstructionIssue::CrossSubprocessMember { .. })));
        assert!(issues
            .iter()
            .any(|i| matches!(i, GroupConstructionIssue::DuplicateVariant { .. })));
    }

    #[test]
    fn test_validate_accepts_wellformed_group() {
        let issues = SubstituteGroupResolver::validate_group(
            &group("SP-1"),
            &[
                usage("U-1", "SP-1", "SCREW-A", 2.0),
                usage("U-2", "SP-1", "SCREW-B", 2.0),
            ],
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn test_group_worst_case_is_max_of_member_costs() {
        // 场景: {Screw-A 最坏0.90, Screw-B 最坏0.60},各用量2 → MAX(1.80, 1.20) = 1.80
        let snapshot_group = SnapshotGroup {
            group: group("SP-1"),
            members: vec![
                usage("U-1", "SP-1", "SCREW-A", 2.0),
                usage("U-2", "SP-1", "SCREW-B", 2.0),
            ],
        };
        let mut prices = HashMap::new();
        prices.insert("SCREW-A".to_string(), vec![price("SCREW-A", 0.90)]);
        prices.insert("SCREW-B".to_string(), vec![price("SCREW-B", 0.60)]);

        let cost =
            SubstituteGroupResolver::group_worst_case_cost(&snapshot_group, &prices, today())
                .unwrap();
        assert!((cost - 1.80).abs() < 1e-9);
    }

    #[test]
    fn test_group_worst_case_never_below_any_member() {
        // 单调性: 组最坏成本 ≥ 任一成员成本
        let snapshot_group = SnapshotGroup {
            group: group("SP-1"),
            members: vec![
                usage("U-1", "SP-1", "SCREW-A", 3.0),
                usage("U-2", "SP-1", "SCREW-B", 1.0),
            ],
        };
        let mut prices = HashMap::new();
        prices.insert("SCREW-A".to_string(), vec![price("SCREW-A", 0.90)]);
        prices.insert("SCREW-B".to_string(), vec![price("SCREW-B", 5.0)]);

        let cost =
            SubstituteGroupResolver::group_worst_case_cost(&snapshot_group, &prices, today())
                .unwrap();
        for member_cost in [0.90 * 3.0, 5.0 * 1.0] {
            assert!(cost >= member_cost - 1e-9);
        }
    }

    #[test]
    fn test_group_worst_case_member_without_price_fails() {
        let snapshot_group = SnapshotGroup {
            group: group("SP-1"),
            members: vec![
                usage("U-1", "SP-1", "SCREW-A", 2.0),
                usage("U-2", "SP-1", "SCREW-B", 2.0),
            ],
        };
        let mut prices = HashMap::new();
        prices.insert("SCREW-A".to_string(), vec![price("SCREW-A", 0.90)]);
        // SCREW-B 无报价

        let err =
            SubstituteGroupResolver::group_worst_case_cost(&snapshot_group, &prices, today())
                .unwrap_err();
        assert_eq!(err.variant_id(), "SCREW-B");
    }
}
