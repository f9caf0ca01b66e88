// ==========================================
// 成本核算引擎集成测试
// ==========================================
// 覆盖: 最坏情况聚合、幂等重算、版本缓存、取价缺失、盈利分析
// ==========================================


use process_costing::api::ApiError;
use process_costing::domain::types::BreakEvenQuantity;
use process_costing::engine::costing::CostingIssue;
use test_helpers::*;

#[test]
fn test_worst_case_total_aggregation() {
    // PLATE 最坏 110.0 + 组最坏 MAX(1.80, 1.20) + 人工 50.0 = 161.80
    let env = TestEnv::new();
    seed_standard_catalog(&env);

    let report = env.costing_api.recalculate("PROC-1").unwrap();
    assert!(report.is_clean());
    assert!((report.total_cost.unwrap() - STANDARD_UNIT_WORST_COST).abs() < 1e-9);

    // 行按 sequence_order 排列
    assert_eq!(report.rows.len(), 2);
    assert_eq!(report.rows[0].sequence_order, 10);
    assert_eq!(report.rows[1].sequence_order, 20);
    assert!((report.rows[0].material_cost - 110.0).abs() < 1e-9);
    assert!((report.rows[1].group_cost - 1.80).abs() < 1e-9);
    assert!((report.rows[1].extra_cost - 50.0).abs() < 1e-9);
}

#[test]
fn test_recalculate_idempotent_and_cached() {
    let env = TestEnv::new();
    seed_standard_catalog(&env);

    let first = env.costing_api.recalculate("PROC-1").unwrap();
    let second = env.costing_api.recalculate("PROC-1").unwrap();
    // 幂等: 同一目录快照,两次重算结果一致
    assert_eq!(first, second);
}

#[test]
fn test_version_bump_invalidates_cache() {
    let env = TestEnv::new();
    seed_standard_catalog(&env);

    let before = env.costing_api.recalculate("PROC-1").unwrap();
    let version_before = before.process_version;

    // 结构性编辑: 软删除下料用料 → 版本递增,总成本下降 110.0
    env.catalog_repo
        .soft_delete_variant_usage(&scoped("PROC-1", "U-PLATE"))
        .unwrap();

    let after = env.costing_api.recalculate("PROC-1").unwrap();
    assert!(after.process_version > version_before);
    assert!(
        (after.total_cost.unwrap() - (STANDARD_UNIT_WORST_COST - 110.0)).abs() < 1e-9,
        "after={:?}",
        after.total_cost
    );
}

#[test]
fn test_group_worst_case_monotonicity() {
    // 组最坏成本 ≥ 任一成员成本
    let env = TestEnv::new();
    seed_standard_catalog(&env);

    let report = env.costing_api.recalculate("PROC-1").unwrap();
    let group_cost = report.rows[1].group_cost;
    for member_cost in [0.90 * 2.0, 0.60 * 2.0] {
        assert!(group_cost >= member_cost - 1e-9);
    }
}

#[test]
fn test_missing_price_blocks_with_distinct_error() {
    let env = TestEnv::new();
    seed_process(&env, "PROC-1");
    // 只给 PLATE-1 报价,SCREW-A/B 缺失
    seed_price(&env, "PLATE-1", "SUP-1", 100.0);

    let report = env.costing_api.recalculate("PROC-1").unwrap();
    assert_eq!(report.total_cost, None);
    assert!(report
        .issues
        .iter()
        .any(|i| matches!(i, CostingIssue::PricingUnavailable { .. })));

    // 盈利分析此时以 PricingUnavailable 区别于其他错误上报
    let err = env.costing_api.profitability("PROC-1", 600.0, 0.0).unwrap_err();
    assert!(matches!(err, ApiError::PricingUnavailable { .. }), "err={:?}", err);
}

#[test]
fn test_profitability_margin_scenario() {
    // 单件 161.80,售价 600 → 毛利率 = (600-161.80)/600×100
    let env = TestEnv::new();
    seed_standard_catalog(&env);

    let profit = env.costing_api.profitability("PROC-1", 600.0, 0.0).unwrap();
    let expected = (600.0 - STANDARD_UNIT_WORST_COST) / 600.0 * 100.0;
    assert!((profit.margin_pct.unwrap() - expected).abs() < 1e-9);
    assert!(matches!(profit.break_even, BreakEvenQuantity::Finite(_)));
}

#[test]
fn test_profitability_zero_sales_price_no_division() {
    let env = TestEnv::new();
    seed_standard_catalog(&env);

    let profit = env.costing_api.profitability("PROC-1", 0.0, 1000.0).unwrap();
    assert_eq!(profit.margin_pct, None);
    assert!(profit.break_even.is_unbounded());
}

#[test]
fn test_soft_deleted_process_not_costed() {
    let env = TestEnv::new();
    seed_standard_catalog(&env);
    env.catalog_repo.soft_delete_process("PROC-1").unwrap();

    let err = env.costing_api.recalculate("PROC-1").unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)), "err={:?}", err);
}

#[test]
fn test_degraded_group_reported_as_malformed() {
    // 软删除组成员至仅剩1个: 组结构违规被结构化上报,不静默接受
    let env = TestEnv::new();
    seed_standard_catalog(&env);
    env.catalog_repo
        .soft_delete_variant_usage(&scoped("PROC-1", "U-SCREW-B"))
        .unwrap();

    let report = env.costing_api.recalculate("PROC-1").unwrap();
    assert_eq!(report.total_cost, None);
    assert!(report
        .issues
        .iter()
        .any(|i| matches!(i, CostingIssue::MalformedGroup { .. })));
}
