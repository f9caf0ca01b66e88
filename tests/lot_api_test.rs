// ==========================================
// 生产批次接口集成测试
// ==========================================
// 覆盖: 创建/选型/就绪校验/取消与状态机边界
// ==========================================


use process_costing::api::ApiError;
use process_costing::domain::types::LotStatus;
use test_helpers::*;

#[test]
fn test_create_lot_freezes_estimate_and_version() {
    let env = TestEnv::new();
    seed_standard_catalog(&env);

    let lot = env
        .lot_api
        .create_lot("PROC-1", 10.0, Some(600.0), "tester")
        .unwrap();

    assert_eq!(lot.status, LotStatus::Planning);
    assert!((lot.estimated_total_cost - STANDARD_UNIT_WORST_COST * 10.0).abs() < 1e-9);

    // 捕获创建时刻的工艺版本
    let process = env.catalog_repo.find_process("PROC-1").unwrap().unwrap();
    assert_eq!(lot.process_version, process.version);

    // 预估在创建时冻结: 之后的目录编辑不改变已有批次
    env.catalog_repo
        .soft_delete_variant_usage(&scoped("PROC-1", "U-PLATE"))
        .unwrap();
    let reloaded = env.lot_api.get_lot(&lot.lot_id).unwrap();
    assert!((reloaded.estimated_total_cost - STANDARD_UNIT_WORST_COST * 10.0).abs() < 1e-9);
}

#[test]
fn test_create_lot_rejects_invalid_input() {
    let env = TestEnv::new();
    seed_standard_catalog(&env);

    assert!(matches!(
        env.lot_api.create_lot("PROC-1", 0.0, None, "tester"),
        Err(ApiError::InvalidInput(_))
    ));
    assert!(matches!(
        env.lot_api.create_lot("", 10.0, None, "tester"),
        Err(ApiError::InvalidInput(_))
    ));
    assert!(matches!(
        env.lot_api.create_lot("PROC-MISSING", 10.0, None, "tester"),
        Err(ApiError::NotFound(_))
    ));
}

#[test]
fn test_create_lot_without_price_is_pricing_unavailable() {
    // 取价缺失阻断创建,与库存问题严格区分
    let env = TestEnv::new();
    seed_process(&env, "PROC-1");

    let err = env
        .lot_api
        .create_lot("PROC-1", 10.0, None, "tester")
        .unwrap_err();
    assert!(matches!(err, ApiError::PricingUnavailable { .. }), "err={:?}", err);
}

#[test]
fn test_validate_reports_missing_selection() {
    // 场景: 未选型的替代组 → is_ready=false, missing_selections 长度1
    let env = TestEnv::new();
    seed_standard_catalog(&env);
    seed_ample_stock(&env);

    let lot = env.lot_api.create_lot("PROC-1", 10.0, None, "tester").unwrap();
    let report = env.lot_api.validate(&lot.lot_id).unwrap();

    assert!(!report.is_ready);
    assert_eq!(report.missing_selections.len(), 1);
    assert_eq!(
        report.missing_selections[0].group_id,
        scoped("PROC-1", "G-SCREW")
    );
    // 未就绪不推进状态
    assert_eq!(env.lot_api.get_lot(&lot.lot_id).unwrap().status, LotStatus::Planning);
}

#[test]
fn test_select_and_validate_promotes_to_ready() {
    let env = TestEnv::new();
    seed_standard_catalog(&env);
    seed_ample_stock(&env);

    let lot = env.lot_api.create_lot("PROC-1", 10.0, None, "tester").unwrap();
    env.lot_api
        .select_variant(
            &lot.lot_id,
            &scoped("PROC-1", "G-SCREW"),
            &scoped("PROC-1", "U-SCREW-A"),
            None,
            Some("价格最优"),
            "tester",
        )
        .unwrap();

    let report = env.lot_api.validate(&lot.lot_id).unwrap();
    assert!(report.is_ready, "report={:?}", report);
    assert_eq!(env.lot_api.get_lot(&lot.lot_id).unwrap().status, LotStatus::Ready);
}

#[test]
fn test_reselect_overwrites_previous_choice() {
    // 规划期选型可自由覆盖,每组至多一条
    let env = TestEnv::new();
    seed_standard_catalog(&env);

    let lot = env.lot_api.create_lot("PROC-1", 10.0, None, "tester").unwrap();
    let group_id = scoped("PROC-1", "G-SCREW");
    env.lot_api
        .select_variant(&lot.lot_id, &group_id, &scoped("PROC-1", "U-SCREW-A"), None, None, "tester")
        .unwrap();
    env.lot_api
        .select_variant(&lot.lot_id, &group_id, &scoped("PROC-1", "U-SCREW-B"), None, None, "tester")
        .unwrap();

    let selections = env.lot_api.list_selections(&lot.lot_id).unwrap();
    assert_eq!(selections.len(), 1);
    assert_eq!(selections[0].usage_id, scoped("PROC-1", "U-SCREW-B"));
}

#[test]
fn test_select_rejects_non_member_usage() {
    let env = TestEnv::new();
    seed_standard_catalog(&env);

    let lot = env.lot_api.create_lot("PROC-1", 10.0, None, "tester").unwrap();
    let err = env
        .lot_api
        .select_variant(
            &lot.lot_id,
            &scoped("PROC-1", "G-SCREW"),
            &scoped("PROC-1", "U-PLATE"), // 非组成员
            None,
            None,
            "tester",
        )
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)), "err={:?}", err);
}

#[test]
fn test_validate_collects_stock_shortages() {
    let env = TestEnv::new();
    seed_standard_catalog(&env);
    // 批量10需要 PLATE-1×10, SCREW-A×20;两者都只给一半
    env.inventory_repo.upsert_stock("PLATE-1", 5.0).unwrap();
    env.inventory_repo.upsert_stock("SCREW-A", 10.0).unwrap();

    let lot = env.lot_api.create_lot("PROC-1", 10.0, None, "tester").unwrap();
    env.lot_api
        .select_variant(
            &lot.lot_id,
            &scoped("PROC-1", "G-SCREW"),
            &scoped("PROC-1", "U-SCREW-A"),
            None,
            None,
            "tester",
        )
        .unwrap();

    let report = env.lot_api.validate(&lot.lot_id).unwrap();
    assert!(!report.is_ready);
    // 缺口全量收集,不在第一条短路
    assert_eq!(report.stock_shortages.len(), 2);
}

#[test]
fn test_cancel_requires_reason() {
    let env = TestEnv::new();
    seed_standard_catalog(&env);

    let lot = env.lot_api.create_lot("PROC-1", 10.0, None, "tester").unwrap();
    assert!(matches!(
        env.lot_api.cancel(&lot.lot_id, "  ", "tester"),
        Err(ApiError::InvalidInput(_))
    ));

    env.lot_api.cancel(&lot.lot_id, "客户取消订单", "tester").unwrap();
    let cancelled = env.lot_api.get_lot(&lot.lot_id).unwrap();
    assert_eq!(cancelled.status, LotStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("客户取消订单"));
}

#[test]
fn test_terminal_lot_is_immutable() {
    let env = TestEnv::new();
    seed_standard_catalog(&env);

    let lot = env.lot_api.create_lot("PROC-1", 10.0, None, "tester").unwrap();
    env.lot_api.cancel(&lot.lot_id, "作废", "tester").unwrap();

    // 终态不可再取消/选型/校验
    assert!(matches!(
        env.lot_api.cancel(&lot.lot_id, "再次取消", "tester"),
        Err(ApiError::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        env.lot_api.select_variant(
            &lot.lot_id,
            &scoped("PROC-1", "G-SCREW"),
            &scoped("PROC-1", "U-SCREW-A"),
            None,
            None,
            "tester"
        ),
        Err(ApiError::BusinessRuleViolation(_))
    ));
    assert!(matches!(
        env.lot_api.validate(&lot.lot_id),
        Err(ApiError::BusinessRuleViolation(_))
    ));
}

#[test]
fn test_variance_report_only_for_completed() {
    let env = TestEnv::new();
    seed_standard_catalog(&env);

    let lot = env.lot_api.create_lot("PROC-1", 10.0, None, "tester").unwrap();
    assert!(matches!(
        env.lot_api.variance_report(&lot.lot_id),
        Err(ApiError::BusinessRuleViolation(_))
    ));
}
