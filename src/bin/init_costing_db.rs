// ==========================================
// 工艺成本核算系统 - 数据库初始化/演示数据工具
// ==========================================
// 用法: init-costing-db [db_path]
// - 幂等建表 (已有库上安全重复执行)
// - 空库时播种一套演示工艺目录,便于联调与手工验证
// ==========================================

use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use process_costing::config::CostingConfig;
use process_costing::db::{init_schema, open_sqlite_connection, read_schema_version};
use process_costing::domain::catalog::{
    CostItem, Process, ProcessSubprocess, Subprocess, SubstituteGroup, SupplierPrice,
    VariantUsage,
};
use process_costing::domain::types::{CostBasis, CostCategory, SelectionLogic};
use process_costing::logging;
use process_costing::repository::{
    CatalogRepository, InventoryRepository, SupplierPriceRepository,
};

const DEMO_PROCESS_ID: &str = "PROC-DEMO";

/// 默认数据库路径: <数据目录>/process-costing/costing.db
fn default_db_path() -> String {
    let mut path: PathBuf = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("process-costing");
    if let Err(e) = std::fs::create_dir_all(&path) {
        tracing::warn!("创建数据目录失败,回退当前目录: {}", e);
        return "costing.db".to_string();
    }
    path.push("costing.db");
    path.to_string_lossy().to_string()
}

fn main() -> Result<(), Box<dyn Error>> {
    logging::init();

    let db_path = std::env::args().nth(1).unwrap_or_else(default_db_path);
    tracing::info!("初始化数据库: {}", db_path);

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;
    tracing::info!("schema_version={:?}", read_schema_version(&conn)?);

    let already_seeded: i64 =
        conn.query_row("SELECT COUNT(*) FROM process", [], |row| row.get(0))?;
    if already_seeded > 0 {
        tracing::info!("目录非空,跳过演示数据播种");
        print_quick_counts(&conn)?;
        return Ok(());
    }

    let conn = Arc::new(Mutex::new(conn));
    seed_demo_catalog(conn.clone())?;

    let conn = conn.lock().map_err(|e| e.to_string())?;
    print_quick_counts(&conn)?;
    tracing::info!("演示数据播种完成,取价模式: {:?}", CostingConfig::default().actual_pricing_mode);
    Ok(())
}

/// 播种演示目录: 装配工艺 = 下料 + 装配(含紧固件替代组与人工成本项)
fn seed_demo_catalog(conn: Arc<Mutex<Connection>>) -> Result<(), Box<dyn Error>> {
    let now = Local::now().naive_local();
    let effective = NaiveDate::from_ymd_opt(2020, 1, 1).expect("静态日期");

    let catalog_repo = CatalogRepository::new(conn.clone());
    let price_repo = SupplierPriceRepository::new(conn.clone());
    let inventory_repo = InventoryRepository::new(conn);

    catalog_repo.create_process(&Process {
        process_id: DEMO_PROCESS_ID.to_string(),
        process_name: "支架装配工艺".to_string(),
        description: Some("演示: 下料 + 装配".to_string()),
        version: 1,
        active: true,
        created_by: "seed".to_string(),
        created_at: now,
        updated_at: now,
    })?;

    for (subprocess_id, name, order) in [
        ("SP-CUT", "下料", 10),
        ("SP-ASM", "装配", 20),
    ] {
        catalog_repo.create_subprocess(&Subprocess {
            subprocess_id: subprocess_id.to_string(),
            subprocess_name: name.to_string(),
            description: None,
            active: true,
            created_at: now,
            updated_at: now,
        })?;
        catalog_repo.link_subprocess(&ProcessSubprocess {
            link_id: Uuid::new_v4().to_string(),
            process_id: DEMO_PROCESS_ID.to_string(),
            subprocess_id: subprocess_id.to_string(),
            sequence_order: order,
            active: true,
            created_at: now,
        })?;
    }

    // 下料: 钢板,无替代
    catalog_repo.add_variant_usage(&VariantUsage {
        usage_id: "U-PLATE".to_string(),
        subprocess_id: "SP-CUT".to_string(),
        variant_id: "PLATE-Q235".to_string(),
        variant_name: "Q235钢板".to_string(),
        quantity: 1.0,
        unit: "张".to_string(),
        group_id: None,
        active: true,
        created_at: now,
    })?;

    // 装配: 紧固件二选一
    for (usage_id, variant_id, variant_name) in [
        ("U-SCREW-A", "SCREW-A", "内六角螺钉A"),
        ("U-SCREW-B", "SCREW-B", "十字螺钉B"),
    ] {
        catalog_repo.add_variant_usage(&VariantUsage {
            usage_id: usage_id.to_string(),
            subprocess_id: "SP-ASM".to_string(),
            variant_id: variant_id.to_string(),
            variant_name: variant_name.to_string(),
            quantity: 2.0,
            unit: "个".to_string(),
            group_id: None,
            active: true,
            created_at: now,
        })?;
    }
    catalog_repo.create_substitute_group(
        &SubstituteGroup {
            group_id: "G-SCREW".to_string(),
            subprocess_id: "SP-ASM".to_string(),
            group_name: "紧固件替代组".to_string(),
            selection_logic: SelectionLogic::Manual,
            active: true,
            created_at: now,
        },
        &["U-SCREW-A".to_string(), "U-SCREW-B".to_string()],
    )?;

    catalog_repo.add_cost_item(&CostItem {
        cost_item_id: "CI-ASM-LABOR".to_string(),
        subprocess_id: "SP-ASM".to_string(),
        cost_name: "装配人工".to_string(),
        category: CostCategory::Labor,
        amount: 50.0,
        cost_basis: CostBasis::PerUnit,
        hours_per_unit: None,
        batch_size: None,
        active: true,
        created_at: now,
    })?;

    // 报价: 每个变体多供应商并存
    for (variant_id, supplier_id, supplier_name, unit_price) in [
        ("PLATE-Q235", "SUP-1", "华东钢贸", 120.0),
        ("PLATE-Q235", "SUP-2", "北方物资", 135.0),
        ("SCREW-A", "SUP-1", "华东钢贸", 0.50),
        ("SCREW-A", "SUP-3", "标准件城", 0.90),
        ("SCREW-B", "SUP-3", "标准件城", 0.60),
    ] {
        price_repo.insert(&SupplierPrice {
            price_id: Uuid::new_v4().to_string(),
            variant_id: variant_id.to_string(),
            supplier_id: supplier_id.to_string(),
            supplier_name: supplier_name.to_string(),
            unit_price,
            effective_date: effective,
            active: true,
            created_at: now,
        })?;
    }

    // 初始库存
    inventory_repo.upsert_stock("PLATE-Q235", 500.0)?;
    inventory_repo.upsert_stock("SCREW-A", 10_000.0)?;
    inventory_repo.upsert_stock("SCREW-B", 10_000.0)?;

    Ok(())
}

fn print_quick_counts(conn: &Connection) -> Result<(), Box<dyn Error>> {
    for table in [
        "process",
        "subprocess",
        "process_subprocess",
        "variant_usage",
        "substitute_group",
        "cost_item",
        "supplier_price",
        "inventory_stock",
        "production_lot",
    ] {
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
        tracing::info!("{}: {} 行", table, count);
    }
    Ok(())
}
