// ==========================================
// 工艺成本核算系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供幂等的建表入口，测试与维护工具共用一套 schema
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
///
/// 说明：
/// - 版本号用于**提示/告警**（不做自动迁移），避免静默在旧库上运行导致隐性错误。
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 幂等初始化数据库 schema
///
/// 约定：
/// - 所有表使用 CREATE TABLE IF NOT EXISTS，可在已有库上安全重复执行
/// - 目录实体统一携带 active 软删除标志，读取侧按 active=1 过滤
/// - 时间列统一 TEXT，格式 %Y-%m-%d / %Y-%m-%d %H:%M:%S
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
        );

        -- ===== 工艺目录 =====
        CREATE TABLE IF NOT EXISTS process (
            process_id   TEXT PRIMARY KEY,
            process_name TEXT NOT NULL,
            description  TEXT,
            version      INTEGER NOT NULL DEFAULT 1,
            active       INTEGER NOT NULL DEFAULT 1,
            created_by   TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS subprocess (
            subprocess_id   TEXT PRIMARY KEY,
            subprocess_name TEXT NOT NULL,
            description     TEXT,
            active          INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS process_subprocess (
            link_id        TEXT PRIMARY KEY,
            process_id     TEXT NOT NULL REFERENCES process(process_id),
            subprocess_id  TEXT NOT NULL REFERENCES subprocess(subprocess_id),
            sequence_order INTEGER NOT NULL,
            active         INTEGER NOT NULL DEFAULT 1,
            created_at     TEXT NOT NULL,
            UNIQUE(process_id, sequence_order)
        );

        CREATE TABLE IF NOT EXISTS substitute_group (
            group_id        TEXT PRIMARY KEY,
            subprocess_id   TEXT NOT NULL REFERENCES subprocess(subprocess_id),
            group_name      TEXT NOT NULL,
            selection_logic TEXT NOT NULL CHECK(selection_logic IN ('MANUAL', 'CHEAPEST', 'FASTEST')),
            active          INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS variant_usage (
            usage_id      TEXT PRIMARY KEY,
            subprocess_id TEXT NOT NULL REFERENCES subprocess(subprocess_id),
            variant_id    TEXT NOT NULL,
            variant_name  TEXT NOT NULL,
            quantity      REAL NOT NULL,
            unit          TEXT NOT NULL,
            group_id      TEXT REFERENCES substitute_group(group_id),
            active        INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cost_item (
            cost_item_id   TEXT PRIMARY KEY,
            subprocess_id  TEXT NOT NULL REFERENCES subprocess(subprocess_id),
            cost_name      TEXT NOT NULL,
            category       TEXT NOT NULL CHECK(category IN ('LABOR', 'OVERHEAD', 'OTHER')),
            amount         REAL NOT NULL,
            cost_basis     TEXT NOT NULL CHECK(cost_basis IN ('PER_UNIT', 'PER_HOUR', 'PER_BATCH')),
            hours_per_unit REAL,
            batch_size     REAL,
            active         INTEGER NOT NULL DEFAULT 1,
            created_at     TEXT NOT NULL
        );

        -- ===== 供应商报价 =====
        CREATE TABLE IF NOT EXISTS supplier_price (
            price_id       TEXT PRIMARY KEY,
            variant_id     TEXT NOT NULL,
            supplier_id    TEXT NOT NULL,
            supplier_name  TEXT NOT NULL,
            unit_price     REAL NOT NULL,
            effective_date TEXT NOT NULL,
            active         INTEGER NOT NULL DEFAULT 1,
            created_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_supplier_price_variant
            ON supplier_price(variant_id, active, effective_date);

        -- ===== 库存 =====
        CREATE TABLE IF NOT EXISTS inventory_stock (
            variant_id TEXT PRIMARY KEY,
            quantity   REAL NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );

        -- ===== 生产批次 =====
        CREATE TABLE IF NOT EXISTS production_lot (
            lot_id               TEXT PRIMARY KEY,
            process_id           TEXT NOT NULL REFERENCES process(process_id),
            process_version      INTEGER NOT NULL,
            lot_quantity         REAL NOT NULL,
            status               TEXT NOT NULL CHECK(status IN
                ('PLANNING', 'READY', 'EXECUTING', 'COMPLETED', 'FAILED', 'CANCELLED')),
            estimated_total_cost REAL NOT NULL,
            actual_total_cost    REAL,
            sales_price          REAL,
            config_snapshot_json TEXT,
            cancel_reason        TEXT,
            fail_reason          TEXT,
            created_by           TEXT NOT NULL,
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL,
            completed_at         TEXT
        );

        CREATE TABLE IF NOT EXISTS lot_selection (
            selection_id TEXT PRIMARY KEY,
            lot_id       TEXT NOT NULL REFERENCES production_lot(lot_id),
            group_id     TEXT NOT NULL REFERENCES substitute_group(group_id),
            usage_id     TEXT NOT NULL REFERENCES variant_usage(usage_id),
            supplier_id  TEXT,
            reason       TEXT,
            selected_by  TEXT NOT NULL,
            selected_at  TEXT NOT NULL,
            UNIQUE(lot_id, group_id)
        );

        CREATE TABLE IF NOT EXISTS lot_cost_line (
            line_id           TEXT PRIMARY KEY,
            lot_id            TEXT NOT NULL REFERENCES production_lot(lot_id),
            usage_id          TEXT NOT NULL REFERENCES variant_usage(usage_id),
            variant_id        TEXT NOT NULL,
            supplier_id       TEXT,
            actual_unit_price REAL NOT NULL,
            actual_quantity   REAL NOT NULL,
            line_cost         REAL NOT NULL,
            created_at        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_lot_cost_line_lot ON lot_cost_line(lot_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}
