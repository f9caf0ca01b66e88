// ==========================================
// 工艺成本核算系统 - 库存仓储
// ==========================================
// 职责: inventory_stock 表的读取与条件扣减
// 红线: 扣减必须是单条条件 UPDATE (quantity >= 请求量),
//       绝不使用先读后写,避免并发批次间的竞态超扣
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ==========================================
// InventoryRepository - 库存仓储
// ==========================================
pub struct InventoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl InventoryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询可用库存 (无记录视为 0)
    pub fn get_stock(&self, variant_id: &str) -> RepositoryResult<f64> {
        let conn = self.get_conn()?;
        let quantity: Option<f64> = conn
            .query_row(
                "SELECT quantity FROM inventory_stock WHERE variant_id = ?",
                params![variant_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(quantity.unwrap_or(0.0))
    }

    /// 设置库存 (upsert,测试与入库边界用)
    pub fn upsert_stock(&self, variant_id: &str, quantity: f64) -> RepositoryResult<()> {
        if quantity < 0.0 {
            return Err(RepositoryError::FieldValueError {
                field: "quantity".to_string(),
                message: format!("库存不能为负: {}", quantity),
            });
        }

        let conn = self.get_conn()?;
        let now = Local::now().naive_local().format(DATETIME_FMT).to_string();
        conn.execute(
            r#"INSERT INTO inventory_stock (variant_id, quantity, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(variant_id) DO UPDATE SET quantity = excluded.quantity,
                                                     updated_at = excluded.updated_at"#,
            params![variant_id, &quantity, &now],
        )?;
        Ok(())
    }

    /// 条件扣减: 仅当剩余库存 ≥ 请求量时成功
    ///
    /// 单条 UPDATE 保证按变体串行化,无需持有长事务。
    /// 失败时返回 InsufficientStock 并附当前可用量。
    pub fn conditional_decrement(&self, variant_id: &str, amount: f64) -> RepositoryResult<()> {
        if amount <= 0.0 {
            return Err(RepositoryError::FieldValueError {
                field: "amount".to_string(),
                message: format!("扣减量必须为正: {}", amount),
            });
        }

        let conn = self.get_conn()?;
        let now = Local::now().naive_local().format(DATETIME_FMT).to_string();
        let affected = conn.execute(
            r#"UPDATE inventory_stock
               SET quantity = quantity - ?, updated_at = ?
               WHERE variant_id = ? AND quantity >= ?"#,
            params![&amount, &now, variant_id, &amount],
        )?;

        if affected == 0 {
            let available: Option<f64> = conn
                .query_row(
                    "SELECT quantity FROM inventory_stock WHERE variant_id = ?",
                    params![variant_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(RepositoryError::InsufficientStock {
                variant_id: variant_id.to_string(),
                required: amount,
                available: available.unwrap_or(0.0),
            });
        }
        Ok(())
    }
}
