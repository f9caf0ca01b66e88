// ==========================================
// 工艺成本核算系统 - 供应商报价仓储
// ==========================================
// 职责: supplier_price 表的写入与生效报价查询
// 口径: 生效报价 = active=1 且 effective_date ≤ 查询日
// ==========================================

use crate::domain::catalog::SupplierPrice;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FMT: &str = "%Y-%m-%d";

// ==========================================
// SupplierPriceRepository - 供应商报价仓储
// ==========================================
pub struct SupplierPriceRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SupplierPriceRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 录入报价
    pub fn insert(&self, price: &SupplierPrice) -> RepositoryResult<String> {
        if price.unit_price < 0.0 {
            return Err(RepositoryError::FieldValueError {
                field: "unit_price".to_string(),
                message: format!("单价不能为负: {}", price.unit_price),
            });
        }

        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO supplier_price (
                price_id, variant_id, supplier_id, supplier_name,
                unit_price, effective_date, active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &price.price_id,
                &price.variant_id,
                &price.supplier_id,
                &price.supplier_name,
                &price.unit_price,
                &price.effective_date.format(DATE_FMT).to_string(),
                price.active,
                &price.created_at.format(DATETIME_FMT).to_string(),
            ],
        )?;
        Ok(price.price_id.clone())
    }

    /// 停用报价 (软删除,保留审计)
    pub fn deactivate(&self, price_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE supplier_price SET active = 0 WHERE price_id = ? AND active = 1",
            params![price_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "SupplierPrice".to_string(),
                id: price_id.to_string(),
            });
        }
        Ok(())
    }

    /// 查询单个变体的当前生效报价
    pub fn active_prices(
        &self,
        variant_id: &str,
        today: NaiveDate,
    ) -> RepositoryResult<Vec<SupplierPrice>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT price_id, variant_id, supplier_id, supplier_name,
                      unit_price, effective_date, active, created_at
               FROM supplier_price
               WHERE variant_id = ? AND active = 1 AND effective_date <= ?
               ORDER BY unit_price ASC, price_id ASC"#,
        )?;
        let prices = stmt
            .query_map(
                params![variant_id, &today.format(DATE_FMT).to_string()],
                Self::map_price_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(prices)
    }

    /// 批量查询多个变体的生效报价
    ///
    /// 返回 variant_id → 报价列表;无生效报价的变体不在映射中,
    /// 由核算引擎判定为 PricingUnavailable。
    pub fn active_prices_map(
        &self,
        variant_ids: &[String],
        today: NaiveDate,
    ) -> RepositoryResult<HashMap<String, Vec<SupplierPrice>>> {
        let mut map: HashMap<String, Vec<SupplierPrice>> = HashMap::new();
        for variant_id in variant_ids {
            let prices = self.active_prices(variant_id, today)?;
            if !prices.is_empty() {
                map.insert(variant_id.clone(), prices);
            }
        }
        Ok(map)
    }

    fn map_price_row(row: &Row<'_>) -> rusqlite::Result<SupplierPrice> {
        Ok(SupplierPrice {
            price_id: row.get(0)?,
            variant_id: row.get(1)?,
            supplier_id: row.get(2)?,
            supplier_name: row.get(3)?,
            unit_price: row.get(4)?,
            effective_date: row.get(5)?,
            active: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}
