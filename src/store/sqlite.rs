//! SQLite-backed [`ProductStore`] implementation.
//!
//! Maps each [`ProductStore`] operation onto the `products` / `prices` schema
//! created by [`migrate::create_schema`](crate::migrate::create_schema).
//! Prices are stored as decimal text and timestamps as Unix milliseconds.
//! Constraint violations surface as [`StoreError::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::error::ErrorKind;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::error::StoreError;
use crate::models::{CanonicalProduct, NewProduct, PriceRecord};

use super::{ProductStore, ReparentReport};

/// SQLite implementation of the [`ProductStore`] trait.
pub struct SqliteProductStore {
    pool: SqlitePool,
}

impl SqliteProductStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Constraint failures are conflicts; everything else stays a database error.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(
            db_err.kind(),
            ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation
        ) {
            return StoreError::Conflict(db_err.message().to_string());
        }
    }
    StoreError::Database(err)
}

fn escape_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn product_from_row(row: &SqliteRow) -> CanonicalProduct {
    CanonicalProduct {
        id: row.get("id"),
        name: row.get("name"),
        brand: row.get("brand"),
        category: row.get("category"),
        image_url: row.get("image_url"),
    }
}

fn price_from_row(row: &SqliteRow) -> Result<PriceRecord, StoreError> {
    let price_text: String = row.get("price");
    let price = Decimal::from_str(&price_text)
        .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
    let millis: i64 = row.get("last_updated");
    Ok(PriceRecord {
        product_id: row.get("product_id"),
        store: row.get("store"),
        price,
        link: row.get("link"),
        last_updated: DateTime::from_timestamp_millis(millis).unwrap_or_default(),
    })
}

#[async_trait]
impl ProductStore for SqliteProductStore {
    async fn find_by_name_like(&self, pattern: &str) -> Result<Vec<CanonicalProduct>, StoreError> {
        let rows = sqlx::query(
            r"SELECT id, name, brand, category, image_url FROM products
              WHERE name LIKE ? ESCAPE '\' ORDER BY id ASC",
        )
        .bind(format!("%{}%", escape_like(pattern)))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(product_from_row).collect())
    }

    async fn get(&self, id: i64) -> Result<CanonicalProduct, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, brand, category, image_url FROM products WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(product_from_row)
            .ok_or(StoreError::NotFound(id))
    }

    async fn create(&self, product: &NewProduct) -> Result<CanonicalProduct, StoreError> {
        let result = sqlx::query(
            "INSERT INTO products (name, brand, category, image_url, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.category)
        .bind(&product.image_url)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(CanonicalProduct {
            id: result.last_insert_rowid(),
            name: product.name.clone(),
            brand: product.brand.clone(),
            category: product.category.clone(),
            image_url: product.image_url.clone(),
        })
    }

    async fn update_image(&self, id: i64, url: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE products SET image_url = ? WHERE id = ?")
            .bind(url)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn upsert_price(
        &self,
        product_id: i64,
        store: &str,
        price: Decimal,
        link: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO prices (product_id, store, price, link, last_updated)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(product_id, store) DO UPDATE SET
                price = excluded.price,
                link = excluded.link,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(product_id)
        .bind(store)
        .bind(price.to_string())
        .bind(link)
        .bind(at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn reparent_prices(
        &self,
        from_ids: &[i64],
        to_id: i64,
    ) -> Result<ReparentReport, StoreError> {
        let mut from: Vec<i64> = from_ids.iter().copied().filter(|id| *id != to_id).collect();
        from.sort_unstable();
        from.dedup();

        // Validates the target even when there is nothing to move.
        self.get(to_id).await?;
        if from.is_empty() {
            return Ok(ReparentReport::default());
        }
        let ph = placeholders(from.len());

        let mut tx = self.pool.begin().await?;

        // Rows whose store the target already has.
        let sql = format!(
            "DELETE FROM prices WHERE product_id IN ({ph})
             AND store IN (SELECT store FROM prices WHERE product_id = ?)"
        );
        let mut query = sqlx::query(&sql);
        for id in &from {
            query = query.bind(*id);
        }
        let collided = query.bind(to_id).execute(&mut *tx).await?.rows_affected();

        // Among duplicates sharing a store, keep only the freshest row.
        let sql = format!(
            "DELETE FROM prices WHERE product_id IN ({ph})
             AND EXISTS (
                SELECT 1 FROM prices AS q
                WHERE q.product_id IN ({ph})
                  AND q.store = prices.store
                  AND (q.last_updated > prices.last_updated
                       OR (q.last_updated = prices.last_updated
                           AND q.product_id < prices.product_id))
             )"
        );
        let mut query = sqlx::query(&sql);
        for id in from.iter().chain(from.iter()) {
            query = query.bind(*id);
        }
        let stale = query.execute(&mut *tx).await?.rows_affected();

        let sql = format!("UPDATE prices SET product_id = ? WHERE product_id IN ({ph})");
        let mut query = sqlx::query(&sql).bind(to_id);
        for id in &from {
            query = query.bind(*id);
        }
        let moved = query
            .execute(&mut *tx)
            .await
            .map_err(classify)?
            .rows_affected();

        tx.commit().await?;

        Ok(ReparentReport {
            moved,
            dropped: collided + stale,
        })
    }

    async fn delete(&self, ids: &[i64]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ph = placeholders(ids.len());

        let sql = format!("SELECT product_id, store FROM prices WHERE product_id IN ({ph}) LIMIT 1");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        if let Some(row) = query.fetch_optional(&self.pool).await? {
            let pid: i64 = row.get("product_id");
            let store: String = row.get("store");
            return Err(StoreError::Conflict(format!(
                "product {} still has a price from {}",
                pid, store
            )));
        }

        let sql = format!("DELETE FROM products WHERE id IN ({ph})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let result = query.execute(&self.pool).await.map_err(classify)?;
        Ok(result.rows_affected())
    }

    async fn list_products(&self) -> Result<Vec<CanonicalProduct>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, brand, category, image_url FROM products ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(product_from_row).collect())
    }

    async fn prices_for(&self, product_id: i64) -> Result<Vec<PriceRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT product_id, store, price, link, last_updated FROM prices
             WHERE product_id = ? ORDER BY store ASC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(price_from_row).collect()
    }
}
