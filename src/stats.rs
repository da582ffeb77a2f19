//! Database statistics and health overview.
//!
//! Provides a quick summary of what a run left behind: product counts, price
//! counts, image coverage, and per-store breakdowns. Used by `petprice stats`
//! to confirm that runs are reaching every store.
//!
//! The price audit counts rows that look wrong rather than fixing them: zero
//! prices, prices outside the plausible range, and links that are not URLs.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

/// Prices below this are suspicious (zero is counted separately).
const PLAUSIBLE_MIN_PRICE: f64 = 1.0;
/// Prices above this are suspicious.
const PLAUSIBLE_MAX_PRICE: f64 = 5000.0;

/// Per-store breakdown of price rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub store: String,
    pub price_count: i64,
    /// Most recent observation, in Unix milliseconds.
    pub last_updated_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogStats {
    pub products: i64,
    pub prices: i64,
    pub without_image: i64,
    pub without_price: i64,
    pub quality: PriceQuality,
    pub stores: Vec<StoreStats>,
}

/// Price rows that fail the sanity checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceQuality {
    pub zero_prices: i64,
    /// Non-zero prices under R$ 1 or over R$ 5000.
    pub suspicious_prices: i64,
    /// Links that are empty or do not start with `http`.
    pub invalid_links: i64,
}

impl PriceQuality {
    pub fn is_clean(&self) -> bool {
        self.zero_prices == 0 && self.suspicious_prices == 0 && self.invalid_links == 0
    }
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<CatalogStats> {
    let products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(pool)
        .await?;

    let prices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM prices")
        .fetch_one(pool)
        .await?;

    let without_image: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM products WHERE image_url IS NULL OR image_url = ''",
    )
    .fetch_one(pool)
    .await?;

    let without_price: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM products p
         WHERE NOT EXISTS (SELECT 1 FROM prices q WHERE q.product_id = p.id)",
    )
    .fetch_one(pool)
    .await?;

    let quality = collect_price_quality(pool).await?;

    let rows = sqlx::query(
        r#"
        SELECT store, COUNT(*) AS price_count, MAX(last_updated) AS last_updated
        FROM prices
        GROUP BY store
        ORDER BY price_count DESC, store ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let stores = rows
        .iter()
        .map(|row| StoreStats {
            store: row.get("store"),
            price_count: row.get("price_count"),
            last_updated_ms: row.get("last_updated"),
        })
        .collect();

    Ok(CatalogStats {
        products,
        prices,
        without_image,
        without_price,
        quality,
        stores,
    })
}

pub async fn collect_price_quality(pool: &SqlitePool) -> Result<PriceQuality> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN CAST(price AS REAL) = 0 THEN 1 ELSE 0 END), 0) AS zero_prices,
            COALESCE(SUM(CASE WHEN CAST(price AS REAL) != 0
                               AND (CAST(price AS REAL) < ? OR CAST(price AS REAL) > ?)
                              THEN 1 ELSE 0 END), 0) AS suspicious_prices,
            COALESCE(SUM(CASE WHEN substr(link, 1, 4) != 'http' THEN 1 ELSE 0 END), 0) AS invalid_links
        FROM prices
        "#,
    )
    .bind(PLAUSIBLE_MIN_PRICE)
    .bind(PLAUSIBLE_MAX_PRICE)
    .fetch_one(pool)
    .await?;

    Ok(PriceQuality {
        zero_prices: row.get("zero_prices"),
        suspicious_prices: row.get("suspicious_prices"),
        invalid_links: row.get("invalid_links"),
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("petprice Catalog Stats");
    println!("=======================");
    println!();
    println!("  Database:       {}", config.db.path.display());
    println!("  Size:           {}", format_bytes(db_size));
    println!();
    println!("  Products:       {}", stats.products);
    println!("  Prices:         {}", stats.prices);
    println!(
        "  With image:     {} / {} ({}%)",
        stats.products - stats.without_image,
        stats.products,
        if stats.products > 0 {
            ((stats.products - stats.without_image) * 100) / stats.products
        } else {
            0
        }
    );
    println!("  Without price:  {}", stats.without_price);
    println!();
    if stats.quality.is_clean() {
        println!("  Price audit:    ok");
    } else {
        println!("  Price audit:");
        println!("    Zero prices:      {}", stats.quality.zero_prices);
        println!(
            "    Suspicious:       {} (< R$ {} or > R$ {})",
            stats.quality.suspicious_prices, PLAUSIBLE_MIN_PRICE, PLAUSIBLE_MAX_PRICE
        );
        println!("    Invalid links:    {}", stats.quality.invalid_links);
    }

    if !stats.stores.is_empty() {
        println!();
        println!("  By store:");
        println!("  {:<24} {:>8}   {}", "STORE", "PRICES", "LAST SEEN");
        println!("  {}", "-".repeat(56));

        for s in &stats.stores {
            let seen = match s.last_updated_ms {
                Some(ms) => format_ts_relative(ms / 1000),
                None => "never".to_string(),
            };
            println!("  {:<24} {:>8}   {}", s.store, s.price_count, seen);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
