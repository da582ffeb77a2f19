//! Persistence abstraction for canonical products and their prices.
//!
//! The [`ProductStore`] trait is everything the merge coordinator and the
//! dedup sweep need from a backend. Two implementations ship with the crate:
//!
//! - [`SqliteProductStore`]: the production store, backed by `sqlx`.
//! - [`InMemoryProductStore`]: maps behind a lock, for tests and dry runs.
//!
//! Implementations must keep at most one price row per `(product_id, store)`.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::StoreError;
use crate::models::{CanonicalProduct, NewProduct, PriceRecord};

pub use memory::InMemoryProductStore;
pub use sqlite::SqliteProductStore;

/// Outcome of [`ProductStore::reparent_prices`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReparentReport {
    /// Rows now owned by the target product.
    pub moved: u64,
    /// Rows discarded because the target (or a fresher duplicate) already
    /// had a price for the same store.
    pub dropped: u64,
}

/// Abstract product/price backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_by_name_like`](ProductStore::find_by_name_like) | Substring lookup, oldest first |
/// | [`get`](ProductStore::get) | Lookup by id |
/// | [`create`](ProductStore::create) | Insert a product, assigning its id |
/// | [`update_image`](ProductStore::update_image) | Set the image URL |
/// | [`upsert_price`](ProductStore::upsert_price) | Insert or replace the `(product, store)` price |
/// | [`reparent_prices`](ProductStore::reparent_prices) | Move prices between products |
/// | [`delete`](ProductStore::delete) | Remove products without prices |
/// | [`list_products`](ProductStore::list_products) | All products, by id |
/// | [`prices_for`](ProductStore::prices_for) | Prices of one product, by store |
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Products whose name contains `pattern`, ignoring ASCII case, ordered
    /// by ascending id. `%` and `_` in the pattern are literal.
    async fn find_by_name_like(&self, pattern: &str) -> Result<Vec<CanonicalProduct>, StoreError>;

    async fn get(&self, id: i64) -> Result<CanonicalProduct, StoreError>;

    async fn create(&self, product: &NewProduct) -> Result<CanonicalProduct, StoreError>;

    async fn update_image(&self, id: i64, url: &str) -> Result<(), StoreError>;

    /// Record the latest price of `product_id` in `store`, replacing any
    /// previous row for the pair. Fails with [`StoreError::Conflict`] when the
    /// product does not exist.
    async fn upsert_price(
        &self,
        product_id: i64,
        store: &str,
        price: Decimal,
        link: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Move every price of `from_ids` onto `to_id`.
    ///
    /// A row whose store `to_id` already has is dropped. When several
    /// `from_ids` carry the same store, the most recently updated row is
    /// moved (lowest product id on ties) and the rest are dropped.
    async fn reparent_prices(&self, from_ids: &[i64], to_id: i64)
        -> Result<ReparentReport, StoreError>;

    /// Delete products. Fails with [`StoreError::Conflict`] if any of them
    /// still owns prices. Returns the number of products removed.
    async fn delete(&self, ids: &[i64]) -> Result<u64, StoreError>;

    async fn list_products(&self) -> Result<Vec<CanonicalProduct>, StoreError>;

    async fn prices_for(&self, product_id: i64) -> Result<Vec<PriceRecord>, StoreError>;
}
