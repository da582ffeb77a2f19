//! Core data models used throughout petprice.
//!
//! These types represent the listings, search jobs, canonical products, and
//! price rows that flow through the fetch → resolve → merge pipeline.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Raw listing produced by a store fetcher for one search job.
///
/// Ephemeral: resolved into a group key and merged immediately, never
/// persisted as-is. `job_index` is stamped by the orchestrator so results
/// can be attributed to their job regardless of arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub store: String,
    #[serde(default)]
    pub job_index: usize,
}

/// One entry of the batch input: a catalog product to search for in every store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchJob {
    /// Application-level code used to correlate results back to the catalog.
    pub code: String,
    /// Search term sent to every store.
    pub term: String,
    /// Brand to record on a newly created product, if known.
    pub brand: Option<String>,
    /// Category to record on a newly created product, if known.
    pub category: Option<String>,
}

impl SearchJob {
    pub fn new(code: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            term: term.into(),
            brand: None,
            category: None,
        }
    }
}

/// Canonical product as stored by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalProduct {
    pub id: i64,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub image_url: Option<String>,
}

/// Fields for creating a [`CanonicalProduct`]; the id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub brand: String,
    pub category: String,
    pub image_url: Option<String>,
}

/// Latest observed price of a product in one store.
///
/// At most one row exists per `(product_id, store)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRecord {
    pub product_id: i64,
    pub store: String,
    pub price: Decimal,
    pub link: String,
    pub last_updated: DateTime<Utc>,
}
