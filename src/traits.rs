//! The store fetcher extension point.
//!
//! Every store petprice collects prices from is a [`StoreFetcher`]. The
//! built-in fetchers ([`FileFetcher`](crate::fetcher_file::FileFetcher) and
//! [`HttpFetcher`](crate::fetcher_http::HttpFetcher)) are built from the
//! `[[stores]]` config table; page-scraping adapters implement the trait in
//! their own crate and are added with [`FetcherRegistry::register`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             FetcherRegistry              │
//! │  ┌─────────┐ ┌─────────┐ ┌────────────┐  │
//! │  │  File   │ │  HTTP   │ │  Custom    │  │
//! │  │ fixture │ │  JSON   │ │ (scraper)  │  │
//! │  └─────────┘ └─────────┘ └────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     FetchOrchestrator: one worker per fetcher
//! ```
//!
//! # Usage
//!
//! ```rust
//! use petprice::traits::FetcherRegistry;
//!
//! let mut fetchers = FetcherRegistry::new();
//! // fetchers.register(Box::new(MyScraper::new()));
//! assert!(fetchers.is_empty());
//! ```

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{Config, StoreKind};
use crate::error::FetchError;
use crate::models::RawListing;

/// A store that can be searched for product listings.
///
/// Each fetcher is owned by exactly one orchestrator worker for the length of
/// a batch, so methods take `&mut self` and implementations may hold a
/// session (browser, HTTP cookies, auth token) without locking.
///
/// # Lifecycle
///
/// 1. [`open`](StoreFetcher::open) is called once when the worker starts.
/// 2. [`search`](StoreFetcher::search) is called once per job.
/// 3. [`close`](StoreFetcher::close) is called when the worker receives
///    its stop command.
///
/// A worker that is aborted after the shutdown grace period never reaches
/// `close`; resources should also be released on drop.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use petprice::error::FetchError;
/// use petprice::models::RawListing;
/// use petprice::traits::StoreFetcher;
///
/// pub struct EmptyStore;
///
/// #[async_trait]
/// impl StoreFetcher for EmptyStore {
///     fn store_name(&self) -> &str { "Empty" }
///
///     async fn search(&mut self, _term: &str) -> Result<Vec<RawListing>, FetchError> {
///         Ok(vec![])
///     }
/// }
/// ```
#[async_trait]
pub trait StoreFetcher: Send {
    /// Store label recorded on every price row (e.g. `"Petz"`).
    fn store_name(&self) -> &str;

    /// Fetcher type identifier (`"file"`, `"http"`, `"custom"`).
    fn kind(&self) -> &str {
        "custom"
    }

    /// Prepare the session. A failure here marks the worker as broken: every
    /// job it receives is answered with a failure marker.
    async fn open(&mut self) -> Result<(), FetchError> {
        Ok(())
    }

    /// Search the store for `term`, best match first.
    ///
    /// An empty vector means the store answered but had nothing. `store`
    /// and `job_index` on the returned listings are overwritten by the
    /// orchestrator.
    async fn search(&mut self, term: &str) -> Result<Vec<RawListing>, FetchError>;

    /// Release the session.
    async fn close(&mut self) {}
}

/// Registry of fetchers for one batch run.
pub struct FetcherRegistry {
    fetchers: Vec<Box<dyn StoreFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self {
            fetchers: Vec::new(),
        }
    }

    /// Create a registry with one built-in fetcher per `[[stores]]` entry.
    pub fn from_config(config: &Config) -> Result<Self> {
        use crate::fetcher_file::FileFetcher;
        use crate::fetcher_http::HttpFetcher;

        let mut registry = Self::new();
        for store in &config.stores {
            match store.kind {
                StoreKind::File => {
                    registry.register(Box::new(FileFetcher::new(store.clone())?));
                }
                StoreKind::Http => {
                    registry.register(Box::new(HttpFetcher::new(store.clone())?));
                }
            }
        }
        Ok(registry)
    }

    pub fn register(&mut self, fetcher: Box<dyn StoreFetcher>) {
        self.fetchers.push(fetcher);
    }

    pub fn names(&self) -> Vec<String> {
        self.fetchers
            .iter()
            .map(|f| f.store_name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    /// Hand the fetchers over to an orchestrator.
    pub fn into_fetchers(self) -> Vec<Box<dyn StoreFetcher>> {
        self.fetchers
    }
}

impl Default for FetcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    struct Named(&'static str);

    #[async_trait]
    impl StoreFetcher for Named {
        fn store_name(&self) -> &str {
            self.0
        }

        async fn search(&mut self, _term: &str) -> Result<Vec<RawListing>, FetchError> {
            Ok(vec![])
        }
    }

    #[test]
    fn register_keeps_order() {
        let mut registry = FetcherRegistry::new();
        registry.register(Box::new(Named("Petz")));
        registry.register(Box::new(Named("Cobasi")));
        assert_eq!(registry.names(), vec!["Petz", "Cobasi"]);
        assert_eq!(registry.len(), 2);
        let fetchers = registry.into_fetchers();
        assert_eq!(fetchers[1].kind(), "custom");
    }

    #[test]
    fn from_config_builds_builtins() {
        let mut config = Config::minimal("unused.sqlite");
        config.stores.push(StoreConfig {
            name: "Cobasi".into(),
            kind: StoreKind::File,
            path: Some("fixtures/cobasi.json".into()),
            url: None,
            timeout_secs: 15,
            api_key_env: None,
        });
        config.stores.push(StoreConfig {
            name: "Petz".into(),
            kind: StoreKind::Http,
            path: None,
            url: Some("http://127.0.0.1:1/search?q={term}".into()),
            timeout_secs: 5,
            api_key_env: None,
        });
        let registry = FetcherRegistry::from_config(&config).unwrap();
        let fetchers = registry.into_fetchers();
        assert_eq!(fetchers[0].kind(), "file");
        assert_eq!(fetchers[1].kind(), "http");
        assert_eq!(fetchers[1].store_name(), "Petz");
    }
}
