//! Fixture-file store fetcher.
//!
//! Serves listings from a JSON array on disk, one file per store:
//!
//! ```json
//! [
//!   { "name": "NexGard Spectra Cão Grande CX 3 Comprimidos", "price": "289.90",
//!     "image_url": "https://cdn.example.com/nexgard.jpg", "link": "https://..." }
//! ]
//! ```
//!
//! A listing matches a search when every token of the term appears among the
//! listing name's tokens. Used for offline runs and tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::FetchError;
use crate::models::RawListing;
use crate::traits::StoreFetcher;

pub struct FileFetcher {
    name: String,
    path: PathBuf,
    listings: Vec<RawListing>,
}

impl FileFetcher {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let path = config
            .path
            .ok_or_else(|| anyhow!("store '{}': file fetcher requires `path`", config.name))?;
        Ok(Self {
            name: config.name,
            path,
            listings: Vec::new(),
        })
    }

    /// Build a fetcher over listings already in memory.
    pub fn from_listings(name: impl Into<String>, listings: Vec<RawListing>) -> Self {
        Self {
            name: name.into(),
            path: PathBuf::new(),
            listings,
        }
    }
}

#[async_trait]
impl StoreFetcher for FileFetcher {
    fn store_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "file"
    }

    async fn open(&mut self) -> Result<(), FetchError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let raw = tokio::fs::read_to_string(&self.path).await?;
        self.listings = serde_json::from_str(&raw)?;
        debug!(store = %self.name, listings = self.listings.len(), "loaded fixture");
        Ok(())
    }

    async fn search(&mut self, term: &str) -> Result<Vec<RawListing>, FetchError> {
        let wanted = tokens(term);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .listings
            .iter()
            .filter(|listing| {
                let have = tokens(&listing.name);
                wanted.iter().all(|t| have.contains(t))
            })
            .cloned()
            .collect())
    }
}

fn tokens(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreKind;
    use rust_decimal::Decimal;
    use std::io::Write;

    fn store_config(path: PathBuf) -> StoreConfig {
        StoreConfig {
            name: "Cobasi".into(),
            kind: StoreKind::File,
            path: Some(path),
            url: None,
            timeout_secs: 15,
            api_key_env: None,
        }
    }

    #[tokio::test]
    async fn loads_fixture_and_matches_all_tokens() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"name": "Ração Golden Special Frango Filhote 15kg", "price": "189.90",
                  "image_url": "https://cdn.example.com/golden.jpg"}},
                {{"name": "Ração Golden Fórmula Carne Adultos 15kg", "price": 179.5}}
            ]"#
        )
        .unwrap();

        let mut fetcher = FileFetcher::new(store_config(file.path().to_path_buf())).unwrap();
        fetcher.open().await.unwrap();

        let hits = fetcher.search("golden special").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].price, Decimal::new(18990, 2));

        let hits = fetcher.search("Ração Golden 15kg").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].price, Decimal::new(1795, 1));

        assert!(fetcher.search("premier").await.unwrap().is_empty());
        assert!(fetcher.search("  ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_fixture_fails_open() {
        let mut fetcher =
            FileFetcher::new(store_config(PathBuf::from("/nonexistent/fixture.json"))).unwrap();
        assert!(matches!(fetcher.open().await, Err(FetchError::Io(_))));
    }

    #[tokio::test]
    async fn malformed_fixture_is_decode_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let mut fetcher = FileFetcher::new(store_config(file.path().to_path_buf())).unwrap();
        assert!(matches!(fetcher.open().await, Err(FetchError::Decode(_))));
    }
}
