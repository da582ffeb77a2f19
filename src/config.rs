//! TOML configuration.
//!
//! The validated [`Config`] is handed to the fetch orchestrator and the merge
//! coordinator at construction time; nothing in the crate reads global
//! endpoint or key constants.
//!
//! ```toml
//! [db]
//! path = "./data/petprice.sqlite"
//!
//! [fetch]
//! per_job_timeout_ms = 10000
//! shutdown_grace_ms = 5000
//!
//! [merge]
//! match_mode = "exact"
//!
//! [[stores]]
//! name = "Petz"
//! kind = "http"
//! url = "https://search.example.com/petz?q={term}"
//! api_key_env = "PETZ_API_KEY"
//!
//! [[stores]]
//! name = "Cobasi"
//! kind = "file"
//! path = "./fixtures/cobasi.json"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub stores: Vec<StoreConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_per_job_timeout_ms")]
    pub per_job_timeout_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_listings_per_store")]
    pub max_listings_per_store: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            per_job_timeout_ms: default_per_job_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            queue_capacity: default_queue_capacity(),
            max_listings_per_store: default_max_listings_per_store(),
        }
    }
}

impl FetchConfig {
    pub fn per_job_timeout(&self) -> Duration {
        Duration::from_millis(self.per_job_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_per_job_timeout_ms() -> u64 {
    10_000
}
fn default_shutdown_grace_ms() -> u64 {
    5_000
}
fn default_queue_capacity() -> usize {
    64
}
fn default_max_listings_per_store() -> usize {
    1
}

/// How a group key is matched against stored product names.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Case-insensitive equality after whitespace normalization.
    #[default]
    Exact,
    /// Exact first, then the oldest product whose name contains the key.
    Contains,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MergeConfig {
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default = "default_image_min_len")]
    pub image_min_len: usize,
    #[serde(default = "default_image_denylist")]
    pub image_denylist: Vec<String>,
    #[serde(default = "default_category")]
    pub default_category: String,
    #[serde(default = "default_skip_accessories")]
    pub skip_accessories: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            match_mode: MatchMode::default(),
            image_min_len: default_image_min_len(),
            image_denylist: default_image_denylist(),
            default_category: default_category(),
            skip_accessories: default_skip_accessories(),
        }
    }
}

fn default_image_min_len() -> usize {
    20
}
fn default_image_denylist() -> Vec<String> {
    ["icon", "logo", "placeholder", "sprite"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_category() -> String {
    "Outros".to_string()
}
fn default_skip_accessories() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    File,
    Http,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub name: String,
    pub kind: StoreKind,
    /// Fixture file for `kind = "file"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Search URL template for `kind = "http"`; `{term}` is replaced by the
    /// percent-encoded search term.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding a bearer token, if the endpoint needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_store_timeout_secs() -> u64 {
    15
}

impl Config {
    /// A config with no stores, pointing at the given database.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            fetch: FetchConfig::default(),
            merge: MergeConfig::default(),
            stores: Vec::new(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.fetch.per_job_timeout_ms == 0 {
        bail!("fetch.per_job_timeout_ms must be > 0");
    }
    if config.fetch.shutdown_grace_ms == 0 {
        bail!("fetch.shutdown_grace_ms must be > 0");
    }
    if config.fetch.queue_capacity == 0 {
        bail!("fetch.queue_capacity must be > 0");
    }
    if config.fetch.max_listings_per_store == 0 {
        bail!("fetch.max_listings_per_store must be > 0");
    }

    let mut seen = HashSet::new();
    for store in &config.stores {
        if store.name.trim().is_empty() {
            bail!("stores: every store needs a non-empty name");
        }
        if !seen.insert(store.name.as_str()) {
            bail!("stores: duplicate store name '{}'", store.name);
        }
        match store.kind {
            StoreKind::File => {
                if store.path.is_none() {
                    bail!("store '{}': kind = \"file\" requires `path`", store.name);
                }
            }
            StoreKind::Http => match &store.url {
                Some(url) if url.contains("{term}") => {}
                Some(_) => bail!("store '{}': url must contain {{term}}", store.name),
                None => bail!("store '{}': kind = \"http\" requires `url`", store.name),
            },
        }
        if store.timeout_secs == 0 {
            bail!("store '{}': timeout_secs must be > 0", store.name);
        }
    }

    Ok(())
}
