//! JSON search endpoint store fetcher.
//!
//! Sends `GET <url>` with `{term}` replaced by the percent-encoded search term
//! and decodes either a bare array or `{"results": [...]}` of:
//!
//! ```json
//! { "name": "...", "price": 189.9, "image_url": "https://...", "link": "https://..." }
//! ```
//!
//! `price` may be a number or a display string such as `"R$ 1.234,56"`.
//! Entries without a usable name or price are skipped.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::FetchError;
use crate::models::RawListing;
use crate::traits::StoreFetcher;

/// Prices at or below this are banner fragments or installment counts.
const MIN_PLAUSIBLE_PRICE: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

static PRICE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)*").expect("valid price pattern"));

pub struct HttpFetcher {
    name: String,
    url_template: String,
    api_key_env: Option<String>,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Bare(Vec<WireListing>),
    Wrapped { results: Vec<WireListing> },
}

#[derive(Debug, Deserialize)]
struct WireListing {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    price: Value,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

impl HttpFetcher {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let url_template = config
            .url
            .ok_or_else(|| anyhow!("store '{}': http fetcher requires `url`", config.name))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("petprice/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            name: config.name,
            url_template,
            api_key_env: config.api_key_env,
            api_key: None,
            client,
        })
    }

    fn url_for(&self, term: &str) -> String {
        self.url_template
            .replace("{term}", &urlencoding::encode(term.trim()))
    }

    fn to_listing(&self, wire: WireListing) -> Option<RawListing> {
        let name = wire.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
        let price = match &wire.price {
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .ok()
                .filter(|p| *p > MIN_PLAUSIBLE_PRICE),
            Value::String(s) => parse_price_text(s),
            _ => None,
        };
        let Some(price) = price else {
            debug!(store = %self.name, name = %name, "skipping listing without usable price");
            return None;
        };
        Some(RawListing {
            name,
            price,
            image_url: wire.image_url,
            link: wire.link,
            store: self.name.clone(),
            job_index: 0,
        })
    }
}

#[async_trait]
impl StoreFetcher for HttpFetcher {
    fn store_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "http"
    }

    async fn open(&mut self) -> Result<(), FetchError> {
        if let Some(var) = &self.api_key_env {
            let key = std::env::var(var).map_err(|_| {
                FetchError::failure(&self.name, format!("environment variable {} not set", var))
            })?;
            self.api_key = Some(key);
        }
        Ok(())
    }

    async fn search(&mut self, term: &str) -> Result<Vec<RawListing>, FetchError> {
        let url = self.url_for(term);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(store = %self.name, %status, "search endpoint returned an error");
            return Err(FetchError::failure(
                &self.name,
                format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
            ));
        }

        let body = response.text().await?;
        let decoded: SearchResponse = serde_json::from_str(&body)?;
        let wire = match decoded {
            SearchResponse::Bare(items) => items,
            SearchResponse::Wrapped { results } => results,
        };
        Ok(wire
            .into_iter()
            .filter_map(|item| self.to_listing(item))
            .collect())
    }
}

/// Parse a Brazilian display price (`"R$ 1.234,56"`, `"A partir de R$ 89,90"`,
/// `"129"`).
///
/// The last `.` or `,` is the decimal separator when one or two digits follow
/// it; every other separator is a thousands mark. Values of 5 or less are
/// rejected.
pub fn parse_price_text(text: &str) -> Option<Decimal> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let run = PRICE_RUN.find(&compact)?.as_str();

    let normalized = match run.rfind(['.', ',']) {
        Some(pos) if run.len() - pos - 1 <= 2 => {
            let (int_part, frac_part) = run.split_at(pos);
            let int_digits: String = int_part.chars().filter(char::is_ascii_digit).collect();
            format!("{}.{}", int_digits, &frac_part[1..])
        }
        _ => run.chars().filter(char::is_ascii_digit).collect(),
    };

    Decimal::from_str(&normalized)
        .ok()
        .filter(|p| *p > MIN_PLAUSIBLE_PRICE)
}
