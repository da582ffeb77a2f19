//! Merge and persistence coordination.
//!
//! [`MergeCoordinator::ingest`] persists one resolved group: it finds or
//! creates the canonical product, fills in a missing image, and upserts one
//! price per listing. [`MergeCoordinator::dedup_sweep`] is the separate
//! cleanup pass that folds products sharing a normalized name into the oldest
//! one, always moving prices before deleting anything.
//!
//! Groups are processed one at a time; the coordinator never interleaves
//! the lookup-or-create or reparent-then-delete sequences of two groups.

use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, MatchMode, MergeConfig};
use crate::db;
use crate::error::{IngestError, StoreError};
use crate::grouping::{collapse_whitespace, GroupKey};
use crate::models::{CanonicalProduct, NewProduct, RawListing};
use crate::migrate::create_schema;
use crate::store::{ProductStore, SqliteProductStore};

/// Listings of one job that resolved to the same group key.
#[derive(Debug, Clone)]
pub struct GroupBatch {
    pub key: GroupKey,
    /// Brand recorded if the product has to be created.
    pub brand: String,
    /// Category recorded if the product has to be created.
    pub category: String,
    pub listings: Vec<RawListing>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub product_id: i64,
    pub created: bool,
    pub image_set: bool,
    pub prices_upserted: usize,
}

/// One duplicate group folded (or, in a dry run, to be folded) by the sweep.
#[derive(Debug, Clone, Serialize)]
pub struct MergePlan {
    pub name: String,
    pub keep_id: i64,
    pub removed_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub dry_run: bool,
    pub groups_found: usize,
    pub products_removed: u64,
    pub prices_moved: u64,
    pub prices_dropped: u64,
    pub images_carried: usize,
    pub failed_groups: usize,
    pub merges: Vec<MergePlan>,
}

pub struct MergeCoordinator {
    store: Arc<dyn ProductStore>,
    settings: MergeConfig,
}

/// Case-insensitive, whitespace-normalized form used for name equality.
pub fn normalize_name(name: &str) -> String {
    collapse_whitespace(name).to_lowercase()
}

impl MergeCoordinator {
    pub fn new(store: Arc<dyn ProductStore>, settings: MergeConfig) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &Arc<dyn ProductStore> {
        &self.store
    }

    /// Whether `url` may be stored as a product image.
    ///
    /// Requires an http(s) scheme and the configured minimum length, and
    /// rejects inline `data:` images and URLs containing a denylisted
    /// substring such as `icon` or `logo`.
    pub fn is_valid_image(&self, url: &str) -> bool {
        let url = url.trim();
        let lower = url.to_lowercase();
        lower.starts_with("http")
            && url.chars().count() >= self.settings.image_min_len
            && !lower.contains("data:image")
            && !self
                .settings
                .image_denylist
                .iter()
                .any(|needle| lower.contains(&needle.to_lowercase()))
    }

    fn first_valid_image<'a>(&self, listings: &'a [RawListing]) -> Option<&'a str> {
        listings
            .iter()
            .filter_map(|l| l.image_url.as_deref())
            .find(|url| self.is_valid_image(url))
    }

    /// Existing product for `key` under the configured match mode.
    pub async fn lookup(&self, key: &str) -> Result<Option<CanonicalProduct>, StoreError> {
        let candidates = self
            .store
            .find_by_name_like(&collapse_whitespace(key))
            .await?;
        let wanted = normalize_name(key);
        if let Some(exact) = candidates.iter().find(|p| normalize_name(&p.name) == wanted) {
            return Ok(Some(exact.clone()));
        }
        match self.settings.match_mode {
            MatchMode::Exact => Ok(None),
            MatchMode::Contains => Ok(candidates.into_iter().next()),
        }
    }

    pub async fn ingest(&self, batch: &GroupBatch) -> Result<IngestOutcome, IngestError> {
        let key = batch.key.as_str();
        let wrap = |e: StoreError| IngestError::new(key, e);

        let image = self.first_valid_image(&batch.listings);
        let (product, created, mut image_set) = match self.lookup(key).await.map_err(wrap)? {
            Some(product) => (product, false, false),
            None => {
                let product = self
                    .store
                    .create(&NewProduct {
                        name: key.to_string(),
                        brand: batch.brand.clone(),
                        category: batch.category.clone(),
                        image_url: image.map(str::to_string),
                    })
                    .await
                    .map_err(wrap)?;
                info!(group = %key, product_id = product.id, "created product");
                (product, true, image.is_some())
            }
        };

        let has_image = product
            .image_url
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        if !created && !has_image {
            if let Some(url) = image {
                self.store
                    .update_image(product.id, url)
                    .await
                    .map_err(wrap)?;
                debug!(product_id = product.id, url, "image set");
                image_set = true;
            }
        }

        // Listings from one store share a row; the last one written wins.
        let at = Utc::now();
        let mut stores = BTreeSet::new();
        for listing in &batch.listings {
            self.store
                .upsert_price(
                    product.id,
                    &listing.store,
                    listing.price,
                    listing.link.as_deref().unwrap_or(""),
                    at,
                )
                .await
                .map_err(wrap)?;
            stores.insert(listing.store.as_str());
        }

        Ok(IngestOutcome {
            product_id: product.id,
            created,
            image_set,
            prices_upserted: stores.len(),
        })
    }

    /// Fold products sharing a normalized name into the lowest id.
    ///
    /// Per group: carry over an image if the kept product lacks one, move
    /// prices, then delete the duplicates. A conflicting group is skipped and
    /// counted; an unreachable store aborts the sweep.
    pub async fn dedup_sweep(&self, dry_run: bool) -> Result<SweepReport, StoreError> {
        let products = self.store.list_products().await?;

        let mut groups: BTreeMap<String, Vec<CanonicalProduct>> = BTreeMap::new();
        for product in products {
            let key = normalize_name(&product.name);
            if key.is_empty() {
                continue;
            }
            groups.entry(key).or_default().push(product);
        }

        let mut report = SweepReport {
            dry_run,
            ..SweepReport::default()
        };

        for (_, mut members) in groups.into_iter().filter(|(_, m)| m.len() > 1) {
            members.sort_by_key(|p| p.id);
            let keep = members.remove(0);
            let removed_ids: Vec<i64> = members.iter().map(|p| p.id).collect();
            report.groups_found += 1;
            report.merges.push(MergePlan {
                name: keep.name.clone(),
                keep_id: keep.id,
                removed_ids: removed_ids.clone(),
            });

            if dry_run {
                report.products_removed += removed_ids.len() as u64;
                continue;
            }

            match self.fold_group(&keep, &members, &removed_ids).await {
                Ok((image_carried, moved, dropped, removed)) => {
                    if image_carried {
                        report.images_carried += 1;
                    }
                    report.prices_moved += moved;
                    report.prices_dropped += dropped;
                    report.products_removed += removed;
                    info!(keep = keep.id, removed = ?removed_ids, moved, dropped, "merged duplicates");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(keep = keep.id, error = %e, "duplicate group skipped");
                    report.failed_groups += 1;
                }
            }
        }

        Ok(report)
    }

    async fn fold_group(
        &self,
        keep: &CanonicalProduct,
        duplicates: &[CanonicalProduct],
        removed_ids: &[i64],
    ) -> Result<(bool, u64, u64, u64), StoreError> {
        let mut image_carried = false;
        if keep.image_url.is_none() {
            if let Some(url) = duplicates
                .iter()
                .filter_map(|p| p.image_url.as_deref())
                .find(|url| self.is_valid_image(url))
            {
                self.store.update_image(keep.id, url).await?;
                image_carried = true;
            }
        }

        // Reparent before delete: deleting first would orphan the prices.
        let reparent = self.store.reparent_prices(removed_ids, keep.id).await?;
        let removed = self.store.delete(removed_ids).await?;
        Ok((image_carried, reparent.moved, reparent.dropped, removed))
    }
}

/// Entry point for `petprice dedup`.
pub async fn run_dedup(config: &Config, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    let store: Arc<dyn ProductStore> = Arc::new(SqliteProductStore::new(pool.clone()));
    let coordinator = MergeCoordinator::new(store, config.merge.clone());
    let report = coordinator.dedup_sweep(dry_run).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if dry_run {
        println!("dedup (dry-run)");
    } else {
        println!("dedup");
    }
    println!("  duplicate groups: {}", report.groups_found);
    for plan in &report.merges {
        println!(
            "    '{}': keep {}, remove {:?}",
            plan.name, plan.keep_id, plan.removed_ids
        );
    }
    println!("  products removed: {}", report.products_removed);
    if !dry_run {
        println!("  prices moved: {}", report.prices_moved);
        println!("  prices dropped: {}", report.prices_dropped);
        println!("  images carried: {}", report.images_carried);
        println!("  groups failed: {}", report.failed_groups);
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::resolve;
    use crate::store::InMemoryProductStore;
    use rust_decimal::Decimal;

    fn listing(store: &str, price: i64, image: Option<&str>) -> RawListing {
        RawListing {
            name: "Ração Golden Special Frango Filhote para Cães 15kg".into(),
            price: Decimal::new(price, 2),
            image_url: image.map(str::to_string),
            link: Some(format!("https://{}.example/p", store.to_lowercase())),
            store: store.into(),
            job_index: 0,
        }
    }

    fn batch(listings: Vec<RawListing>) -> GroupBatch {
        GroupBatch {
            key: resolve("Ração Golden Special Frango Filhote para Cães 15kg"),
            brand: "Golden".into(),
            category: "Ração".into(),
            listings,
        }
    }

    fn coordinator() -> (Arc<InMemoryProductStore>, MergeCoordinator) {
        let store = Arc::new(InMemoryProductStore::new());
        let coordinator = MergeCoordinator::new(store.clone(), MergeConfig::default());
        (store, coordinator)
    }

    #[test]
    fn image_validity() {
        let (_, c) = coordinator();
        assert!(c.is_valid_image("https://cdn.example.com/golden-15kg.jpg"));
        assert!(!c.is_valid_image("http://x.co/a.png"));
        assert!(!c.is_valid_image("data:image/png;base64,iVBORw0KGgoAAAANSUhEUg"));
        assert!(!c.is_valid_image("https://cdn.example.com/store-logo.png"));
        assert!(!c.is_valid_image("https://cdn.example.com/ICON-cart.svg"));
        assert!(!c.is_valid_image("ftp://cdn.example.com/golden-15kg.jpg"));
    }

    #[tokio::test]
    async fn creates_then_updates() {
        let (store, c) = coordinator();
        let first = c
            .ingest(&batch(vec![
                listing("Petz", 18990, Some("data:image/gif;base64,R0lGODlhAQABAAAAACw=")),
                listing("Cobasi", 17990, Some("https://cdn.example.com/golden.jpg")),
            ]))
            .await
            .unwrap();
        assert!(first.created);
        assert!(first.image_set);
        assert_eq!(first.prices_upserted, 2);

        let product = store.get(first.product_id).await.unwrap();
        assert_eq!(product.name, "Ração Golden Special Frango Filhotes para Cães");
        assert_eq!(product.image_url.as_deref(), Some("https://cdn.example.com/golden.jpg"));

        let second = c
            .ingest(&batch(vec![listing(
                "Petz",
                17490,
                Some("https://cdn.example.com/other.jpg"),
            )]))
            .await
            .unwrap();
        assert_eq!(second.product_id, first.product_id);
        assert!(!second.created);
        assert!(!second.image_set);

        let product = store.get(first.product_id).await.unwrap();
        assert_eq!(product.image_url.as_deref(), Some("https://cdn.example.com/golden.jpg"));
    }

    #[tokio::test]
    async fn repeated_ingest_keeps_one_price_per_store() {
        let (store, c) = coordinator();
        let a = c.ingest(&batch(vec![listing("Petz", 10000, None)])).await.unwrap();
        c.ingest(&batch(vec![listing("Petz", 9500, None)])).await.unwrap();

        let prices = store.prices_for(a.product_id).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].price, Decimal::new(9500, 2));
    }

    #[tokio::test]
    async fn listings_from_one_store_count_as_one_price() {
        let (store, c) = coordinator();
        let outcome = c
            .ingest(&batch(vec![
                listing("Petz", 18990, None),
                listing("Petz", 3990, None),
                listing("Cobasi", 17990, None),
            ]))
            .await
            .unwrap();

        assert_eq!(outcome.prices_upserted, 2);
        let prices = store.prices_for(outcome.product_id).await.unwrap();
        assert_eq!(prices.len(), 2);
    }

    #[tokio::test]
    async fn image_filled_later_when_missing() {
        let (store, c) = coordinator();
        let a = c.ingest(&batch(vec![listing("Petz", 10000, None)])).await.unwrap();
        assert!(!a.image_set);
        let b = c
            .ingest(&batch(vec![listing(
                "Cobasi",
                9900,
                Some("https://cdn.example.com/golden.jpg"),
            )]))
            .await
            .unwrap();
        assert!(b.image_set);
        assert!(store.get(a.product_id).await.unwrap().image_url.is_some());
    }

    #[tokio::test]
    async fn match_modes() {
        let store = Arc::new(InMemoryProductStore::new());
        store
            .create(&NewProduct {
                name: "Ração Golden Special Frango Filhotes para Cães Pacote".into(),
                brand: "Golden".into(),
                category: "Ração".into(),
                image_url: None,
            })
            .await
            .unwrap();

        let exact = MergeCoordinator::new(store.clone(), MergeConfig::default());
        assert!(exact
            .lookup("Ração Golden Special Frango Filhotes para Cães")
            .await
            .unwrap()
            .is_none());
        // Whitespace and ASCII case differences still count as exact.
        assert!(exact
            .lookup("ração golden special  FRANGO filhotes para cães pacote")
            .await
            .unwrap()
            .is_some());

        let contains = MergeCoordinator::new(
            store,
            MergeConfig {
                match_mode: MatchMode::Contains,
                ..MergeConfig::default()
            },
        );
        let hit = contains
            .lookup("Ração Golden Special Frango Filhotes para Cães")
            .await
            .unwrap();
        assert_eq!(hit.map(|p| p.id), Some(1));
    }

    #[tokio::test]
    async fn sweep_keeps_lowest_id_and_one_price_per_store() {
        let (store, c) = coordinator();
        let new = |name: &str, image: Option<&str>| NewProduct {
            name: name.into(),
            brand: "NexGard".into(),
            category: "Antipulgas".into(),
            image_url: image.map(str::to_string),
        };
        let keep = store.create(&new("NexGard 1 Comp.", None)).await.unwrap().id;
        let d1 = store
            .create(&new("nexgard  1 comp.", Some("https://cdn.example.com/nexgard.jpg")))
            .await
            .unwrap()
            .id;
        let d2 = store.create(&new("NexGard 1 Comp. ", None)).await.unwrap().id;
        let other = store.create(&new("NexGard 3 Comp.", None)).await.unwrap().id;

        let at = Utc::now();
        // 5 rows over 3 distinct stores.
        for (pid, s) in [(keep, "Petz"), (d1, "Petz"), (d1, "Cobasi"), (d2, "Cobasi"), (d2, "Amazon")] {
            store.upsert_price(pid, s, Decimal::TEN, "", at).await.unwrap();
        }
        store.upsert_price(other, "Petz", Decimal::new(100, 0), "", at).await.unwrap();

        let report = c.dedup_sweep(false).await.unwrap();
        assert_eq!(report.groups_found, 1);
        assert_eq!(report.products_removed, 2);
        assert_eq!(report.prices_moved + report.prices_dropped, 4);
        assert_eq!(report.images_carried, 1);
        assert_eq!(report.merges[0].keep_id, keep);
        assert_eq!(report.merges[0].removed_ids, vec![d1, d2]);

        assert_eq!(store.prices_for(keep).await.unwrap().len(), 3);
        assert_eq!(store.prices_for(other).await.unwrap().len(), 1);
        assert!(store.get(d1).await.is_err());
        assert!(store.get(d2).await.is_err());
        assert!(store.get(keep).await.unwrap().image_url.is_some());
        assert_eq!(store.list_products().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dry_run_sweep_changes_nothing() {
        let (store, c) = coordinator();
        for _ in 0..3 {
            store
                .create(&NewProduct {
                    name: "Simparic 1 Comp.".into(),
                    brand: "Simparic".into(),
                    category: "Antipulgas".into(),
                    image_url: None,
                })
                .await
                .unwrap();
        }
        let report = c.dedup_sweep(true).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.products_removed, 2);
        assert_eq!(store.list_products().await.unwrap().len(), 3);
    }
}
