//! In-memory [`ProductStore`] for tests and dry runs.
//!
//! All state sits behind one `std::sync::RwLock`, so every operation is
//! atomic with respect to the others. A poisoned lock surfaces as
//! [`StoreError::Unavailable`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::StoreError;
use crate::models::{CanonicalProduct, NewProduct, PriceRecord};

use super::{ProductStore, ReparentReport};

#[derive(Default)]
struct Inner {
    next_id: i64,
    products: BTreeMap<i64, CanonicalProduct>,
    prices: BTreeMap<(i64, String), PriceRecord>,
}

/// In-memory store. Ids start at 1 and are never reused.
pub struct InMemoryProductStore {
    inner: RwLock<Inner>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: 1,
                ..Inner::default()
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    /// Total number of price rows, across all products.
    pub fn price_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.prices.len())
    }
}

impl Default for InMemoryProductStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn find_by_name_like(&self, pattern: &str) -> Result<Vec<CanonicalProduct>, StoreError> {
        let needle = pattern.to_ascii_lowercase();
        let inner = self.read()?;
        Ok(inner
            .products
            .values()
            .filter(|p| p.name.to_ascii_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> Result<CanonicalProduct, StoreError> {
        self.read()?
            .products
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn create(&self, product: &NewProduct) -> Result<CanonicalProduct, StoreError> {
        let mut inner = self.write()?;
        let id = inner.next_id;
        inner.next_id += 1;
        let created = CanonicalProduct {
            id,
            name: product.name.clone(),
            brand: product.brand.clone(),
            category: product.category.clone(),
            image_url: product.image_url.clone(),
        };
        inner.products.insert(id, created.clone());
        Ok(created)
    }

    async fn update_image(&self, id: i64, url: &str) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let product = inner.products.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        product.image_url = Some(url.to_string());
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
        let mut inner = self.write()?;
        if !inner.products.contains_key(&product_id) {
            return Err(StoreError::Conflict(format!(
                "price for unknown product {}",
                product_id
            )));
        }
        inner.prices.insert(
            (product_id, store.to_string()),
            PriceRecord {
                product_id,
                store: store.to_string(),
                price,
                link: link.to_string(),
                last_updated: at,
            },
        );
        Ok(())
    }

    async fn reparent_prices(
        &self,
        from_ids: &[i64],
        to_id: i64,
    ) -> Result<ReparentReport, StoreError> {
        let mut inner = self.write()?;
        if !inner.products.contains_key(&to_id) {
            return Err(StoreError::NotFound(to_id));
        }

        let mut report = ReparentReport::default();
        let keys: Vec<(i64, String)> = inner
            .prices
            .keys()
            .filter(|(pid, _)| *pid != to_id && from_ids.contains(pid))
            .cloned()
            .collect();

        // Winner per store among the duplicates.
        let mut winners: HashMap<String, PriceRecord> = HashMap::new();
        for key in keys {
            let Some(row) = inner.prices.remove(&key) else {
                continue;
            };
            if inner.prices.contains_key(&(to_id, row.store.clone())) {
                report.dropped += 1;
                continue;
            }
            let replaces = winners
                .get(&row.store)
                .map_or(true, |current| fresher(&row, current));
            if !replaces {
                report.dropped += 1;
                continue;
            }
            if winners.insert(row.store.clone(), row).is_some() {
                report.dropped += 1;
            }
        }

        for (store, mut row) in winners {
            row.product_id = to_id;
            inner.prices.insert((to_id, store), row);
            report.moved += 1;
        }
        Ok(report)
    }

    async fn delete(&self, ids: &[i64]) -> Result<u64, StoreError> {
        let mut inner = self.write()?;
        if let Some(((pid, store), _)) = inner.prices.iter().find(|((pid, _), _)| ids.contains(pid)) {
            return Err(StoreError::Conflict(format!(
                "product {} still has a price from {}",
                pid, store
            )));
        }
        let mut removed = 0;
        for id in ids {
            if inner.products.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn list_products(&self) -> Result<Vec<CanonicalProduct>, StoreError> {
        Ok(self.read()?.products.values().cloned().collect())
    }

    async fn prices_for(&self, product_id: i64) -> Result<Vec<PriceRecord>, StoreError> {
        Ok(self
            .read()?
            .prices
            .range((product_id, String::new())..)
            .take_while(|((pid, _), _)| *pid == product_id)
            .map(|(_, row)| row.clone())
            .collect())
    }
}

/// Whether `candidate` should replace `current` as the surviving row.
fn fresher(candidate: &PriceRecord, current: &PriceRecord) -> bool {
    candidate.last_updated > current.last_updated
        || (candidate.last_updated == current.last_updated
            && candidate.product_id < current.product_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn product(name: &str) -> NewProduct {
        NewProduct {
            name: name.into(),
            brand: "Golden".into(),
            category: "Ração".into(),
            image_url: None,
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn ids_are_sequential_and_lookup_ignores_case() {
        let store = InMemoryProductStore::new();
        let a = store.create(&product("Ração Golden Special")).await.unwrap();
        let b = store.create(&product("Ração Golden Mega")).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        let hits = store.find_by_name_like("GOLDEN").await.unwrap();
        assert_eq!(hits.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(store.find_by_name_like("premier").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_existing_pair() {
        let store = InMemoryProductStore::new();
        let p = store.create(&product("NexGard 1 Comp.")).await.unwrap();
        store
            .upsert_price(p.id, "Petz", Decimal::new(9990, 2), "https://a", ts(1))
            .await
            .unwrap();
        store
            .upsert_price(p.id, "Petz", Decimal::new(8990, 2), "https://b", ts(2))
            .await
            .unwrap();

        let prices = store.prices_for(p.id).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].price, Decimal::new(8990, 2));
        assert_eq!(prices[0].link, "https://b");
    }

    #[tokio::test]
    async fn upsert_for_unknown_product_conflicts() {
        let store = InMemoryProductStore::new();
        let err = store
            .upsert_price(42, "Petz", Decimal::ONE, "", ts(0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn reparent_drops_collisions_and_keeps_freshest() {
        let store = InMemoryProductStore::new();
        let keep = store.create(&product("X")).await.unwrap().id;
        let dup1 = store.create(&product("X")).await.unwrap().id;
        let dup2 = store.create(&product("X")).await.unwrap().id;

        store.upsert_price(keep, "Petz", Decimal::TEN, "", ts(1)).await.unwrap();
        store.upsert_price(dup1, "Petz", Decimal::new(2, 0), "", ts(9)).await.unwrap();
        store.upsert_price(dup1, "Cobasi", Decimal::new(11, 0), "", ts(3)).await.unwrap();
        store.upsert_price(dup2, "Cobasi", Decimal::new(12, 0), "", ts(5)).await.unwrap();
        store.upsert_price(dup2, "Amazon", Decimal::new(13, 0), "", ts(5)).await.unwrap();

        let report = store.reparent_prices(&[dup1, dup2], keep).await.unwrap();
        assert_eq!(report, ReparentReport { moved: 2, dropped: 2 });

        let prices = store.prices_for(keep).await.unwrap();
        let stores: Vec<_> = prices.iter().map(|p| p.store.as_str()).collect();
        assert_eq!(stores, vec!["Amazon", "Cobasi", "Petz"]);
        assert_eq!(prices[1].price, Decimal::new(12, 0));
        assert_eq!(prices[2].price, Decimal::TEN);
        assert!(store.prices_for(dup1).await.unwrap().is_empty());
        assert!(store.prices_for(dup2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_refuses_products_with_prices() {
        let store = InMemoryProductStore::new();
        let p = store.create(&product("X")).await.unwrap().id;
        store.upsert_price(p, "Petz", Decimal::TEN, "", ts(1)).await.unwrap();
        assert!(matches!(store.delete(&[p]).await, Err(StoreError::Conflict(_))));

        let q = store.create(&product("Y")).await.unwrap().id;
        assert_eq!(store.delete(&[q, 999]).await.unwrap(), 1);
        assert!(matches!(store.get(q).await, Err(StoreError::NotFound(_))));
    }
}
