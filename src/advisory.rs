//! Advisory grouping report.
//!
//! Groups a set of names with [`resolve`] and flags pairs of group keys that
//! look like the same product split in two: adjacent keys, in sorted order,
//! where one is a substring of the other. This is a heuristic. It misses
//! near-duplicates that do not sort next to each other and flags unrelated
//! keys that merely share a prefix ("NexGard 1 Comp." / "NexGard 1 Comp. Gde.").
//! Nothing here ever merges records; the output is for a human to review.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::attributes::weight_label;
use crate::config::Config;
use crate::db;
use crate::grouping::resolve;
use crate::store::{ProductStore, SqliteProductStore};

/// Two keys that may name the same product family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuspectPair {
    pub left: String,
    pub right: String,
    /// First name that resolved to `left`.
    pub left_example: String,
    /// First name that resolved to `right`.
    pub right_example: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupingReport {
    pub names_total: usize,
    /// Names per group key, in input order within each group.
    pub groups: BTreeMap<String, Vec<String>>,
    /// Keys that only one name resolved to.
    pub singletons: Vec<String>,
    pub suspects: Vec<SuspectPair>,
}

impl GroupingReport {
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Distinct weight/quantity labels seen in a group, e.g. `["1kg", "15kg"]`.
    pub fn variants(&self, key: &str) -> Vec<String> {
        let mut labels: Vec<String> = self
            .groups
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|name| weight_label(name))
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }
}

pub fn grouping_report<S: AsRef<str>>(names: &[S]) -> GroupingReport {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in names {
        let name = name.as_ref();
        groups
            .entry(resolve(name).into_string())
            .or_default()
            .push(name.to_string());
    }

    let singletons = groups
        .iter()
        .filter(|(_, members)| members.len() == 1)
        .map(|(key, _)| key.clone())
        .collect();

    let keys: Vec<&String> = groups.keys().collect();
    let suspects = keys
        .windows(2)
        .filter(|pair| pair[0].contains(pair[1].as_str()) || pair[1].contains(pair[0].as_str()))
        .map(|pair| SuspectPair {
            left: pair[0].clone(),
            right: pair[1].clone(),
            left_example: groups[pair[0]][0].clone(),
            right_example: groups[pair[1]][0].clone(),
        })
        .collect();

    GroupingReport {
        names_total: names.len(),
        groups,
        singletons,
        suspects,
    }
}

/// Entry point for `petprice report`: runs the report over stored product names.
///
/// Stored names are group keys and resolve to themselves. A name written under
/// an older rule table may land in a different group.
pub async fn run_report(config: &Config, limit: usize) -> Result<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn ProductStore> = Arc::new(SqliteProductStore::new(pool.clone()));
    let names: Vec<String> = store
        .list_products()
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();
    pool.close().await;

    let report = grouping_report(&names);

    println!(
        "grouping: {} products -> {} groups",
        report.names_total,
        report.group_count()
    );
    println!("  single-member groups: {}", report.singletons.len());
    println!("  suspected split groups: {}", report.suspects.len());

    for pair in report.suspects.iter().take(limit) {
        println!();
        println!("  '{}' vs '{}'", pair.left, pair.right);
        println!("    e.g. {} / {}", pair.left_example, pair.right_example);
    }

    let multi: Vec<(&String, &Vec<String>)> = report
        .groups
        .iter()
        .filter(|(_, members)| members.len() > 1)
        .take(limit)
        .collect();
    if !multi.is_empty() {
        println!();
        println!("  largest groups:");
        for (key, members) in multi {
            let variants = report.variants(key);
            if variants.is_empty() {
                println!("    {}: {} names", key, members.len());
            } else {
                println!("    {}: {} names ({})", key, members.len(), variants.join(", "));
            }
        }
    }
    Ok(())
}
