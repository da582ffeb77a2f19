//! Batch pipeline orchestration.
//!
//! Coordinates a full run: jobs → fetch orchestrator → group resolution →
//! merge coordinator → store. Each job's groups are persisted as soon as the
//! job closes, so an interrupted run keeps everything written so far.

use anyhow::{anyhow, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, MergeConfig};
use crate::db;
use crate::grouping::{classify, GroupKey, GroupSource};
use crate::jobs::load_jobs;
use crate::merge::{GroupBatch, MergeCoordinator};
use crate::migrate::create_schema;
use crate::models::SearchJob;
use crate::orchestrator::{FetchOrchestrator, JobResult, OrchestratorConfig, ShutdownReport};
use crate::progress::{ProgressMode, RunProgressEvent, RunProgressReporter};
use crate::store::{InMemoryProductStore, ProductStore, SqliteProductStore};
use crate::traits::{FetcherRegistry, StoreFetcher};

/// Brand recorded when neither the job nor a brand rule names one.
const UNKNOWN_BRAND: &str = "Outros";

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Fetch and resolve, but write nothing.
    pub dry_run: bool,
    /// Process at most this many jobs.
    pub limit: Option<usize>,
}

/// What a run did, per job and per store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub dry_run: bool,
    pub cancelled: bool,
    pub jobs_total: usize,
    pub jobs_processed: usize,
    pub jobs_without_results: usize,
    pub listings_per_store: BTreeMap<String, usize>,
    pub timeouts_per_store: BTreeMap<String, usize>,
    pub failures_per_store: BTreeMap<String, usize>,
    pub listings_skipped: usize,
    pub groups_resolved: usize,
    pub groups_created: usize,
    pub groups_updated: usize,
    pub groups_failed: usize,
    pub prices_upserted: usize,
    pub shutdown: ShutdownReport,
}

impl RunSummary {
    fn tally(&mut self, result: &JobResult) {
        self.jobs_processed += 1;
        if !result.has_listings() {
            self.jobs_without_results += 1;
        }
        for listing in &result.listings {
            *self
                .listings_per_store
                .entry(listing.store.clone())
                .or_default() += 1;
        }
        for store in &result.timed_out {
            *self.timeouts_per_store.entry(store.clone()).or_default() += 1;
        }
        for (store, _) in &result.failed {
            *self.failures_per_store.entry(store.clone()).or_default() += 1;
        }
    }
}

/// Split a job's listings into one batch per group key.
///
/// Unnamed listings are always skipped, accessories when configured so.
/// Returns the batches in key order and the number of skipped listings.
pub fn group_listings(
    result: &JobResult,
    job: &SearchJob,
    merge: &MergeConfig,
) -> (Vec<GroupBatch>, usize) {
    let mut batches: BTreeMap<GroupKey, GroupBatch> = BTreeMap::new();
    let mut skipped = 0;

    for listing in &result.listings {
        let classification = classify(&listing.name);
        let skip = match classification.source {
            GroupSource::Unnamed => true,
            GroupSource::Accessory => merge.skip_accessories,
            GroupSource::Brand | GroupSource::Generic => false,
        };
        if skip {
            skipped += 1;
            continue;
        }

        let brand = job
            .brand
            .clone()
            .or_else(|| classification.brand.map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_BRAND.to_string());
        let category = job
            .category
            .clone()
            .or_else(|| classification.category.map(str::to_string))
            .unwrap_or_else(|| merge.default_category.clone());

        batches
            .entry(classification.key.clone())
            .or_insert_with(|| GroupBatch {
                key: classification.key,
                brand,
                category,
                listings: Vec::new(),
            })
            .listings
            .push(listing.clone());
    }

    (batches.into_values().collect(), skipped)
}

/// Run every job through fetch, resolution, and merge.
///
/// A conflicting group is skipped and counted; a store that becomes
/// unreachable stops the run with an error after the workers are shut down.
pub async fn run_batch(
    config: &Config,
    jobs: &[SearchJob],
    fetchers: Vec<Box<dyn StoreFetcher>>,
    store: Arc<dyn ProductStore>,
    progress: &dyn RunProgressReporter,
    options: BatchOptions,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let jobs = match options.limit {
        Some(limit) => &jobs[..limit.min(jobs.len())],
        None => jobs,
    };
    let mut summary = RunSummary {
        run_id: Uuid::new_v4().to_string(),
        dry_run: options.dry_run,
        jobs_total: jobs.len(),
        ..RunSummary::default()
    };
    info!(run_id = %summary.run_id, jobs = jobs.len(), stores = fetchers.len(), "run started");

    let expected = fetchers.len();
    let coordinator = MergeCoordinator::new(store, config.merge.clone());
    let mut orchestrator = FetchOrchestrator::start(
        fetchers,
        OrchestratorConfig::from(&config.fetch),
        cancel.clone(),
    );

    let mut fatal = None;
    for (index, job) in jobs.iter().enumerate() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        progress.report(RunProgressEvent::Dispatching {
            job: index + 1,
            total: jobs.len(),
            code: job.code.clone(),
        });

        let result = orchestrator.run_job(index, job).await;
        progress.report(RunProgressEvent::Collected {
            job: index + 1,
            total: jobs.len(),
            responded: result.responded.len(),
            expected,
            listings: result.listings.len(),
        });
        summary.tally(&result);

        let (batches, skipped) = group_listings(&result, job, &config.merge);
        summary.listings_skipped += skipped;
        summary.groups_resolved += batches.len();
        if options.dry_run {
            for batch in &batches {
                info!(job = %job.code, group = %batch.key, listings = batch.listings.len(), "resolved (dry-run)");
            }
            continue;
        }

        for batch in &batches {
            match coordinator.ingest(batch).await {
                Ok(outcome) => {
                    if outcome.created {
                        summary.groups_created += 1;
                    } else {
                        summary.groups_updated += 1;
                    }
                    summary.prices_upserted += outcome.prices_upserted;
                }
                Err(e) if e.is_fatal() => {
                    fatal = Some(e);
                    break;
                }
                Err(e) => {
                    warn!(job = %job.code, error = %e, "group ingestion abandoned");
                    summary.groups_failed += 1;
                }
            }
        }
        if fatal.is_some() {
            break;
        }
    }
    if cancel.is_cancelled() {
        summary.cancelled = true;
    }

    summary.shutdown = orchestrator.shutdown().await;

    if let Some(e) = fatal {
        return Err(anyhow!(e).context("store unavailable, run aborted"));
    }

    info!(
        run_id = %summary.run_id,
        processed = summary.jobs_processed,
        created = summary.groups_created,
        updated = summary.groups_updated,
        failed = summary.groups_failed,
        "run finished"
    );
    Ok(summary)
}

/// Entry point for `petprice run`.
pub async fn run_cmd(
    config: &Config,
    jobs_path: &Path,
    options: BatchOptions,
    json: bool,
    mode: ProgressMode,
) -> Result<()> {
    let jobs = load_jobs(jobs_path)?;
    let registry = FetcherRegistry::from_config(config)?;
    if registry.is_empty() {
        anyhow::bail!("No stores configured. Add [[stores]] entries to the config file.");
    }

    // A dry run never writes, so it leaves the database file alone.
    let (pool, store) = if options.dry_run {
        let store: Arc<dyn ProductStore> = Arc::new(InMemoryProductStore::new());
        (None::<SqlitePool>, store)
    } else {
        let pool = db::connect(config).await?;
        create_schema(&pool).await?;
        let store: Arc<dyn ProductStore> = Arc::new(SqliteProductStore::new(pool.clone()));
        (Some(pool), store)
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current job");
            on_signal.cancel();
        }
    });

    let reporter = mode.reporter();
    let summary = run_batch(
        config,
        &jobs,
        registry.into_fetchers(),
        store,
        reporter.as_ref(),
        options,
        cancel,
    )
    .await?;
    if let Some(pool) = pool {
        pool.close().await;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    if summary.dry_run {
        println!("run {} (dry-run)", summary.run_id);
    } else {
        println!("run {}", summary.run_id);
    }
    println!(
        "  jobs processed: {} / {}",
        summary.jobs_processed, summary.jobs_total
    );
    println!("  jobs without results: {}", summary.jobs_without_results);
    for (store, count) in &summary.listings_per_store {
        let timeouts = summary.timeouts_per_store.get(store).copied().unwrap_or(0);
        let failures = summary.failures_per_store.get(store).copied().unwrap_or(0);
        println!(
            "  {}: {} listings, {} timeouts, {} failures",
            store, count, timeouts, failures
        );
    }
    for (store, timeouts) in &summary.timeouts_per_store {
        if !summary.listings_per_store.contains_key(store) {
            let failures = summary.failures_per_store.get(store).copied().unwrap_or(0);
            println!(
                "  {}: 0 listings, {} timeouts, {} failures",
                store, timeouts, failures
            );
        }
    }
    for (store, failures) in &summary.failures_per_store {
        if !summary.listings_per_store.contains_key(store)
            && !summary.timeouts_per_store.contains_key(store)
        {
            println!("  {}: 0 listings, 0 timeouts, {} failures", store, failures);
        }
    }
    println!("  listings skipped: {}", summary.listings_skipped);
    println!("  groups resolved: {}", summary.groups_resolved);
    if !summary.dry_run {
        println!("  groups created: {}", summary.groups_created);
        println!("  groups updated: {}", summary.groups_updated);
        println!("  groups failed: {}", summary.groups_failed);
        println!("  prices upserted: {}", summary.prices_upserted);
    }
    if !summary.shutdown.terminated.is_empty() {
        println!(
            "  workers terminated: {}",
            summary.shutdown.terminated.join(", ")
        );
    }
    if summary.cancelled {
        println!("cancelled");
    } else {
        println!("ok");
    }
}
