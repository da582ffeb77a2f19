//! Concurrent multi-store fetch orchestration.
//!
//! One long-lived worker task per [`StoreFetcher`] consumes commands from its
//! own bounded queue and answers on a single shared results channel. Each job
//! is broadcast to every worker; the orchestrator then collects until every
//! worker has answered for that job or the per-job deadline passes.
//!
//! ```text
//!                  ┌──────────┐  Search{i}   ┌──────────┐
//!            ┌────▶│ queue A  │─────────────▶│ worker A │──┐
//! run_job(i) ├────▶│ queue B  │─────────────▶│ worker B │──┼──▶ results ──▶ JobResult{i}
//!            └────▶│ queue C  │─────────────▶│ worker C │──┘   (tagged i)
//!                  └──────────┘              └──────────┘
//! ```
//!
//! Every report carries its job index, so a report that arrives after its job
//! was closed is recognised and discarded. A hung or crashed worker only
//! costs the jobs it misses; the others keep being served. On
//! [`shutdown`](FetchOrchestrator::shutdown) workers get a stop command and a
//! grace period, after which the remaining tasks are aborted.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::models::{RawListing, SearchJob};
use crate::traits::StoreFetcher;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub per_job_timeout: Duration,
    pub shutdown_grace: Duration,
    /// Capacity of each worker's input queue.
    pub queue_capacity: usize,
    /// Listings kept per store per job, best match first.
    pub max_listings_per_store: usize,
}

impl From<&FetchConfig> for OrchestratorConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            per_job_timeout: config.per_job_timeout(),
            shutdown_grace: config.shutdown_grace(),
            queue_capacity: config.queue_capacity.max(1),
            max_listings_per_store: config.max_listings_per_store.max(1),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

#[derive(Debug)]
enum WorkerCommand {
    Search { job_index: usize, term: String },
    Stop,
}

/// What one store produced for one job.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    Found(Vec<RawListing>),
    NoResult,
    Failed(String),
}

#[derive(Debug)]
struct WorkerReport {
    worker: usize,
    job_index: usize,
    outcome: StoreOutcome,
}

/// Per-store results gathered for one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job_index: usize,
    pub job: SearchJob,
    /// Listings from every store that answered in time, in arrival order.
    pub listings: Vec<RawListing>,
    /// Stores that answered in time, with or without listings.
    pub responded: Vec<String>,
    /// Stores that answered in time with nothing.
    pub empty: Vec<String>,
    /// Stores that failed, with the reason.
    pub failed: Vec<(String, String)>,
    /// Stores that did not answer before the deadline.
    pub timed_out: Vec<String>,
}

impl JobResult {
    fn new(job_index: usize, job: SearchJob) -> Self {
        Self {
            job_index,
            job,
            listings: Vec::new(),
            responded: Vec::new(),
            empty: Vec::new(),
            failed: Vec::new(),
            timed_out: Vec::new(),
        }
    }

    pub fn has_listings(&self) -> bool {
        !self.listings.is_empty()
    }
}

/// How the workers ended at shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Workers that exited on their own within the grace period.
    pub stopped: usize,
    /// Workers that had panicked.
    pub crashed: Vec<String>,
    /// Workers aborted after the grace period.
    pub terminated: Vec<String>,
}

struct Worker {
    store: String,
    commands: mpsc::Sender<WorkerCommand>,
    handle: JoinHandle<()>,
}

/// A started pool of store workers.
///
/// Must be created inside a tokio runtime. Dropping it without calling
/// [`shutdown`](Self::shutdown) aborts the workers immediately.
pub struct FetchOrchestrator {
    workers: Vec<Worker>,
    results: mpsc::Receiver<WorkerReport>,
    /// Lowest job index still being collected; workers skip older commands.
    open_job: Arc<AtomicUsize>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl FetchOrchestrator {
    /// Spawn one worker per fetcher. Each worker opens its fetcher once and
    /// reuses it for every job.
    pub fn start(
        fetchers: Vec<Box<dyn StoreFetcher>>,
        config: OrchestratorConfig,
        cancel: CancellationToken,
    ) -> Self {
        let capacity = (config.queue_capacity + 1) * fetchers.len().max(1);
        let (results_tx, results) = mpsc::channel(capacity);
        let open_job = Arc::new(AtomicUsize::new(0));

        let workers = fetchers
            .into_iter()
            .enumerate()
            .map(|(index, fetcher)| {
                let store = fetcher.store_name().to_string();
                let (commands, inbox) = mpsc::channel(config.queue_capacity);
                let handle = tokio::spawn(run_worker(
                    index,
                    fetcher,
                    inbox,
                    results_tx.clone(),
                    open_job.clone(),
                    cancel.clone(),
                    config.max_listings_per_store,
                ));
                Worker {
                    store,
                    commands,
                    handle,
                }
            })
            .collect::<Vec<_>>();

        info!(workers = workers.len(), "fetch workers started");

        Self {
            workers,
            results,
            open_job,
            config,
            cancel,
        }
    }

    pub fn store_names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.store.clone()).collect()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Broadcast one job to every worker and collect what arrives before the
    /// deadline. Job indices must increase from call to call.
    pub async fn run_job(&mut self, job_index: usize, job: &SearchJob) -> JobResult {
        self.open_job.store(job_index, Ordering::SeqCst);
        let mut result = JobResult::new(job_index, job.clone());
        let mut pending = vec![false; self.workers.len()];

        for (index, worker) in self.workers.iter().enumerate() {
            let command = WorkerCommand::Search {
                job_index,
                term: job.term.clone(),
            };
            match worker.commands.try_send(command) {
                Ok(()) => pending[index] = true,
                // Still busy with earlier jobs: it has not answered, so this is
                // a timeout rather than a failure.
                Err(TrySendError::Full(_)) => {
                    warn!(store = %worker.store, job = job_index, "worker backlogged, counted as timed out");
                    result.timed_out.push(worker.store.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    result
                        .failed
                        .push((worker.store.clone(), "worker exited".to_string()));
                }
            }
        }

        let deadline = Instant::now() + self.config.per_job_timeout;
        while pending.iter().any(|p| *p) {
            let report = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                received = tokio::time::timeout_at(deadline, self.results.recv()) => match received {
                    Ok(Some(report)) => report,
                    // Every worker is gone.
                    Ok(None) => break,
                    Err(_) => break,
                },
            };

            if report.job_index != job_index {
                debug!(
                    job = report.job_index,
                    current = job_index,
                    "discarding late result"
                );
                continue;
            }
            let Some(slot) = pending.get_mut(report.worker) else {
                continue;
            };
            if !std::mem::replace(slot, false) {
                continue;
            }

            let store = self.workers[report.worker].store.clone();
            match report.outcome {
                StoreOutcome::Found(listings) => {
                    debug!(store = %store, job = job_index, listings = listings.len(), "store answered");
                    result.listings.extend(listings);
                    result.responded.push(store);
                }
                StoreOutcome::NoResult => {
                    result.responded.push(store.clone());
                    result.empty.push(store);
                }
                StoreOutcome::Failed(reason) => result.failed.push((store, reason)),
            }
        }

        for (index, still_pending) in pending.into_iter().enumerate() {
            if !still_pending {
                continue;
            }
            let worker = &self.workers[index];
            if worker.handle.is_finished() {
                result
                    .failed
                    .push((worker.store.clone(), "worker exited".to_string()));
            } else {
                warn!(store = %worker.store, job = job_index, "store timed out");
                result.timed_out.push(worker.store.clone());
            }
        }

        result
    }

    /// Stop every worker: send the stop command, wait up to the grace period,
    /// then abort whatever is still running.
    pub async fn shutdown(mut self) -> ShutdownReport {
        self.open_job.store(usize::MAX, Ordering::SeqCst);
        let workers = std::mem::take(&mut self.workers);

        // Workers blocked on a full results channel unblock with an error.
        self.results.close();
        for worker in &workers {
            let _ = worker.commands.try_send(WorkerCommand::Stop);
        }

        let deadline = Instant::now() + self.config.shutdown_grace;
        let mut report = ShutdownReport::default();
        for worker in workers {
            let Worker {
                store,
                commands,
                mut handle,
            } = worker;
            drop(commands);
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.stopped += 1,
                Ok(Err(e)) => {
                    warn!(store = %store, error = %e, "worker crashed");
                    report.crashed.push(store);
                }
                Err(_) => {
                    handle.abort();
                    warn!(store = %store, "worker did not stop in time, aborted");
                    report.terminated.push(store);
                }
            }
        }

        info!(
            stopped = report.stopped,
            crashed = report.crashed.len(),
            terminated = report.terminated.len(),
            "fetch workers shut down"
        );
        report
    }
}

impl Drop for FetchOrchestrator {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.handle.abort();
        }
    }
}

async fn run_worker(
    index: usize,
    mut fetcher: Box<dyn StoreFetcher>,
    mut inbox: mpsc::Receiver<WorkerCommand>,
    results: mpsc::Sender<WorkerReport>,
    open_job: Arc<AtomicUsize>,
    cancel: CancellationToken,
    max_listings: usize,
) {
    let store = fetcher.store_name().to_string();
    let broken = match fetcher.open().await {
        Ok(()) => None,
        Err(e) => {
            warn!(store = %store, error = %e, "fetcher failed to open");
            Some(e.to_string())
        }
    };

    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,
            command = inbox.recv() => command,
        };
        let (job_index, term) = match command {
            Some(WorkerCommand::Search { job_index, term }) => (job_index, term),
            Some(WorkerCommand::Stop) | None => break,
        };
        if job_index < open_job.load(Ordering::SeqCst) {
            debug!(store = %store, job = job_index, "skipping stale job");
            continue;
        }

        let outcome = match &broken {
            Some(reason) => StoreOutcome::Failed(format!("session unavailable: {}", reason)),
            None => match fetcher.search(&term).await {
                Ok(listings) if listings.is_empty() => StoreOutcome::NoResult,
                Ok(mut listings) => {
                    listings.truncate(max_listings);
                    for listing in &mut listings {
                        listing.store = store.clone();
                        listing.job_index = job_index;
                    }
                    StoreOutcome::Found(listings)
                }
                Err(e) => {
                    warn!(store = %store, job = job_index, error = %e, "search failed");
                    StoreOutcome::Failed(e.to_string())
                }
            },
        };

        let report = WorkerReport {
            worker: index,
            job_index,
            outcome,
        };
        if results.send(report).await.is_err() {
            break;
        }
    }

    fetcher.close().await;
    debug!(store = %store, "worker stopped");
}

/// Run every job against every fetcher and shut the workers down.
///
/// Results come back in job order, one per job.
pub async fn run_all(
    jobs: &[SearchJob],
    fetchers: Vec<Box<dyn StoreFetcher>>,
    config: OrchestratorConfig,
) -> Vec<JobResult> {
    let mut orchestrator = FetchOrchestrator::start(fetchers, config, CancellationToken::new());
    let mut results = Vec::with_capacity(jobs.len());
    for (index, job) in jobs.iter().enumerate() {
        results.push(orchestrator.run_job(index, job).await);
    }
    orchestrator.shutdown().await;
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    fn listing(name: &str) -> RawListing {
        RawListing {
            name: name.into(),
            price: Decimal::new(9990, 2),
            image_url: None,
            link: None,
            store: String::new(),
            job_index: 0,
        }
    }

    /// Answers every search after `delay` with two listings named after the term.
    struct Steady {
        name: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl StoreFetcher for Steady {
        fn store_name(&self) -> &str {
            self.name
        }

        async fn search(&mut self, term: &str) -> Result<Vec<RawListing>, FetchError> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![listing(term), listing(&format!("{term} alt"))])
        }
    }

    /// Never answers and ignores stop commands while searching.
    struct Hung;

    #[async_trait]
    impl StoreFetcher for Hung {
        fn store_name(&self) -> &str {
            "Hung"
        }

        async fn search(&mut self, _term: &str) -> Result<Vec<RawListing>, FetchError> {
            std::future::pending::<()>().await;
            Ok(vec![])
        }
    }

    /// Panics on the first search.
    struct Crashy;

    #[async_trait]
    impl StoreFetcher for Crashy {
        fn store_name(&self) -> &str {
            "Crashy"
        }

        async fn search(&mut self, _term: &str) -> Result<Vec<RawListing>, FetchError> {
            panic!("scraper blew up");
        }
    }

    /// Fails to open; every job gets a failure marker.
    struct Broken;

    #[async_trait]
    impl StoreFetcher for Broken {
        fn store_name(&self) -> &str {
            "Broken"
        }

        async fn open(&mut self) -> Result<(), FetchError> {
            Err(FetchError::failure("Broken", "login page"))
        }

        async fn search(&mut self, _term: &str) -> Result<Vec<RawListing>, FetchError> {
            Ok(vec![listing("never")])
        }
    }

    /// Answers with nothing, or an error for the term "boom".
    struct Sparse;

    #[async_trait]
    impl StoreFetcher for Sparse {
        fn store_name(&self) -> &str {
            "Sparse"
        }

        async fn search(&mut self, term: &str) -> Result<Vec<RawListing>, FetchError> {
            if term == "boom" {
                Err(FetchError::failure("Sparse", "blocked"))
            } else {
                Ok(vec![])
            }
        }
    }

    fn config(timeout_ms: u64) -> OrchestratorConfig {
        OrchestratorConfig {
            per_job_timeout: Duration::from_millis(timeout_ms),
            shutdown_grace: Duration::from_millis(100),
            queue_capacity: 4,
            max_listings_per_store: 1,
        }
    }

    fn steady(name: &'static str) -> Box<dyn StoreFetcher> {
        Box::new(Steady {
            name,
            delay: Duration::from_millis(5),
        })
    }

    #[tokio::test]
    async fn broadcasts_and_tags_results() {
        let jobs = vec![SearchJob::new("A1", "nexgard"), SearchJob::new("B2", "golden")];
        let results = run_all(&jobs, vec![steady("Petz"), steady("Cobasi")], config(2_000)).await;

        assert_eq!(results.len(), 2);
        for (index, result) in results.iter().enumerate() {
            assert_eq!(result.job_index, index);
            // One listing per store: the extra one is truncated.
            assert_eq!(result.listings.len(), 2);
            assert!(result.listings.iter().all(|l| l.job_index == index));
            assert!(result.listings.iter().all(|l| l.name == jobs[index].term));
            let mut stores: Vec<_> = result.listings.iter().map(|l| l.store.as_str()).collect();
            stores.sort();
            assert_eq!(stores, vec!["Cobasi", "Petz"]);
            assert!(result.timed_out.is_empty());
        }
    }

    #[tokio::test]
    async fn hung_fetcher_only_costs_the_deadline() {
        let timeout = Duration::from_millis(300);
        let mut orchestrator = FetchOrchestrator::start(
            vec![steady("Petz"), Box::new(Hung), steady("Cobasi")],
            OrchestratorConfig {
                per_job_timeout: timeout,
                ..config(0)
            },
            CancellationToken::new(),
        );

        let started = Instant::now();
        let result = orchestrator
            .run_job(0, &SearchJob::new("A1", "bravecto"))
            .await;
        let elapsed = started.elapsed();

        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_millis(500), "took {elapsed:?}");
        assert_eq!(result.listings.len(), 2);
        assert_eq!(result.timed_out, vec!["Hung".to_string()]);
        assert_eq!(result.responded.len(), 2);

        // The next job is still served by the healthy workers.
        let next = orchestrator
            .run_job(1, &SearchJob::new("B2", "simparic"))
            .await;
        assert_eq!(next.listings.len(), 2);
        assert!(next.listings.iter().all(|l| l.job_index == 1));

        let shutdown = orchestrator.shutdown().await;
        assert_eq!(shutdown.stopped, 2);
        assert_eq!(shutdown.terminated, vec!["Hung".to_string()]);
    }

    #[tokio::test]
    async fn backlogged_store_keeps_counting_as_timed_out() {
        let jobs: Vec<SearchJob> = (0..5)
            .map(|i| SearchJob::new(format!("J{i}"), format!("term {i}")))
            .collect();
        let results = run_all(
            &jobs,
            vec![steady("Petz"), Box::new(Hung)],
            OrchestratorConfig {
                queue_capacity: 1,
                ..config(80)
            },
        )
        .await;

        for result in &results {
            assert_eq!(result.timed_out, vec!["Hung".to_string()], "job {}", result.job_index);
            assert!(result.failed.is_empty(), "job {}: {:?}", result.job_index, result.failed);
            assert_eq!(result.listings.len(), 1);
        }
    }

    #[tokio::test]
    async fn crashed_worker_does_not_stop_the_run() {
        let mut orchestrator = FetchOrchestrator::start(
            vec![steady("Petz"), Box::new(Crashy)],
            config(300),
            CancellationToken::new(),
        );

        let first = orchestrator.run_job(0, &SearchJob::new("A1", "golden")).await;
        assert_eq!(first.listings.len(), 1);
        assert_eq!(first.failed.len(), 1);
        assert_eq!(first.failed[0].0, "Crashy");

        let second = orchestrator.run_job(1, &SearchJob::new("B2", "premier")).await;
        assert_eq!(second.listings.len(), 1);
        assert_eq!(second.failed, vec![("Crashy".to_string(), "worker exited".to_string())]);

        let shutdown = orchestrator.shutdown().await;
        assert_eq!(shutdown.crashed, vec!["Crashy".to_string()]);
        assert_eq!(shutdown.stopped, 1);
    }

    #[tokio::test]
    async fn broken_session_and_empty_answers_are_recorded() {
        let jobs = vec![SearchJob::new("A1", "whiskas"), SearchJob::new("B2", "boom")];
        let results = run_all(
            &jobs,
            vec![Box::new(Broken), Box::new(Sparse)],
            config(1_000),
        )
        .await;

        let first = &results[0];
        assert!(!first.has_listings());
        assert_eq!(first.empty, vec!["Sparse".to_string()]);
        assert_eq!(first.failed.len(), 1);
        assert!(first.failed[0].1.contains("login page"));

        let second = &results[1];
        assert_eq!(second.failed.len(), 2);
        assert!(second.responded.is_empty());
    }

    #[tokio::test]
    async fn late_results_are_discarded() {
        let mut orchestrator = FetchOrchestrator::start(
            vec![
                steady("Petz"),
                Box::new(Steady {
                    name: "Slow",
                    delay: Duration::from_millis(250),
                }),
            ],
            config(100),
            CancellationToken::new(),
        );

        let first = orchestrator.run_job(0, &SearchJob::new("A1", "first")).await;
        assert_eq!(first.timed_out, vec!["Slow".to_string()]);

        // Slow's answer to job 0 lands while job 1 is collecting.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let second = orchestrator.run_job(1, &SearchJob::new("B2", "second")).await;
        assert!(second.listings.iter().all(|l| l.job_index == 1));
        assert!(second.listings.iter().all(|l| l.name == "second"));

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn cancellation_ends_collection_early() {
        let cancel = CancellationToken::new();
        let mut orchestrator = FetchOrchestrator::start(
            vec![Box::new(Hung)],
            config(10_000),
            cancel.clone(),
        );
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = orchestrator.run_job(0, &SearchJob::new("A1", "x")).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(result.listings.is_empty());
        assert!(orchestrator.is_cancelled());
        orchestrator.shutdown().await;
    }
}
