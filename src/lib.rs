//! # petprice
//!
//! A concurrent multi-store price collector for pet products, with
//! rule-based product canonicalization.
//!
//! Every search job is broadcast to one long-lived worker per store. The
//! listings that come back before the job's deadline are resolved into
//! canonical group keys, and each group is merged into a product catalog
//! holding one price row per (product, store).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐   ┌──────────┐
//! │  Fetchers   │──▶│ Orchestrator │──▶│ Resolver  │──▶│  Merge   │
//! │ file / http │   │ 1 worker per │   │ rules +   │   │ products │
//! └─────────────┘   │ store        │   │ attributes│   │ + prices │
//!                   └──────────────┘   └───────────┘   └────┬─────┘
//!                                                           ▼
//!                                                      ┌──────────┐
//!                                                      │  SQLite  │
//!                                                      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! petprice init                          # create database
//! petprice resolve "NexGard Spectra Cão Grande CX 3 Comprimidos"
//! petprice run --jobs ./config/jobs.toml # fetch, resolve, merge
//! petprice dedup --dry-run               # preview the duplicate sweep
//! petprice report                        # advisory grouping report
//! petprice stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Fetch, store, and ingest errors |
//! | [`rules`] | Versioned keyword and brand rule table |
//! | [`attributes`] | Attribute extraction from listing names |
//! | [`grouping`] | Group key resolution |
//! | [`traits`] | `StoreFetcher` trait and registry |
//! | [`fetcher_file`] | JSON fixture fetcher |
//! | [`fetcher_http`] | JSON search endpoint fetcher |
//! | [`orchestrator`] | Per-store workers, fan-out and deadline fan-in |
//! | [`store`] | `ProductStore` trait, SQLite and in-memory backends |
//! | [`merge`] | Lookup-or-create, price upsert, dedup sweep |
//! | [`jobs`] | Batch input file |
//! | [`ingest`] | Batch pipeline |
//! | [`progress`] | Run progress reporting |
//! | [`advisory`] | Advisory grouping report |
//! | [`stats`] | Catalog statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod advisory;
pub mod attributes;
pub mod config;
pub mod db;
pub mod error;
pub mod fetcher_file;
pub mod fetcher_http;
pub mod grouping;
pub mod ingest;
pub mod jobs;
pub mod merge;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod rules;
pub mod stats;
pub mod store;
pub mod traits;
