// Copyright (c) 2026 gasview contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/gasview/gasview-rs

//! gasview - browsing core for gas-analyzer time-series data
//!
//! Discovers raw instrument files (Picarro CRDS analyzers and Pico laser
//! analyzers), normalizes them into a common tabular schema, aggregates
//! them over a user-selected time window with an uncertainty estimate,
//! and keeps a durable SQLite cache of precomputed 1-minute aggregates
//! so repeated queries avoid re-parsing raw files.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                   Query Orchestrator                       │
//! ├────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐  ┌─────────┐  ┌───────────┐  ┌───────────┐   │
//! │  │ Discovery│→ │ Parsers │→ │ Aggregate │→ │  Cache    │   │
//! │  │          │  │ (pool)  │  │ Engine    │  │  Store    │   │
//! │  └──────────┘  └─────────┘  └───────────┘  └───────────┘   │
//! │        sync path (write)        read path (re-aggregate)   │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The dashboard, charting and calendar collaborators sit outside this
//! crate; they pass a [`config::QueryConfig`] in and get a
//! [`model::ProcessedResult`] back.

pub mod aggregate;
pub mod config;
pub mod discover;
pub mod model;
pub mod parsers;
pub mod query;
pub mod store;

// Re-exports for convenience
pub use config::{AggMethod, AppConfig, DataSource, QueryConfig, TimeWindow, ZeroFilter};
pub use model::{DataTable, ProcessedResult};
pub use query::Orchestrator;
pub use store::{CacheStore, SyncReport};

/// gasview version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
