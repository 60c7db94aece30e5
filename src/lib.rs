#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Analysis Worker
//!
//! Queue-driven worker that runs single-cell analyses for one experiment at a time.
//!
//! ## Overview
//!
//! Each inbound request names a task in `body.name`. The worker validates the request,
//! resolves symbolic cell set references into concrete cell ids, calls the remote
//! compute backend and publishes one response per request, either results or a
//! structured error.
//!
//! ## Request flow
//!
//! ```text
//! MessageQueue -> WorkerLoop -> TaskDispatcher -> AnalysisTask
//!                                   |                 |-- CellSetResolver (DE only)
//!                                   |                 `-- RWorkerClient (retry + backoff)
//!                                   `-- ResultCache (cacheable results by fingerprint)
//! ```
//!
//! ## Module Organization
//!
//! - [`tasks`] - the closed set of analyses and their request/result formatting
//! - [`cell_sets`] - cell set stores and `rest`/`all`/basis resolution
//! - [`client`] - HTTP client for the compute backend
//! - [`resilience`] - retry policy with exponential backoff
//! - [`dispatcher`] - task selection, caching, dataset checks
//! - [`worker`] - the request loop
//! - [`messaging`] - queue adapters
//! - [`config`] - layered configuration
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use analysis_worker::{
//!     CellSetDatasetLoader, ConfigManager, FileCellSetStore, InMemoryQueue, RWorkerClient,
//!     TaskDispatcher, WorkerLoop,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = Arc::new(manager.config().clone());
//!
//! let store = Arc::new(FileCellSetStore::new(&config.cell_sets.directory));
//! let client = RWorkerClient::new(&config)?;
//! let dispatcher = TaskDispatcher::new(config, client, store.clone());
//!
//! let mut worker = WorkerLoop::new(
//!     dispatcher,
//!     Arc::new(InMemoryQueue::new()),
//!     Arc::new(CellSetDatasetLoader::new(store)),
//! );
//! worker.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cell_sets;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod resilience;
pub mod tasks;
pub mod worker;

pub use cache::ResultCache;
pub use cell_sets::{
    CellSetResolver, CellSetStore, ComparisonQuery, ComparisonType, FileCellSetStore,
    InMemoryCellSetStore, ResolvedComparison,
};
pub use client::RWorkerClient;
pub use config::{ConfigManager, ConfigurationError, WorkerConfig};
pub use dispatcher::TaskDispatcher;
pub use error::{ComparisonSide, Result, WorkerError};
pub use messaging::{InMemoryQueue, JsonLinesQueue, MessageQueue};
pub use models::{
    CellIds, CellSetNode, CellSetTree, DatasetHandle, TaskResult, WorkRequest, WorkResponse,
};
pub use resilience::RetryPolicy;
pub use tasks::{AnalysisTask, Task, TaskKind};
pub use worker::{CellSetDatasetLoader, DatasetLoader, StopReason, WorkerLoop};
