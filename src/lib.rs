#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Grid Executor Core
//!
//! Clustered task coordination and partition-batched scatter-gather for an
//! in-memory data grid.
//!
//! ## Overview
//!
//! Tasks live as records in a clustered map. An orchestrator plans which
//! executors run each task and records per-executor assignments; executors
//! drive their assignments through `ASSIGNED -> EXECUTING -> EXECUTED` and
//! write results back into the task record. On the submitting side a
//! [`TaskCoordinator`] watches the record and relays every new result to its
//! local subscribers until the task completes or is cancelled.
//!
//! Remote clients page through large maps with cookies: each round queries a
//! batch of partitions sized to a byte budget and returns the partitions still
//! to visit in an opaque cookie.
//!
//! ## Module Organization
//!
//! - [`partition`] - Partition bitmaps, batch sizing and paging cookies
//! - [`assignment`] - Executor assignment records and their store
//! - [`task`] - Task records, planning, executors and the coordinator
//! - [`proxy`] - Remote request dispatch and paged queries
//! - [`cluster`] - Clustered map, membership and partition ownership contracts
//!   with an in-process implementation
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grid_executor::cluster::{LocalGrid, TokioListenerExecutor};
//! use grid_executor::config::GridConfig;
//! use grid_executor::task::{TaskCoordinator, TaskRecord};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let grid = Arc::new(LocalGrid::new(GridConfig::default()));
//! let executor = Arc::new(TokioListenerExecutor::new(
//!     "task-coordinator",
//!     tokio::runtime::Handle::current(),
//! ));
//!
//! let record = TaskRecord::new("report-42").with_body(|_| Ok(serde_json::json!("done")));
//! let coordinator = TaskCoordinator::submit(record, Vec::new(), grid, executor)?;
//! let mut results = coordinator.subscribe_stream();
//! # let _ = &mut results;
//! # Ok(())
//! # }
//! ```

pub mod assignment;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod partition;
pub mod proxy;
pub mod task;

pub use assignment::{AssignmentState, AssignmentStore, ClusteredAssignment};
pub use cluster::{GridSession, LocalGrid};
pub use config::{ConfigLoader, GridConfig};
pub use error::{GridError, GridResult};
pub use partition::{PartitionBatcher, PartitionCookie, PartitionSet};
pub use proxy::{CacheRequest, CacheResponse, RequestDispatcher};
pub use task::{
    ExecutionPlan, ExecutorWorker, TaskCoordinator, TaskOrchestrator, TaskOutcome, TaskRecord,
};
