//! Concurrent fetch pipeline: worker pool, connection admission, retry
//! with backoff, resumable streaming, and cooperative cancellation.
//!
//! # Overview
//!
//! The [`DownloadCoordinator`] drives one batch at a time: a shared queue
//! of [`DownloadTask`]s drained by a fixed pool of workers, each streaming
//! its file through the [`HttpClient`] under [`ConnectionPool`] admission,
//! retrying per [`RetryPolicy`], and reporting every transition through the
//! shared state manager.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use specdl_core::download::DownloadCoordinator;
//! use specdl_core::state::{Settings, StateManager};
//!
//! # fn example(records: Vec<specdl_core::SpecRecord>) -> Result<(), Box<dyn std::error::Error>> {
//! let state = Arc::new(StateManager::new(Settings::default()));
//! let coordinator = DownloadCoordinator::new(Arc::clone(&state), PathBuf::from("./downloads"));
//! coordinator.start(&records)?;
//! // ... poll state.snapshot() at any cadence
//! # Ok(())
//! # }
//! ```

mod cancel;
mod client;
mod constants;
mod coordinator;
mod error;
mod pool;
mod retry;
mod task;
mod worker;

pub use cancel::CancelToken;
pub use client::{FetchOutcome, FetchResult, HttpClient};
pub use constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, DEFAULT_THREAD_COUNT};
pub use coordinator::{CoordinatorError, DownloadCoordinator};
pub use error::DownloadError;
pub use pool::{ConnectionPool, PoolClosed, PoolPermit, extract_host};
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error,
    parse_retry_after,
};
pub use task::{DownloadTask, TaskStatus};
