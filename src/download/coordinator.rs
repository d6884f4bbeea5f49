//! Download coordinator: batch lifecycle over a bounded worker pool.
//!
//! The coordinator owns the work queue for one batch at a time. `start`
//! enforces the single-flight invariant, enqueues one task per selected
//! record, and spawns exactly `thread_count` long-lived workers that pull
//! from the shared queue until it drains (never one task per URL). `stop`
//! records cancellation intent and returns immediately; workers observe
//! the token at their suspension points.
//!
//! Status is exposed through the [`StateManager`] snapshot - the
//! coordinator pushes, pollers pull.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::cancel::CancelToken;
use super::client::HttpClient;
use super::constants::{MAX_WORKERS, MIN_WORKERS};
use super::pool::ConnectionPool;
use super::retry::RetryPolicy;
use super::task::DownloadTask;
use super::worker::{TaskQueue, WorkerContext, run_worker};
use crate::catalog::SpecRecord;
use crate::state::{AppState, JobKind, StateManager};

/// Error type for coordinator start/stop operations.
///
/// Both variants are concurrency conflicts rejected synchronously: no task
/// is created and no state is modified.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// A download batch is already running.
    #[error("a download job is already running")]
    AlreadyRunning,

    /// There is no running download batch to stop.
    #[error("no download job is running")]
    NothingToStop,
}

/// Bookkeeping for the batch currently in flight.
#[derive(Debug)]
struct ActiveBatch {
    cancel: CancelToken,
    supervisor: Option<JoinHandle<()>>,
}

/// Orchestrates download batches against the shared state manager.
///
/// Holds the HTTP client and connection pool for the life of the engine;
/// worker count, retry bounds, and the resume toggle are read from settings
/// at each `start` so they can change between batches.
#[derive(Debug)]
pub struct DownloadCoordinator {
    state: Arc<StateManager>,
    client: HttpClient,
    pool: Arc<ConnectionPool>,
    download_root: PathBuf,
    active: Mutex<Option<ActiveBatch>>,
}

impl DownloadCoordinator {
    /// Creates a coordinator writing under `download_root`.
    ///
    /// The HTTP client and connection-pool ceilings are built from the
    /// manager's current settings.
    #[must_use]
    pub fn new(state: Arc<StateManager>, download_root: PathBuf) -> Self {
        let settings = state.settings();
        let client = HttpClient::with_config(
            settings.http_connect_timeout_secs,
            settings.http_read_timeout_secs,
            settings.http_max_connections_per_host,
        );
        let pool = Arc::new(ConnectionPool::new(
            settings.http_max_connections,
            settings.http_max_connections_per_host,
        ));
        Self {
            state,
            client,
            pool,
            download_root,
            active: Mutex::new(None),
        }
    }

    /// Returns the root directory downloads are written under.
    #[must_use]
    pub fn download_root(&self) -> &std::path::Path {
        &self.download_root
    }

    /// Starts a download batch for the selected records.
    ///
    /// Records the full selection as the batch, resets per-batch counters,
    /// sets the download job `running`, and enqueues one task per record.
    /// The engine does not validate selection provenance: a record whose
    /// URL no longer exists simply becomes a task that fails with a
    /// permanent error on first fetch.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::AlreadyRunning`] if a batch is in
    /// flight; zero additional tasks are created in that case.
    #[instrument(skip(self, records), fields(selected = records.len()))]
    pub fn start(&self, records: &[SpecRecord]) -> Result<(), CoordinatorError> {
        let settings = self.state.settings();
        let thread_count = settings.thread_count.clamp(MIN_WORKERS, MAX_WORKERS);

        // Single-flight check and batch reset are one atomic transition.
        self.state.mutate(|s| {
            if s.job(JobKind::Download).is_running() {
                return Err(CoordinatorError::AlreadyRunning);
            }
            s.begin_download_batch(records.len());
            Ok(())
        })?;

        let tasks: VecDeque<DownloadTask> = records
            .iter()
            .map(|record| {
                let dest = self
                    .download_root
                    .join(record.relative_dest(settings.organize_by_series));
                DownloadTask::new(record.url.clone(), dest)
            })
            .collect();

        info!(
            tasks = tasks.len(),
            workers = thread_count,
            "starting download batch"
        );

        let queue: TaskQueue = Arc::new(Mutex::new(tasks));
        let cancel = CancelToken::new();
        let ctx = Arc::new(WorkerContext {
            client: self.client.clone(),
            pool: Arc::clone(&self.pool),
            retry_policy: RetryPolicy::new(
                settings.retry_max_attempts,
                std::time::Duration::from_millis(settings.retry_base_delay_ms),
                std::time::Duration::from_millis(settings.retry_max_delay_ms),
            ),
            state: Arc::clone(&self.state),
            cancel: cancel.clone(),
            resume: settings.resume_downloads,
        });

        let mut handles = Vec::with_capacity(thread_count);
        for worker_id in 0..thread_count {
            handles.push(tokio::spawn(run_worker(
                Arc::clone(&ctx),
                Arc::clone(&queue),
                worker_id,
            )));
        }

        let state = Arc::clone(&self.state);
        let supervisor = tokio::spawn(async move {
            for handle in handles {
                // Worker panics are logged but don't fail the batch.
                if let Err(e) = handle.await {
                    warn!(error = %e, "download worker panicked");
                }
            }
            state.mutate(AppState::finish_download_batch);
            debug!("download batch supervisor finished");
        });

        *self.lock_active() = Some(ActiveBatch {
            cancel,
            supervisor: Some(supervisor),
        });

        Ok(())
    }

    /// Requests cancellation of the running batch.
    ///
    /// Records the intent and returns immediately without waiting for
    /// workers to drain; they observe the token at their next suspension
    /// point. Cancellation is monotonic for the batch - a later `start`
    /// gets a fresh token.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NothingToStop`] if no batch is running.
    #[instrument(skip(self))]
    pub fn stop(&self) -> Result<(), CoordinatorError> {
        self.state.mutate(|s| {
            if !s.job(JobKind::Download).is_running() {
                return Err(CoordinatorError::NothingToStop);
            }
            s.request_download_cancel();
            Ok(())
        })?;

        if let Some(batch) = self.lock_active().as_ref() {
            batch.cancel.cancel();
        }
        info!("download cancellation requested");
        Ok(())
    }

    /// Waits for the current batch (if any) to reach its terminal status.
    ///
    /// A convenience for drivers and tests; pollers normally just read
    /// snapshots at their own cadence.
    pub async fn wait(&self) {
        let supervisor = self
            .lock_active()
            .as_mut()
            .and_then(|batch| batch.supervisor.take());
        if let Some(handle) = supervisor {
            if let Err(e) = handle.await {
                warn!(error = %e, "batch supervisor panicked");
            }
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveBatch>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
