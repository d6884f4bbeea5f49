//! Shared job-state manager polled by external callers.
//!
//! This module provides the [`StateManager`], the single source of truth
//! for scrape-job and download-job status, settings, the event log, and the
//! per-batch completed/failed URL partitions. Workers and the coordinator
//! mutate it; any number of external pollers read it.
//!
//! # Consistency model
//!
//! All state lives behind one mutex. [`StateManager::snapshot`] deep-clones
//! the whole state under the lock, so a reader never observes a combination
//! of fields that did not exist at a single instant. Multi-field
//! transitions (mark task failed AND append failed URL AND record an event)
//! happen inside one [`StateManager::mutate`] closure, so they are observed
//! together or not at all. Critical sections are short and never await,
//! so they cannot deadlock against worker I/O.

mod events;
mod settings;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use events::{DownloadEvent, EventLog};
pub use settings::{Settings, SettingsError, SettingsPatch};

/// The two job kinds tracked by the manager.
///
/// Scrape and download run independently and never share a worker; each has
/// its own [`JobState`] and single-flight guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Catalogue discovery (driven by the external crawler).
    Scrape,
    /// Bulk document download.
    Download,
}

/// Lifecycle status of a job.
///
/// `Idle -> Running -> {Completed | Error}`; a terminal status persists
/// until explicitly acknowledged or a new run starts, so the last result
/// stays observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No run started, or the last result was acknowledged.
    Idle,
    /// A run is in flight.
    Running,
    /// The last run finished without task failures.
    Completed,
    /// The last run finished with at least one failed task.
    Error,
}

impl JobStatus {
    /// Returns the stable string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    /// Lifecycle status.
    pub status: JobStatus,
    /// Aggregate progress, 0..=100.
    pub progress_percent: f32,
    /// URL of the most recently started item, for display.
    pub current_item: Option<String>,
    /// When the current/last run started.
    pub started_at: Option<SystemTime>,
    /// Whether cancellation has been requested for the current batch.
    pub cancellation_requested: bool,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            status: JobStatus::Idle,
            progress_percent: 0.0,
            current_item: None,
            started_at: None,
            cancellation_requested: false,
        }
    }
}

impl JobState {
    /// Returns true while a run is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }
}

/// Per-batch task counters exposed in snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounters {
    /// Tasks enqueued for the batch.
    pub total: usize,
    /// Tasks not yet picked up by a worker.
    pub queued: usize,
    /// Tasks currently being downloaded.
    pub in_progress: usize,
    /// Tasks that completed successfully.
    pub succeeded: usize,
    /// Tasks that failed terminally.
    pub failed: usize,
    /// Tasks canceled before or during transfer.
    pub canceled: usize,
}

/// Per-batch progress bookkeeping.
///
/// Tasks with a known byte total contribute their byte fraction; tasks with
/// an unknown total contribute 0 until terminal, then 1. The batch percent
/// is the mean task fraction.
#[derive(Debug, Clone, Default)]
struct BatchProgress {
    counters: BatchCounters,
    fractions: HashMap<String, f64>,
}

impl BatchProgress {
    fn new(total: usize) -> Self {
        Self {
            counters: BatchCounters {
                total,
                queued: total,
                ..BatchCounters::default()
            },
            fractions: HashMap::new(),
        }
    }

    fn percent(&self) -> f32 {
        if self.counters.total == 0 {
            return 0.0;
        }
        let sum: f64 = self.fractions.values().sum();
        #[allow(clippy::cast_precision_loss)]
        let percent = 100.0 * sum / self.counters.total as f64;
        #[allow(clippy::cast_possible_truncation)]
        let percent = percent.clamp(0.0, 100.0) as f32;
        percent
    }
}

/// Point-in-time, internally consistent copy of the whole state.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    /// Scrape job state.
    pub scrape: JobState,
    /// Download job state.
    pub download: JobState,
    /// Current settings.
    pub settings: Settings,
    /// Retained event-log entries, oldest first.
    pub events: Vec<DownloadEvent>,
    /// URLs that succeeded in the current/most recent batch.
    pub completed_downloads: Vec<String>,
    /// URLs that failed in the current/most recent batch.
    pub failed_downloads: Vec<String>,
    /// Per-batch task counters.
    pub batch: BatchCounters,
}

/// Mutable state owned by the manager; exposed to [`StateManager::mutate`]
/// closures through its transition helpers.
#[derive(Debug)]
pub struct AppState {
    scrape: JobState,
    download: JobState,
    settings: Settings,
    events: EventLog,
    completed_downloads: Vec<String>,
    failed_downloads: Vec<String>,
    batch: BatchProgress,
}

impl AppState {
    fn new(settings: Settings) -> Self {
        let capacity = settings.max_log_events;
        Self {
            scrape: JobState::default(),
            download: JobState::default(),
            settings,
            events: EventLog::new(capacity),
            completed_downloads: Vec::new(),
            failed_downloads: Vec::new(),
            batch: BatchProgress::default(),
        }
    }

    /// Returns the state of one job.
    #[must_use]
    pub fn job(&self, kind: JobKind) -> &JobState {
        match kind {
            JobKind::Scrape => &self.scrape,
            JobKind::Download => &self.download,
        }
    }

    fn job_mut(&mut self, kind: JobKind) -> &mut JobState {
        match kind {
            JobKind::Scrape => &mut self.scrape,
            JobKind::Download => &mut self.download,
        }
    }

    /// Returns the current settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Appends an entry to the event log.
    pub fn record_event(&mut self, event: DownloadEvent) {
        self.events.push(event);
    }

    /// Sets a job's status and progress directly.
    ///
    /// Used by the scrape boundary; the download batch uses the dedicated
    /// transition helpers below so counters stay consistent.
    pub fn set_job_status(&mut self, kind: JobKind, status: JobStatus, progress_percent: f32) {
        let job = self.job_mut(kind);
        job.status = status;
        job.progress_percent = progress_percent.clamp(0.0, 100.0);
        if status == JobStatus::Running && job.started_at.is_none() {
            job.started_at = Some(SystemTime::now());
        }
    }

    /// Marks the scrape job running unless one already is.
    ///
    /// Returns false without touching any state when a scrape is in
    /// flight, preserving the single-flight guarantee for the external
    /// crawler boundary.
    pub fn begin_scrape(&mut self) -> bool {
        if self.scrape.is_running() {
            return false;
        }
        self.scrape = JobState {
            status: JobStatus::Running,
            progress_percent: 0.0,
            current_item: None,
            started_at: Some(SystemTime::now()),
            cancellation_requested: false,
        };
        true
    }

    /// Resets a terminal job back to idle.
    ///
    /// A running job is left untouched; terminal results are only cleared
    /// by this explicit acknowledgement, never automatically.
    pub fn acknowledge(&mut self, kind: JobKind) {
        let job = self.job_mut(kind);
        if matches!(job.status, JobStatus::Completed | JobStatus::Error) {
            *job = JobState::default();
        }
    }

    /// Starts a fresh download batch: running status, zeroed counters,
    /// cleared partitions and events.
    pub fn begin_download_batch(&mut self, total: usize) {
        self.download = JobState {
            status: JobStatus::Running,
            progress_percent: 0.0,
            current_item: None,
            started_at: Some(SystemTime::now()),
            cancellation_requested: false,
        };
        self.completed_downloads.clear();
        self.failed_downloads.clear();
        self.events.clear();
        self.batch = BatchProgress::new(total);
    }

    /// Records that a worker picked up a task.
    pub fn task_started(&mut self, url: &str) {
        self.batch.counters.queued = self.batch.counters.queued.saturating_sub(1);
        self.batch.counters.in_progress += 1;
        self.download.current_item = Some(url.to_string());
    }

    /// Updates a task's byte progress and the batch aggregate.
    pub fn task_progress(&mut self, url: &str, bytes_done: u64, bytes_total: Option<u64>) {
        if let Some(total) = bytes_total.filter(|total| *total > 0) {
            #[allow(clippy::cast_precision_loss)]
            let fraction = (bytes_done as f64 / total as f64).clamp(0.0, 1.0);
            self.batch.fractions.insert(url.to_string(), fraction);
        }
        self.download.progress_percent = self.batch.percent();
    }

    /// Marks a task succeeded: counters, completed partition, event log.
    pub fn task_succeeded(&mut self, url: &str, filename: &str, description: &str) {
        self.batch.counters.in_progress = self.batch.counters.in_progress.saturating_sub(1);
        self.batch.counters.succeeded += 1;
        self.batch.fractions.insert(url.to_string(), 1.0);
        self.completed_downloads.push(url.to_string());
        self.events.push(DownloadEvent::success(filename, description));
        self.download.progress_percent = self.batch.percent();
    }

    /// Marks a task failed: counters, failed partition, event log.
    ///
    /// Local-resource failures get a distinct description since they likely
    /// recur for every remaining task.
    pub fn task_failed(&mut self, url: &str, filename: &str, description: &str, local: bool) {
        self.batch.counters.in_progress = self.batch.counters.in_progress.saturating_sub(1);
        self.batch.counters.failed += 1;
        self.batch.fractions.insert(url.to_string(), 1.0);
        self.failed_downloads.push(url.to_string());
        let description = if local {
            format!("local error (may affect all tasks): {description}")
        } else {
            description.to_string()
        };
        self.events.push(DownloadEvent::failure(filename, description));
        self.download.progress_percent = self.batch.percent();
    }

    /// Marks a task canceled.
    ///
    /// `started` distinguishes an interrupted transfer from a task that was
    /// never picked up; canceled URLs join neither partition.
    pub fn task_canceled(&mut self, filename: &str, started: bool) {
        if started {
            self.batch.counters.in_progress = self.batch.counters.in_progress.saturating_sub(1);
        } else {
            self.batch.counters.queued = self.batch.counters.queued.saturating_sub(1);
        }
        self.batch.counters.canceled += 1;
        self.events.push(DownloadEvent::canceled(filename));
        self.download.progress_percent = self.batch.percent();
    }

    /// Records the operator's stop request on the download job.
    pub fn request_download_cancel(&mut self) {
        self.download.cancellation_requested = true;
    }

    /// Rolls the download batch up to its terminal status.
    ///
    /// Error iff at least one task failed; cancellation alone is not an
    /// error.
    pub fn finish_download_batch(&mut self) {
        let counters = self.batch.counters;
        self.download.current_item = None;
        if counters.failed > 0 {
            self.download.status = JobStatus::Error;
        } else {
            self.download.status = JobStatus::Completed;
            if counters.canceled == 0 {
                self.download.progress_percent = 100.0;
            }
        }
        debug!(
            succeeded = counters.succeeded,
            failed = counters.failed,
            canceled = counters.canceled,
            status = %self.download.status,
            "download batch finished"
        );
    }
}

/// Process-wide state container, safe for concurrent mutation from the
/// jobs and concurrent reads from any number of pollers.
///
/// Components receive an explicit handle (`Arc<StateManager>`); there is no
/// ambient global instance.
#[derive(Debug)]
pub struct StateManager {
    inner: Mutex<AppState>,
    settings_path: Option<PathBuf>,
}

impl StateManager {
    /// Creates a manager with the given settings and no persistence.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Mutex::new(AppState::new(settings)),
            settings_path: None,
        }
    }

    /// Creates a manager whose settings load from and persist to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when an existing settings file is
    /// unreadable or malformed. A missing file yields defaults.
    pub fn with_persistence(path: PathBuf) -> Result<Self, SettingsError> {
        let settings = Settings::load_or_default(&path)?;
        Ok(Self {
            inner: Mutex::new(AppState::new(settings)),
            settings_path: Some(path),
        })
    }

    fn lock(&self) -> MutexGuard<'_, AppState> {
        // A poisoned lock only means another thread panicked mid-mutation;
        // the state itself is still structurally sound.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a state transition under exclusive access.
    ///
    /// All multi-field updates belong in one closure so they are observed
    /// together or not at all. Closures must not block or perform I/O.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut AppState) -> T) -> T {
        f(&mut *self.lock())
    }

    /// Returns an atomic, internally consistent copy of the whole state.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        let state = self.lock();
        StateSnapshot {
            scrape: state.scrape.clone(),
            download: state.download.clone(),
            settings: state.settings.clone(),
            events: state.events.to_vec(),
            completed_downloads: state.completed_downloads.clone(),
            failed_downloads: state.failed_downloads.clone(),
            batch: state.batch.counters,
        }
    }

    /// Returns a copy of the current settings.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.lock().settings.clone()
    }

    /// Merges a partial settings update and durably persists the result
    /// before committing it.
    ///
    /// On any error the in-memory settings are unchanged and the previous
    /// durable value is intact.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Invalid`] when the merged result fails
    /// validation, or an I/O error from persistence.
    pub fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings, SettingsError> {
        let mut state = self.lock();

        let mut merged = state.settings.clone();
        merged.merge(patch);
        merged.validate()?;

        if let Some(path) = &self.settings_path {
            merged.persist(path)?;
        }

        state.events.set_capacity(merged.max_log_events);
        state.settings = merged.clone();
        debug!("settings updated");
        Ok(merged)
    }
}
