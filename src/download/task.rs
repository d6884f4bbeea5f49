//! Download task types and status definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Status of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the batch queue.
    Queued,
    /// Currently being downloaded by a worker.
    InProgress,
    /// Fully downloaded and verified.
    Succeeded,
    /// Failed after all retries exhausted (or a non-retryable error).
    Failed,
    /// Stopped by operator request before completion.
    Canceled,
}

impl TaskStatus {
    /// Returns the stable string representation used in snapshots and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Returns true for statuses a task never leaves.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of work in a download batch.
///
/// Created when the coordinator enqueues the batch, then exclusively owned
/// by the single worker that dequeues it until its loop exits with a
/// terminal status. Never shared between workers, so no per-task locking is
/// needed; observable progress flows through the state manager instead.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// The URL to download.
    pub url: String,
    /// Final destination path for the completed file.
    pub dest_path: PathBuf,
    /// Attempts made so far (0 until the first attempt starts).
    pub attempts_made: u32,
    /// Bytes written for this task so far.
    pub bytes_done: u64,
    /// Expected total bytes when the server advertised one.
    pub bytes_total: Option<u64>,
    /// Current status.
    pub status: TaskStatus,
}

impl DownloadTask {
    /// Creates a queued task for a URL and destination.
    #[must_use]
    pub fn new(url: impl Into<String>, dest_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest_path: dest_path.into(),
            attempts_made: 0,
            bytes_done: 0,
            bytes_total: None,
            status: TaskStatus::Queued,
        }
    }
}

impl fmt::Display for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DownloadTask {{ url: {}, status: {} }}",
            self.url, self.status
        )
    }
}
