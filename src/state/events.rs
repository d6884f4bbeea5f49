//! Bounded event log for download outcomes.
//!
//! A lossy audit trail: the most recent N entries are retained in a
//! fixed-capacity ring buffer and the oldest are evicted first. Entries are
//! appended in completion order (workers finish out of order), never in
//! submission order.

use std::collections::VecDeque;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// One recorded download outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadEvent {
    /// When the event was recorded.
    pub timestamp: SystemTime,
    /// Output filename the event refers to.
    pub filename: String,
    /// Short machine-readable status (`success`, `failed`, `canceled`).
    pub status: String,
    /// Human-readable description for display.
    pub description: String,
}

impl DownloadEvent {
    /// Creates an event with the current timestamp.
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        status: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: SystemTime::now(),
            filename: filename.into(),
            status: status.into(),
            description: description.into(),
        }
    }

    /// Creates a `success` event.
    #[must_use]
    pub fn success(filename: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(filename, "success", description)
    }

    /// Creates a `failed` event.
    #[must_use]
    pub fn failure(filename: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(filename, "failed", description)
    }

    /// Creates a `canceled` event.
    #[must_use]
    pub fn canceled(filename: impl Into<String>) -> Self {
        Self::new(filename, "canceled", "stopped by operator")
    }
}

/// Fixed-capacity ring buffer of [`DownloadEvent`] entries.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<DownloadEvent>,
    capacity: usize,
}

impl EventLog {
    /// Creates an empty log retaining at most `capacity` entries.
    ///
    /// Capacity is clamped to at least 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an entry, evicting the oldest once capacity is exceeded.
    ///
    /// O(1) amortized; overflow is eviction, never an error.
    pub fn push(&mut self, event: DownloadEvent) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    /// Changes the retention capacity, evicting oldest entries if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Returns the current number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no entries are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clears all retained entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the retained entries, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<DownloadEvent> {
        self.entries.iter().cloned().collect()
    }
}
