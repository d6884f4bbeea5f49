//! Host-aware connection admission for download requests.
//!
//! This module provides the [`ConnectionPool`] struct which bounds how many
//! requests may be in flight globally and per remote host, independent of
//! the worker-pool size. Raising the worker count therefore cannot by
//! itself overwhelm a single origin.
//!
//! # Overview
//!
//! [`ConnectionPool::acquire`] suspends the caller while either ceiling is
//! saturated and resumes waiters in FIFO order as slots free up (tokio
//! semaphores queue fairly). The returned [`PoolPermit`] releases both
//! slots on drop (RAII). Physical connection reuse and discarding of
//! remote-closed connections is handled by the HTTP client's own pool,
//! which is configured with matching per-host limits.
//!
//! # Example
//!
//! ```
//! use specdl_core::download::ConnectionPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = ConnectionPool::new(100, 10);
//! let permit = pool.acquire("host.example").await?;
//! // ... issue the request while holding the permit
//! drop(permit);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument};

/// Error returned when the pool has been shut down.
///
/// Only possible if a semaphore is closed, which this pool never does
/// during normal operation; surfaced as a typed error rather than a panic.
#[derive(Debug, Error)]
#[error("connection pool closed")]
pub struct PoolClosed;

/// Bounded, host-aware admission pool for outbound requests.
///
/// Designed to be wrapped in `Arc` and shared across worker tasks.
#[derive(Debug)]
pub struct ConnectionPool {
    /// Global in-flight ceiling across all hosts.
    global: Arc<Semaphore>,
    /// Per-host ceiling applied to each remote origin.
    per_host_limit: usize,
    /// Per-host semaphores, created lazily on first acquire.
    hosts: DashMap<String, Arc<Semaphore>>,
}

/// RAII guard for one admitted request.
///
/// Holds one global and one per-host slot; dropping it releases both and
/// wakes the oldest waiter.
#[derive(Debug)]
pub struct PoolPermit {
    _host: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

impl ConnectionPool {
    /// Creates a pool with the given global and per-host ceilings.
    ///
    /// Both limits are clamped to at least 1.
    #[must_use]
    #[instrument]
    pub fn new(max_connections: usize, max_per_host: usize) -> Self {
        debug!("creating connection pool");
        Self {
            global: Arc::new(Semaphore::new(max_connections.max(1))),
            per_host_limit: max_per_host.max(1),
            hosts: DashMap::new(),
        }
    }

    /// Returns the configured per-host ceiling.
    #[must_use]
    pub fn per_host_limit(&self) -> usize {
        self.per_host_limit
    }

    /// Returns the number of currently free global slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.global.available_permits()
    }

    /// Acquires one request slot for the given host.
    ///
    /// Suspends while the host or global ceiling is saturated; waiters
    /// resume in FIFO order. The host slot is taken first so a request
    /// queued behind a busy host does not idle a global slot that another
    /// host could use.
    ///
    /// # Errors
    ///
    /// Returns [`PoolClosed`] if the pool's semaphores were closed (not
    /// expected during normal operation).
    #[instrument(skip(self))]
    pub async fn acquire(&self, host: &str) -> Result<PoolPermit, PoolClosed> {
        // Clone the Arc out of the shard so the DashMap lock is not held
        // across the await below.
        let host_semaphore = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit)))
            .clone();

        let host_permit = host_semaphore
            .acquire_owned()
            .await
            .map_err(|_| PoolClosed)?;
        let global_permit = Arc::clone(&self.global)
            .acquire_owned()
            .await
            .map_err(|_| PoolClosed)?;

        Ok(PoolPermit {
            _host: host_permit,
            _global: global_permit,
        })
    }
}

/// Extracts the host from a URL for pool admission.
///
/// Returns "unknown" for malformed URLs so every request is still bounded
/// even when the URL cannot be parsed.
#[must_use]
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}
