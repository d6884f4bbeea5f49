//! Fetch worker: drives one download task at a time to a terminal status.
//!
//! Workers are long-lived: each pulls tasks from the shared batch queue
//! until it is drained. A task is exclusively owned by its worker from
//! dequeue to terminal status; all observable transitions flow through the
//! state manager so pollers see progress mid-flight.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::client::{FetchResult, HttpClient};
use super::pool::{ConnectionPool, extract_host};
use super::retry::{
    FailureType, RetryDecision, RetryPolicy, classify_error, parse_retry_after,
};
use super::task::{DownloadTask, TaskStatus};
use crate::DownloadError;
use crate::state::StateManager;

/// Everything a worker needs for one batch, shared across the pool.
#[derive(Debug)]
pub(crate) struct WorkerContext {
    pub client: HttpClient,
    pub pool: Arc<ConnectionPool>,
    pub retry_policy: RetryPolicy,
    pub state: Arc<StateManager>,
    pub cancel: CancelToken,
    pub resume: bool,
}

/// Shared batch queue the workers drain.
pub(crate) type TaskQueue = Arc<Mutex<VecDeque<DownloadTask>>>;

fn dequeue(queue: &TaskQueue) -> Option<DownloadTask> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

/// Runs one worker until the queue is drained.
pub(crate) async fn run_worker(ctx: Arc<WorkerContext>, queue: TaskQueue, worker_id: usize) {
    debug!(worker_id, "download worker started");
    while let Some(task) = dequeue(&queue) {
        process_task(&ctx, task).await;
    }
    debug!(worker_id, "download worker finished");
}

/// Drives a single task through its attempt loop to a terminal status.
async fn process_task(ctx: &WorkerContext, mut task: DownloadTask) {
    let url = task.url.clone();
    let dest_path = task.dest_path.clone();
    let filename = dest_path
        .file_name()
        .map_or_else(|| url.clone(), |name| name.to_string_lossy().into_owned());

    // A task that never started needs no network call to cancel.
    if ctx.cancel.is_cancelled() {
        task.status = TaskStatus::Canceled;
        ctx.state
            .mutate(|s| s.task_canceled(&filename, false));
        return;
    }

    task.status = TaskStatus::InProgress;
    ctx.state.mutate(|s| s.task_started(&url));

    // Files at the final path are complete by the rename contract, so an
    // existing one is counted as done without re-fetching.
    if tokio::fs::try_exists(&dest_path).await.unwrap_or(false) {
        info!(url = %url, path = %dest_path.display(), "already downloaded, skipping");
        task.status = TaskStatus::Succeeded;
        ctx.state
            .mutate(|s| s.task_succeeded(&url, &filename, "already downloaded"));
        return;
    }

    let host = extract_host(&url);

    loop {
        task.attempts_made += 1;
        debug!(url = %url, attempt = task.attempts_made, "attempting download");

        // Pool admission is a suspension point; a stop request must not
        // wait behind a saturated host.
        let permit = tokio::select! {
            permit = ctx.pool.acquire(&host) => permit,
            () = ctx.cancel.cancelled() => {
                task.status = TaskStatus::Canceled;
                ctx.state.mutate(|s| s.task_canceled(&filename, true));
                return;
            }
        };
        let Ok(permit) = permit else {
            task.status = TaskStatus::Failed;
            ctx.state.mutate(|s| {
                s.task_failed(&url, &filename, "connection pool closed", false);
            });
            return;
        };

        let state = Arc::clone(&ctx.state);
        let result = ctx
            .client
            .fetch(&url, &dest_path, ctx.resume, &ctx.cancel, |done, total| {
                task.bytes_done = done;
                task.bytes_total = total;
                state.mutate(|s| s.task_progress(&url, done, total));
            })
            .await;

        // Release the connection before any retry sleep.
        drop(permit);

        match result {
            Ok(FetchResult::Complete(outcome)) => {
                task.status = TaskStatus::Succeeded;
                task.bytes_done = outcome.bytes_downloaded;
                task.bytes_total = outcome.content_length;
                ctx.state
                    .mutate(|s| s.task_succeeded(&url, &filename, "saved to downloads"));
                return;
            }
            Ok(FetchResult::Canceled) => {
                task.status = TaskStatus::Canceled;
                ctx.state.mutate(|s| s.task_canceled(&filename, true));
                return;
            }
            Err(error) => {
                if !handle_failure(ctx, &mut task, &url, &filename, &error).await {
                    return;
                }
            }
        }
    }
}

/// Classifies a failed attempt and either sleeps for the retry delay
/// (returning `true` to loop again) or records the terminal failure
/// (returning `false`).
async fn handle_failure(
    ctx: &WorkerContext,
    task: &mut DownloadTask,
    url: &str,
    filename: &str,
    error: &DownloadError,
) -> bool {
    let failure_type = classify_error(error);

    // A 429 with a parseable Retry-After overrides the backoff delay.
    let server_delay = match error {
        DownloadError::HttpStatus {
            status: 429,
            retry_after: Some(value),
            ..
        } => parse_retry_after(value).map(|delay| ctx.retry_policy.cap_server_delay(delay)),
        _ => None,
    };

    match ctx.retry_policy.should_retry(failure_type, task.attempts_made) {
        RetryDecision::Retry {
            delay: backoff_delay,
            attempt: next_attempt,
        } => {
            let delay = server_delay.unwrap_or(backoff_delay);
            info!(
                url = %url,
                attempt = next_attempt,
                max_attempts = ctx.retry_policy.max_attempts(),
                delay_ms = delay.as_millis(),
                using_retry_after = server_delay.is_some(),
                error = %error,
                "retrying download"
            );
            // The backoff sleep itself is interruptible by cancellation.
            tokio::select! {
                () = tokio::time::sleep(delay) => true,
                () = ctx.cancel.cancelled() => {
                    task.status = TaskStatus::Canceled;
                    ctx.state.mutate(|s| s.task_canceled(filename, true));
                    false
                }
            }
        }
        RetryDecision::DoNotRetry { reason } => {
            warn!(
                url = %url,
                attempts = task.attempts_made,
                error = %error,
                %reason,
                "download failed"
            );
            task.status = TaskStatus::Failed;
            let local = failure_type == FailureType::LocalResource;
            let description = format!("{error} ({reason})");
            ctx.state
                .mutate(|s| s.task_failed(url, filename, &description, local));
            false
        }
    }
}
