//! CLI entry point for the specdl tool.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use specdl_core::{
    DownloadCoordinator, JobStatus, Settings, SettingsPatch, SpecRecord, StateManager,
    catalog, filter_latest,
};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("Specdl starting");

    let state = Arc::new(StateManager::new(Settings::default()));
    state
        .update_settings(&SettingsPatch {
            thread_count: Some(usize::from(args.threads)),
            organize_by_series: Some(args.by_series),
            resume_downloads: Some(!args.no_resume),
            specific_release: args.release,
            verbose_logging: Some(args.verbose > 0),
            ..SettingsPatch::default()
        })
        .context("invalid command-line settings")?;

    // Load the crawler's manifest.
    let records = catalog::load_manifest(&args.manifest)
        .with_context(|| format!("cannot load manifest {}", args.manifest.display()))?;
    info!(discovered = records.len(), "manifest loaded");
    if records.is_empty() {
        info!("Manifest is empty - run the crawler first");
        return Ok(());
    }

    // Reduce to the latest version per family unless every version was asked for.
    let selection = if args.all_versions {
        records
    } else {
        let latest = filter_latest(&records);
        info!(
            families = latest.len(),
            "reduced manifest to latest versions"
        );
        let latest_path = sibling_path(&args.manifest, "latest.json");
        if let Err(e) = catalog::store_manifest(&latest_path, &latest) {
            warn!(error = %e, "could not store filtered manifest");
        }
        latest
    };

    // Optional single-release restriction.
    let selection: Vec<SpecRecord> = match args.release {
        Some(release) => {
            let restricted: Vec<SpecRecord> = selection
                .into_iter()
                .filter(|record| record.release == release)
                .collect();
            info!(release, selected = restricted.len(), "release filter applied");
            restricted
        }
        None => selection,
    };

    if args.no_download {
        info!(selected = selection.len(), "no-download mode, exiting");
        return Ok(());
    }
    if selection.is_empty() {
        info!("Nothing matches the selection");
        return Ok(());
    }

    let coordinator = DownloadCoordinator::new(Arc::clone(&state), args.output_dir.clone());
    coordinator
        .start(&selection)
        .context("failed to start download batch")?;

    let (spinner, stop) = spawn_progress_ui(!args.quiet, Arc::clone(&state));

    coordinator.wait().await;

    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner {
        let _ = handle.await;
    }

    let snapshot = state.snapshot();
    info!(
        succeeded = snapshot.batch.succeeded,
        failed = snapshot.batch.failed,
        canceled = snapshot.batch.canceled,
        "download batch finished"
    );
    for event in &snapshot.events {
        debug!(
            filename = %event.filename,
            status = %event.status,
            description = %event.description,
            "event"
        );
    }

    if snapshot.download.status == JobStatus::Error {
        bail!(
            "{} of {} downloads failed",
            snapshot.batch.failed,
            snapshot.batch.total
        );
    }

    Ok(())
}

/// Returns `name` next to `path` (same directory).
fn sibling_path(path: &std::path::Path, name: &str) -> PathBuf {
    path.parent()
        .map_or_else(|| PathBuf::from(name), |parent| parent.join(name))
}

/// Spawns the progress UI (spinner) polling the state manager.
///
/// Returns (handle, stop) so the caller can signal stop and await the
/// handle. When `use_spinner` is false, returns (None, stop) with stop
/// already true.
fn spawn_progress_ui(
    use_spinner: bool,
    state: Arc<StateManager>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = Arc::clone(&stop);

    let handle = tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop_signal.load(Ordering::SeqCst) {
            let snapshot = state.snapshot();
            let done = snapshot.batch.succeeded + snapshot.batch.failed + snapshot.batch.canceled;
            let current = snapshot
                .download
                .current_item
                .as_deref()
                .and_then(|url| url.rsplit('/').next())
                .unwrap_or("queue");
            spinner.set_message(format!(
                "[{}/{}] {:.1}% Downloading {}...",
                done, snapshot.batch.total, snapshot.download.progress_percent, current
            ));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    });
    (Some(handle), stop)
}
