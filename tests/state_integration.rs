//! Integration tests for the shared state manager.
//!
//! These tests exercise the concurrency guarantees an external poller
//! relies on: atomic snapshots under concurrent mutation, and durable
//! settings merges.

use std::sync::Arc;
use std::thread;

use specdl_core::state::{JobStatus, Settings, SettingsPatch, StateManager};
use tempfile::TempDir;

// ==================== Snapshot Atomicity Tests ====================

/// Every `task_succeeded` transition updates the completed partition and
/// the succeeded counter inside one mutate call. A snapshot taken at any
/// instant must therefore observe them in agreement - a torn read would
/// show the URL list and the counter out of sync.
#[test]
fn test_snapshots_never_observe_torn_multi_field_updates() {
    let state = Arc::new(StateManager::new(Settings::default()));
    let total = 2_000;
    state.mutate(|s| s.begin_download_batch(total));

    let mutator = {
        let state = Arc::clone(&state);
        thread::spawn(move || {
            for i in 0..total {
                let url = format!("https://host.example/spec-{i}.pdf");
                state.mutate(|s| {
                    s.task_started(&url);
                    s.task_succeeded(&url, &format!("spec-{i}.pdf"), "saved to downloads");
                });
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for _ in 0..1_000 {
                    let snapshot = state.snapshot();
                    assert_eq!(
                        snapshot.completed_downloads.len(),
                        snapshot.batch.succeeded,
                        "snapshot mixed pre- and post-mutation fields"
                    );
                }
            })
        })
        .collect();

    mutator.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    let snapshot = state.snapshot();
    assert_eq!(snapshot.batch.succeeded, total);
    assert_eq!(snapshot.completed_downloads.len(), total);
}

/// Status and progress are set together when a batch finishes; no snapshot
/// may pair a terminal status with a stale progress value.
#[test]
fn test_terminal_status_is_never_paired_with_stale_progress() {
    let state = Arc::new(StateManager::new(Settings::default()));

    for _ in 0..200 {
        let worker = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                state.mutate(|s| s.begin_download_batch(1));
                state.mutate(|s| {
                    s.task_started("u");
                    s.task_succeeded("u", "u.pdf", "saved to downloads");
                    s.finish_download_batch();
                });
            })
        };

        let reader = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for _ in 0..50 {
                    let snapshot = state.snapshot();
                    if snapshot.download.status == JobStatus::Completed {
                        assert!(
                            (snapshot.download.progress_percent - 100.0).abs() < f32::EPSILON,
                            "completed status paired with progress {}",
                            snapshot.download.progress_percent
                        );
                    }
                }
            })
        };

        worker.join().unwrap();
        reader.join().unwrap();
    }
}

// ==================== Settings Tests ====================

#[test]
fn test_settings_patch_leaves_unrelated_fields_untouched() {
    let state = StateManager::new(Settings {
        thread_count: 4,
        verbose_logging: true,
        ..Settings::default()
    });

    let merged = state
        .update_settings(&SettingsPatch {
            thread_count: Some(8),
            ..SettingsPatch::default()
        })
        .unwrap();

    assert_eq!(merged.thread_count, 8);
    assert!(merged.verbose_logging);
}

#[test]
fn test_settings_update_is_durable_across_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");

    {
        let state = StateManager::with_persistence(path.clone()).unwrap();
        state
            .update_settings(&SettingsPatch {
                thread_count: Some(12),
                resume_downloads: Some(false),
                ..SettingsPatch::default()
            })
            .unwrap();
    }

    // A fresh manager (new process) sees the merged value.
    let reloaded = StateManager::with_persistence(path).unwrap();
    let settings = reloaded.settings();
    assert_eq!(settings.thread_count, 12);
    assert!(!settings.resume_downloads);
    // Fields absent from the patch kept their defaults.
    assert_eq!(settings.retry_max_attempts, 5);
}

#[test]
fn test_failed_update_leaves_durable_value_intact() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");

    let state = StateManager::with_persistence(path.clone()).unwrap();
    state
        .update_settings(&SettingsPatch {
            thread_count: Some(12),
            ..SettingsPatch::default()
        })
        .unwrap();

    // Invalid merge must not touch memory or disk.
    assert!(
        state
            .update_settings(&SettingsPatch {
                thread_count: Some(0),
                ..SettingsPatch::default()
            })
            .is_err()
    );
    assert_eq!(state.settings().thread_count, 12);

    let reloaded = StateManager::with_persistence(path).unwrap();
    assert_eq!(reloaded.settings().thread_count, 12);
}
