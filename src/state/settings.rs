//! Persisted engine settings and partial-update merging.
//!
//! Settings are a flat struct of named options with defaults. Callers patch
//! them field-by-field: a [`SettingsPatch`] carries only the fields being
//! changed, and [`Settings::merge`] overwrites exactly those, so an
//! unrelated update can never reset a field to its default.
//!
//! Persistence is a JSON file written atomically (temp file, fsync, rename)
//! so a crash mid-write leaves the previous durable value intact.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bounds for `thread_count`.
const MIN_THREADS: usize = 1;
const MAX_THREADS: usize = 64;

/// Errors raised by settings persistence and validation.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Reading or writing the settings file failed.
    #[error("IO error accessing settings {path}: {source}")]
    Io {
        /// Settings path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file contents are not valid.
    #[error("malformed settings {path}: {source}")]
    Parse {
        /// Settings path involved.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A field value is outside its allowed range.
    #[error("invalid setting `{field}`: {value} (expected {expected})")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: i64,
        /// Human-readable expected range.
        expected: &'static str,
    },
}

/// Engine configuration with defaults for every field.
///
/// `#[serde(default)]` lets older persisted files load after new fields are
/// added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Continue partially fetched files from their last byte.
    pub resume_downloads: bool,
    /// Organize output under `Series-<s>/` instead of `Rel-<r>/Series-<s>/`.
    pub organize_by_series: bool,
    /// Restrict selection to a single release when set.
    pub specific_release: Option<u32>,
    /// Number of download workers.
    pub thread_count: usize,
    /// Emit debug-level log output.
    pub verbose_logging: bool,

    /// Global in-flight connection ceiling.
    pub http_max_connections: usize,
    /// Per-host in-flight connection ceiling.
    pub http_max_connections_per_host: usize,
    /// Connect timeout in seconds.
    pub http_connect_timeout_secs: u64,
    /// Read timeout in seconds.
    pub http_read_timeout_secs: u64,

    /// Maximum download attempts per task (including the first).
    pub retry_max_attempts: u32,
    /// Base backoff delay in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Backoff delay cap in milliseconds.
    pub retry_max_delay_ms: u64,

    /// Maximum retained event-log entries.
    pub max_log_events: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            resume_downloads: true,
            organize_by_series: false,
            specific_release: None,
            thread_count: 5,
            verbose_logging: false,
            http_max_connections: 100,
            http_max_connections_per_host: 10,
            http_connect_timeout_secs: 10,
            http_read_timeout_secs: 60,
            retry_max_attempts: 5,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 60_000,
            max_log_events: 100,
        }
    }
}

impl Settings {
    /// Validates field values against their allowed ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_THREADS..=MAX_THREADS).contains(&self.thread_count) {
            return Err(invalid("thread_count", self.thread_count as i64, "1..=64"));
        }
        if !(1..=1_000).contains(&self.http_max_connections) {
            return Err(invalid(
                "http_max_connections",
                self.http_max_connections as i64,
                "1..=1000",
            ));
        }
        if !(1..=100).contains(&self.http_max_connections_per_host) {
            return Err(invalid(
                "http_max_connections_per_host",
                self.http_max_connections_per_host as i64,
                "1..=100",
            ));
        }
        for (field, value) in [
            ("http_connect_timeout_secs", self.http_connect_timeout_secs),
            ("http_read_timeout_secs", self.http_read_timeout_secs),
        ] {
            if !(1..=3_600).contains(&value) {
                #[allow(clippy::cast_possible_wrap)]
                return Err(invalid(field, value as i64, "1..=3600"));
            }
        }
        if !(1..=20).contains(&self.retry_max_attempts) {
            return Err(invalid(
                "retry_max_attempts",
                i64::from(self.retry_max_attempts),
                "1..=20",
            ));
        }
        if self.max_log_events == 0 {
            return Err(invalid("max_log_events", 0, "1.."));
        }
        Ok(())
    }

    /// Applies a partial update: fields present in the patch overwrite,
    /// absent fields keep their current value.
    pub fn merge(&mut self, patch: &SettingsPatch) {
        macro_rules! take {
            ($field:ident) => {
                if let Some(value) = patch.$field {
                    self.$field = value;
                }
            };
        }
        take!(resume_downloads);
        take!(organize_by_series);
        take!(thread_count);
        take!(verbose_logging);
        take!(http_max_connections);
        take!(http_max_connections_per_host);
        take!(http_connect_timeout_secs);
        take!(http_read_timeout_secs);
        take!(retry_max_attempts);
        take!(retry_base_delay_ms);
        take!(retry_max_delay_ms);
        take!(max_log_events);
        // Present-with-value sets the release filter; an absent field
        // leaves it untouched (same as every other field).
        if let Some(release) = patch.specific_release {
            self.specific_release = Some(release);
        }
    }

    /// Loads settings from a JSON file, or defaults when the file is absent.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Io`] on read failure other than not-found
    /// and [`SettingsError::Parse`] on malformed contents.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Durably persists the settings to a JSON file.
    ///
    /// Writes to a temporary sibling path, fsyncs, then renames over the
    /// target, so the previous durable value survives a crash mid-write.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Io`] on any filesystem failure.
    pub fn persist(&self, path: &Path) -> Result<(), SettingsError> {
        use std::io::Write;

        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };

        let json = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path).map_err(io_err)?;
            file.write_all(json.as_bytes()).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        std::fs::rename(&tmp_path, path).map_err(io_err)
    }
}

/// Partial-update mirror of [`Settings`]: every field optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub resume_downloads: Option<bool>,
    pub organize_by_series: Option<bool>,
    pub specific_release: Option<u32>,
    pub thread_count: Option<usize>,
    pub verbose_logging: Option<bool>,
    pub http_max_connections: Option<usize>,
    pub http_max_connections_per_host: Option<usize>,
    pub http_connect_timeout_secs: Option<u64>,
    pub http_read_timeout_secs: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
    pub max_log_events: Option<usize>,
}

fn invalid(field: &'static str, value: i64, expected: &'static str) -> SettingsError {
    SettingsError::Invalid {
        field,
        value,
        expected,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ==================== Default / Validation Tests ====================

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert!(settings.resume_downloads);
        assert_eq!(settings.thread_count, 5);
        assert_eq!(settings.retry_max_attempts, 5);
        assert_eq!(settings.max_log_events, 100);
    }

    #[test]
    fn test_validate_rejects_out_of_range_thread_count() {
        let mut settings = Settings::default();
        settings.thread_count = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid {
                field: "thread_count",
                ..
            })
        ));
        settings.thread_count = 65;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_log_capacity() {
        let mut settings = Settings::default();
        settings.max_log_events = 0;
        assert!(settings.validate().is_err());
    }

    // ==================== Merge Tests ====================

    #[test]
    fn test_merge_overwrites_only_present_fields() {
        let mut settings = Settings {
            thread_count: 4,
            verbose_logging: true,
            ..Settings::default()
        };

        let patch = SettingsPatch {
            thread_count: Some(8),
            ..SettingsPatch::default()
        };
        settings.merge(&patch);

        assert_eq!(settings.thread_count, 8);
        assert!(settings.verbose_logging, "unrelated field must be untouched");
        assert!(settings.resume_downloads, "defaults must be untouched");
    }

    #[test]
    fn test_merge_empty_patch_is_identity() {
        let mut settings = Settings::default();
        let before = settings.clone();
        settings.merge(&SettingsPatch::default());
        assert_eq!(settings, before);
    }

    #[test]
    fn test_merge_sets_specific_release() {
        let mut settings = Settings::default();
        settings.merge(&SettingsPatch {
            specific_release: Some(17),
            ..SettingsPatch::default()
        });
        assert_eq!(settings.specific_release, Some(17));

        // Absent field leaves it in place.
        settings.merge(&SettingsPatch::default());
        assert_eq!(settings.specific_release, Some(17));
    }

    // ==================== Persistence Tests ====================

    #[test]
    fn test_persist_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::default();
        settings.thread_count = 12;
        settings.specific_release = Some(18);
        settings.persist(&path).unwrap();

        let loaded = Settings::load_or_default(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = Settings::load_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_load_malformed_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{broken").unwrap();
        assert!(matches!(
            Settings::load_or_default(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_persist_leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        Settings::default().persist(&path).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_partial_file_loads_with_defaults_for_missing_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"thread_count": 9}"#).unwrap();
        let loaded = Settings::load_or_default(&path).unwrap();
        assert_eq!(loaded.thread_count, 9);
        assert_eq!(loaded.retry_max_attempts, 5);
    }
}
