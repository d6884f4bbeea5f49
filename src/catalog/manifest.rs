//! Manifest I/O boundary between the external crawler and the engine.
//!
//! The crawler writes an ordered JSON array of [`SpecRecord`] entries
//! (`links.json`); the filtered catalogue is stored alongside it
//! (`latest.json`). The engine is agnostic to the producer - any sequence
//! matching the record shape loads.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::record::SpecRecord;

/// Errors raised by manifest load/store operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Reading or writing the manifest file failed.
    #[error("IO error accessing manifest {path}: {source}")]
    Io {
        /// Manifest path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest contents are not a valid record array.
    #[error("malformed manifest {path}: {source}")]
    Parse {
        /// Manifest path involved.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Loads an ordered catalogue from a JSON manifest file.
///
/// # Errors
///
/// Returns [`ManifestError::Io`] when the file cannot be read and
/// [`ManifestError::Parse`] when its contents are not a record array.
pub fn load_manifest(path: &Path) -> Result<Vec<SpecRecord>, ManifestError> {
    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Stores a catalogue as a JSON manifest file.
///
/// # Errors
///
/// Returns [`ManifestError::Io`] on write failure. Serialization of the
/// record shape itself cannot fail.
pub fn store_manifest(path: &Path, records: &[SpecRecord]) -> Result<(), ManifestError> {
    let json =
        serde_json::to_string_pretty(records).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    std::fs::write(path, json).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves an operator's URL selection against the loaded catalogue.
///
/// Returns the matching records in catalogue order plus the URLs that
/// matched nothing. Unknown URLs are reported, not rejected - the caller
/// decides whether to drop them or let them fail as tasks.
#[must_use]
pub fn resolve_selection(
    catalogue: &[SpecRecord],
    urls: &[String],
) -> (Vec<SpecRecord>, Vec<String>) {
    let wanted: HashSet<&str> = urls.iter().map(String::as_str).collect();
    let matched: Vec<SpecRecord> = catalogue
        .iter()
        .filter(|record| wanted.contains(record.url.as_str()))
        .cloned()
        .collect();

    let found: HashSet<&str> = matched.iter().map(|record| record.url.as_str()).collect();
    let missing = urls
        .iter()
        .filter(|url| !found.contains(url.as_str()))
        .cloned()
        .collect();

    (matched, missing)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(url: &str) -> SpecRecord {
        SpecRecord {
            url: url.to_string(),
            series: "23".to_string(),
            ts_number: "23.501".to_string(),
            release: 18,
            version: "18.10.0".to_string(),
            name: None,
        }
    }

    #[test]
    fn test_store_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        let records = vec![
            record("https://host.example/a.pdf"),
            record("https://host.example/b.pdf"),
        ];

        store_manifest(&path, &records).unwrap();
        let loaded = load_manifest(&path).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = load_manifest(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ManifestError::Io { .. })));
    }

    #[test]
    fn test_load_malformed_json_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        std::fs::write(&path, "{not json").unwrap();
        let result = load_manifest(&path);
        assert!(matches!(result, Err(ManifestError::Parse { .. })));
    }

    #[test]
    fn test_resolve_selection_partitions_known_and_unknown() {
        let catalogue = vec![
            record("https://host.example/a.pdf"),
            record("https://host.example/b.pdf"),
        ];
        let urls = vec![
            "https://host.example/b.pdf".to_string(),
            "https://host.example/ghost.pdf".to_string(),
        ];

        let (matched, missing) = resolve_selection(&catalogue, &urls);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].url, "https://host.example/b.pdf");
        assert_eq!(missing, vec!["https://host.example/ghost.pdf".to_string()]);
    }

    #[test]
    fn test_resolve_selection_preserves_catalogue_order() {
        let catalogue = vec![
            record("https://host.example/a.pdf"),
            record("https://host.example/b.pdf"),
            record("https://host.example/c.pdf"),
        ];
        let urls = vec![
            "https://host.example/c.pdf".to_string(),
            "https://host.example/a.pdf".to_string(),
        ];

        let (matched, _) = resolve_selection(&catalogue, &urls);
        let got: Vec<&str> = matched.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            got,
            vec!["https://host.example/a.pdf", "https://host.example/c.pdf"]
        );
    }
}
