//! Catalogue record shape produced by the external crawler.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use super::version::{SpecKey, VersionTuple};

/// Fallback basename when a URL has no usable path segment.
const FALLBACK_BASENAME: &str = "document.pdf";

/// One entry of the raw catalogue manifest.
///
/// Produced by the external crawler (one JSON object per discovered
/// document) and never mutated in place; the latest-version filter builds a
/// new sequence rather than editing this one. Field names match the
/// crawler's manifest schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecRecord {
    /// Absolute URL of the document.
    pub url: String,
    /// Series identifier (e.g. `"23"`).
    pub series: String,
    /// Technical specification number (e.g. `"23.501"`).
    pub ts_number: String,
    /// Release number.
    pub release: u32,
    /// Raw dotted version string as discovered (e.g. `"18.10.0"`).
    pub version: String,
    /// Optional human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SpecRecord {
    /// Returns the document family identity for this record.
    #[must_use]
    pub fn key(&self) -> SpecKey {
        SpecKey {
            series: self.series.clone(),
            ts_number: self.ts_number.clone(),
            release: self.release,
        }
    }

    /// Parses the raw version string into its ordered form.
    #[must_use]
    pub fn version_tuple(&self) -> VersionTuple {
        VersionTuple::parse(&self.version)
    }

    /// Derives the output filename from the URL's last path segment.
    ///
    /// Falls back to a generic name when the URL is unparseable or ends in
    /// a bare directory, so a task can always be created.
    #[must_use]
    pub fn filename(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                url.path_segments().and_then(|mut segments| {
                    segments
                        .next_back()
                        .filter(|segment| !segment.is_empty())
                        .map(ToString::to_string)
                })
            })
            .unwrap_or_else(|| FALLBACK_BASENAME.to_string())
    }

    /// Returns the destination path relative to the download root.
    ///
    /// Layout mirrors the catalogue organisation modes:
    /// `Rel-<release>/Series-<series>/<file>` by default, or
    /// `Series-<series>/<file>` when organising by series.
    #[must_use]
    pub fn relative_dest(&self, organize_by_series: bool) -> PathBuf {
        let mut path = PathBuf::new();
        if !organize_by_series {
            path.push(format!("Rel-{}", self.release));
        }
        path.push(format!("Series-{}", self.series));
        path.push(self.filename());
        path
    }
}
