//! Catalogue model: version keys, latest-version filtering, manifest I/O.
//!
//! The external crawler produces an ordered manifest of every discovered
//! document version. This module gives that manifest a typed shape
//! ([`SpecRecord`]), a deterministic "latest per family" reduction
//! ([`filter_latest`]), and the load/store boundary ([`manifest`]).

mod filter;
mod manifest;
mod record;
mod version;

pub use filter::filter_latest;
pub use manifest::{ManifestError, load_manifest, resolve_selection, store_manifest};
pub use record::SpecRecord;
pub use version::{SpecKey, VersionTuple};
