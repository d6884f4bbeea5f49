//! Version key types and ordering for specification documents.
//!
//! A specification document family is identified by a [`SpecKey`]
//! (series / TS number / release). Within a family, documents are ordered
//! by [`VersionTuple`], the parsed numeric form of a dotted version string
//! such as `"18.10.0"`.
//!
//! # Ordering
//!
//! Comparison is lexicographic over the parsed segments. Shorter tuples are
//! padded with zero on the right, so `"17.5"` and `"17.5.0"` compare equal.
//! A malformed (non-numeric) segment sorts below any valid numeric segment,
//! so a garbled version string never wins over a parseable one.
//!
//! # Example
//!
//! ```
//! use specdl_core::catalog::VersionTuple;
//!
//! let a = VersionTuple::parse("17.5.1");
//! let b = VersionTuple::parse("18.0.0");
//! assert!(a < b);
//! assert_eq!(VersionTuple::parse("17.5"), VersionTuple::parse("17.5.0"));
//! ```

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a specification document family, independent of version.
///
/// Two catalogue records belong to the same family iff all three fields are
/// equal. Used as the grouping key by the latest-version filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecKey {
    /// Series identifier (e.g. `"23"`).
    pub series: String,
    /// Technical specification number (e.g. `"23.501"`).
    pub ts_number: String,
    /// Release number (e.g. `17`).
    pub release: u32,
}

impl fmt::Display for SpecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TS {} Rel-{} (series {})",
            self.ts_number, self.release, self.series
        )
    }
}

/// Parsed numeric form of a dotted version string, used for ordering.
///
/// Each segment is `Some(n)` for a numeric segment or `None` for a
/// malformed one. `None` sorts below every `Some`, including `Some(0)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTuple(Vec<Option<u64>>);

impl VersionTuple {
    /// Parses a dotted version string into an ordered tuple.
    ///
    /// Never fails: non-numeric segments become `None` and sort below any
    /// valid version rather than rejecting the record.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .trim()
            .split('.')
            .map(|segment| segment.trim().parse::<u64>().ok())
            .collect();
        Self(segments)
    }

    /// Returns true if every segment parsed as a number.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.0.iter().all(Option::is_some)
    }

    /// Returns the parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Option<u64>] {
        &self.0
    }
}

impl Ord for VersionTuple {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            // Missing segments pad with zero on the right.
            let a = self.0.get(i).copied().unwrap_or(Some(0));
            let b = other.0.get(i).copied().unwrap_or(Some(0));
            // Option<u64> already orders None below Some(0).
            match a.cmp(&b) {
                Ordering::Equal => {}
                non_eq => return non_eq,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for VersionTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== VersionTuple Parsing Tests ====================

    #[test]
    fn test_parse_simple_version() {
        let v = VersionTuple::parse("17.5.1");
        assert_eq!(v.segments(), &[Some(17), Some(5), Some(1)]);
        assert!(v.is_well_formed());
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let v = VersionTuple::parse(" 18.0.0 ");
        assert_eq!(v.segments(), &[Some(18), Some(0), Some(0)]);
    }

    #[test]
    fn test_parse_malformed_segment_becomes_none() {
        let v = VersionTuple::parse("17.x.1");
        assert_eq!(v.segments(), &[Some(17), None, Some(1)]);
        assert!(!v.is_well_formed());
    }

    #[test]
    fn test_parse_empty_string_is_single_malformed_segment() {
        let v = VersionTuple::parse("");
        assert_eq!(v.segments(), &[None]);
    }

    // ==================== Ordering Tests ====================

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(VersionTuple::parse("17.5.1") < VersionTuple::parse("18.0.0"));
        assert!(VersionTuple::parse("17.5.1") < VersionTuple::parse("17.10.0"));
        assert!(VersionTuple::parse("17.10.0") < VersionTuple::parse("17.10.1"));
    }

    #[test]
    fn test_shorter_version_pads_with_zero() {
        assert_eq!(VersionTuple::parse("17.5"), VersionTuple::parse("17.5.0"));
        assert!(VersionTuple::parse("17.5") < VersionTuple::parse("17.5.1"));
        assert!(VersionTuple::parse("17.5.1") > VersionTuple::parse("17.5"));
    }

    #[test]
    fn test_malformed_sorts_below_any_valid() {
        assert!(VersionTuple::parse("x.y.z") < VersionTuple::parse("0.0.0"));
        assert!(VersionTuple::parse("17.x") < VersionTuple::parse("17.0"));
        // A malformed segment even sorts below the implicit zero padding.
        assert!(VersionTuple::parse("17.x") < VersionTuple::parse("17"));
    }

    #[test]
    fn test_equal_versions_compare_equal() {
        assert_eq!(
            VersionTuple::parse("18.10.0").cmp(&VersionTuple::parse("18.10.0")),
            std::cmp::Ordering::Equal
        );
    }

    // ==================== SpecKey Tests ====================

    #[test]
    fn test_spec_key_equality_requires_all_fields() {
        let a = SpecKey {
            series: "23".to_string(),
            ts_number: "23.501".to_string(),
            release: 17,
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.release = 18;
        assert_ne!(a, b);
    }

    #[test]
    fn test_spec_key_display() {
        let key = SpecKey {
            series: "23".to_string(),
            ts_number: "23.501".to_string(),
            release: 17,
        };
        let text = key.to_string();
        assert!(text.contains("23.501"));
        assert!(text.contains("Rel-17"));
    }
}
