//! Latest-version reduction over a raw catalogue.
//!
//! The crawler emits every discovered version of every document family.
//! [`filter_latest`] collapses that sequence to one winning record per
//! [`SpecKey`](super::SpecKey): the record with the maximum parsed version,
//! ties broken by first-seen order.
//!
//! The reduction is pure and deterministic, and it is a fixed point:
//! filtering an already-filtered catalogue changes nothing.

use std::collections::HashMap;

use super::record::SpecRecord;
use super::version::{SpecKey, VersionTuple};

/// Collapses a raw catalogue to the latest record per document family.
///
/// Single pass; for each input record the stored winner for its key is
/// replaced iff the new version is strictly greater. Output preserves the
/// first-occurrence order of each winning key, not the input order of all
/// records. Malformed version strings sort below any valid version rather
/// than failing the batch, so the reduction never errors.
#[must_use]
pub fn filter_latest(records: &[SpecRecord]) -> Vec<SpecRecord> {
    // Winner slots in first-seen key order; the map indexes into them.
    let mut winners: Vec<(SpecRecord, VersionTuple)> = Vec::new();
    let mut by_key: HashMap<SpecKey, usize> = HashMap::new();

    for record in records {
        let version = record.version_tuple();
        match by_key.get(&record.key()) {
            Some(&slot) => {
                // Strictly greater replaces; equal keeps the first seen.
                if version > winners[slot].1 {
                    winners[slot] = (record.clone(), version);
                }
            }
            None => {
                by_key.insert(record.key(), winners.len());
                winners.push((record.clone(), version));
            }
        }
    }

    winners.into_iter().map(|(record, _)| record).collect()
}
