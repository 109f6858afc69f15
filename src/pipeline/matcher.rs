//! Duration-based best match selection
//!
//! The search service already ranks its results by relevance, so the only
//! signal applied here is how close each candidate's duration is to the
//! catalog entry. The closest candidate always wins, even when the gap is
//! large; [`match_quality`] exposes how good the pick was for reporting.

use super::models::{CatalogEntry, MatchCandidate};

/// Pick the candidate whose duration is closest to the entry's
///
/// Ties go to the earlier candidate. Returns `None` only for an empty list.
pub fn select<'a>(
    entry: &CatalogEntry,
    candidates: &'a [MatchCandidate],
) -> Option<&'a MatchCandidate> {
    candidates
        .iter()
        .min_by_key(|candidate| duration_diff(entry, candidate))
}

/// Absolute duration difference in milliseconds
pub fn duration_diff(entry: &CatalogEntry, candidate: &MatchCandidate) -> u64 {
    entry.duration_ms.abs_diff(candidate.duration_ms)
}

/// Score in 0..=100, where 100 is an exact duration match
///
/// Every percent of the entry's length that the candidate is off costs one
/// point. `None` when the entry has no known duration.
pub fn match_quality(entry: &CatalogEntry, candidate: &MatchCandidate) -> Option<f64> {
    if entry.duration_ms == 0 {
        return None;
    }
    let diff = duration_diff(entry, candidate) as f64;
    let one_percent = entry.duration_ms as f64 * 0.01;
    Some((100.0 - diff / one_percent).max(0.0))
}
