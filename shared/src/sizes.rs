//! Size-range expansion and the carton rule for catalogue size breakups.

use crate::error::{PortalError, PortalResult};
use crate::{SizeEntry, PAIRS_PER_CARTON};

const MAX_SIZE_LABELS: u32 = 100;

/// Expands `"4-8"` into `["4", "5", "6", "7", "8"]`.
///
/// Anything malformed (no dash, non-numeric bounds, `end < start`) yields an
/// empty list rather than an error.
pub fn expand_size_range(range: &str) -> Vec<String> {
    let Some((start, end)) = range.split_once('-') else {
        return Vec::new();
    };
    let (Ok(start), Ok(end)) = (start.trim().parse::<u32>(), end.trim().parse::<u32>()) else {
        return Vec::new();
    };
    if end < start || end - start >= MAX_SIZE_LABELS {
        return Vec::new();
    }
    (start..=end).map(|size| size.to_string()).collect()
}

/// Builds the breakup for `range`, keeping counts already entered for sizes
/// that are still present.
pub fn rebuild_breakup(range: &str, previous: &[SizeEntry]) -> Vec<SizeEntry> {
    expand_size_range(range)
        .into_iter()
        .map(|size| {
            let pairs = previous
                .iter()
                .find(|entry| entry.size == size)
                .map(|entry| entry.pairs)
                .unwrap_or(0);
            SizeEntry { size, pairs }
        })
        .collect()
}

pub fn total_pairs(breakup: &[SizeEntry]) -> u64 {
    breakup.iter().map(|entry| u64::from(entry.pairs)).sum()
}

/// Returns the number of cartons the breakup fills.
pub fn validate_breakup(breakup: &[SizeEntry]) -> PortalResult<u64> {
    let total = total_pairs(breakup);
    let per_carton = u64::from(PAIRS_PER_CARTON);
    if total % per_carton != 0 {
        return Err(PortalError::SizeBreakupNotCartonMultiple { total });
    }
    Ok(total / per_carton)
}
