//! Minimum-gap enforcement between occurrences of the same activity.

use chrono::{DateTime, Duration, Utc};

/// Whether a candidate start respects `max_frequency_days` against prior starts.
///
/// A candidate is rejected when any prior start lies strictly less than the cap
/// away (in either direction); a gap of exactly the cap is allowed. `None` or a
/// cap of zero never rejects.
pub fn allow(
    max_frequency_days: Option<u32>,
    candidate_start: DateTime<Utc>,
    prior_starts: &[DateTime<Utc>],
) -> bool {
    blocking_prior(max_frequency_days, candidate_start, prior_starts).is_none()
}

/// The prior start that blocks the candidate, if any (the latest one when several do).
pub fn blocking_prior(
    max_frequency_days: Option<u32>,
    candidate_start: DateTime<Utc>,
    prior_starts: &[DateTime<Utc>],
) -> Option<DateTime<Utc>> {
    let cap = cap_duration(max_frequency_days)?;
    prior_starts
        .iter()
        .copied()
        .filter(|prior| (candidate_start - *prior).abs() < cap)
        .max()
}

/// Earliest start at or after `from` that the cap allows.
pub fn earliest_allowed(
    max_frequency_days: Option<u32>,
    from: DateTime<Utc>,
    prior_starts: &[DateTime<Utc>],
) -> DateTime<Utc> {
    let Some(cap) = cap_duration(max_frequency_days) else {
        return from;
    };
    let mut candidate = from;
    // Each jump moves strictly past the latest blocking prior.
    while let Some(prior) = blocking_prior(max_frequency_days, candidate, prior_starts) {
        candidate = prior + cap;
    }
    candidate
}

pub(crate) fn cap_duration(max_frequency_days: Option<u32>) -> Option<Duration> {
    max_frequency_days
        .filter(|days| *days > 0)
        .map(|days| Duration::days(i64::from(days)))
}
