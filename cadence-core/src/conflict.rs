//! Conflict classification of candidate occurrences.

use crate::availability::AvailabilityIndex;
use crate::decision::{Outcome, SchedulingDecision, Verification};
use crate::occurrence::Occurrence;

/// Classify a candidate against the busy index. Never reschedules.
///
/// Any non-empty intersection with a busy interval is a conflict; the busy
/// interval with the earliest start is reported.
pub fn resolve(candidate: Occurrence, index: &AvailabilityIndex) -> SchedulingDecision {
    let outcome = match index.overlaps(candidate.start_at, candidate.end_at) {
        Some(busy) => Outcome::Conflict {
            conflicting_interval: busy.clone(),
        },
        None => Outcome::Accepted,
    };

    SchedulingDecision::new(candidate, outcome, verification_of(index))
}

pub(crate) fn verification_of(index: &AvailabilityIndex) -> Verification {
    if index.is_verified() {
        Verification::Verified
    } else {
        Verification::Unverified
    }
}
