//! Per-occurrence scheduling decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::availability::BusyInterval;
use crate::occurrence::Occurrence;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Accepted,
    Conflict { conflicting_interval: BusyInterval },
    /// Blocked by the activity's frequency cap; `blocked_by` is the prior start too close to it.
    Capped { blocked_by: DateTime<Utc> },
    OutOfWindow,
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted)
    }
}

/// Whether the decision was checked against the external calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    Verified,
    /// External busy time was unavailable; only own commitments were checked.
    Unverified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingDecision {
    pub occurrence: Occurrence,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub verification: Verification,
}

impl SchedulingDecision {
    pub fn new(occurrence: Occurrence, outcome: Outcome, verification: Verification) -> Self {
        SchedulingDecision {
            occurrence,
            outcome,
            verification,
        }
    }

    /// The conflicting busy interval; present iff the outcome is a conflict.
    pub fn conflicting_interval(&self) -> Option<&BusyInterval> {
        match &self.outcome {
            Outcome::Conflict {
                conflicting_interval,
            } => Some(conflicting_interval),
            _ => None,
        }
    }
}
