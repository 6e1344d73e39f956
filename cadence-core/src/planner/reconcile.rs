//! Commit reconciliation against the external calendar.
//!
//! Every accepted occurrence is looked up by its [`OccurrenceKey`] and only
//! created or updated when the calendar does not already hold it, so running
//! a commit twice leaves the calendar unchanged the second time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::decision::{Outcome, SchedulingDecision};
use crate::error::CadenceResult;
use crate::occurrence::{Occurrence, OccurrenceKey};
use crate::remote::ExternalCalendar;
use crate::retry::{RetryPolicy, with_retry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitStatus {
    Created { event_id: String },
    Updated { event_id: String },
    /// Already on the calendar with the same time and title.
    Unchanged { event_id: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEntry {
    pub key: OccurrenceKey,
    pub activity_id: String,
    pub start_at: DateTime<Utc>,
    #[serde(flatten)]
    pub status: CommitStatus,
}

/// Outcome of one commit run. Failed keys are listed, never fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub entries: Vec<CommitEntry>,
    /// Occurrences not written because they conflicted.
    pub conflicted: usize,
    pub capped: usize,
    pub out_of_window: usize,
}

impl ReconciliationReport {
    /// (created, updated, unchanged, failed)
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let mut created = 0;
        let mut updated = 0;
        let mut unchanged = 0;
        let mut failed = 0;

        for entry in &self.entries {
            match entry.status {
                CommitStatus::Created { .. } => created += 1,
                CommitStatus::Updated { .. } => updated += 1,
                CommitStatus::Unchanged { .. } => unchanged += 1,
                CommitStatus::Failed { .. } => failed += 1,
            }
        }

        (created, updated, unchanged, failed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CommitEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, CommitStatus::Failed { .. }))
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Write accepted occurrences to the calendar, at most `max_concurrency`
/// keys in flight. Entries come back in decision order.
pub async fn reconcile(
    calendar: Arc<dyn ExternalCalendar>,
    decisions: &[SchedulingDecision],
    policy: RetryPolicy,
    max_concurrency: usize,
) -> ReconciliationReport {
    let mut report = ReconciliationReport::default();
    for decision in decisions {
        match decision.outcome {
            Outcome::Conflict { .. } => report.conflicted += 1,
            Outcome::Capped { .. } => report.capped += 1,
            Outcome::OutOfWindow => report.out_of_window += 1,
            Outcome::Accepted => {}
        }
    }

    let accepted: Vec<&Occurrence> = decisions
        .iter()
        .filter(|d| d.outcome.is_accepted())
        .map(|d| &d.occurrence)
        .collect();

    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (idx, occurrence) in accepted.iter().enumerate() {
        let calendar = Arc::clone(&calendar);
        let semaphore = Arc::clone(&semaphore);
        let occurrence = (*occurrence).clone();

        tasks.spawn(async move {
            let status = match semaphore.acquire_owned().await {
                Ok(_permit) => reconcile_one(calendar.as_ref(), &occurrence, &policy).await,
                Err(e) => CommitStatus::Failed {
                    error: e.to_string(),
                },
            };
            (idx, status)
        });
    }

    let mut statuses: Vec<Option<CommitStatus>> = vec![None; accepted.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, status)) => statuses[idx] = Some(status),
            Err(e) => warn!(error = %e, "commit task did not finish"),
        }
    }

    report.entries = accepted
        .into_iter()
        .zip(statuses)
        .map(|(occurrence, status)| CommitEntry {
            key: occurrence.key(),
            activity_id: occurrence.activity_id.clone(),
            start_at: occurrence.start_at,
            status: status.unwrap_or_else(|| CommitStatus::Failed {
                error: "commit task did not finish".into(),
            }),
        })
        .collect();

    report
}

async fn reconcile_one(
    calendar: &dyn ExternalCalendar,
    occurrence: &Occurrence,
    policy: &RetryPolicy,
) -> CommitStatus {
    match write_occurrence(calendar, occurrence, policy).await {
        Ok(status) => {
            debug!(key = %occurrence.key(), ?status, "reconciled");
            status
        }
        Err(e) => {
            warn!(key = %occurrence.key(), error = %e, "could not write occurrence");
            CommitStatus::Failed {
                error: e.to_string(),
            }
        }
    }
}

async fn write_occurrence(
    calendar: &dyn ExternalCalendar,
    occurrence: &Occurrence,
    policy: &RetryPolicy,
) -> CadenceResult<CommitStatus> {
    let key = &occurrence.key();

    let existing = with_retry(policy, "find_event_by_key", move || {
        calendar.find_event_by_key(key)
    })
    .await?;

    if let Some(event) = &existing {
        if event.matches(occurrence) {
            return Ok(CommitStatus::Unchanged {
                event_id: event.id.clone(),
            });
        }
    }

    let event_id = with_retry(policy, "upsert_event", move || {
        calendar.upsert_event(key, occurrence.start_at, occurrence.end_at, &occurrence.title)
    })
    .await?;

    Ok(match existing {
        Some(_) => CommitStatus::Updated { event_id },
        None => CommitStatus::Created { event_id },
    })
}
