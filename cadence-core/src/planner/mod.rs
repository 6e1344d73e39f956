//! Planning runs: build the busy index, decide every candidate occurrence,
//! and in commit mode write the accepted ones to the external calendar.

mod reconcile;
mod schedule;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::availability::{AvailabilityIndex, BusyInterval, BusySource};
use crate::decision::{Outcome, SchedulingDecision, Verification};
use crate::error::{CadenceError, CadenceResult};
use crate::remote::ExternalCalendar;
use crate::retry::{RetryPolicy, with_retry};
use crate::store::{ActivityStore, UserSnapshot};
use crate::window::Window;

pub use reconcile::{CommitEntry, CommitStatus, ReconciliationReport, reconcile};
pub use schedule::schedule;

/// Tunables of a planning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerSettings {
    pub retry: RetryPolicy,
    /// Maximum external calendar calls in flight during a commit.
    pub max_concurrency: usize,
    /// Local hours in which flexible and deadline activities may be placed.
    pub day_start: NaiveTime,
    pub day_end: NaiveTime,
    /// Calendar account for users that do not name one.
    pub default_account: Option<String>,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        PlannerSettings {
            retry: RetryPolicy::default(),
            max_concurrency: 4,
            day_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            day_end: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
            default_account: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    /// Compute the agenda without writing anything.
    DryRun,
    /// Compute the agenda and reconcile accepted occurrences with the calendar.
    Commit,
}

/// Result of a planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agenda {
    pub user_id: String,
    pub mode: PlanMode,
    pub window: Window,
    pub timezone: String,
    /// False when the external calendar could not be read.
    pub verified: bool,
    pub decisions: Vec<SchedulingDecision>,
    /// Present in commit mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ReconciliationReport>,
}

impl Agenda {
    pub fn verification(&self) -> Verification {
        if self.verified {
            Verification::Verified
        } else {
            Verification::Unverified
        }
    }

    pub fn accepted(&self) -> impl Iterator<Item = &SchedulingDecision> {
        self.decisions.iter().filter(|d| d.outcome.is_accepted())
    }

    /// (accepted, conflict, capped, out_of_window)
    pub fn outcome_counts(&self) -> (usize, usize, usize, usize) {
        let mut counts = (0, 0, 0, 0);
        for decision in &self.decisions {
            match decision.outcome {
                Outcome::Accepted => counts.0 += 1,
                Outcome::Conflict { .. } => counts.1 += 1,
                Outcome::Capped { .. } => counts.2 += 1,
                Outcome::OutOfWindow => counts.3 += 1,
            }
        }
        counts
    }
}

/// Orchestrates planning runs over an activity store and an optional external calendar.
///
/// Each run reads one store snapshot; runs for different users share nothing.
pub struct SchedulingPlanner {
    store: Arc<dyn ActivityStore>,
    calendar: Option<Arc<dyn ExternalCalendar>>,
    settings: PlannerSettings,
}

impl SchedulingPlanner {
    pub fn new(store: Arc<dyn ActivityStore>, settings: PlannerSettings) -> Self {
        SchedulingPlanner {
            store,
            calendar: None,
            settings,
        }
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn ExternalCalendar>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Plan `user_id`'s activities over `window`.
    ///
    /// Dry runs may read external busy time but never write. If the read
    /// fails the run continues against own commitments only and every
    /// decision is marked unverified. Commit requires a calendar.
    pub async fn plan(&self, user_id: &str, window: Window, mode: PlanMode) -> CadenceResult<Agenda> {
        let calendar = match (mode, &self.calendar) {
            (PlanMode::Commit, None) => return Err(CadenceError::NoCalendarConfigured),
            (_, calendar) => calendar.clone(),
        };

        let snapshot = self.store.snapshot(user_id, &window)?;
        let index = self.availability(&snapshot, &window, calendar.as_deref()).await;
        let verified = index.is_verified();

        let decisions = schedule(&snapshot, &window, index, &self.settings);

        let mut agenda = Agenda {
            user_id: user_id.to_string(),
            mode,
            window,
            timezone: snapshot.timezone.name().to_string(),
            verified,
            decisions,
            report: None,
        };

        let (accepted, conflicts, capped, out_of_window) = agenda.outcome_counts();
        info!(
            user_id,
            ?mode,
            verified,
            accepted,
            conflicts,
            capped,
            out_of_window,
            "planned"
        );

        if let (PlanMode::Commit, Some(calendar)) = (mode, calendar) {
            let report = reconcile(
                calendar,
                &agenda.decisions,
                self.settings.retry,
                self.settings.max_concurrency,
            )
            .await;
            let (created, updated, unchanged, failed) = report.counts();
            info!(user_id, created, updated, unchanged, failed, "committed");
            agenda.report = Some(report);
        }

        Ok(agenda)
    }

    async fn availability(
        &self,
        snapshot: &UserSnapshot,
        window: &Window,
        calendar: Option<&dyn ExternalCalendar>,
    ) -> AvailabilityIndex {
        let own = own_intervals(snapshot);

        let Some(calendar) = calendar else {
            return AvailabilityIndex::own_only(own);
        };

        let account = snapshot
            .calendar_account
            .as_deref()
            .or(self.settings.default_account.as_deref())
            .unwrap_or(&snapshot.user_id);

        let listed = with_retry(&self.settings.retry, "list_busy_intervals", move || {
            calendar.list_busy_intervals(account, window)
        })
        .await;

        match listed {
            Ok(busy) => {
                // Events carrying a key were written by us; the plan recomputes them.
                let external = busy
                    .into_iter()
                    .filter(|b| b.key.is_none())
                    .filter_map(|b| {
                        BusyInterval::new(b.start_at, b.end_at, BusySource::ExternalCalendar)
                            .map_err(|e| warn!(error = %e, "skipping external busy interval"))
                            .ok()
                    })
                    .collect();
                AvailabilityIndex::build(own, external)
            }
            Err(e) => {
                warn!(
                    user_id = %snapshot.user_id,
                    error = %e,
                    "external calendar unavailable, planning against own commitments only"
                );
                AvailabilityIndex::own_only(own)
            }
        }
    }
}

/// Own busy time, minus commitments of activities this run re-plans.
fn own_intervals(snapshot: &UserSnapshot) -> Vec<BusyInterval> {
    let planned: HashSet<&str> = snapshot.activities.iter().map(|a| a.id.as_str()).collect();

    snapshot
        .commitments
        .iter()
        .filter(|c| !planned.contains(c.activity_id.as_str()))
        .filter_map(|c| {
            BusyInterval::new(c.start_at, c.end_at, BusySource::OwnActivity)
                .map_err(|e| warn!(activity_id = %c.activity_id, error = %e, "skipping commitment"))
                .ok()
        })
        .collect()
}
