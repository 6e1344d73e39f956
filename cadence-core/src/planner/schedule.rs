//! Pure decision pass of a planning run.
//!
//! Per candidate: generated, window-checked, frequency-checked, then
//! conflict-checked. Fixed occurrences (strict and recurring) are decided in
//! chronological order first; flexible and deadline activities are then
//! placed into the time that is still free.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::activity::{Activity, Schedule};
use crate::availability::{AvailabilityIndex, BusyInterval, BusySource};
use crate::conflict::{self, verification_of};
use crate::decision::{Outcome, SchedulingDecision};
use crate::frequency;
use crate::occurrence::{Occurrence, resolve_local};
use crate::planner::PlannerSettings;
use crate::recurrence::expand;
use crate::store::UserSnapshot;
use crate::window::Window;

/// Mutable state of one run: the busy index and per-activity occurrence history.
struct RunState {
    index: AvailabilityIndex,
    history: HashMap<String, Vec<DateTime<Utc>>>,
}

impl RunState {
    fn priors(&self, activity_id: &str, candidate_start: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        // A logged start equal to the candidate is the same occurrence, not a prior one.
        self.history
            .get(activity_id)
            .map(|starts| {
                starts
                    .iter()
                    .copied()
                    .filter(|s| *s != candidate_start)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn decide(&mut self, activity: &Activity, candidate: Occurrence, window: &Window) -> SchedulingDecision {
        let verification = verification_of(&self.index);

        if !window.contains(candidate.start_at) {
            return SchedulingDecision::new(candidate, Outcome::OutOfWindow, verification);
        }

        let priors = self.priors(&activity.id, candidate.start_at);
        if let Some(blocked_by) =
            frequency::blocking_prior(activity.max_frequency_days, candidate.start_at, &priors)
        {
            return SchedulingDecision::new(candidate, Outcome::Capped { blocked_by }, verification);
        }

        let decision = conflict::resolve(candidate, &self.index);
        if decision.outcome.is_accepted() {
            self.accept(&decision.occurrence);
        }
        decision
    }

    fn accept(&mut self, occurrence: &Occurrence) {
        self.index.insert(BusyInterval {
            start_at: occurrence.start_at,
            end_at: occurrence.end_at,
            source: BusySource::OwnActivity,
        });
        self.history
            .entry(occurrence.activity_id.clone())
            .or_default()
            .push(occurrence.start_at);
    }
}

/// Decide every candidate occurrence of the snapshot's activities in `window`.
///
/// The result is ordered by start time, then activity id.
pub fn schedule(
    snapshot: &UserSnapshot,
    window: &Window,
    index: AvailabilityIndex,
    settings: &PlannerSettings,
) -> Vec<SchedulingDecision> {
    let tz = snapshot.timezone;
    let mut state = RunState {
        index,
        history: snapshot.history.clone(),
    };
    let mut decisions = Vec::new();

    let mut fixed: Vec<(&Activity, Occurrence)> = snapshot
        .activities
        .iter()
        .filter(|a| a.is_fixed())
        .flat_map(|a| fixed_candidates(a, window, tz).into_iter().map(move |o| (a, o)))
        .collect();
    fixed.sort_by(|(_, a), (_, b)| {
        (a.start_at, &a.activity_id).cmp(&(b.start_at, &b.activity_id))
    });

    for (activity, candidate) in fixed {
        decisions.push(state.decide(activity, candidate, window));
    }

    for activity in snapshot.activities.iter().filter(|a| !a.is_fixed()) {
        decisions.extend(place(activity, window, tz, settings, &mut state));
    }

    decisions.sort_by(|a, b| {
        (a.occurrence.start_at, &a.occurrence.activity_id)
            .cmp(&(b.occurrence.start_at, &b.occurrence.activity_id))
    });

    for decision in &decisions {
        debug!(
            key = %decision.occurrence.key(),
            outcome = ?decision.outcome,
            "scheduling decision"
        );
    }

    decisions
}

/// Candidates of strict and recurring activities.
fn fixed_candidates(activity: &Activity, window: &Window, tz: Tz) -> Vec<Occurrence> {
    match &activity.schedule {
        Schedule::Strict { start_at, end_at } => vec![Occurrence::from_instants(
            &activity.id,
            &activity.title,
            *start_at,
            *end_at,
            tz,
        )],
        Schedule::RecurringStrict {
            rule,
            time_start,
            time_end,
        } => {
            let (first, last) = window.local_dates(tz);
            expand(rule, first, last)
                .into_iter()
                .map(|date| {
                    Occurrence::from_local(&activity.id, &activity.title, date, *time_start, *time_end, tz)
                })
                .collect()
        }
        Schedule::Flexible | Schedule::Deadline { .. } => Vec::new(),
    }
}

/// Place a flexible or deadline activity into free time.
///
/// Deadline activities get one occurrence that ends by the deadline. Flexible
/// activities get one occurrence, or with a frequency cap one every `cap`
/// days. A history-blocked candidate is reported as capped once and the
/// search resumes at the earliest start the cap allows.
fn place(
    activity: &Activity,
    window: &Window,
    tz: Tz,
    settings: &PlannerSettings,
    state: &mut RunState,
) -> Vec<SchedulingDecision> {
    let verification = verification_of(&state.index);
    let (limit, single) = match &activity.schedule {
        Schedule::Deadline { deadline } => ((*deadline).min(window.end()), true),
        _ => (window.end(), false),
    };

    let nominal = || match &activity.schedule {
        Schedule::Deadline { deadline } => Occurrence::from_instants(
            &activity.id,
            &activity.title,
            *deadline - activity.duration,
            *deadline,
            tz,
        ),
        _ => Occurrence::from_instants(
            &activity.id,
            &activity.title,
            window.start(),
            window.start() + activity.duration,
            tz,
        ),
    };

    let mut decisions = Vec::new();
    let mut from = window.start();
    let mut reported_cap = false;

    while let Some(start) = find_slot(&state.index, from, limit, activity.duration, tz, settings) {
        let candidate = Occurrence::from_instants(
            &activity.id,
            &activity.title,
            start,
            start + activity.duration,
            tz,
        );

        let priors = state.priors(&activity.id, start);
        if let Some(blocked_by) =
            frequency::blocking_prior(activity.max_frequency_days, start, &priors)
        {
            if !reported_cap {
                decisions.push(SchedulingDecision::new(
                    candidate,
                    Outcome::Capped { blocked_by },
                    verification,
                ));
                reported_cap = true;
            }
            from = frequency::earliest_allowed(activity.max_frequency_days, start, &priors);
            continue;
        }

        let decision = conflict::resolve(candidate, &state.index);
        if decision.outcome.is_accepted() {
            state.accept(&decision.occurrence);
        }
        decisions.push(decision);

        match frequency::cap_duration(activity.max_frequency_days) {
            Some(cap) if !single => from = start + cap,
            _ => break,
        }
    }

    if decisions.is_empty() {
        decisions.push(SchedulingDecision::new(nominal(), Outcome::OutOfWindow, verification));
    }

    decisions
}

/// Earliest free start in `[from, until)` that lies within the daily placement hours.
fn find_slot(
    index: &AvailabilityIndex,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
    duration: Duration,
    tz: Tz,
    settings: &PlannerSettings,
) -> Option<DateTime<Utc>> {
    let mut date = from.with_timezone(&tz).date_naive();
    loop {
        let day_open = resolve_local(tz, date.and_time(settings.day_start));
        if day_open >= until {
            return None;
        }
        let day_close = resolve_local(tz, date.and_time(settings.day_end));

        let lo = from.max(day_open);
        let hi = until.min(day_close);
        if lo < hi {
            if let Some(start) = index.first_fit(lo, hi, duration) {
                return Some(start);
            }
        }

        date = date.succ_opt()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Verification;
    use crate::recurrence::{Frequency, RecurrenceRule};
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, h, 0, 0).unwrap()
    }

    fn week() -> Window {
        Window::from_dates(date(2025, 6, 2), date(2025, 6, 8), Tz::UTC).unwrap()
    }

    fn snapshot(activities: Vec<Activity>) -> UserSnapshot {
        UserSnapshot {
            user_id: "u1".into(),
            timezone: Tz::UTC,
            calendar_account: None,
            activities,
            commitments: vec![],
            history: HashMap::new(),
        }
    }

    fn daily(id: &str, start_h: u32, end_h: u32, cap: Option<u32>) -> Activity {
        let rule = RecurrenceRule::builder(Frequency::Daily, date(2025, 6, 1)).build().unwrap();
        Activity {
            id: id.into(),
            title: id.to_uppercase(),
            duration: Duration::hours(i64::from(end_h - start_h)),
            max_frequency_days: cap,
            schedule: Schedule::RecurringStrict {
                rule,
                time_start: time(start_h, 0),
                time_end: time(end_h, 0),
            },
        }
    }

    fn flexible(id: &str, minutes: i64, cap: Option<u32>) -> Activity {
        Activity {
            id: id.into(),
            title: id.into(),
            duration: Duration::minutes(minutes),
            max_frequency_days: cap,
            schedule: Schedule::Flexible,
        }
    }

    #[test]
    fn recurring_activity_fills_window() {
        let snap = snapshot(vec![daily("run", 7, 8, None)]);
        let decisions = schedule(&snap, &week(), AvailabilityIndex::build(vec![], vec![]), &PlannerSettings::default());
        assert_eq!(decisions.len(), 7);
        assert!(decisions.iter().all(|d| d.outcome.is_accepted()));
        assert!(decisions.iter().all(|d| d.verification == Verification::Verified));
    }

    #[test]
    fn frequency_cap_thins_out_recurrence() {
        let snap = snapshot(vec![daily("swim", 7, 8, Some(2))]);
        let decisions = schedule(&snap, &week(), AvailabilityIndex::build(vec![], vec![]), &PlannerSettings::default());
        let accepted: Vec<u32> = decisions
            .iter()
            .filter(|d| d.outcome.is_accepted())
            .map(|d| chrono::Datelike::day(&d.occurrence.date))
            .collect();
        assert_eq!(accepted, vec![2, 4, 6, 8]);
        assert_eq!(
            decisions.iter().filter(|d| matches!(d.outcome, Outcome::Capped { .. })).count(),
            3
        );
    }

    #[test]
    fn earlier_fixed_occurrence_wins_overlap_between_activities() {
        let snap = snapshot(vec![daily("b-late", 8, 10, None), daily("a-early", 7, 9, None)]);
        let decisions = schedule(&snap, &week(), AvailabilityIndex::build(vec![], vec![]), &PlannerSettings::default());
        let first_day: Vec<_> = decisions.iter().filter(|d| d.occurrence.date == date(2025, 6, 2)).collect();
        assert_eq!(first_day[0].occurrence.activity_id, "a-early");
        assert!(first_day[0].outcome.is_accepted());
        let busy = first_day[1].conflicting_interval().expect("later activity conflicts");
        assert_eq!(busy.source, BusySource::OwnActivity);
    }

    #[test]
    fn external_busy_time_conflicts() {
        let external = BusyInterval::new(utc(3, 7), utc(3, 9), BusySource::ExternalCalendar).unwrap();
        let snap = snapshot(vec![daily("run", 7, 8, None)]);
        let decisions = schedule(&snap, &week(), AvailabilityIndex::build(vec![], vec![external]), &PlannerSettings::default());
        let conflicted: Vec<_> = decisions.iter().filter(|d| d.conflicting_interval().is_some()).collect();
        assert_eq!(conflicted.len(), 1);
        assert_eq!(conflicted[0].occurrence.date, date(2025, 6, 3));
    }

    #[test]
    fn strict_outside_window_is_reported() {
        let snap = snapshot(vec![Activity {
            id: "concert".into(),
            title: "Concert".into(),
            duration: Duration::hours(2),
            max_frequency_days: None,
            schedule: Schedule::Strict {
                start_at: utc(20, 19),
                end_at: utc(20, 21),
            },
        }]);
        let decisions = schedule(&snap, &week(), AvailabilityIndex::build(vec![], vec![]), &PlannerSettings::default());
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].outcome, Outcome::OutOfWindow);
    }

    #[test]
    fn flexible_is_placed_in_first_free_daytime_slot() {
        let busy = BusyInterval::new(utc(2, 8), utc(2, 12), BusySource::ExternalCalendar).unwrap();
        let snap = snapshot(vec![daily("standup", 12, 13, None), flexible("read", 60, None)]);
        let decisions = schedule(&snap, &week(), AvailabilityIndex::build(vec![], vec![busy]), &PlannerSettings::default());
        let read: Vec<_> = decisions.iter().filter(|d| d.occurrence.activity_id == "read").collect();
        assert_eq!(read.len(), 1);
        assert!(read[0].outcome.is_accepted());
        assert_eq!(read[0].occurrence.start_at, utc(2, 13));
    }

    #[test]
    fn capped_flexible_repeats_every_cap_days() {
        let mut snap = snapshot(vec![flexible("walk", 30, Some(3))]);
        snap.history.insert("walk".into(), vec![utc(1, 8)]);
        let decisions = schedule(&snap, &week(), AvailabilityIndex::build(vec![], vec![]), &PlannerSettings::default());
        let outcomes: Vec<_> = decisions
            .iter()
            .map(|d| (d.occurrence.start_at, d.outcome.is_accepted()))
            .collect();
        assert_eq!(
            outcomes,
            vec![(utc(2, 8), false), (utc(4, 8), true), (utc(7, 8), true)]
        );
    }

    #[test]
    fn deadline_before_window_is_out_of_window() {
        let snap = snapshot(vec![Activity {
            id: "taxes".into(),
            title: "Taxes".into(),
            duration: Duration::hours(2),
            max_frequency_days: None,
            schedule: Schedule::Deadline { deadline: utc(1, 12) },
        }]);
        let decisions = schedule(&snap, &week(), AvailabilityIndex::build(vec![], vec![]), &PlannerSettings::default());
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].outcome, Outcome::OutOfWindow);
        assert_eq!(decisions[0].occurrence.end_at, utc(1, 12));
    }

    #[test]
    fn deadline_placed_once_before_deadline() {
        let snap = snapshot(vec![Activity {
            id: "report".into(),
            title: "Report".into(),
            duration: Duration::hours(3),
            max_frequency_days: None,
            schedule: Schedule::Deadline { deadline: utc(3, 10) },
        }]);
        let busy = BusyInterval::new(utc(2, 8), utc(2, 20), BusySource::ExternalCalendar).unwrap();
        let decisions = schedule(&snap, &week(), AvailabilityIndex::build(vec![], vec![busy]), &PlannerSettings::default());
        assert_eq!(decisions.len(), 1);
        // 2025-06-03 08:00..11:00 would end after the 10:00 deadline
        assert_eq!(decisions[0].outcome, Outcome::OutOfWindow);

        let decisions = schedule(&snap, &week(), AvailabilityIndex::build(vec![], vec![]), &PlannerSettings::default());
        assert!(decisions[0].outcome.is_accepted());
        assert_eq!(decisions[0].occurrence.start_at, utc(2, 8));
    }

    #[test]
    fn history_entry_for_same_start_does_not_cap_itself() {
        let mut snap = snapshot(vec![daily("run", 7, 8, Some(7))]);
        snap.history.insert("run".into(), vec![utc(2, 7)]);
        let decisions = schedule(&snap, &week(), AvailabilityIndex::build(vec![], vec![]), &PlannerSettings::default());
        assert!(decisions[0].outcome.is_accepted());
        assert!(decisions[1..].iter().all(|d| matches!(d.outcome, Outcome::Capped { .. })));
    }
}
