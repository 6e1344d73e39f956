use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use cadence_core::availability::BusySource;
use cadence_core::decision::{Outcome, Verification};
use cadence_core::occurrence::OccurrenceKey;
use cadence_core::planner::{CommitStatus, PlanMode, PlannerSettings, SchedulingPlanner};
use cadence_core::remote::{ExternalBusy, ExternalCalendar, ExternalEvent};
use cadence_core::retry::RetryPolicy;
use cadence_core::store::{Commitment, MemoryStore, UserRecord};
use cadence_core::window::Window;
use cadence_core::{CadenceError, CadenceResult};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// In-memory calendar. Events written through `upsert_event` are reported
/// back from `list_busy_intervals` with their key, like a real provider.
#[derive(Default)]
struct FakeCalendar {
    busy: Vec<ExternalBusy>,
    events: Mutex<HashMap<String, ExternalEvent>>,
    upserts: AtomicUsize,
    list_calls: AtomicUsize,
    unavailable: AtomicBool,
    failing_keys: Mutex<HashSet<String>>,
    latency: Option<StdDuration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCalendar {
    fn with_busy(busy: Vec<ExternalBusy>) -> Self {
        FakeCalendar {
            busy,
            ..FakeCalendar::default()
        }
    }

    fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    async fn enter(&self) -> CadenceResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CadenceError::Unavailable("connection refused".into()));
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ExternalCalendar for FakeCalendar {
    async fn list_busy_intervals(
        &self,
        _account: &str,
        window: &Window,
    ) -> CadenceResult<Vec<ExternalBusy>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;

        let mut busy: Vec<ExternalBusy> = self.busy.clone();
        busy.extend(self.events.lock().unwrap().values().map(|e| ExternalBusy {
            start_at: e.start_at,
            end_at: e.end_at,
            key: Some(e.key.clone()),
        }));
        busy.retain(|b| b.start_at < window.end() && b.end_at > window.start());
        Ok(busy)
    }

    async fn find_event_by_key(&self, key: &OccurrenceKey) -> CadenceResult<Option<ExternalEvent>> {
        self.enter().await?;
        Ok(self.events.lock().unwrap().get(key.as_str()).cloned())
    }

    async fn upsert_event(
        &self,
        key: &OccurrenceKey,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        title: &str,
    ) -> CadenceResult<String> {
        self.enter().await?;
        if self.failing_keys.lock().unwrap().contains(key.as_str()) {
            return Err(CadenceError::Unavailable("quota exceeded".into()));
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);

        let mut events = self.events.lock().unwrap();
        let next_id = format!("evt-{}", events.len() + 1);
        let event = events
            .entry(key.to_string())
            .or_insert_with(|| ExternalEvent {
                id: next_id,
                key: key.clone(),
                start_at,
                end_at,
                title: title.to_string(),
            });
        event.start_at = start_at;
        event.end_at = end_at;
        event.title = title.to_string();
        Ok(event.id.clone())
    }
}

fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, hour, minute, 0).unwrap()
}

/// Monday 2025-06-02 through Sunday 2025-06-08.
fn week() -> Window {
    Window::from_dates(
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
        NaiveDate::from_ymd_opt(2025, 6, 8).unwrap(),
        Tz::UTC,
    )
    .unwrap()
}

fn ada() -> UserRecord {
    serde_json::from_value(serde_json::json!({
        "timezone": "UTC",
        "calendar_account": "ada@example.com",
        "activities": [
            {
                "id": "run", "title": "Morning run", "schedule_type": "recurring_strict",
                "recurrence": {"frequency": "DAILY", "start_date": "2025-06-01"},
                "occurrence_time_start": "07:00:00", "occurrence_time_end": "08:00:00"
            },
            {
                "id": "read", "title": "Reading", "schedule_type": "flexible",
                "duration_minutes": 60
            }
        ]
    }))
    .unwrap()
}

fn settings(max_concurrency: usize) -> PlannerSettings {
    PlannerSettings {
        retry: RetryPolicy {
            attempts: 3,
            base_delay: StdDuration::from_millis(50),
            max_delay: StdDuration::from_millis(200),
            call_timeout: StdDuration::from_secs(2),
        },
        max_concurrency,
        ..PlannerSettings::default()
    }
}

fn planner(record: UserRecord, calendar: Arc<FakeCalendar>) -> SchedulingPlanner {
    let store = MemoryStore::new(Tz::UTC).with_user("ada", record);
    SchedulingPlanner::new(Arc::new(store), settings(4)).with_calendar(calendar)
}

#[tokio::test(start_paused = true)]
async fn commit_twice_creates_events_once() {
    let calendar = Arc::new(FakeCalendar::default());
    let planner = planner(ada(), calendar.clone());

    let first = planner.plan("ada", week(), PlanMode::Commit).await.unwrap();
    let report = first.report.as_ref().unwrap();
    assert_eq!(report.counts(), (8, 0, 0, 0));
    assert_eq!(calendar.event_count(), 8);

    let second = planner.plan("ada", week(), PlanMode::Commit).await.unwrap();
    assert_eq!(second.decisions, first.decisions);
    let report = second.report.as_ref().unwrap();
    assert_eq!(report.counts(), (0, 0, 8, 0));
    assert_eq!(calendar.event_count(), 8);
    assert_eq!(calendar.upserts.load(Ordering::SeqCst), 8);
}

#[tokio::test(start_paused = true)]
async fn dry_run_reads_but_never_writes() {
    let calendar = Arc::new(FakeCalendar::default());
    let planner = planner(ada(), calendar.clone());

    let agenda = planner.plan("ada", week(), PlanMode::DryRun).await.unwrap();

    assert!(agenda.verified);
    assert!(agenda.report.is_none());
    assert_eq!(agenda.accepted().count(), 8);
    assert_eq!(calendar.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(calendar.upserts.load(Ordering::SeqCst), 0);
    assert_eq!(calendar.event_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn unavailable_calendar_degrades_dry_run_to_unverified() {
    let calendar = Arc::new(FakeCalendar::default());
    calendar.unavailable.store(true, Ordering::SeqCst);
    let planner = planner(ada(), calendar.clone());

    let agenda = planner.plan("ada", week(), PlanMode::DryRun).await.unwrap();

    assert!(!agenda.verified);
    assert_eq!(agenda.verification(), Verification::Unverified);
    assert!(!agenda.decisions.is_empty());
    assert!(agenda
        .decisions
        .iter()
        .all(|d| d.verification == Verification::Unverified));
    // Retried before giving up.
    assert_eq!(calendar.list_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn unavailable_calendar_fails_commit_entries_not_the_run() {
    let calendar = Arc::new(FakeCalendar::default());
    calendar.unavailable.store(true, Ordering::SeqCst);
    let planner = planner(ada(), calendar.clone());

    let agenda = planner.plan("ada", week(), PlanMode::Commit).await.unwrap();
    let report = agenda.report.unwrap();

    assert_eq!(report.counts(), (0, 0, 0, 8));
    assert!(!report.is_complete());
}

#[tokio::test]
async fn commit_without_calendar_is_rejected() {
    let store = MemoryStore::new(Tz::UTC).with_user("ada", ada());
    let planner = SchedulingPlanner::new(Arc::new(store), settings(4));

    let result = planner.plan("ada", week(), PlanMode::Commit).await;
    assert!(matches!(result, Err(CadenceError::NoCalendarConfigured)));

    let agenda = planner.plan("ada", week(), PlanMode::DryRun).await.unwrap();
    assert!(!agenda.verified);
}

#[tokio::test(start_paused = true)]
async fn external_busy_time_conflicts_and_is_not_written() {
    let calendar = Arc::new(FakeCalendar::with_busy(vec![ExternalBusy {
        start_at: utc(3, 6, 30),
        end_at: utc(3, 7, 30),
        key: None,
    }]));
    let planner = planner(ada(), calendar.clone());

    let agenda = planner.plan("ada", week(), PlanMode::Commit).await.unwrap();

    let conflicts: Vec<_> = agenda
        .decisions
        .iter()
        .filter_map(|d| d.conflicting_interval().map(|busy| (d, busy)))
        .collect();
    assert_eq!(conflicts.len(), 1);
    let (decision, busy) = conflicts[0];
    assert_eq!(decision.occurrence.key().as_str(), "run@2025-06-03");
    assert_eq!(busy.source, BusySource::ExternalCalendar);
    assert_eq!(busy.start_at, utc(3, 6, 30));

    let report = agenda.report.unwrap();
    assert_eq!(report.conflicted, 1);
    assert_eq!(report.counts().0, 7);
    assert!(report.entries.iter().all(|e| e.key.as_str() != "run@2025-06-03"));
}

#[tokio::test(start_paused = true)]
async fn own_commitments_block_other_activities_only() {
    let mut record = ada();
    record.commitments = vec![
        Commitment {
            activity_id: "gym".into(),
            start_at: utc(5, 7, 0),
            end_at: utc(5, 8, 0),
        },
        Commitment {
            activity_id: "run".into(),
            start_at: utc(6, 7, 0),
            end_at: utc(6, 8, 0),
        },
    ];
    let planner = planner(record, Arc::new(FakeCalendar::default()));

    let agenda = planner.plan("ada", week(), PlanMode::DryRun).await.unwrap();
    let outcome_on = |key: &str| {
        agenda
            .decisions
            .iter()
            .find(|d| d.occurrence.key().as_str() == key)
            .map(|d| d.outcome.clone())
            .unwrap()
    };

    match outcome_on("run@2025-06-05") {
        Outcome::Conflict {
            conflicting_interval,
        } => assert_eq!(conflicting_interval.source, BusySource::OwnActivity),
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(outcome_on("run@2025-06-06"), Outcome::Accepted);
}

#[tokio::test(start_paused = true)]
async fn failed_key_is_reported_and_others_commit() {
    let calendar = Arc::new(FakeCalendar {
        failing_keys: Mutex::new(HashSet::from(["run@2025-06-04".to_string()])),
        ..FakeCalendar::default()
    });
    let planner = planner(ada(), calendar.clone());

    let agenda = planner.plan("ada", week(), PlanMode::Commit).await.unwrap();
    let report = agenda.report.unwrap();

    assert_eq!(report.counts(), (7, 0, 0, 1));
    let failed: Vec<_> = report.failures().collect();
    assert_eq!(failed[0].key.as_str(), "run@2025-06-04");
    assert!(matches!(&failed[0].status, CommitStatus::Failed { error } if error.contains("quota")));
    assert_eq!(calendar.event_count(), 7);
}

#[tokio::test(start_paused = true)]
async fn rerun_after_partial_commit_writes_only_missing_keys() {
    let calendar = Arc::new(FakeCalendar {
        failing_keys: Mutex::new(HashSet::from(["run@2025-06-04".to_string()])),
        ..FakeCalendar::default()
    });
    let planner = planner(ada(), calendar.clone());

    let first = planner.plan("ada", week(), PlanMode::Commit).await.unwrap();
    assert!(!first.report.unwrap().is_complete());

    calendar.failing_keys.lock().unwrap().clear();

    let second = planner.plan("ada", week(), PlanMode::Commit).await.unwrap();
    let report = second.report.unwrap();
    assert_eq!(report.counts(), (1, 0, 7, 0));
    assert!(report.is_complete());
    let created: Vec<_> = report
        .entries
        .iter()
        .filter(|e| matches!(e.status, CommitStatus::Created { .. }))
        .collect();
    assert_eq!(created[0].key.as_str(), "run@2025-06-04");
    assert_eq!(calendar.event_count(), 8);
    assert_eq!(calendar.upserts.load(Ordering::SeqCst), 8);
}

#[tokio::test(start_paused = true)]
async fn changed_title_updates_existing_event() {
    let calendar = Arc::new(FakeCalendar::default());
    planner(ada(), calendar.clone())
        .plan("ada", week(), PlanMode::Commit)
        .await
        .unwrap();

    let mut renamed = ada();
    renamed.activities[0].title = "Easy run".into();
    let agenda = planner(renamed, calendar.clone())
        .plan("ada", week(), PlanMode::Commit)
        .await
        .unwrap();

    assert_eq!(agenda.report.unwrap().counts(), (0, 7, 1, 0));
    assert_eq!(calendar.event_count(), 8);
}

#[tokio::test(start_paused = true)]
async fn commit_respects_max_concurrency() {
    let calendar = Arc::new(FakeCalendar {
        latency: Some(StdDuration::from_millis(20)),
        ..FakeCalendar::default()
    });
    let store = MemoryStore::new(Tz::UTC).with_user("ada", ada());
    let planner = SchedulingPlanner::new(Arc::new(store), settings(2)).with_calendar(calendar.clone());

    let agenda = planner.plan("ada", week(), PlanMode::Commit).await.unwrap();

    assert_eq!(agenda.report.unwrap().counts().0, 8);
    assert!(calendar.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert!(calendar.max_in_flight.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn recurring_times_follow_user_timezone_across_dst() {
    let record: UserRecord = serde_json::from_value(serde_json::json!({
        "timezone": "Europe/Berlin",
        "activities": [{
            "id": "yoga", "title": "Yoga", "schedule_type": "recurring_strict",
            "recurrence": "FREQ=WEEKLY;BYDAY=SA,SU",
            "start_time": "2025-03-01T09:00:00Z",
            "occurrence_time_start": "09:00:00", "duration_minutes": 60
        }]
    }))
    .unwrap();
    let berlin: Tz = "Europe/Berlin".parse().unwrap();
    let window = Window::from_dates(
        NaiveDate::from_ymd_opt(2025, 3, 29).unwrap(),
        NaiveDate::from_ymd_opt(2025, 3, 30).unwrap(),
        berlin,
    )
    .unwrap();
    let store = MemoryStore::new(Tz::UTC).with_user("ada", record);
    let planner = SchedulingPlanner::new(Arc::new(store), settings(4));

    let agenda = planner.plan("ada", window, PlanMode::DryRun).await.unwrap();
    let starts: Vec<String> = agenda
        .decisions
        .iter()
        .map(|d| d.occurrence.start_at.to_rfc3339())
        .collect();

    // Clocks go forward on 2025-03-30: 09:00 CET, then 09:00 CEST.
    assert_eq!(
        starts,
        vec!["2025-03-29T08:00:00+00:00", "2025-03-30T07:00:00+00:00"]
    );
}

#[tokio::test]
async fn unknown_user_is_an_error() {
    let planner = planner(ada(), Arc::new(FakeCalendar::default()));
    let result = planner.plan("grace", week(), PlanMode::DryRun).await;
    assert!(matches!(result, Err(CadenceError::UserNotFound(_))));
}
