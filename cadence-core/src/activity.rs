//! Activities and their scheduling modes.
//!
//! Stored rows carry every scheduling field as a nullable column, selected by
//! `schedule_type`. [`ActivityRecord`] is that row shape; [`Activity`] is the
//! validated form where exactly one field group survives, as a [`Schedule`].

use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, CadenceResult};
use crate::recurrence::{RecurrenceRule, RecurrenceSpec};

/// How an activity is placed on the calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed single instance.
    Strict {
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    },
    /// No fixed time; placed into free time, repeated at most every `max_frequency_days`.
    Flexible,
    /// Must happen once, finishing by `deadline`.
    Deadline { deadline: DateTime<Utc> },
    /// Rule-based recurrence at fixed local times of day.
    RecurringStrict {
        rule: RecurrenceRule,
        time_start: NaiveTime,
        time_end: NaiveTime,
    },
}

/// A validated activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub id: String,
    pub title: String,
    pub duration: Duration,
    /// Minimum gap in days between two occurrences; `None` is uncapped.
    pub max_frequency_days: Option<u32>,
    pub schedule: Schedule,
}

impl Activity {
    /// Whether the activity occupies a fixed time (as opposed to being placed by the planner).
    pub fn is_fixed(&self) -> bool {
        matches!(
            self.schedule,
            Schedule::Strict { .. } | Schedule::RecurringStrict { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Strict,
    Flexible,
    Deadline,
    RecurringStrict,
}

/// A recurrence as stored: either the structured form or RRULE text.
///
/// RRULE text has no start date of its own, so it is anchored at the local
/// date of the record's `start_time` in the owner's timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredRecurrence {
    Structured(RecurrenceSpec),
    Text(String),
}

/// Flat row shape of an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub title: String,
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recurrence: Option<StoredRecurrence>,
    #[serde(default)]
    pub occurrence_time_start: Option<NaiveTime>,
    #[serde(default)]
    pub occurrence_time_end: Option<NaiveTime>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub max_frequency_days: Option<u32>,
}

impl ActivityRecord {
    fn duration(&self) -> Option<Duration> {
        self.duration_minutes
            .filter(|m| *m > 0)
            .map(|m| Duration::minutes(i64::from(m)))
    }

    fn require_duration(&self) -> CadenceResult<Duration> {
        self.duration().ok_or_else(|| {
            CadenceError::invalid_activity(&self.id, "duration_minutes must be a positive number")
        })
    }

    fn rule(&self, timezone: Tz) -> CadenceResult<RecurrenceRule> {
        match &self.recurrence {
            Some(StoredRecurrence::Structured(spec)) => RecurrenceRule::try_from(spec.clone()),
            Some(StoredRecurrence::Text(text)) => {
                let start = self.start_time.ok_or_else(|| {
                    CadenceError::invalid_activity(
                        &self.id,
                        "RRULE text recurrence needs start_time as its anchor date",
                    )
                })?;
                RecurrenceRule::parse_rrule(text, start.with_timezone(&timezone).date_naive())
            }
            None => Err(CadenceError::invalid_activity(
                &self.id,
                "recurring_strict activity has no recurrence",
            )),
        }
    }
}

/// Recurring occurrences are bounded by one local day.
const MAX_OCCURRENCE_MINUTES: u32 = 24 * 60;

impl TryFrom<ActivityRecord> for Activity {
    type Error = CadenceError;

    /// Validates a record owned by a UTC user.
    fn try_from(record: ActivityRecord) -> CadenceResult<Self> {
        Activity::from_record(record, Tz::UTC)
    }
}

impl Activity {
    /// Validates `record` for an owner in `timezone`.
    pub fn from_record(record: ActivityRecord, timezone: Tz) -> CadenceResult<Self> {
        let (schedule, duration) = match record.schedule_type {
            ScheduleType::Strict => {
                let (Some(start_at), Some(end_at)) = (record.start_time, record.end_time) else {
                    return Err(CadenceError::invalid_activity(
                        &record.id,
                        "strict activity needs start_time and end_time",
                    ));
                };
                if end_at <= start_at {
                    return Err(CadenceError::invalid_activity(
                        &record.id,
                        "end_time must be after start_time",
                    ));
                }
                (Schedule::Strict { start_at, end_at }, end_at - start_at)
            }
            ScheduleType::Flexible => (Schedule::Flexible, record.require_duration()?),
            ScheduleType::Deadline => {
                let deadline = record.deadline.ok_or_else(|| {
                    CadenceError::invalid_activity(&record.id, "deadline activity has no deadline")
                })?;
                (Schedule::Deadline { deadline }, record.require_duration()?)
            }
            ScheduleType::RecurringStrict => {
                let rule = record.rule(timezone)?;
                let time_start = record.occurrence_time_start.ok_or_else(|| {
                    CadenceError::invalid_activity(
                        &record.id,
                        "recurring_strict activity needs occurrence_time_start",
                    )
                })?;
                let (time_end, duration) = match (record.occurrence_time_end, record.duration()) {
                    (Some(end), _) if end == time_start => {
                        return Err(CadenceError::invalid_activity(
                            &record.id,
                            "occurrence_time_end equals occurrence_time_start",
                        ));
                    }
                    (Some(end), _) => {
                        let mut span = end - time_start;
                        if span <= Duration::zero() {
                            span += Duration::days(1);
                        }
                        (end, span)
                    }
                    (None, Some(_)) if record.duration_minutes >= Some(MAX_OCCURRENCE_MINUTES) => {
                        return Err(CadenceError::invalid_activity(
                            &record.id,
                            "recurring_strict duration_minutes must be under 24 hours",
                        ));
                    }
                    (None, Some(duration)) => (time_start + duration, duration),
                    (None, None) => {
                        return Err(CadenceError::invalid_activity(
                            &record.id,
                            "recurring_strict activity needs occurrence_time_end or duration_minutes",
                        ));
                    }
                };
                (
                    Schedule::RecurringStrict {
                        rule,
                        time_start,
                        time_end,
                    },
                    duration,
                )
            }
        };

        Ok(Activity {
            id: record.id,
            title: record.title,
            duration,
            max_frequency_days: record.max_frequency_days,
            schedule,
        })
    }
}
