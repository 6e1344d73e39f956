//! Concrete occurrences of activities.

use std::fmt;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Stable reconciliation key for one occurrence: activity id plus local start date.
///
/// External events are matched by this key, never by the provider's event id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OccurrenceKey(String);

impl OccurrenceKey {
    pub fn new(activity_id: &str, date: NaiveDate) -> Self {
        OccurrenceKey(format!("{}@{}", activity_id, date.format("%Y-%m-%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OccurrenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One concrete instance of an activity, normalized to UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub activity_id: String,
    pub title: String,
    /// Local date in the owner's timezone the occurrence belongs to.
    pub date: NaiveDate,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl Occurrence {
    /// Occurrence from wall-clock times on `date` in `tz`.
    ///
    /// An end time at or before the start time rolls over to the next day.
    pub fn from_local(
        activity_id: &str,
        title: &str,
        date: NaiveDate,
        time_start: NaiveTime,
        time_end: NaiveTime,
        tz: Tz,
    ) -> Self {
        let end_date = if time_end <= time_start {
            date + Duration::days(1)
        } else {
            date
        };

        Occurrence {
            activity_id: activity_id.to_string(),
            title: title.to_string(),
            date,
            start_at: resolve_local(tz, date.and_time(time_start)),
            end_at: resolve_local(tz, end_date.and_time(time_end)),
        }
    }

    /// Occurrence from UTC instants; `date` is derived in `tz`.
    pub fn from_instants(
        activity_id: &str,
        title: &str,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        tz: Tz,
    ) -> Self {
        Occurrence {
            activity_id: activity_id.to_string(),
            title: title.to_string(),
            date: start_at.with_timezone(&tz).date_naive(),
            start_at,
            end_at,
        }
    }

    pub fn key(&self) -> OccurrenceKey {
        OccurrenceKey::new(&self.activity_id, self.date)
    }

    pub fn duration(&self) -> Duration {
        self.end_at - self.start_at
    }
}

/// Convert a wall-clock time in `tz` to UTC.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// DST gap are moved forward past the gap.
pub fn resolve_local(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Gaps are at most a few hours; step until the wall clock exists again.
            let mut probe = local;
            for _ in 0..24 {
                probe += Duration::minutes(30);
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return dt.with_timezone(&Utc);
                }
            }
            Utc.from_utc_datetime(&local)
        }
    }
}
