//! Planning window.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, CadenceResult};

/// Half-open time window `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CadenceResult<Self> {
        if end <= start {
            return Err(CadenceError::InvalidWindow(format!(
                "window end {} is not after start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(Window { start, end })
    }

    /// Window covering whole local days `from..=to` in `tz`.
    pub fn from_dates(from: NaiveDate, to: NaiveDate, tz: Tz) -> CadenceResult<Self> {
        let start = local_midnight(from, tz);
        let end = local_midnight(to + Duration::days(1), tz);
        Window::new(start, end)
    }

    /// Parse CLI-style bounds.
    /// - `from`: YYYY-MM-DD, defaults to today
    /// - `to`: YYYY-MM-DD (inclusive), defaults to `from + horizon_days - 1`
    pub fn from_args(
        from: Option<&str>,
        to: Option<&str>,
        horizon_days: u32,
        tz: Tz,
    ) -> CadenceResult<Self> {
        let from_date = match from {
            Some(s) => parse_date(s)?,
            None => Utc::now().with_timezone(&tz).date_naive(),
        };

        let to_date = match to {
            Some(s) => parse_date(s)?,
            None => from_date + Duration::days(i64::from(horizon_days.max(1)) - 1),
        };

        Window::from_dates(from_date, to_date, tz)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    /// First and last local calendar dates touched by the window.
    pub fn local_dates(&self, tz: Tz) -> (NaiveDate, NaiveDate) {
        let first = self.start.with_timezone(&tz).date_naive();
        let last = (self.end - Duration::nanoseconds(1))
            .with_timezone(&tz)
            .date_naive();
        (first, last)
    }
}

/// Parse YYYY-MM-DD.
pub fn parse_date(s: &str) -> CadenceResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        CadenceError::InvalidWindow(format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))
    })
}

fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    crate::occurrence::resolve_local(tz, date.and_time(chrono::NaiveTime::MIN))
}

/// UTC helper used by tests and callers holding plain dates.
pub fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}
