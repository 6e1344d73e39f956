//! Typed recurrence rules.
//!
//! A [`RecurrenceRule`] is only obtainable through validation (the builder,
//! [`RecurrenceSpec`] conversion, or RRULE text parsing), so expansion never
//! has to deal with malformed combinations.

use std::fmt;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, CadenceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn as_rrule(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

/// Weekday for a Sunday-based ordinal (Sunday = 0 .. Saturday = 6).
pub fn weekday_from_ordinal(ordinal: u8) -> Option<Weekday> {
    match ordinal {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "SU",
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
    }
}

fn weekday_from_code(code: &str) -> Option<Weekday> {
    match code {
        "SU" => Some(Weekday::Sun),
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        _ => None,
    }
}

/// Validated recurrence rule modeled after RFC 5545 RRULE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    frequency: Frequency,
    interval: u32,
    by_day: Vec<Weekday>,
    by_month: Vec<u32>,
    by_month_day: Vec<i32>,
    by_set_pos: Vec<i32>,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
}

impl RecurrenceRule {
    pub fn builder(frequency: Frequency, start_date: NaiveDate) -> RuleBuilder {
        RuleBuilder {
            frequency,
            start_date,
            interval: 1,
            by_day: Vec::new(),
            by_month: Vec::new(),
            by_month_day: Vec::new(),
            by_set_pos: Vec::new(),
            end_date: None,
        }
    }

    /// Parse the RRULE value (the part after `RRULE:`), anchored at `start_date`.
    pub fn parse_rrule(text: &str, start_date: NaiveDate) -> CadenceResult<Self> {
        let text = text.trim();
        let text = text.strip_prefix("RRULE:").unwrap_or(text);

        let mut frequency = None;
        let mut builder_parts: Vec<(String, String)> = Vec::new();

        for part in text.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| CadenceError::InvalidRule(format!("malformed part '{part}'")))?;
            let key = key.trim().to_ascii_uppercase();
            let value = value.trim().to_ascii_uppercase();
            if key == "FREQ" {
                frequency = Some(match value.as_str() {
                    "DAILY" => Frequency::Daily,
                    "WEEKLY" => Frequency::Weekly,
                    "MONTHLY" => Frequency::Monthly,
                    "YEARLY" => Frequency::Yearly,
                    other => {
                        return Err(CadenceError::InvalidRule(format!(
                            "unsupported FREQ '{other}'"
                        )));
                    }
                });
            } else {
                builder_parts.push((key, value));
            }
        }

        let frequency =
            frequency.ok_or_else(|| CadenceError::InvalidRule("missing FREQ".into()))?;
        let mut builder = RecurrenceRule::builder(frequency, start_date);

        for (key, value) in builder_parts {
            builder = match key.as_str() {
                "INTERVAL" => builder.interval(parse_number(&key, &value)?),
                "BYDAY" => {
                    let days = value
                        .split(',')
                        .map(|code| {
                            weekday_from_code(code).ok_or_else(|| {
                                CadenceError::InvalidRule(format!(
                                    "unsupported BYDAY value '{code}' (use BYSETPOS for nth weekday)"
                                ))
                            })
                        })
                        .collect::<CadenceResult<Vec<_>>>()?;
                    builder.by_weekdays(days)
                }
                "BYMONTH" => builder.by_month(parse_list(&key, &value)?),
                "BYMONTHDAY" => builder.by_month_day(parse_list(&key, &value)?),
                "BYSETPOS" => builder.by_set_pos(parse_list(&key, &value)?),
                "UNTIL" => {
                    let date = value
                        .get(..8)
                        .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
                        .ok_or_else(|| {
                            CadenceError::InvalidRule(format!("invalid UNTIL '{value}'"))
                        })?;
                    builder.end_date(Some(date))
                }
                "WKST" if value == "SU" => builder,
                other => {
                    return Err(CadenceError::InvalidRule(format!(
                        "unsupported rule part '{other}'"
                    )));
                }
            };
        }

        builder.build()
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn by_day(&self) -> &[Weekday] {
        &self.by_day
    }

    pub fn by_month(&self) -> &[u32] {
        &self.by_month
    }

    pub fn by_month_day(&self) -> &[i32] {
        &self.by_month_day
    }

    pub fn by_set_pos(&self) -> &[i32] {
        &self.by_set_pos
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={}", self.frequency.as_rrule())?;
        if self.interval != 1 {
            write!(f, ";INTERVAL={}", self.interval)?;
        }
        if !self.by_day.is_empty() {
            let codes: Vec<_> = self.by_day.iter().map(|d| weekday_code(*d)).collect();
            write!(f, ";BYDAY={}", codes.join(","))?;
        }
        if !self.by_month.is_empty() {
            write!(f, ";BYMONTH={}", join_numbers(&self.by_month))?;
        }
        if !self.by_month_day.is_empty() {
            write!(f, ";BYMONTHDAY={}", join_numbers(&self.by_month_day))?;
        }
        if !self.by_set_pos.is_empty() {
            write!(f, ";BYSETPOS={}", join_numbers(&self.by_set_pos))?;
        }
        if let Some(end) = self.end_date {
            write!(f, ";UNTIL={}", end.format("%Y%m%d"))?;
        }
        Ok(())
    }
}

fn join_numbers<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> CadenceResult<T> {
    value
        .parse()
        .map_err(|_| CadenceError::InvalidRule(format!("invalid {key} value '{value}'")))
}

fn parse_list<T: std::str::FromStr>(key: &str, value: &str) -> CadenceResult<Vec<T>> {
    value.split(',').map(|v| parse_number(key, v)).collect()
}

/// Builder that validates on [`RuleBuilder::build`].
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    frequency: Frequency,
    start_date: NaiveDate,
    interval: u32,
    by_day: Vec<Weekday>,
    by_month: Vec<u32>,
    by_month_day: Vec<i32>,
    by_set_pos: Vec<i32>,
    end_date: Option<NaiveDate>,
}

impl RuleBuilder {
    pub fn interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn by_weekdays(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.by_day = days.into_iter().collect();
        self
    }

    pub fn by_month(mut self, months: impl IntoIterator<Item = u32>) -> Self {
        self.by_month = months.into_iter().collect();
        self
    }

    pub fn by_month_day(mut self, days: impl IntoIterator<Item = i32>) -> Self {
        self.by_month_day = days.into_iter().collect();
        self
    }

    pub fn by_set_pos(mut self, positions: impl IntoIterator<Item = i32>) -> Self {
        self.by_set_pos = positions.into_iter().collect();
        self
    }

    pub fn end_date(mut self, end_date: Option<NaiveDate>) -> Self {
        self.end_date = end_date;
        self
    }

    pub fn build(self) -> CadenceResult<RecurrenceRule> {
        if self.interval < 1 {
            return Err(CadenceError::InvalidRule("interval must be >= 1".into()));
        }
        if let Some(month) = self.by_month.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(CadenceError::InvalidRule(format!(
                "by_month value {month} outside 1..=12"
            )));
        }
        if let Some(day) = self
            .by_month_day
            .iter()
            .find(|d| **d == 0 || !(-31..=31).contains(*d))
        {
            return Err(CadenceError::InvalidRule(format!(
                "by_month_day value {day} outside -31..=-1 or 1..=31"
            )));
        }
        if let Some(pos) = self
            .by_set_pos
            .iter()
            .find(|p| **p == 0 || !(-366..=366).contains(*p))
        {
            return Err(CadenceError::InvalidRule(format!(
                "by_set_pos value {pos} outside -366..=-1 or 1..=366"
            )));
        }
        if !self.by_set_pos.is_empty() && self.by_day.is_empty() && self.by_month_day.is_empty() {
            return Err(CadenceError::InvalidRule(
                "by_set_pos requires by_day or by_month_day".into(),
            ));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(CadenceError::InvalidRule(format!(
                    "end_date {end} is before start_date {}",
                    self.start_date
                )));
            }
        }

        let mut by_day = self.by_day;
        by_day.sort_by_key(|d| d.num_days_from_sunday());
        by_day.dedup();

        let mut by_month = self.by_month;
        by_month.sort_unstable();
        by_month.dedup();

        let mut by_month_day = self.by_month_day;
        by_month_day.sort_unstable();
        by_month_day.dedup();

        let mut by_set_pos = self.by_set_pos;
        by_set_pos.sort_unstable();
        by_set_pos.dedup();

        Ok(RecurrenceRule {
            frequency: self.frequency,
            interval: self.interval,
            by_day,
            by_month,
            by_month_day,
            by_set_pos,
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }
}

fn default_interval() -> u32 {
    1
}

/// Structured, serializable form of a rule as it is stored alongside an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceSpec {
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Sunday-based weekday ordinals (Sunday = 0).
    #[serde(default)]
    pub by_day: Vec<u8>,
    #[serde(default)]
    pub by_month: Vec<u32>,
    #[serde(default)]
    pub by_month_day: Vec<i32>,
    #[serde(default)]
    pub by_set_pos: Vec<i32>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl TryFrom<RecurrenceSpec> for RecurrenceRule {
    type Error = CadenceError;

    fn try_from(spec: RecurrenceSpec) -> CadenceResult<Self> {
        let by_day = spec
            .by_day
            .iter()
            .map(|o| {
                weekday_from_ordinal(*o).ok_or_else(|| {
                    CadenceError::InvalidRule(format!("by_day value {o} outside 0..=6"))
                })
            })
            .collect::<CadenceResult<Vec<_>>>()?;

        RecurrenceRule::builder(spec.frequency, spec.start_date)
            .interval(spec.interval)
            .by_weekdays(by_day)
            .by_month(spec.by_month)
            .by_month_day(spec.by_month_day)
            .by_set_pos(spec.by_set_pos)
            .end_date(spec.end_date)
            .build()
    }
}

impl From<&RecurrenceRule> for RecurrenceSpec {
    fn from(rule: &RecurrenceRule) -> Self {
        RecurrenceSpec {
            frequency: rule.frequency,
            interval: rule.interval,
            by_day: rule
                .by_day
                .iter()
                .map(|d| d.num_days_from_sunday() as u8)
                .collect(),
            by_month: rule.by_month.clone(),
            by_month_day: rule.by_month_day.clone(),
            by_set_pos: rule.by_set_pos.clone(),
            start_date: rule.start_date,
            end_date: rule.end_date,
        }
    }
}
