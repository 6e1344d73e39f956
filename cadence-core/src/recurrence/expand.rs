//! Date-level expansion of recurrence rules.
//!
//! Periods are walked at the rule's frequency and interval, anchored at the
//! period containing `start_date`. Weeks start on Sunday, matching the
//! Sunday = 0 weekday ordinals. A `by_month_day` that does not exist in a
//! month (31 in February) selects nothing for that month; it is never clamped.

use std::collections::VecDeque;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use super::rule::{Frequency, RecurrenceRule};

/// Expand `rule` into the occurrence dates within `[window_start, window_end]`
/// (both inclusive), in strictly increasing order.
pub fn expand(rule: &RecurrenceRule, window_start: NaiveDate, window_end: NaiveDate) -> Vec<NaiveDate> {
    Occurrences::new(rule, window_start, window_end).collect()
}

/// Lazy, finite iterator over a rule's occurrence dates.
///
/// Cloning the iterator before consuming it yields an independent restart.
#[derive(Debug, Clone)]
pub struct Occurrences<'a> {
    rule: &'a RecurrenceRule,
    lower: NaiveDate,
    upper: NaiveDate,
    period: i64,
    pending: VecDeque<NaiveDate>,
    exhausted: bool,
}

impl<'a> Occurrences<'a> {
    pub fn new(rule: &'a RecurrenceRule, window_start: NaiveDate, window_end: NaiveDate) -> Self {
        let lower = rule.start_date().max(window_start);
        let upper = match rule.end_date() {
            Some(end) => end.min(window_end),
            None => window_end,
        };

        Occurrences {
            rule,
            lower,
            upper,
            period: first_period(rule, lower),
            pending: VecDeque::new(),
            exhausted: lower > upper,
        }
    }

    fn fill(&mut self) {
        while self.pending.is_empty() && !self.exhausted {
            let Some(period_start) = period_start(self.rule, self.period) else {
                self.exhausted = true;
                return;
            };
            if period_start > self.upper {
                self.exhausted = true;
                return;
            }

            self.pending.extend(
                period_candidates(self.rule, period_start)
                    .into_iter()
                    .filter(|d| *d >= self.lower && *d <= self.upper),
            );
            self.period += 1;
        }
    }
}

impl Iterator for Occurrences<'_> {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        self.fill();
        self.pending.pop_front()
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

/// Index of the first period (in interval steps) that can contain `lower`.
fn first_period(rule: &RecurrenceRule, lower: NaiveDate) -> i64 {
    let start = rule.start_date();
    let interval = i64::from(rule.interval());
    let elapsed = match rule.frequency() {
        Frequency::Daily => (lower - start).num_days(),
        Frequency::Weekly => (week_start(lower) - week_start(start)).num_days() / 7,
        Frequency::Monthly => month_index(lower) - month_index(start),
        Frequency::Yearly => i64::from(lower.year() - start.year()),
    };
    elapsed.max(0) / interval
}

fn period_start(rule: &RecurrenceRule, period: i64) -> Option<NaiveDate> {
    let start = rule.start_date();
    let steps = period.checked_mul(i64::from(rule.interval()))?;
    match rule.frequency() {
        Frequency::Daily => start.checked_add_signed(Duration::try_days(steps)?),
        Frequency::Weekly => week_start(start).checked_add_signed(Duration::try_weeks(steps)?),
        Frequency::Monthly => {
            let index = month_index(start).checked_add(steps)?;
            let year = i32::try_from(index.div_euclid(12)).ok()?;
            NaiveDate::from_ymd_opt(year, index.rem_euclid(12) as u32 + 1, 1)
        }
        Frequency::Yearly => {
            let year = i32::try_from(i64::from(start.year()).checked_add(steps)?).ok()?;
            NaiveDate::from_ymd_opt(year, 1, 1)
        }
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Resolve a signed day-of-month against a month length; `None` when the day does not exist.
fn resolve_month_day(day: i32, last: u32) -> Option<u32> {
    let last = last as i32;
    let resolved = if day > 0 { day } else { last + 1 + day };
    (1..=last).contains(&resolved).then_some(resolved as u32)
}

fn matches_month_day(rule: &RecurrenceRule, date: NaiveDate) -> bool {
    let last = days_in_month(date.year(), date.month());
    rule.by_month_day()
        .iter()
        .any(|d| resolve_month_day(*d, last) == Some(date.day()))
}

fn matches_weekday(days: &[Weekday], date: NaiveDate) -> bool {
    days.contains(&date.weekday())
}

fn period_candidates(rule: &RecurrenceRule, period_start: NaiveDate) -> Vec<NaiveDate> {
    let mut candidates = match rule.frequency() {
        Frequency::Daily => daily_candidates(rule, period_start),
        Frequency::Weekly => weekly_candidates(rule, period_start),
        Frequency::Monthly => {
            if rule.by_month().is_empty() || rule.by_month().contains(&period_start.month()) {
                month_candidates(rule, period_start.year(), period_start.month())
            } else {
                Vec::new()
            }
        }
        Frequency::Yearly => yearly_candidates(rule, period_start.year()),
    };

    candidates.sort_unstable();
    candidates.dedup();
    select_set_positions(rule.by_set_pos(), candidates)
}

fn daily_candidates(rule: &RecurrenceRule, day: NaiveDate) -> Vec<NaiveDate> {
    let keep = (rule.by_day().is_empty() || matches_weekday(rule.by_day(), day))
        && (rule.by_month().is_empty() || rule.by_month().contains(&day.month()))
        && (rule.by_month_day().is_empty() || matches_month_day(rule, day));
    if keep { vec![day] } else { Vec::new() }
}

fn weekly_candidates(rule: &RecurrenceRule, week: NaiveDate) -> Vec<NaiveDate> {
    let default_day = [rule.start_date().weekday()];
    let weekdays: &[Weekday] = if rule.by_day().is_empty() && rule.by_month_day().is_empty() {
        &default_day
    } else {
        rule.by_day()
    };

    (0..7)
        .map(|offset| week + Duration::days(offset))
        .filter(|d| weekdays.is_empty() || matches_weekday(weekdays, *d))
        .filter(|d| rule.by_month_day().is_empty() || matches_month_day(rule, *d))
        .filter(|d| rule.by_month().is_empty() || rule.by_month().contains(&d.month()))
        .collect()
}

fn month_candidates(rule: &RecurrenceRule, year: i32, month: u32) -> Vec<NaiveDate> {
    let last = days_in_month(year, month);
    let date = |day: u32| NaiveDate::from_ymd_opt(year, month, day);

    if !rule.by_month_day().is_empty() {
        rule.by_month_day()
            .iter()
            .filter_map(|d| resolve_month_day(*d, last))
            .filter_map(date)
            .filter(|d| rule.by_day().is_empty() || matches_weekday(rule.by_day(), *d))
            .collect()
    } else if !rule.by_day().is_empty() {
        (1..=last)
            .filter_map(date)
            .filter(|d| matches_weekday(rule.by_day(), *d))
            .collect()
    } else {
        let day = rule.start_date().day();
        if day <= last { date(day).into_iter().collect() } else { Vec::new() }
    }
}

fn yearly_candidates(rule: &RecurrenceRule, year: i32) -> Vec<NaiveDate> {
    let months: Vec<u32> = if !rule.by_month().is_empty() {
        rule.by_month().to_vec()
    } else if !rule.by_day().is_empty() || !rule.by_month_day().is_empty() {
        (1..=12).collect()
    } else {
        vec![rule.start_date().month()]
    };

    months
        .into_iter()
        .flat_map(|month| month_candidates(rule, year, month))
        .collect()
}

/// Keep only the 1-based (negative = from the end) positions of a sorted period set.
fn select_set_positions(positions: &[i32], candidates: Vec<NaiveDate>) -> Vec<NaiveDate> {
    if positions.is_empty() {
        return candidates;
    }

    let len = candidates.len() as i64;
    let mut selected: Vec<NaiveDate> = positions
        .iter()
        .filter_map(|pos| {
            let pos = i64::from(*pos);
            let index = if pos > 0 { pos - 1 } else { len + pos };
            (0..len).contains(&index).then(|| candidates[index as usize])
        })
        .collect();
    selected.sort_unstable();
    selected.dedup();
    selected
}
