//! Busy-time index over a user's own commitments and external calendar.
//!
//! Intervals are half-open `[start_at, end_at)`. The index keeps them sorted
//! and coalesced (overlapping or touching intervals merged) so lookups are a
//! binary search.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, CadenceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusySource {
    OwnActivity,
    ExternalCalendar,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub source: BusySource,
}

impl BusyInterval {
    pub fn new(
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        source: BusySource,
    ) -> CadenceResult<Self> {
        if end_at < start_at {
            return Err(CadenceError::InvalidInterval(format!(
                "busy interval ends ({}) before it starts ({})",
                end_at.to_rfc3339(),
                start_at.to_rfc3339()
            )));
        }
        Ok(BusyInterval {
            start_at,
            end_at,
            source,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.end_at <= self.start_at
    }

    /// Non-empty intersection with `[start, end)`; touching endpoints do not overlap.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_at < end && start < self.end_at
    }
}

#[derive(Debug, Clone, Default)]
pub struct AvailabilityIndex {
    intervals: Vec<BusyInterval>,
    verified: bool,
}

impl AvailabilityIndex {
    /// Merge own and external intervals into one sorted, coalesced set.
    pub fn build(own: Vec<BusyInterval>, external: Vec<BusyInterval>) -> Self {
        let mut all = own;
        all.extend(external);
        AvailabilityIndex {
            intervals: coalesce(all),
            verified: true,
        }
    }

    /// Index over own intervals only, used when the external calendar could not be read.
    pub fn own_only(own: Vec<BusyInterval>) -> Self {
        AvailabilityIndex {
            intervals: coalesce(own),
            verified: false,
        }
    }

    /// Whether external busy time is reflected in this index.
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn intervals(&self) -> &[BusyInterval] {
        &self.intervals
    }

    /// First busy interval intersecting `[start, end)`, lowest start first.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<&BusyInterval> {
        if end <= start {
            return None;
        }
        let idx = self.intervals.partition_point(|i| i.end_at <= start);
        self.intervals
            .get(idx)
            .filter(|interval| interval.overlaps(start, end))
    }

    /// Add one interval, keeping the set sorted and coalesced.
    pub fn insert(&mut self, interval: BusyInterval) {
        if interval.is_empty() {
            return;
        }

        let mut merged = interval;
        let lo = self.intervals.partition_point(|i| i.end_at < merged.start_at);
        let mut hi = lo;
        while let Some(existing) = self.intervals.get(hi) {
            if existing.start_at > merged.end_at {
                break;
            }
            if existing.start_at <= merged.start_at {
                merged.source = existing.source;
                merged.start_at = existing.start_at;
            }
            merged.end_at = merged.end_at.max(existing.end_at);
            hi += 1;
        }
        self.intervals.splice(lo..hi, std::iter::once(merged));
    }

    /// Earliest start in `[from, until)` where `duration` fits without touching busy time.
    pub fn first_fit(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        duration: Duration,
    ) -> Option<DateTime<Utc>> {
        let mut cursor = from;
        let idx = self.intervals.partition_point(|i| i.end_at <= from);

        for interval in &self.intervals[idx..] {
            if interval.start_at >= until {
                break;
            }
            if interval.start_at >= cursor + duration {
                break;
            }
            cursor = cursor.max(interval.end_at);
        }

        (cursor + duration <= until).then_some(cursor)
    }
}

/// Sort by start and sweep, merging any interval that starts at or before the
/// running end. The merged interval keeps the source of its earliest member.
fn coalesce(mut intervals: Vec<BusyInterval>) -> Vec<BusyInterval> {
    intervals.retain(|i| !i.is_empty());
    intervals.sort_by_key(|i| i.start_at);

    let mut merged: Vec<BusyInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start_at <= last.end_at => {
                last.end_at = last.end_at.max(interval.end_at);
            }
            _ => merged.push(interval),
        }
    }
    merged
}
