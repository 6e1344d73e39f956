//! External calendar collaborator.
//!
//! The planner never talks to a calendar provider directly; it is handed an
//! [`ExternalCalendar`] so the engine can be driven by a provider subprocess
//! in production and by an in-memory fake in tests.

pub mod protocol;
pub mod provider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CadenceResult;
use crate::occurrence::{Occurrence, OccurrenceKey};
use crate::window::Window;

pub use provider::{Provider, ProviderCalendar};

/// A busy block reported by the external calendar.
///
/// `key` is set when the block is an event this system created, so planning
/// can ignore its own earlier output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalBusy {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<OccurrenceKey>,
}

/// An event on the external calendar created from an occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub id: String,
    pub key: OccurrenceKey,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub title: String,
}

impl ExternalEvent {
    /// Whether the event already reflects the occurrence (time and title).
    pub fn matches(&self, occurrence: &Occurrence) -> bool {
        self.start_at == occurrence.start_at
            && self.end_at == occurrence.end_at
            && self.title == occurrence.title
    }
}

#[async_trait]
pub trait ExternalCalendar: Send + Sync {
    /// Busy blocks overlapping `window`. Fails with `Unavailable` on network or auth errors.
    async fn list_busy_intervals(
        &self,
        account: &str,
        window: &Window,
    ) -> CadenceResult<Vec<ExternalBusy>>;

    async fn find_event_by_key(&self, key: &OccurrenceKey) -> CadenceResult<Option<ExternalEvent>>;

    /// Create or update the event for `key`; returns the provider's event id.
    /// Calling twice with the same key must not create two events.
    async fn upsert_event(
        &self,
        key: &OccurrenceKey,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        title: &str,
    ) -> CadenceResult<String>;
}
