//! Activity store: the read-only source of a user's activities.
//!
//! A planning run reads one [`UserSnapshot`] up front and never goes back to
//! the store, so writes from elsewhere are not observed mid-run.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::activity::{Activity, ActivityRecord};
use crate::error::{CadenceError, CadenceResult};
use crate::window::Window;

/// An already-scheduled own interval, e.g. a past commit of some activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub activity_id: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

/// Everything a planning run needs about one user.
#[derive(Debug, Clone)]
pub struct UserSnapshot {
    pub user_id: String,
    pub timezone: Tz,
    pub calendar_account: Option<String>,
    pub activities: Vec<Activity>,
    /// Own intervals overlapping the requested window.
    pub commitments: Vec<Commitment>,
    /// Past occurrence starts per activity id, for frequency caps.
    pub history: HashMap<String, Vec<DateTime<Utc>>>,
}

pub trait ActivityStore: Send + Sync {
    fn snapshot(&self, user_id: &str, window: &Window) -> CadenceResult<UserSnapshot>;
}

/// Stored shape of one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub calendar_account: Option<String>,
    #[serde(default)]
    pub activities: Vec<ActivityRecord>,
    #[serde(default)]
    pub commitments: Vec<Commitment>,
    #[serde(default)]
    pub history: HashMap<String, Vec<DateTime<Utc>>>,
}

/// Timezone and calendar account of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub timezone: Tz,
    pub calendar_account: Option<String>,
}

impl UserRecord {
    fn profile(&self, user_id: &str, default_timezone: Tz) -> CadenceResult<UserProfile> {
        let timezone = match &self.timezone {
            Some(name) => name.parse::<Tz>().map_err(|_| {
                CadenceError::Config(format!("Unknown timezone '{name}' for user '{user_id}'"))
            })?,
            None => default_timezone,
        };
        Ok(UserProfile {
            timezone,
            calendar_account: self.calendar_account.clone(),
        })
    }

    fn to_snapshot(&self, user_id: &str, default_timezone: Tz, window: &Window) -> CadenceResult<UserSnapshot> {
        let UserProfile {
            timezone,
            calendar_account,
        } = self.profile(user_id, default_timezone)?;

        let activities = self
            .activities
            .iter()
            .cloned()
            .map(|record| Activity::from_record(record, timezone))
            .collect::<CadenceResult<Vec<_>>>()?;

        let commitments = self
            .commitments
            .iter()
            .filter(|c| c.start_at < window.end() && c.end_at > window.start())
            .cloned()
            .collect();

        Ok(UserSnapshot {
            user_id: user_id.to_string(),
            timezone,
            calendar_account,
            activities,
            commitments,
            history: self.history.clone(),
        })
    }
}

/// In-memory store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    users: HashMap<String, UserRecord>,
    default_timezone: Tz,
}

impl MemoryStore {
    pub fn new(default_timezone: Tz) -> Self {
        MemoryStore {
            users: HashMap::new(),
            default_timezone,
        }
    }

    pub fn with_user(mut self, user_id: &str, record: UserRecord) -> Self {
        self.users.insert(user_id.to_string(), record);
        self
    }
}

impl ActivityStore for MemoryStore {
    fn snapshot(&self, user_id: &str, window: &Window) -> CadenceResult<UserSnapshot> {
        self.users
            .get(user_id)
            .ok_or_else(|| CadenceError::UserNotFound(user_id.to_string()))?
            .to_snapshot(user_id, self.default_timezone, window)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    users: HashMap<String, UserRecord>,
}

/// Store backed by a JSON file of the form `{"users": {"<id>": UserRecord}}`.
///
/// The file is read on every snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    default_timezone: Tz,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, default_timezone: Tz) -> Self {
        JsonFileStore {
            path: path.into(),
            default_timezone,
        }
    }

    fn load(&self) -> CadenceResult<StoreFile> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            CadenceError::Config(format!(
                "Could not read activity store {}: {e}",
                self.path.display()
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            CadenceError::Serialization(format!("{}: {e}", self.path.display()))
        })
    }
}

impl JsonFileStore {
    /// Profile of `user_id` without validating their activities.
    pub fn profile(&self, user_id: &str) -> CadenceResult<UserProfile> {
        self.load()?
            .users
            .get(user_id)
            .ok_or_else(|| CadenceError::UserNotFound(user_id.to_string()))?
            .profile(user_id, self.default_timezone)
    }
}

impl ActivityStore for JsonFileStore {
    fn snapshot(&self, user_id: &str, window: &Window) -> CadenceResult<UserSnapshot> {
        self.load()?
            .users
            .get(user_id)
            .ok_or_else(|| CadenceError::UserNotFound(user_id.to_string()))?
            .to_snapshot(user_id, self.default_timezone, window)
    }
}
