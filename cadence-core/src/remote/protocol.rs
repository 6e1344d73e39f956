//! JSON protocol spoken between cadence and calendar provider binaries
//! over stdin/stdout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::occurrence::OccurrenceKey;
use crate::remote::{ExternalBusy, ExternalEvent};

pub trait ProviderCommand: Serialize {
    type Response: DeserializeOwned;
    fn command() -> Command;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    ListBusy,
    FindEvent,
    UpsertEvent,
}

/// Request sent from cadence to provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response sent from provider to cadence.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Success { data: T },
    Error { error: String },
}

/// List busy blocks within a time range.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListBusy {
    pub account: String,
    pub from: String,
    pub to: String,
}

impl ProviderCommand for ListBusy {
    type Response = Vec<ExternalBusy>;
    fn command() -> Command {
        Command::ListBusy
    }
}

/// Look up an event previously created for an occurrence key.
#[derive(Debug, Serialize, Deserialize)]
pub struct FindEvent {
    pub account: String,
    pub key: OccurrenceKey,
}

impl ProviderCommand for FindEvent {
    type Response = Option<ExternalEvent>;
    fn command() -> Command {
        Command::FindEvent
    }
}

/// Create the event for a key, or update it in place if it exists.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpsertEvent {
    pub account: String,
    pub key: OccurrenceKey,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub title: String,
}

impl ProviderCommand for UpsertEvent {
    type Response = String; // Provider event id
    fn command() -> Command {
        Command::UpsertEvent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_command_in_snake_case() {
        let request = Request {
            command: UpsertEvent::command(),
            params: serde_json::json!({}),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""command":"upsert_event""#));
    }

    #[test]
    fn responses_deserialize_by_status() {
        let ok: Response<Option<ExternalEvent>> =
            serde_json::from_str(r#"{"status":"success","data":null}"#).unwrap();
        assert!(matches!(ok, Response::Success { data: None }));

        let err: Response<String> =
            serde_json::from_str(r#"{"status":"error","error":"token expired"}"#).unwrap();
        match err {
            Response::Error { error } => assert_eq!(error, "token expired"),
            other => panic!("Expected error response, got {:?}", other),
        }
    }

    #[test]
    fn busy_key_is_optional() {
        let busy: Vec<ExternalBusy> = serde_json::from_str(
            r#"[{"start_at":"2025-06-02T10:00:00Z","end_at":"2025-06-02T11:00:00Z"},
                {"start_at":"2025-06-02T12:00:00Z","end_at":"2025-06-02T13:00:00Z","key":"gym@2025-06-02"}]"#,
        )
        .unwrap();
        assert_eq!(busy[0].key, None);
        assert_eq!(busy[1].key.as_ref().map(|k| k.as_str()), Some("gym@2025-06-02"));
    }
}
