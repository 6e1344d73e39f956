//! Provider subprocess calendar.
//!
//! Each call spawns the external provider binary (e.g.
//! `cadence-provider-google`), writes one JSON request line to its stdin and
//! reads one JSON response from its stdout. Providers own their credentials;
//! cadence only passes the account identifier.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::error::{CadenceError, CadenceResult};
use crate::occurrence::OccurrenceKey;
use crate::remote::protocol::{
    Command, FindEvent, ListBusy, ProviderCommand, Request, Response, UpsertEvent,
};
use crate::remote::{ExternalBusy, ExternalCalendar, ExternalEvent};
use crate::window::Window;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Provider(String);

impl Provider {
    pub fn from_name(name: &str) -> Self {
        Provider(name.to_string())
    }

    fn binary_path(&self) -> CadenceResult<std::path::PathBuf> {
        let binary_name = format!("cadence-provider-{}", self.0);
        which::which(&binary_name).map_err(|_| CadenceError::ProviderNotInstalled(binary_name))
    }

    /// Call a typed provider command and return the result.
    ///
    /// Timeouts and retries are applied by the caller.
    pub async fn call<C: ProviderCommand>(&self, cmd: C) -> CadenceResult<C::Response> {
        self.call_raw(C::command(), cmd).await
    }

    async fn call_raw<P: Serialize, R: serde::de::DeserializeOwned>(
        &self,
        command: Command,
        params: P,
    ) -> CadenceResult<R> {
        let params = serde_json::to_value(params)?;
        let request = Request { command, params };
        let request_json = serde_json::to_string(&request)?;

        let binary_path = self.binary_path()?;
        debug!(provider = %self.0, ?command, "calling provider");

        let mut child = TokioCommand::new(&binary_path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CadenceError::Unavailable(format!(
                    "Failed to spawn {}: {}",
                    binary_path.display(),
                    e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CadenceError::Unavailable("Provider stdin not available".into()))?;
        stdin
            .write_all(format!("{request_json}\n").as_bytes())
            .await
            .map_err(|e| CadenceError::Unavailable(format!("Failed to write request: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CadenceError::Unavailable(format!("Provider did not finish: {e}")))?;

        if !output.status.success() {
            return Err(CadenceError::Unavailable(format!(
                "Provider exited with status: {}",
                output.status.code().unwrap_or(-1)
            )));
        }

        let response_str = String::from_utf8_lossy(&output.stdout);
        if response_str.trim().is_empty() {
            return Err(CadenceError::Unavailable(
                "Provider returned no response".into(),
            ));
        }

        let response: Response<R> = serde_json::from_str(&response_str)
            .map_err(|e| CadenceError::Serialization(format!("Failed to parse response: {}", e)))?;

        match response {
            Response::Success { data } => Ok(data),
            Response::Error { error } => Err(CadenceError::Unavailable(error)),
        }
    }
}

/// [`ExternalCalendar`] backed by a provider binary and one account.
#[derive(Clone, Debug)]
pub struct ProviderCalendar {
    provider: Provider,
    account: String,
}

impl ProviderCalendar {
    pub fn new(provider: Provider, account: impl Into<String>) -> Self {
        ProviderCalendar {
            provider,
            account: account.into(),
        }
    }
}

#[async_trait]
impl ExternalCalendar for ProviderCalendar {
    async fn list_busy_intervals(
        &self,
        account: &str,
        window: &Window,
    ) -> CadenceResult<Vec<ExternalBusy>> {
        self.provider
            .call(ListBusy {
                account: account.to_string(),
                from: window.start().to_rfc3339(),
                to: window.end().to_rfc3339(),
            })
            .await
    }

    async fn find_event_by_key(&self, key: &OccurrenceKey) -> CadenceResult<Option<ExternalEvent>> {
        self.provider
            .call(FindEvent {
                account: self.account.clone(),
                key: key.clone(),
            })
            .await
    }

    async fn upsert_event(
        &self,
        key: &OccurrenceKey,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        title: &str,
    ) -> CadenceResult<String> {
        self.provider
            .call(UpsertEvent {
                account: self.account.clone(),
                key: key.clone(),
                start_at,
                end_at,
                title: title.to_string(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_provider_binary_is_reported() {
        let provider = Provider::from_name("definitely-not-installed-xyz");
        let result = provider
            .call(FindEvent {
                account: "me@example.com".into(),
                key: OccurrenceKey::new("a1", chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            })
            .await;
        match result {
            Err(CadenceError::ProviderNotInstalled(name)) => {
                assert_eq!(name, "cadence-provider-definitely-not-installed-xyz")
            }
            other => panic!("Expected ProviderNotInstalled, got {:?}", other),
        }
    }
}
