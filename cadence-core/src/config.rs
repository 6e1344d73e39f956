//! Cadence configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, CadenceResult};
use crate::planner::PlannerSettings;
use crate::retry::RetryPolicy;

static DEFAULT_DATA_FILE: &str = "~/.cadence/activities.json";

fn default_data_file() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_FILE)
}

fn default_horizon_days() -> u32 {
    14
}

fn default_max_concurrency() -> usize {
    4
}

fn default_call_timeout() -> String {
    "10s".into()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> String {
    "200ms".into()
}

fn default_day_start() -> String {
    "08:00".into()
}

fn default_day_end() -> String {
    "22:00".into()
}

/// Configuration at ~/.config/cadence/config.toml, overridable with
/// `CADENCE_*` environment variables.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CadenceConfig {
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Fallback IANA timezone for users without one.
    #[serde(default)]
    pub timezone: Option<String>,

    /// External calendar provider name (`cadence-provider-<name>`).
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub calendar_account: Option<String>,

    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_call_timeout")]
    pub call_timeout: String,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay: String,

    #[serde(default = "default_day_start")]
    pub day_start: String,

    #[serde(default = "default_day_end")]
    pub day_end: String,
}

impl CadenceConfig {
    pub fn config_path() -> CadenceResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CadenceError::Config("Could not determine config directory".into()))?
            .join("cadence");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, creating a commented default file first if needed.
    pub fn load() -> CadenceResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> CadenceResult<Self> {
        Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(Environment::with_prefix("CADENCE").try_parsing(true))
            .build()
            .map_err(|e| CadenceError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CadenceError::Config(e.to_string()))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> CadenceResult<()> {
        let contents = format!(
            "\
# cadence configuration

# JSON file holding users, activities and occurrence history:
# data_file = \"{}\"

# Timezone for users that do not set one:
# timezone = \"Europe/Amsterdam\"

# External calendar provider (runs cadence-provider-<name>) and account:
# provider = \"google\"
# calendar_account = \"me@example.com\"

# Default planning window length in days:
# horizon_days = {}

# External calendar calls:
# max_concurrency = {}
# call_timeout = \"{}\"
# retry_attempts = {}
# retry_base_delay = \"{}\"

# Hours in which flexible and deadline activities are placed:
# day_start = \"{}\"
# day_end = \"{}\"
",
            DEFAULT_DATA_FILE,
            default_horizon_days(),
            default_max_concurrency(),
            default_call_timeout(),
            default_retry_attempts(),
            default_retry_base_delay(),
            default_day_start(),
            default_day_end(),
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CadenceError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| CadenceError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// Effective configuration rendered as TOML.
    pub fn to_toml(&self) -> CadenceResult<String> {
        toml::to_string_pretty(self).map_err(|e| CadenceError::Serialization(e.to_string()))
    }

    pub fn data_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.data_file.to_string_lossy()).into_owned();
        PathBuf::from(full_path_str)
    }

    /// Configured fallback timezone, if any.
    pub fn timezone(&self) -> CadenceResult<Option<Tz>> {
        self.timezone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|_| CadenceError::Config(format!("Unknown timezone '{name}'")))
            })
            .transpose()
    }

    pub fn planner_settings(&self) -> CadenceResult<PlannerSettings> {
        let day_start = parse_time_of_day("day_start", &self.day_start)?;
        let day_end = parse_time_of_day("day_end", &self.day_end)?;
        if day_end <= day_start {
            return Err(CadenceError::Config(format!(
                "day_end ({}) must be after day_start ({})",
                self.day_end, self.day_start
            )));
        }
        if self.max_concurrency == 0 {
            return Err(CadenceError::Config("max_concurrency must be at least 1".into()));
        }

        let base_delay = parse_duration("retry_base_delay", &self.retry_base_delay)?;
        let retry = RetryPolicy {
            attempts: self.retry_attempts.max(1),
            base_delay,
            max_delay: RetryPolicy::default().max_delay.max(base_delay),
            call_timeout: parse_duration("call_timeout", &self.call_timeout)?,
        };

        Ok(PlannerSettings {
            retry,
            max_concurrency: self.max_concurrency,
            day_start,
            day_end,
            default_account: self.calendar_account.clone(),
        })
    }
}

fn parse_duration(key: &str, value: &str) -> CadenceResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| CadenceError::Config(format!("Invalid {key} '{value}': {e}")))
}

fn parse_time_of_day(key: &str, value: &str) -> CadenceResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| CadenceError::Config(format!("Invalid {key} '{value}'. Expected HH:MM")))
}
