pub mod commit;
pub mod config;
pub mod expand;
pub mod plan;

use std::sync::Arc;

use anyhow::Result;
use cadence_core::config::CadenceConfig;
use cadence_core::planner::SchedulingPlanner;
use cadence_core::remote::{Provider, ProviderCalendar};
use cadence_core::store::JsonFileStore;
use cadence_core::window::Window;
use chrono_tz::Tz;
use tracing::debug;

/// Configured timezone, else the system one, else UTC.
pub fn default_timezone(config: &CadenceConfig) -> Result<Tz> {
    if let Some(tz) = config.timezone()? {
        return Ok(tz);
    }

    Ok(iana_time_zone::get_timezone()
        .ok()
        .and_then(|name| name.parse::<Tz>().ok())
        .unwrap_or(Tz::UTC))
}

/// Planner over the configured store and provider, plus the window for
/// `user_id` with dates read in the user's own timezone.
pub fn open_planner(
    config: &CadenceConfig,
    user_id: &str,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<(SchedulingPlanner, Window)> {
    let store = JsonFileStore::new(config.data_path(), default_timezone(config)?);
    let profile = store.profile(user_id)?;
    let window = Window::from_args(from, to, config.horizon_days, profile.timezone)?;

    let mut planner = SchedulingPlanner::new(Arc::new(store), config.planner_settings()?);

    if let Some(name) = &config.provider {
        let account = profile
            .calendar_account
            .or_else(|| config.calendar_account.clone())
            .unwrap_or_else(|| user_id.to_string());
        debug!(provider = %name, %account, "using provider calendar");
        let calendar = ProviderCalendar::new(Provider::from_name(name), account);
        planner = planner.with_calendar(Arc::new(calendar));
    }

    Ok((planner, window))
}
