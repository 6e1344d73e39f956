use anyhow::{Context, Result};
use cadence_core::config::CadenceConfig;
use cadence_core::occurrence::resolve_local;
use cadence_core::recurrence::{RecurrenceRule, expand};
use cadence_core::window::parse_date;
use chrono::{Duration, NaiveTime};
use chrono_tz::Tz;
use owo_colors::OwoColorize;

use super::default_timezone;

pub fn run(
    config: &CadenceConfig,
    rule: &str,
    start: &str,
    from: Option<&str>,
    to: Option<&str>,
    at: Option<&str>,
    tz: Option<&str>,
) -> Result<()> {
    let start = parse_date(start)?;
    let rule = RecurrenceRule::parse_rrule(rule, start)?;

    let from = from.map(parse_date).transpose()?.unwrap_or(start);
    let to = match to {
        Some(s) => parse_date(s)?,
        None => from + Duration::days(i64::from(config.horizon_days.max(1)) - 1),
    };

    let dates = expand(&rule, from, to);

    println!("{} {}", rule.to_string().bold(), format!("({from} to {to})").dimmed());

    if dates.is_empty() {
        println!("   {}", "No occurrences".dimmed());
        return Ok(());
    }

    let at = at
        .map(|s| {
            NaiveTime::parse_from_str(s, "%H:%M").with_context(|| format!("Invalid --at '{s}'. Expected HH:MM"))
        })
        .transpose()?;

    match at {
        None => {
            for date in &dates {
                println!("   {}", date.format("%a %Y-%m-%d"));
            }
        }
        Some(time) => {
            let tz = match tz {
                Some(name) => name
                    .parse::<Tz>()
                    .map_err(|_| anyhow::anyhow!("Unknown timezone '{name}'"))?,
                None => default_timezone(config)?,
            };
            for date in &dates {
                let instant = resolve_local(tz, date.and_time(time));
                println!(
                    "   {} {}",
                    date.format("%a %Y-%m-%d"),
                    instant.to_rfc3339().dimmed()
                );
            }
        }
    }

    Ok(())
}
