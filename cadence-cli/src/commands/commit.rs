use anyhow::Result;
use cadence_core::config::CadenceConfig;
use cadence_core::planner::PlanMode;

use super::open_planner;
use crate::render::Render;
use crate::utils::tui::spin_while;

pub async fn run(
    config: &CadenceConfig,
    user_id: &str,
    from: Option<&str>,
    to: Option<&str>,
    json: bool,
) -> Result<()> {
    if config.provider.is_none() {
        anyhow::bail!(
            "No calendar provider configured.\n\n\
            Set one in {}:\n  \
            provider = \"google\"",
            CadenceConfig::config_path()?.display()
        );
    }

    let (planner, window) = open_planner(config, user_id, from, to)?;

    let agenda = spin_while(
        format!("Committing {user_id}"),
        json,
        planner.plan(user_id, window, PlanMode::Commit),
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&agenda)?);
    } else {
        println!("{}", agenda.render());
        if let Some(report) = &agenda.report {
            println!();
            println!("{}", report.render());
        }
    }

    if let Some(report) = &agenda.report {
        if !report.is_complete() {
            anyhow::bail!(
                "{} occurrence(s) could not be written; run commit again to retry",
                report.failures().count()
            );
        }
    }

    Ok(())
}
