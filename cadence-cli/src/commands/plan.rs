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
    let (planner, window) = open_planner(config, user_id, from, to)?;

    let agenda = spin_while(
        format!("Planning {user_id}"),
        json,
        planner.plan(user_id, window, PlanMode::DryRun),
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&agenda)?);
    } else {
        println!("{}", agenda.render());
    }

    Ok(())
}
