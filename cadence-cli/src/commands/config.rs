use anyhow::Result;
use cadence_core::config::CadenceConfig;
use owo_colors::OwoColorize;

use super::default_timezone;

pub fn run() -> Result<()> {
    let config_path = CadenceConfig::config_path()?;
    let config = CadenceConfig::load()?;

    println!("{}", "Paths".bold());
    println!("  Config:      {}", config_path.display());
    println!("  Activities:  {}", config.data_path().display());
    println!("  Timezone:    {}", default_timezone(&config)?);
    println!(
        "  Provider:    {}",
        config
            .provider
            .as_deref()
            .map(|name| format!("cadence-provider-{name}"))
            .unwrap_or_else(|| "none".dimmed().to_string())
    );

    println!();
    println!("{}", "Settings".bold());
    for line in config.to_toml()?.lines() {
        println!("  {line}");
    }

    Ok(())
}
