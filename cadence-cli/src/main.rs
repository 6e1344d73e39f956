mod commands;
mod render;
mod utils;

use anyhow::Result;
use cadence_core::config::CadenceConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Expand recurring activities and plan them into your calendar")]
struct Cli {
    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the dates a recurrence rule produces
    Expand {
        /// RRULE value, e.g. "FREQ=WEEKLY;BYDAY=SA,SU"
        rule: String,

        /// First date of the recurrence (YYYY-MM-DD)
        #[arg(short, long)]
        start: String,

        /// List dates from this date (YYYY-MM-DD), defaults to --start
        #[arg(long)]
        from: Option<String>,

        /// List dates until this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Local time of day (HH:MM); prints UTC instants instead of dates
        #[arg(long)]
        at: Option<String>,

        /// Timezone for --at (IANA name)
        #[arg(long)]
        tz: Option<String>,
    },
    /// Show the agenda for a user without writing anything
    Plan {
        #[arg(short, long)]
        user: String,

        /// Plan from this date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        from: Option<String>,

        /// Plan until this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Print the agenda as JSON
        #[arg(long)]
        json: bool,
    },
    /// Plan and write accepted occurrences to the external calendar
    Commit {
        #[arg(short, long)]
        user: String,

        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,

        #[arg(long)]
        json: bool,
    },
    /// Show config paths and effective settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Expand {
            rule,
            start,
            from,
            to,
            at,
            tz,
        } => {
            let config = CadenceConfig::load()?;
            commands::expand::run(
                &config,
                &rule,
                &start,
                from.as_deref(),
                to.as_deref(),
                at.as_deref(),
                tz.as_deref(),
            )
        }
        Commands::Plan {
            user,
            from,
            to,
            json,
        } => {
            let config = CadenceConfig::load()?;
            commands::plan::run(&config, &user, from.as_deref(), to.as_deref(), json).await
        }
        Commands::Commit {
            user,
            from,
            to,
            json,
        } => {
            let config = CadenceConfig::load()?;
            commands::commit::run(&config, &user, from.as_deref(), to.as_deref(), json).await
        }
        Commands::Config => commands::config::run(),
    }
}

/// Logs go to stderr so `--json` output on stdout stays machine-readable.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
