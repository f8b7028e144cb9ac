//! Trail Control - CLI harness for the trail progress engine
//!
//! Opens a session against the learning backend, prints XP, level, rank and
//! the lesson trail, awards XP by event key and flushes the queue.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use trail_core::config::EngineConfig;
use trail_core::logging;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "trailctl")]
#[command(about = "Trail - XP and lesson progress engine", long_about = None)]
#[command(version = VERSION)]
struct Cli {
    /// Config file (default: ~/.config/trail/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bearer token for the learning backend
    #[arg(long, env = "TRAIL_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Override `remote.base_url`
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Lesson catalogue, in trail order
    #[arg(long, global = true, value_delimiter = ',', default_value = "1,2,3,4,5")]
    lessons: Vec<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show XP, level, rank and the lesson trail
    Status {
        /// Starting XP from the login profile
        #[arg(long, default_value_t = 0)]
        xp: u64,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Award XP for an event key and sync it
    Award {
        /// XP amount
        amount: u32,

        /// Event key (e.g. "lesson_complete_3")
        event_key: String,

        /// Starting XP from the login profile
        #[arg(long, default_value_t = 0)]
        xp: u64,
    },

    /// Print the level curve
    Levels {
        /// Highest level to show
        #[arg(long, default_value_t = 10)]
        max: u32,
    },

    /// Show the effective configuration
    Config,
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };
    if let Some(base_url) = &cli.base_url {
        config.remote.base_url = base_url.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    logging::init(&config.log);

    let ctx = commands::Context {
        config,
        token: cli.token.clone(),
        lessons: cli.lessons.clone(),
    };

    match cli.command {
        Commands::Status { xp, json } => commands::status(ctx, xp, json).await,
        Commands::Award {
            amount,
            event_key,
            xp,
        } => commands::award(ctx, amount, &event_key, xp).await,
        Commands::Levels { max } => commands::levels(max),
        Commands::Config => commands::show_config(&ctx.config),
    }
}
