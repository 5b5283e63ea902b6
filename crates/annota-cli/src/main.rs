//! Annota CLI - Terminal Client for Video Annotation Feeds
//!
//! Features:
//! - Watch a video topic (backlog plus live annotations)
//! - Post an annotation at a playback position
//! - Replay a saved backlog against a simulated player
//! - Inspect backlogs and the effective widget configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

/// Annota CLI - Video annotation toolkit
#[derive(Parser)]
#[command(name = "annota")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Watch, post and replay timestamped video annotations", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Widget configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a video topic and print annotations as they arrive
    Watch {
        /// Socket endpoint, e.g. ws://localhost:4000/socket
        url: String,

        /// Logical video id
        video_id: String,

        /// Only fetch annotations newer than this id
        #[arg(short, long)]
        last_seen_id: Option<u64>,
    },

    /// Post an annotation
    Post {
        /// Socket endpoint, e.g. ws://localhost:4000/socket
        url: String,

        /// Logical video id
        video_id: String,

        /// Playback position (milliseconds or MM:SS)
        #[arg(short, long, default_value = "0")]
        at: String,

        /// Annotation text
        body: String,
    },

    /// Replay a saved backlog against a simulated player
    Replay {
        /// JSON file with an annotation list or a join reply
        backlog: PathBuf,

        /// Playback rate
        #[arg(short, long, default_value = "1.0")]
        speed: f64,

        /// Start position (milliseconds or MM:SS)
        #[arg(long, default_value = "0")]
        start: String,
    },

    /// Print a saved backlog in playback order
    Show {
        /// JSON file with an annotation list or a join reply
        backlog: PathBuf,
    },

    /// Print the effective widget configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Watch { url, video_id, last_seen_id } => {
            commands::watch(&config, &url, &video_id, last_seen_id, &cli.format).await?;
        }
        Commands::Post { url, video_id, at, body } => {
            let at = commands::parse_position(&at)?;
            commands::post(&config, &url, &video_id, at, &body, &cli.format).await?;
        }
        Commands::Replay { backlog, speed, start } => {
            let start = commands::parse_position(&start)?;
            commands::replay(&config, &backlog, speed, start, &cli.format).await?;
        }
        Commands::Show { backlog } => {
            commands::show(&backlog, &cli.format)?;
        }
        Commands::Config => {
            commands::show_config(&config, &cli.format)?;
        }
    }

    Ok(())
}
