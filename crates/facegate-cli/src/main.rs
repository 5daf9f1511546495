use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod account;
mod camera;
mod config;
mod sink;
mod verify;

use config::Config;

#[derive(Parser)]
#[command(name = "facegate", about = "Face verification with blink liveness", version)]
struct Cli {
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Identify the face in front of the camera, check liveness, then log in or register
    Verify {
        /// Directory of still images used as the camera
        #[arg(long)]
        frames: Option<PathBuf>,
        /// Display name to register with if the face is new (prompted otherwise)
        #[arg(long)]
        name: Option<String>,
    },
    /// Record the current emotion and show the refreshed user list
    Emotion {
        #[arg(long)]
        frames: Option<PathBuf>,
    },
    /// List users, optionally filtered by name
    Users {
        #[arg(long)]
        search: Option<String>,
    },
    /// Emotion history of the signed-in user
    History {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// End the server-side session
    Logout,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    tracing::debug!(server = %config.server_url, "facegate starting");

    let ok = match cli.command {
        Command::Verify { frames, name } => verify::verify(&config, frames, name, cli.json).await?,
        Command::Emotion { frames } => verify::emotion(&config, frames, cli.json).await?,
        Command::Users { search } => account::users(&config, search.as_deref(), cli.json).await?,
        Command::History { days } => account::history(&config, days, cli.json).await?,
        Command::Logout => account::logout(&config).await?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
