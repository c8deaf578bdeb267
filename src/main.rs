use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "pulse")]
#[command(version, about = "Live progress for long-running report tasks")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Backend base URL. Overrides pulse.toml and PULSE_BASE_URL.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Bearer token. Overrides PULSE_TOKEN and the token file.
    #[arg(long, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow a task live until it completes or fails
    Watch {
        task_id: String,

        /// Fail instead of polling when the stream cannot be kept up
        #[arg(long)]
        no_fallback: bool,

        /// Skip the stream and poll the status endpoint from the start
        #[arg(long)]
        polling: bool,

        /// Open the report in a browser when the task completes
        #[arg(long)]
        open: bool,

        /// Print one line per update instead of progress bars
        #[arg(long)]
        plain: bool,
    },
    /// Fetch a task's current status once
    Status {
        task_id: String,

        /// Print the raw status snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    Show,
    Validate,
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(&project_dir, command.clone(), cli.base_url.as_deref());
    }

    let mut config =
        pulse::config::PulseConfig::load(&project_dir).context("Failed to load configuration")?;
    if let Some(url) = &cli.base_url {
        config.toml.server.base_url = url.clone();
    }
    let _log_guard = pulse::logging::init(cli.verbose, &config.toml.logging);

    match cli.command {
        Commands::Watch {
            task_id,
            no_fallback,
            polling,
            open,
            plain,
        } => {
            let args = cmd::WatchArgs {
                task_id,
                no_fallback,
                polling,
                open,
                plain,
                verbose: cli.verbose,
            };
            cmd::cmd_watch(&config, cli.token, args).await?;
        }
        Commands::Status { task_id, json } => {
            cmd::cmd_status(&config, cli.token, &task_id, json).await?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}
