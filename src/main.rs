use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;

use pitchboard::config::{CliOverrides, LogFormat, PitchboardConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "pitchboard")]
#[command(version, about = "Pitch assignment and claim workflow server")]
pub struct Cli {
    /// Path to the config file (defaults to ./pitchboard.toml when present)
    #[arg(long, global = true, env = "PITCHBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and WebSocket change feed
    Serve(ServeArgs),
    /// Create (or migrate) the pitch database and exit
    InitDb {
        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View, validate or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Interface to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to serve on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Database path
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Enable dev mode (permissive CORS for a local UI dev server)
    #[arg(long)]
    pub dev: bool,

    /// Log filter directive, e.g. "info" or "pitchboard=debug"
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log output format: text or json
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    /// Also write daily-rolling log files to this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl ServeArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            host: self.host.clone(),
            port: self.port,
            db_path: self.db_path.clone(),
            dev_mode: self.dev,
            log_level: self.log_level.clone(),
            log_format: self.log_format,
            log_dir: self.log_dir.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and exit
    Validate,
    /// Write a default pitchboard.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Serve(args) => {
            let (config, _log_guard) = load(config_path, &args.overrides())?;
            cmd::cmd_serve(&config).await
        }
        Commands::InitDb { db_path } => {
            let overrides = CliOverrides {
                db_path: db_path.clone(),
                ..Default::default()
            };
            let (config, _log_guard) = load(config_path, &overrides)?;
            cmd::cmd_init_db(&config)
        }
        Commands::Config { command } => match command {
            None | Some(ConfigCommands::Show) => {
                let (config, _log_guard) = load(config_path, &CliOverrides::default())?;
                cmd::cmd_config_show(&config)
            }
            Some(ConfigCommands::Validate) => {
                let (config, _log_guard) = load(config_path, &CliOverrides::default())?;
                cmd::cmd_config_validate(&config)
            }
            // Must work even when the current config is broken, so nothing is loaded.
            Some(ConfigCommands::Init { force }) => cmd::cmd_config_init(config_path, *force),
        },
    }
}

/// Resolve configuration and install logging. Keep the guard alive until exit.
fn load(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<(PitchboardConfig, Option<WorkerGuard>)> {
    let config = PitchboardConfig::resolve(config_path, overrides)?;
    let guard = pitchboard::logging::init(&config.logging)?;
    Ok((config, guard))
}
