use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use flowdesk::config::Config;

mod cmd;

#[derive(Parser)]
#[command(name = "flowdesk")]
#[command(version, about = "Ticket workflow tracker with recurring tickets and user reports")]
pub struct Cli {
    /// Force debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to flowdesk.toml (defaults to .flowdesk/flowdesk.toml)
    #[arg(long, global = true, env = "FLOWDESK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and a default config file
    Init {
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable permissive CORS for local front-end work
        #[arg(long)]
        dev: bool,
    },
    /// Inspect and execute recurring rules
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Print reports as JSON
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Show or validate the effective configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum RulesCommands {
    /// Execute every active rule that is due now
    RunDue,
    /// Execute one tick of a rule
    Execute { id: i64 },
    /// List all rules
    List,
}

#[derive(Subcommand, Clone)]
pub enum ReportCommands {
    /// Report for a single user
    User {
        id: i64,

        /// Window start (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        from: Option<String>,

        /// Window end, inclusive
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    Show,
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // `init` may be pointed at a config file it is about to create.
    let config = match (&cli.command, cli.config.as_deref()) {
        (Commands::Init { .. }, Some(path)) if !path.exists() => {
            let mut config = Config::default();
            config.apply_env_overrides()?;
            config
        }
        (_, explicit) => Config::resolve(explicit)?,
    };
    let _log_guard = flowdesk::logging::init(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Init { db_path } => cmd::cmd_init(config, cli.config.as_deref(), db_path)?,
        Commands::Serve {
            host,
            port,
            db_path,
            dev,
        } => cmd::cmd_serve(config, host, port, db_path, dev).await?,
        Commands::Rules { command } => cmd::cmd_rules(&config, command)?,
        Commands::Report { command } => cmd::cmd_report(&config, command)?,
        Commands::Config { command } => cmd::cmd_config(&config, cli.config.as_deref(), command)?,
    }

    Ok(())
}
