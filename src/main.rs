//! RelayConsole - operator console with a single-peer reverse listener

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relayconsole::{
    config::{CliOverrides, ConfigManager},
    ActivityLog, Config, Console, InterruptCoordinator, OperatorInput,
};

/// CLI arguments for RelayConsole
#[derive(Parser, Debug)]
#[command(name = "relayconsole")]
#[command(about = "Operator console with a single-peer reverse listener")]
#[command(version)]
#[command(long_about = "
RelayConsole - operator console with a single-peer reverse listener

Commands at the prompt: help, shell, reverse <port>, put <target> <user>,
get <target> <user>, history, exit.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  RELAYCONSOLE_BIND_HOST        - Listener bind host (e.g., 0.0.0.0)
  RELAYCONSOLE_BACKLOG          - Listen backlog (at least 5)
  RELAYCONSOLE_POLL_INTERVAL    - Accept wait granularity (e.g., 1s, 250ms)
  RELAYCONSOLE_READ_CHUNK_SIZE  - Peer read size in bytes
  RELAYCONSOLE_ACTIVITY_LOG     - Activity log file
  RELAYCONSOLE_HISTORY_FILE     - Command history file
  RELAYCONSOLE_SSH_PORT         - SSH port for put/get
  RELAYCONSOLE_LOG_LEVEL        - Diagnostics level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "relayconsole.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Diagnostics log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Listener bind host (overrides config file)
    #[arg(short, long, help = "Listener bind host (e.g., 127.0.0.1)")]
    pub bind_host: Option<String>,

    /// Activity log path (overrides config file)
    #[arg(long, help = "Activity log file")]
    pub activity_log: Option<PathBuf>,

    /// History file path (overrides config file)
    #[arg(long, help = "Command history file")]
    pub history_file: Option<PathBuf>,

    /// Do not print the banner
    #[arg(long, help = "Do not print the banner")]
    pub no_banner: bool,

    /// Run a single reverse session on PORT and exit
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(u16).range(1..),
        help = "Run one reverse listener session on PORT and exit"
    )]
    pub listen: Option<u16>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

impl CliArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            bind_host: self.bind_host.clone(),
            activity_log: self.activity_log.clone(),
            history_file: self.history_file.clone(),
            log_level: self.log_level.clone(),
            no_banner: self.no_banner,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    config.merge_with_cli_args(&args.overrides());

    config
        .validate()
        .context("Final configuration validation failed")?;

    init_tracing(&args, &config)?;

    info!("Starting RelayConsole v{}", env!("CARGO_PKG_VERSION"));

    if args.validate_config {
        print_summary(&config);
        return Ok(());
    }

    let activity = if config.console.activity_log_enabled {
        ActivityLog::open(&config.console.activity_log)?
    } else {
        ActivityLog::disabled()
    };

    let mut interrupts = InterruptCoordinator::new();
    interrupts
        .listen_for_signals()
        .context("Failed to install interrupt handlers")?;

    let input = OperatorInput::from_stdin();
    let mut console = Console::new(config, input, tokio::io::stdout(), activity, interrupts)?;

    match args.listen {
        Some(port) => {
            console.reverse(port).await?;
        }
        None => console.run().await?,
    }

    info!("RelayConsole finished");
    Ok(())
}

fn print_summary(config: &Config) {
    println!("Configuration is valid");
    println!("  Bind host: {}", config.listener.bind_host);
    println!("  Backlog: {}", config.listener.backlog);
    println!(
        "  Accept poll interval: {}",
        humantime::format_duration(config.listener.accept_poll_interval)
    );
    println!("  Read chunk size: {} bytes", config.listener.read_chunk_size);
    println!(
        "  Activity log: {}",
        if config.console.activity_log_enabled {
            config.console.activity_log.display().to_string()
        } else {
            "disabled".to_string()
        }
    );
    println!("  History file: {}", config.console.history_file.display());
    println!("  SSH port: {}", config.transfer.ssh_port);
}

/// Initialize tracing/logging
///
/// Diagnostics go to stderr; stdout carries relayed peer output.
fn init_tracing(args: &CliArgs, config: &Config) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
