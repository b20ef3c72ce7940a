//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "RELAYCONSOLE_";

const MIN_BACKLOG: u32 = 5;
const MAX_READ_CHUNK: usize = 1024 * 1024;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        Self::load_from_vars(|key| std::env::var(key).ok())
    }

    /// Load defaults and apply overrides from an arbitrary variable source
    pub fn load_from_vars<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(host) = var("BIND_HOST") {
            config.listener.bind_host = host
                .parse::<IpAddr>()
                .with_context(|| format!("Invalid {}BIND_HOST: {}", ENV_PREFIX, host))?;
        }

        if let Some(backlog) = var("BACKLOG") {
            config.listener.backlog = backlog
                .parse::<u32>()
                .with_context(|| format!("Invalid {}BACKLOG: {}", ENV_PREFIX, backlog))?;
        }

        if let Some(interval) = var("POLL_INTERVAL") {
            config.listener.accept_poll_interval = humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid {}POLL_INTERVAL: {}", ENV_PREFIX, interval))?;
        }

        if let Some(chunk) = var("READ_CHUNK_SIZE") {
            config.listener.read_chunk_size = chunk
                .parse::<usize>()
                .with_context(|| format!("Invalid {}READ_CHUNK_SIZE: {}", ENV_PREFIX, chunk))?;
        }

        if let Some(path) = var("ACTIVITY_LOG") {
            config.console.activity_log = PathBuf::from(path);
        }

        if let Some(path) = var("HISTORY_FILE") {
            config.console.history_file = PathBuf::from(path);
        }

        if let Some(level) = var("LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(port) = var("SSH_PORT") {
            config.transfer.ssh_port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid {}SSH_PORT: {}", ENV_PREFIX, port))?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Values from the command line that take precedence over file and environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind_host: Option<String>,
    pub activity_log: Option<PathBuf>,
    pub history_file: Option<PathBuf>,
    pub log_level: Option<String>,
    pub no_banner: bool,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_console_config()
            .with_context(|| "Console configuration validation failed")?;

        self.validate_listener_config()
            .with_context(|| "Listener configuration validation failed")?;

        self.validate_transfer_config()
            .with_context(|| "Transfer configuration validation failed")?;

        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        Ok(())
    }

    fn validate_console_config(&self) -> Result<()> {
        if self.console.activity_log_enabled && self.console.activity_log.as_os_str().is_empty() {
            bail!("activity_log must be set when activity_log_enabled is true");
        }

        if self.console.history_file.as_os_str().is_empty() {
            bail!("history_file must not be empty");
        }

        if self.console.history_limit == 0 {
            bail!("history_limit must be greater than 0");
        }

        Ok(())
    }

    fn validate_listener_config(&self) -> Result<()> {
        if self.listener.backlog < MIN_BACKLOG {
            bail!("backlog must be at least {}", MIN_BACKLOG);
        }

        let interval = self.listener.accept_poll_interval;
        if interval.as_millis() < 10 {
            bail!("accept_poll_interval must be at least 10ms");
        }

        if interval.as_secs() > 60 {
            bail!("accept_poll_interval cannot exceed 60 seconds");
        }

        if self.listener.read_chunk_size == 0 {
            bail!("read_chunk_size must be greater than 0");
        }

        if self.listener.read_chunk_size > MAX_READ_CHUNK {
            bail!("read_chunk_size cannot exceed 1MB");
        }

        Ok(())
    }

    fn validate_transfer_config(&self) -> Result<()> {
        if self.transfer.ssh_port == 0 {
            bail!("ssh_port must be greater than 0");
        }

        if self.transfer.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }

        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            bail!("logging.level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(&mut self, overrides: &CliOverrides) {
        if let Some(host) = overrides.bind_host.as_deref() {
            if let Ok(addr) = host.parse::<IpAddr>() {
                self.listener.bind_host = addr;
                tracing::info!("CLI override: bind host set to {}", addr);
            } else {
                tracing::warn!("Invalid bind host provided: {}", host);
            }
        }

        if let Some(path) = &overrides.activity_log {
            self.console.activity_log = path.clone();
            tracing::info!("CLI override: activity log set to {}", path.display());
        }

        if let Some(path) = &overrides.history_file {
            self.console.history_file = path.clone();
            tracing::info!("CLI override: history file set to {}", path.display());
        }

        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
            tracing::info!("CLI override: log level set to {}", level);
        }

        if overrides.no_banner {
            self.console.show_banner = false;
        }
    }
}
