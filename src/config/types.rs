//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub console: ConsoleConfig,
    pub listener: ListenerConfig,
    pub transfer: TransferConfig,
    pub logging: LoggingConfig,
}

/// Interactive console configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub prompt: String,
    pub show_banner: bool,
    pub history_file: PathBuf,
    pub history_limit: usize,
    pub activity_log: PathBuf,
    pub activity_log_enabled: bool,
}

/// Reverse listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub bind_host: IpAddr,
    pub backlog: u32,
    /// Upper bound on a single accept wait; cancellation is observed between waits
    #[serde(with = "humantime_serde")]
    pub accept_poll_interval: Duration,
    pub read_chunk_size: usize,
    #[serde(with = "humantime_serde")]
    pub worker_shutdown_timeout: Duration,
}

/// SSH/SFTP transfer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransferConfig {
    pub ssh_port: u16,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

/// Diagnostics configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            console: ConsoleConfig::default(),
            listener: ListenerConfig::default(),
            transfer: TransferConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            prompt: "relay> ".to_string(),
            show_banner: true,
            history_file: PathBuf::from(".relayconsole.hist"),
            history_limit: 1000,
            activity_log: PathBuf::from("relayconsole.log"),
            activity_log_enabled: true,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            backlog: 5,
            accept_poll_interval: Duration::from_secs(1),
            read_chunk_size: 4096,
            worker_shutdown_timeout: Duration::from_secs(2),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            ssh_port: 22,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
