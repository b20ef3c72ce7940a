//! RelayConsole Library
//! 
//! Operator console built around a single-peer reverse listener: it accepts
//! one inbound connection, relays the peer's output to the operator and the
//! operator's keystrokes back, and stays cancellable until a peer arrives.
//! Local shell passthrough and SFTP transfers round out the console.

pub mod activity;
pub mod config;
pub mod console;
pub mod error;
pub mod relay;
pub mod shell;
pub mod shutdown;
pub mod transfer;

pub use activity::ActivityLog;
pub use config::Config;
pub use console::Console;
pub use relay::{OperatorInput, RelayEngine};
pub use shutdown::{Interrupt, InterruptCoordinator, InterruptNotifier};

/// Common error type for the console
pub type Result<T> = anyhow::Result<T>;
