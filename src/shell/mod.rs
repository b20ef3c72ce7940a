//! Local Shell Passthrough Module
//!
//! Runs operator lines on the local machine while the console is in shell mode.

pub mod passthrough;

pub use passthrough::{expand_home, CommandOutput, DirectoryChange, LocalShell, ShellCommand};
