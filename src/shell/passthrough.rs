//! Local Shell Passthrough

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::activity::ActivityLog;

/// One line typed in shell mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Empty,
    Exit,
    ChangeDirectory(String),
    Clear,
    Run(String),
}

impl ShellCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let lower = line.to_lowercase();

        if line.is_empty() {
            ShellCommand::Empty
        } else if lower == "exit" {
            ShellCommand::Exit
        } else if lower == "cd" || lower.starts_with("cd ") {
            ShellCommand::ChangeDirectory(line.get(2..).unwrap_or("").trim().to_string())
        } else if lower == "clear" || lower == "cls" {
            ShellCommand::Clear
        } else {
            ShellCommand::Run(line.to_string())
        }
    }
}

/// Result of a `cd`: the new working directory or an operator-facing message
pub type DirectoryChange = std::result::Result<PathBuf, String>;

/// Captured output of a local command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
}

/// Executes local commands and tracks the working directory
#[derive(Debug, Clone)]
pub struct LocalShell {
    activity: ActivityLog,
}

impl LocalShell {
    pub fn new(activity: ActivityLog) -> Self {
        Self { activity }
    }

    /// Change the process working directory
    ///
    /// An empty argument changes to the home directory.
    pub fn change_directory(&self, raw: &str) -> DirectoryChange {
        let target = if raw.is_empty() {
            expand_home("~")
        } else {
            expand_home(raw)
        };
        let shown = target.display().to_string();

        let result = if target.exists() && !target.is_dir() {
            Err(format!("{}: Not a directory", shown))
        } else {
            std::env::set_current_dir(&target)
                .map_err(|e| directory_error_message(&shown, &e))
                .and_then(|()| {
                    std::env::current_dir().map_err(|e| format!("An error occurred: {}", e))
                })
        };

        match &result {
            Ok(cwd) => self
                .activity
                .success(format!("Changed directory to {}", cwd.display())),
            Err(message) => self.activity.error(message.clone()),
        }

        result
    }

    /// Clear the terminal using the platform's mechanism
    pub async fn clear_screen(&self) {
        let mut command = platform_clear();
        match command.status().await {
            Ok(status) if status.success() => self.activity.success("Screen cleared"),
            Ok(status) => warn!("Clear command exited with {}", status),
            Err(e) => warn!("Failed to clear screen: {}", e),
        }
    }

    /// Run `line` through the platform shell and capture its output
    pub async fn execute(&self, line: &str) -> std::result::Result<CommandOutput, String> {
        debug!("Executing local command: {}", line);

        let output = platform_shell(line)
            // Operator input belongs to the console's reader thread
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) => {
                self.activity.success(format!("Executed command: {}", line));
                Ok(CommandOutput {
                    stdout: output.stdout,
                    stderr: output.stderr,
                    exit_code: output.status.code(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let message = format!("{}: command not found", line);
                self.activity.error(message.clone());
                Err(message)
            }
            Err(e) => {
                let message = format!("Unknown error during command execution: {}", e);
                self.activity.error(message.clone());
                Err(message)
            }
        }
    }
}

/// Expand a leading `~` to the operator's home directory
pub fn expand_home(raw: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (raw, home) {
        ("~", Some(home)) => home,
        (path, Some(home)) if path.starts_with("~/") => home.join(&path[2..]),
        (path, _) => Path::new(path).to_path_buf(),
    }
}

fn directory_error_message(shown: &str, e: &io::Error) -> String {
    match e.kind() {
        io::ErrorKind::NotFound => format!("{}: No such file or directory", shown),
        io::ErrorKind::PermissionDenied => format!("{}: Permission denied", shown),
        _ => format!("An error occurred: {}", e),
    }
}

#[cfg(unix)]
fn platform_shell(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(windows)]
fn platform_shell(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

#[cfg(unix)]
fn platform_clear() -> Command {
    Command::new("clear")
}

#[cfg(windows)]
fn platform_clear() -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg("cls");
    command
}
