//! Activity Log

use chrono::{DateTime, Local};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::Result;
use anyhow::Context;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Severity of an activity log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Info => "Info",
            Status::Success => "Success",
            Status::Warning => "Warning",
            Status::Error => "Error",
        };
        f.write_str(label)
    }
}

/// One immutable log record
#[derive(Debug, Clone)]
pub struct ActivityLogEntry {
    pub timestamp: DateTime<Local>,
    pub status: Status,
    pub message: String,
}

impl ActivityLogEntry {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for ActivityLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.status,
            self.message
        )
    }
}

/// Shared handle to the activity log file
///
/// Cloning is cheap; all clones append to the same file. Each call to
/// [`ActivityLog::record`] writes one complete line under a lock, so entries
/// from different call sites never interleave.
#[derive(Clone)]
pub struct ActivityLog {
    sink: Option<Arc<Mutex<File>>>,
    path: Option<PathBuf>,
}

impl ActivityLog {
    /// Open (or create) the log file in append mode
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open activity log: {}", path.display()))?;

        debug!("Activity log opened at {}", path.display());

        Ok(Self {
            sink: Some(Arc::new(Mutex::new(file))),
            path: Some(path.to_path_buf()),
        })
    }

    /// A log that accepts entries and drops them
    pub fn disabled() -> Self {
        Self {
            sink: None,
            path: None,
        }
    }

    /// Location of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append an entry; write failures are reported and swallowed
    pub fn record(&self, status: Status, message: impl Into<String>) {
        let entry = ActivityLogEntry::new(status, message);

        match entry.status {
            Status::Info | Status::Success => info!(status = %entry.status, "{}", entry.message),
            Status::Warning => warn!(status = %entry.status, "{}", entry.message),
            Status::Error => error!(status = %entry.status, "{}", entry.message),
        }

        if let Err(e) = self.append(&entry) {
            eprintln!("Logging error: {}", e);
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(Status::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.record(Status::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.record(Status::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(Status::Error, message);
    }

    fn append(&self, entry: &ActivityLogEntry) -> std::io::Result<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };

        let line = format!("{}\n", entry);
        let mut file = sink
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "activity log lock poisoned"))?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

impl fmt::Debug for ActivityLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityLog").field("path", &self.path).finish()
    }
}
