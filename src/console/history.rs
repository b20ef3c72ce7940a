//! Command History

use anyhow::Context;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::Result;

/// Bounded list of entered commands backed by a file
#[derive(Debug)]
pub struct History {
    path: PathBuf,
    limit: usize,
    entries: VecDeque<String>,
}

impl History {
    /// Load history from `path`; a missing file yields an empty history
    pub fn load(path: &Path, limit: usize) -> Result<Self> {
        let mut history = Self {
            path: path.to_path_buf(),
            limit: limit.max(1),
            entries: VecDeque::new(),
        };

        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read history file: {}", path.display()))?;
            for line in content.lines() {
                history.push(line);
            }
            debug!("Loaded {} history entries from {}", history.len(), path.display());
        }

        Ok(history)
    }

    /// Record a command; blank lines are ignored
    pub fn push(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_string());
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write all entries to the history file, one per line
    pub fn save(&self) -> Result<()> {
        let mut content = String::new();
        for entry in &self.entries {
            content.push_str(entry);
            content.push('\n');
        }
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write history file: {}", self.path.display()))
    }
}
