use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Append-only prompt history backed by a plain text file, one entry per
/// line, newest last. Up/Down recall walks the in-memory copy.
#[derive(Debug)]
pub struct PromptHistory {
    path: PathBuf,
    entries: Vec<String>,
    cursor: Option<usize>,
}

impl PromptHistory {
    pub fn default_path() -> Result<PathBuf> {
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join("llm-term").join("history.txt"))
    }

    /// Load existing history; a missing file yields an empty history.
    pub fn load(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            fs::read_to_string(&path)?
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            entries,
            cursor: None,
        })
    }

    /// Record an accepted prompt, appending it to the backing file.
    pub fn append(&mut self, line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;

        self.entries.push(line.to_string());
        self.cursor = None;
        Ok(())
    }

    /// Recall the previous (older) entry, entering recall mode if needed.
    pub fn prev(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let next_cursor = match self.cursor {
            None => self.entries.len() - 1,
            Some(0) => 0,
            Some(i) => i - 1,
        };
        self.cursor = Some(next_cursor);
        self.entries.get(next_cursor).map(String::as_str)
    }

    /// Recall the next (newer) entry; `None` means past the newest entry,
    /// and the caller should restore whatever the user was typing.
    pub fn next(&mut self) -> Option<&str> {
        let i = self.cursor?;
        if i + 1 < self.entries.len() {
            self.cursor = Some(i + 1);
            self.entries.get(i + 1).map(String::as_str)
        } else {
            self.cursor = None;
            None
        }
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    pub fn is_recalling(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
