//! Atomic JSON persistence for a [`super::TaskList`].

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::TaskList;

pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the task list. A missing or empty file yields an empty list.
    pub fn load(&self) -> Result<TaskList> {
        if !self.path.exists() {
            return Ok(TaskList::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(TaskList::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", self.path.display()))
    }

    /// Persist the task list via write-to-temp-then-rename, so a reader
    /// never observes a partially written document.
    pub fn save(&self, list: &TaskList) -> Result<()> {
        write_atomic(&self.path, serde_json::to_string_pretty(list)?.as_bytes())
    }
}

pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().context("store path has no parent directory")?;
    std::fs::create_dir_all(dir)?;
    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("store"),
        std::process::id()
    ));
    std::fs::write(&tmp_path, content)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename into {}", path.display()))?;
    Ok(())
}
