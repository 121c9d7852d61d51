//! Raw per-run JSON-lines logging under `<project>/.ralph/logs/`.
//!
//! This is the "engine-owned format" the spec's filesystem layout names
//! (§6) without prescribing a schema; one line per event, newest last,
//! so a tail-f gives a readable run history independent of any event sink
//! a caller plugged in.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::events::{Event, EventSink};

/// Appends one JSON object per event to `<logs_dir>/<session_id>.jsonl`.
pub struct FileEventLogger {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl FileEventLogger {
    pub fn open(logs_dir: &Path, session_id: &str) -> Result<Self> {
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("failed to create log directory {}", logs_dir.display()))?;
        let path = logs_dir.join(format!("{session_id}.jsonl"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for FileEventLogger {
    fn emit(&self, event: Event) {
        let line = serde_json::json!({
            "ts": Utc::now().to_rfc3339(),
            "event": event.to_string(),
        });
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
        }
    }
}
