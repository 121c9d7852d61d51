//! Session Context + Store (C5): per-session state, checkpointed on every
//! transition, reloaded on resume.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::verification::{ProjectAnalysis, TestOutcome};

pub use store::SessionStore;

/// A timestamp-based opaque session id (spec §4.5), with a counter suffix
/// so two sessions started within the same second stay distinct.
pub fn generate_session_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("s-{}-{n:04}", Utc::now().format("%Y%m%d%H%M%S%3f"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    Aborting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub id: String,
    pub project_dir: std::path::PathBuf,
    pub agent_name: String,
    pub model: String,
    pub state: SessionState,
    #[serde(default)]
    pub current_task_id: Option<String>,
    /// Per-task attempt counter, keyed by task id (how many `NEXT`
    /// continuations have been spent on the current task).
    #[serde(default)]
    pub attempts: BTreeMap<String, u32>,
    #[serde(default)]
    pub event_counter: u64,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(default)]
    pub analysis: ProjectAnalysis,
    #[serde(default)]
    pub test_baseline: BTreeMap<String, TestOutcome>,
    #[serde(default)]
    pub fail_reason: Option<String>,
}

impl SessionContext {
    pub fn new(id: impl Into<String>, project_dir: std::path::PathBuf, agent_name: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            project_dir,
            agent_name: agent_name.into(),
            model: model.into(),
            state: SessionState::Idle,
            current_task_id: None,
            attempts: BTreeMap::new(),
            event_counter: 0,
            started_at: now,
            last_activity_at: now,
            analysis: ProjectAnalysis::default(),
            test_baseline: BTreeMap::new(),
            fail_reason: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    pub fn next_event_id(&mut self) -> u64 {
        self.event_counter += 1;
        self.event_counter
    }

    pub fn attempts_for(&self, task_id: &str) -> u32 {
        self.attempts.get(task_id).copied().unwrap_or(0)
    }

    pub fn increment_attempts(&mut self, task_id: &str) -> u32 {
        let entry = self.attempts.entry(task_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn reset_attempts(&mut self, task_id: &str) {
        self.attempts.remove(task_id);
    }
}
