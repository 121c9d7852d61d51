//! Task model, manager, store, and import formats (C3).

pub mod import;
pub mod manager;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

pub use manager::TaskManager;
pub use store::TaskStore;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Lifecycle status of a [`Task`]. Terminal statuses (`Done`, `Failed`,
/// `Skipped`) never revert except through an explicit retry, which resets
/// to `Pending` and bumps `retry_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// Whether a transition from `self` to `next` is allowed by the
    /// lattice `Pending <-> Running -> {Done, Failed, Skipped}`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Pending)
                | (Running, Done)
                | (Running, Failed)
                | (Running, Skipped)
                | (Pending, Skipped)
                | (Pending, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed | TaskStatus::Skipped)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub ordinal: u64,
    pub status: TaskStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Free-text bookkeeping, never consulted by the state machine.
    #[serde(default)]
    pub notes: Option<String>,
}

impl Task {
    pub fn new(title: impl Into<String>, body: impl Into<String>, ordinal: u64) -> Self {
        Self {
            id: generate_id(),
            title: title.into(),
            body: body.into(),
            ordinal,
            status: TaskStatus::Pending,
            retry_count: 0,
            session_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            parent_id: None,
            notes: None,
        }
    }
}

/// A document of tasks, backed by `tasks.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskList {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Generate a stable, human-scannable task id: `t-` followed by a hex
/// digest of a monotonic counter plus a timestamp, collision-avoided by the
/// counter rather than relying on timestamp resolution alone.
fn generate_id() -> String {
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(Utc::now().timestamp_nanos_opt().unwrap_or(0).to_le_bytes());
    hasher.update(counter.to_le_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    format!("t-{hex}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(a.starts_with("t-"));
    }

    #[test]
    fn transition_lattice_allows_pending_to_running() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
    }

    #[test]
    fn transition_lattice_rejects_done_to_pending() {
        assert!(!TaskStatus::Done.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn terminal_statuses_are_terminal() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn new_task_starts_pending() {
        let task = Task::new("title", "body", 0);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
    }
}
