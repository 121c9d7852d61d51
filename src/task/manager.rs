//! In-memory operations over a [`super::TaskList`], backed by a [`super::TaskStore`].

use anyhow::{bail, Result};
use chrono::Utc;

use super::{Task, TaskList, TaskStatus, TaskStore};

pub struct TaskManager {
    store: TaskStore,
    list: TaskList,
}

impl TaskManager {
    /// Load the task list from `store`.
    pub fn load(store: TaskStore) -> Result<Self> {
        let list = store.load()?;
        Ok(Self { store, list })
    }

    /// Append a task, assigning it the next ordinal. Returns the new task's id.
    pub fn add(&mut self, title: impl Into<String>, body: impl Into<String>) -> Result<String> {
        let ordinal = self.list.tasks.iter().map(|t| t.ordinal).max().map_or(0, |m| m + 1);
        let task = Task::new(title, body, ordinal);
        let id = task.id.clone();
        self.list.tasks.push(task);
        self.save()?;
        Ok(id)
    }

    /// Append a pre-built task (used by import), assigning it the next
    /// ordinal and preserving its requested status.
    pub fn add_task(&mut self, mut task: Task) -> Result<String> {
        let ordinal = self.list.tasks.iter().map(|t| t.ordinal).max().map_or(0, |m| m + 1);
        task.ordinal = ordinal;
        let id = task.id.clone();
        if self.list.tasks.iter().any(|t| t.id == id) {
            bail!("duplicate task id '{id}'");
        }
        self.list.tasks.push(task);
        self.save()?;
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.list.tasks.iter().find(|t| t.id == id)
    }

    /// The first `Pending` task in ordinal order, if any.
    pub fn next_pending(&self) -> Option<&Task> {
        self.list
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .min_by_key(|t| t.ordinal)
    }

    /// Move `id` to `status`, enforcing the transition lattice and
    /// persisting the result. Also stamps `started_at`/`completed_at`.
    pub fn set_status(&mut self, id: &str, status: TaskStatus) -> Result<()> {
        let task = self
            .list
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| anyhow::anyhow!("unknown task id '{id}'"))?;

        if !task.status.can_transition_to(status) {
            bail!(
                "illegal task transition {:?} -> {:?} for task '{id}'",
                task.status,
                status
            );
        }

        let now = Utc::now();
        match status {
            TaskStatus::Running => task.started_at = Some(now),
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Skipped => {
                task.completed_at = Some(now)
            }
            TaskStatus::Pending => {
                task.started_at = None;
                task.completed_at = None;
            }
        }
        task.status = status;
        self.save()
    }

    /// Reset a terminal task to `Pending`, bumping its retry counter. This
    /// is the one legal way a terminal status reverts (spec invariant 2).
    pub fn retry(&mut self, id: &str) -> Result<()> {
        let task = self
            .list
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| anyhow::anyhow!("unknown task id '{id}'"))?;
        if !task.status.is_terminal() {
            bail!("task '{id}' is not in a terminal status, cannot retry");
        }
        task.status = TaskStatus::Pending;
        task.retry_count += 1;
        task.started_at = None;
        task.completed_at = None;
        self.save()
    }

    pub fn increment_retry(&mut self, id: &str) -> Result<()> {
        let task = self
            .list
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| anyhow::anyhow!("unknown task id '{id}'"))?;
        task.retry_count += 1;
        self.save()
    }

    pub fn set_session_id(&mut self, id: &str, session_id: impl Into<String>) -> Result<()> {
        let task = self
            .list
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| anyhow::anyhow!("unknown task id '{id}'"))?;
        task.session_id = Some(session_id.into());
        self.save()
    }

    pub fn all(&self) -> &[Task] {
        &self.list.tasks
    }

    pub fn save(&self) -> Result<()> {
        self.store.save(&self.list)
    }
}
