//! Loop Engine (C6): the state machine that drives the Task Manager
//! through the Agent, gating on the Verification Gate, persisting via the
//! Session Store, emitting events, and honoring the Control Channel.

pub mod prompt;

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, InvokeOpts, StatusMarker};
use crate::config::Config;
use crate::control::{ControlMessage, ControlReceiver};
use crate::events::{Event, EventSink, RawOutputSink};
use crate::hooks;
use crate::session::{SessionContext, SessionState, SessionStore};
use crate::task::{Task, TaskManager, TaskStatus};
use crate::verification::{self, GateResult};
use prompt::PromptBuilder;

/// Iteration guard: maximum `NEXT` continuations spent on one task, and
/// (reusing the same default, per the spec's "its retry cap" wording for
/// verification-failure retries) the cap on retry-after-verification-
/// failure attempts too.
pub const ITERATION_CAP: u32 = 10;

/// Per-task outcome after classifying one agent invocation (spec §4.6 step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    SucceededAfterFix,
    NeedsAnotherTurn,
    AgentError(String),
    VerificationFailed(Vec<String>),
}

/// Classify a raw invocation result into a task outcome (spec §4.6 step 4,
/// testable invariant 5: status-marker precedence).
pub fn classify(result: &crate::agent::InvocationResult) -> TaskOutcome {
    if result.exit_code != 0 {
        return TaskOutcome::AgentError(
            result
                .error
                .clone()
                .unwrap_or_else(|| format!("process exited with status {}", result.exit_code)),
        );
    }

    match result.status {
        StatusMarker::Done => TaskOutcome::Succeeded,
        StatusMarker::Fixed => TaskOutcome::SucceededAfterFix,
        StatusMarker::Next => TaskOutcome::NeedsAnotherTurn,
        StatusMarker::Error => {
            TaskOutcome::AgentError(last_lines(&result.stdout, 5))
        }
        StatusMarker::Unknown => TaskOutcome::Succeeded,
    }
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

pub struct Engine {
    config: Config,
    project_root: std::path::PathBuf,
    agent: Arc<dyn Agent>,
    tasks: TaskManager,
    session_store: SessionStore,
    ctx: SessionContext,
    events: Arc<dyn EventSink>,
    raw_output: Option<Arc<dyn RawOutputSink>>,
    control: ControlReceiver,
    cancel: CancellationToken,
    /// Set when a task-scoped `Skip` arrives mid-invocation; consumed at
    /// the next checkpoint.
    pending_skip: Option<Option<String>>,
    pending_pause: bool,
    /// Maximum tasks to complete this invocation (`ralph run --limit`/
    /// `--once`); `None` means run until the task list is exhausted.
    task_limit: Option<u32>,
    tasks_completed: u32,
}

pub struct EngineBuilder {
    config: Config,
    project_root: std::path::PathBuf,
    agent: Arc<dyn Agent>,
    tasks: TaskManager,
    session_store: SessionStore,
    events: Arc<dyn EventSink>,
    raw_output: Option<Arc<dyn RawOutputSink>>,
    control: ControlReceiver,
    task_limit: Option<u32>,
    analysis: Option<crate::verification::ProjectAnalysis>,
}

impl EngineBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        project_root: std::path::PathBuf,
        agent: Arc<dyn Agent>,
        tasks: TaskManager,
        session_store: SessionStore,
        events: Arc<dyn EventSink>,
        control: ControlReceiver,
    ) -> Self {
        Self {
            config,
            project_root,
            agent,
            tasks,
            session_store,
            events,
            raw_output: None,
            control,
            task_limit: None,
            analysis: None,
        }
    }

    pub fn with_raw_output(mut self, sink: Arc<dyn RawOutputSink>) -> Self {
        self.raw_output = Some(sink);
        self
    }

    /// Cap the number of tasks completed this invocation. Once reached, the
    /// engine transitions to `Paused` and returns without blocking on the
    /// control channel, so a one-shot CLI call exits instead of hanging.
    pub fn with_task_limit(mut self, limit: Option<u32>) -> Self {
        self.task_limit = limit;
        self
    }

    /// Seed a fresh session's project analysis (spec's greenfield/has-tests
    /// cache). No effect on `resume`, where the persisted analysis wins.
    pub fn with_analysis(mut self, analysis: crate::verification::ProjectAnalysis) -> Self {
        self.analysis = Some(analysis);
        self
    }

    /// Start a fresh session.
    pub fn start(self, session_id: impl Into<String>, model: impl Into<String>) -> Engine {
        let mut ctx = SessionContext::new(
            session_id,
            self.project_root.clone(),
            self.agent.name(),
            model,
        );
        if let Some(analysis) = self.analysis {
            ctx.analysis = analysis;
        }
        Engine {
            config: self.config,
            project_root: self.project_root,
            agent: self.agent,
            tasks: self.tasks,
            session_store: self.session_store,
            ctx,
            events: self.events,
            raw_output: self.raw_output,
            control: self.control,
            cancel: CancellationToken::new(),
            pending_skip: None,
            pending_pause: false,
            task_limit: self.task_limit,
            tasks_completed: 0,
        }
    }

    /// Resume from a persisted session document.
    pub fn resume(self, ctx: SessionContext) -> Engine {
        Engine {
            config: self.config,
            project_root: self.project_root,
            agent: self.agent,
            tasks: self.tasks,
            session_store: self.session_store,
            ctx,
            events: self.events,
            raw_output: self.raw_output,
            control: self.control,
            cancel: CancellationToken::new(),
            pending_skip: None,
            pending_pause: false,
            task_limit: self.task_limit,
            tasks_completed: 0,
        }
    }
}

impl Engine {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn emit(&self, event: Event) {
        self.events.emit(event);
    }

    fn persist(&mut self) -> Result<()> {
        self.ctx.touch();
        self.session_store.save(&self.ctx)
    }

    /// Drive the state machine to a terminal state (Completed or Failed).
    pub async fn run(mut self) -> Result<SessionState> {
        let starting_fresh = self.ctx.state == SessionState::Idle;
        self.ctx.state = SessionState::Running;
        if starting_fresh {
            self.emit(Event::SessionStarted {
                session_id: self.ctx.id.clone(),
            });
        }
        self.persist()?;

        loop {
            if self.cancel.is_cancelled() {
                return self.abort("cancelled".to_string()).await;
            }

            // Checkpoint: before selecting the next task.
            if let Some(outcome) = self.check_control().await? {
                return Ok(outcome);
            }

            let Some(task_id) = self.tasks.next_pending().map(|t| t.id.clone()) else {
                let all_tasks = self.tasks.all();
                let all_failed =
                    !all_tasks.is_empty() && all_tasks.iter().all(|t| t.status == TaskStatus::Failed);
                if all_failed {
                    self.ctx.state = SessionState::Failed;
                    self.ctx.fail_reason = Some("all tasks failed".to_string());
                    self.persist()?;
                    self.emit(Event::SessionFailed {
                        reason: "all tasks failed".to_string(),
                    });
                    return Ok(SessionState::Failed);
                }
                self.ctx.state = SessionState::Completed;
                self.persist()?;
                self.emit(Event::SessionCompleted);
                return Ok(SessionState::Completed);
            };

            match self.run_task(&task_id).await {
                Ok(()) => {}
                Err(e) => {
                    self.ctx.state = SessionState::Failed;
                    self.ctx.fail_reason = Some(e.to_string());
                    self.persist()?;
                    self.emit(Event::SessionFailed {
                        reason: e.to_string(),
                    });
                    return Ok(SessionState::Failed);
                }
            }

            if let Some(limit) = self.task_limit {
                self.tasks_completed += 1;
                if self.tasks_completed >= limit {
                    self.ctx.state = SessionState::Paused;
                    self.persist()?;
                    self.emit(Event::Paused);
                    return Ok(SessionState::Paused);
                }
            }

            // Checkpoint: after the verification gate.
            if let Some(outcome) = self.check_control().await? {
                return Ok(outcome);
            }
        }
    }

    /// Process control messages at a checkpoint. Returns `Some(state)` if
    /// the engine should stop (Paused handling loops internally until
    /// Resume/Abort; only Aborting/Failed bubbles up early).
    async fn check_control(&mut self) -> Result<Option<SessionState>> {
        for msg in self.control.drain() {
            self.apply_control(msg);
        }

        if self.pending_pause {
            self.pending_pause = false;
            self.ctx.state = SessionState::Paused;
            self.persist()?;
            self.emit(Event::Paused);

            loop {
                match self.control.recv().await {
                    Some(ControlMessage::Resume) => {
                        self.ctx.state = SessionState::Running;
                        self.persist()?;
                        self.emit(Event::Resumed);
                        return Ok(None);
                    }
                    Some(ControlMessage::Abort(reason)) => {
                        return Ok(Some(self.abort(reason).await?));
                    }
                    Some(_) => continue,
                    None => return Ok(Some(self.abort("control channel closed".to_string()).await?)),
                }
            }
        }

        Ok(None)
    }

    fn apply_control(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::Pause => self.pending_pause = true,
            ControlMessage::Resume => {
                // Illegal outside Paused; silently ignored here since this
                // path only runs while Running (resume is handled inside
                // the Paused wait loop above).
            }
            ControlMessage::Skip(task_id) => self.pending_skip = Some(task_id),
            ControlMessage::Abort(reason) => self.cancel_with_reason(reason),
        }
    }

    fn cancel_with_reason(&mut self, reason: String) {
        self.ctx.fail_reason = Some(reason);
        self.cancel.cancel();
    }

    async fn abort(&mut self, reason: String) -> Result<SessionState> {
        self.ctx.state = SessionState::Aborting;
        self.cancel.cancel();
        self.persist()?;
        self.ctx.state = SessionState::Failed;
        self.ctx.fail_reason = Some(reason.clone());
        self.persist()?;
        self.emit(Event::Aborted {
            reason: reason.clone(),
        });
        Ok(SessionState::Failed)
    }

    /// Run one task to a terminal per-task status, looping internally over
    /// `NeedsAnotherTurn` continuations up to `ITERATION_CAP`.
    async fn run_task(&mut self, task_id: &str) -> Result<()> {
        self.tasks.set_status(task_id, TaskStatus::Running)?;
        self.ctx.current_task_id = Some(task_id.to_string());
        let title = self
            .tasks
            .get(task_id)
            .map(|t| t.title.clone())
            .unwrap_or_default();
        self.emit(Event::TaskStarted {
            task_id: task_id.to_string(),
            title,
        });

        loop {
            if let Some(skip) = self.take_matching_skip(task_id) {
                let _ = skip;
                self.tasks.set_status(task_id, TaskStatus::Skipped)?;
                self.ctx.reset_attempts(task_id);
                self.persist()?;
                self.emit(Event::TaskCompleted {
                    task_id: task_id.to_string(),
                    outcome: "Skipped".to_string(),
                });
                return Ok(());
            }

            let task = self
                .tasks
                .get(task_id)
                .ok_or_else(|| anyhow::anyhow!("task '{task_id}' disappeared from the store"))?
                .clone();

            self.run_pre_task_hooks(task_id).await;
            let outcome = self.invoke_and_classify(&task).await?;

            // A Skip of the running task cancels the in-flight invocation
            // (spec §4.6); the skip takes precedence over whatever the
            // interrupted invocation classified to.
            if self.take_matching_skip(task_id).is_some() {
                self.tasks.set_status(task_id, TaskStatus::Skipped)?;
                self.ctx.reset_attempts(task_id);
                self.persist()?;
                self.emit(Event::TaskCompleted {
                    task_id: task_id.to_string(),
                    outcome: "Skipped".to_string(),
                });
                return Ok(());
            }

            match outcome {
                TaskOutcome::NeedsAnotherTurn => {
                    let attempts = self.ctx.increment_attempts(task_id);
                    self.persist()?;
                    if attempts >= ITERATION_CAP {
                        self.finish_task(task_id, TaskStatus::Failed, "NeedsAnotherTurn (cap exceeded)").await?;
                        return Ok(());
                    }
                    continue;
                }
                TaskOutcome::AgentError(message) => {
                    let retry_count = self.tasks.get(task_id).map(|t| t.retry_count).unwrap_or(0);
                    if retry_count < ITERATION_CAP {
                        self.tasks.increment_retry(task_id)?;
                        self.tasks.set_status(task_id, TaskStatus::Pending)?;
                        self.tasks.set_status(task_id, TaskStatus::Running)?;
                        self.emit(Event::TaskCompleted {
                            task_id: task_id.to_string(),
                            outcome: format!("AgentError({message}), retrying"),
                        });
                        continue;
                    }
                    self.finish_task(task_id, TaskStatus::Failed, &format!("AgentError: {message}"))
                        .await?;
                    return Ok(());
                }
                TaskOutcome::Succeeded | TaskOutcome::SucceededAfterFix => {
                    self.ctx.reset_attempts(task_id);
                    let gate = self.verify(task_id).await?;
                    if gate.passed {
                        self.run_post_task_hooks(task_id).await;
                        let label = if outcome == TaskOutcome::SucceededAfterFix {
                            "SucceededAfterFix"
                        } else {
                            "Succeeded"
                        };
                        self.finish_task(task_id, TaskStatus::Done, label).await?;
                    } else {
                        let retry_count = self.tasks.get(task_id).map(|t| t.retry_count).unwrap_or(0);
                        if retry_count < ITERATION_CAP {
                            self.tasks.increment_retry(task_id)?;
                            self.tasks.set_status(task_id, TaskStatus::Pending)?;
                            self.tasks.set_status(task_id, TaskStatus::Running)?;
                            self.emit(Event::TaskCompleted {
                                task_id: task_id.to_string(),
                                outcome: format!(
                                    "VerificationFailed(regressed={:?}), retrying",
                                    gate.regressed
                                ),
                            });
                            continue;
                        }
                        self.finish_task(
                            task_id,
                            TaskStatus::Failed,
                            &format!("VerificationFailed(regressed={:?})", gate.regressed),
                        )
                        .await?;
                    }
                    return Ok(());
                }
                TaskOutcome::VerificationFailed(_) => unreachable!("produced only internally"),
            }
        }
    }

    fn take_matching_skip(&mut self, task_id: &str) -> Option<()> {
        match &self.pending_skip {
            Some(None) => {
                self.pending_skip = None;
                Some(())
            }
            Some(Some(id)) if id == task_id => {
                self.pending_skip = None;
                Some(())
            }
            _ => None,
        }
    }

    async fn finish_task(&mut self, task_id: &str, status: TaskStatus, outcome: &str) -> Result<()> {
        self.tasks.set_status(task_id, status)?;
        self.ctx.reset_attempts(task_id);
        self.persist()?;
        self.emit(Event::TaskCompleted {
            task_id: task_id.to_string(),
            outcome: outcome.to_string(),
        });
        Ok(())
    }

    async fn invoke_and_classify(&mut self, task: &Task) -> Result<TaskOutcome> {
        let prompt = PromptBuilder::default().build(&self.project_root, task);
        let mut opts = InvokeOpts::new(self.project_root.clone());
        opts.deadline = Some(self.config.timeout.active.0);
        opts.stuck_timeout = Some(self.config.timeout.stuck.0);
        opts.stream = self.raw_output.clone();
        opts.model = Some(self.ctx.model.clone());
        opts.prior_session_id = task.session_id.clone();

        self.emit(Event::AgentInvoked {
            task_id: task.id.clone(),
            agent_name: self.agent.name().to_string(),
            model: self.ctx.model.clone(),
        });

        // A child of the engine-wide token: Abort cancels it too (parent
        // cancellation propagates), but a task-scoped Skip can cancel just
        // this invocation without tearing down the whole session.
        let invocation_cancel = self.cancel.child_token();
        let invoke_token = invocation_cancel.clone();
        let agent = self.agent.clone();
        let session_id = task.session_id.clone();

        let agent_future = async move {
            if let (Some(session_id), true) = (session_id.as_deref(), agent.supports_continue()) {
                agent
                    .continue_session(session_id, &prompt, &opts, invoke_token)
                    .await
            } else {
                agent.run(&prompt, &opts, invoke_token).await
            }
        };
        tokio::pin!(agent_future);

        let result = loop {
            tokio::select! {
                biased;
                res = &mut agent_future => break res?,
                _ = tokio::time::sleep(Duration::from_millis(200)) => {
                    for msg in self.control.drain() {
                        if let ControlMessage::Skip(ref target) = msg {
                            if target.is_none() || target.as_deref() == Some(task.id.as_str()) {
                                invocation_cancel.cancel();
                            }
                        }
                        self.apply_control(msg);
                    }
                }
            }
        };

        if let Some(session_id) = &result.session_id {
            self.tasks.set_session_id(&task.id, session_id.clone())?;
        }

        self.emit(Event::AgentCompleted {
            task_id: task.id.clone(),
            exit_code: result.exit_code,
        });

        let outcome = classify(&result);
        if outcome == TaskOutcome::Succeeded && result.status == StatusMarker::Unknown {
            self.emit(Event::Warning {
                message: format!(
                    "task {}: agent exited 0 with no recognized status marker; treating as Succeeded",
                    task.id
                ),
            });
        }
        Ok(outcome)
    }

    async fn verify(&mut self, task_id: &str) -> Result<GateResult> {
        self.emit(Event::VerificationStarted {
            task_id: task_id.to_string(),
        });

        let gate = verification::run_gate(
            &self.config,
            &self.ctx.analysis,
            &self.project_root,
            &self.ctx.test_baseline,
            self.cancel.clone(),
        )
        .await?;

        verification::update_baseline(&mut self.ctx.test_baseline, &gate.test);
        self.persist()?;

        self.emit(Event::VerificationCompleted {
            task_id: task_id.to_string(),
            passed: gate.passed,
        });

        Ok(gate)
    }

    async fn run_pre_task_hooks(&mut self, task_id: &str) {
        for failure in hooks::run_hooks(&self.config.hooks.pre_task, &self.project_root).await {
            self.emit(Event::Warning {
                message: format!(
                    "pre-task hook '{}' failed before task {task_id}: {}",
                    failure.command, failure.message
                ),
            });
        }
    }

    async fn run_post_task_hooks(&mut self, task_id: &str) {
        let mut commands = self.config.hooks.post_task.clone();
        if self.config.git.auto_commit {
            commands.push(hooks::auto_commit_hook(&format!("Ralph: complete task {task_id}")));
        }
        for failure in hooks::run_hooks(&commands, &self.project_root).await {
            self.emit(Event::Warning {
                message: format!("post-task hook '{}' failed: {}", failure.command, failure.message),
            });
        }
    }
}
