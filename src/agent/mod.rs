//! Agent abstraction: uniform subprocess invocation over named adapters.
//!
//! Capability types over inheritance: an `Agent` is a value exposing a
//! fixed operation set, not a class in a hierarchy. Concrete adapters
//! (`cursor`, `auggie`, `custom`) share one invocation pipeline in
//! [`process`] and differ only in their argv template and availability
//! probe.

pub mod auggie;
pub mod custom;
pub mod cursor;
pub mod parser;
pub mod process;
pub mod registry;

pub use parser::StatusMarker;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::events::RawOutputSink;

/// A model an adapter can run with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: String,
    pub display_name: String,
}

/// Availability probe taxonomy (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Look up a binary name in `PATH`.
    Command(String),
    /// Stat a file or directory.
    Path(PathBuf),
    /// Check an environment variable is set.
    Env(String),
    /// Trivially true.
    Always,
}

impl Detection {
    pub fn probe(&self) -> bool {
        match self {
            Detection::Command(name) => which(name),
            Detection::Path(path) => path.exists(),
            Detection::Env(var) => std::env::var_os(var).is_some(),
            Detection::Always => true,
        }
    }
}

/// Cheap, side-effect-free `PATH` lookup (no shell, no subprocess).
fn which(name: &str) -> bool {
    if name.contains('/') {
        return PathBuf::from(name).is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(name).is_file())
        })
        .unwrap_or(false)
}

/// Options carried into a single invocation.
#[derive(Clone)]
pub struct InvokeOpts {
    pub model: Option<String>,
    pub working_dir: PathBuf,
    pub stream: Option<Arc<dyn RawOutputSink>>,
    pub deadline: Option<Duration>,
    /// Cancel the invocation if stdout is silent for this long.
    pub stuck_timeout: Option<Duration>,
    pub force: bool,
    pub prior_session_id: Option<String>,
}

impl std::fmt::Debug for InvokeOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokeOpts")
            .field("model", &self.model)
            .field("working_dir", &self.working_dir)
            .field("deadline", &self.deadline)
            .field("stuck_timeout", &self.stuck_timeout)
            .field("force", &self.force)
            .field("prior_session_id", &self.prior_session_id)
            .finish()
    }
}

impl InvokeOpts {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            model: None,
            working_dir,
            stream: None,
            deadline: None,
            stuck_timeout: None,
            force: false,
            prior_session_id: None,
        }
    }
}

/// Outcome of one agent invocation.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub stdout: String,
    pub exit_code: i32,
    pub wall_duration: Duration,
    pub status: StatusMarker,
    pub session_id: Option<String>,
    pub error: Option<String>,
    /// Set when the invocation was cut short by cancellation rather than a
    /// natural process exit.
    pub cancelled: bool,
}

/// Uniform contract every adapter implements (spec §4.1).
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Cheap, side-effect-free probe. MUST NOT launch the agent.
    fn available(&self) -> bool;

    /// MAY execute a trivial subcommand. Err carries a remediation string.
    async fn check_auth(&self) -> Result<(), String>;

    fn list_models(&self) -> Vec<Model>;
    fn default_model(&self) -> Model;

    async fn run(
        &self,
        prompt: &str,
        opts: &InvokeOpts,
        cancel: tokio_util::sync::CancellationToken,
    ) -> anyhow::Result<InvocationResult>;

    async fn continue_session(
        &self,
        session_id: &str,
        prompt: &str,
        opts: &InvokeOpts,
        cancel: tokio_util::sync::CancellationToken,
    ) -> anyhow::Result<InvocationResult>;

    /// Whether this adapter's invocation shape supports `continue_session`.
    fn supports_continue(&self) -> bool {
        true
    }

    /// The session id the adapter's most recent invocation reported, if
    /// any (spec §4.1). The task store threads session ids across tasks,
    /// but this is the adapter's own record of what it last saw.
    fn last_session_id(&self) -> Option<String> {
        None
    }
}

/// Tracks the session id from an adapter's most recent invocation.
/// Shared by every built-in adapter since the bookkeeping is identical.
#[derive(Default)]
pub struct LastSessionId(std::sync::Mutex<Option<String>>);

impl LastSessionId {
    pub fn record(&self, result: &InvocationResult) {
        if let Some(id) = &result.session_id {
            *self.0.lock().expect("last_session_id lock poisoned") = Some(id.clone());
        }
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().expect("last_session_id lock poisoned").clone()
    }
}

/// Tokenize a command template by whitespace (no shell), per spec §4.1
/// step 1. `shlex` also honors quoting, which no built-in template needs
/// today but a custom agent's command string might.
pub fn tokenize_template(template: &str) -> anyhow::Result<Vec<String>> {
    shlex::split(template)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow::anyhow!("invalid command template: '{template}'"))
}
