//! CLI argument parsing using clap.
//!
//! This binary is a thin driver over the library: it wires a chosen agent,
//! a project directory, a task list, and an event sink into the Loop
//! Engine. The interactive setup wizard, project analyzer, legacy-layout
//! migration, and update checker are out of scope (spec §1) — only the
//! seams they would plug into are exposed here.

use clap::{Parser, Subcommand};

/// Task-automation supervisor that drives an external AI coding agent
/// around a project's task list.
#[derive(Parser, Debug)]
#[command(name = "ralph", version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the loop engine over the project's pending tasks.
    Run(RunArgs),
    /// Manage the task list.
    Tasks(TasksArgs),
    /// Pause a running session at its next checkpoint.
    Pause,
    /// Resume a paused session.
    Resume,
    /// Skip a task at the next checkpoint (the current one if unnamed).
    Skip {
        /// Task id to skip; defaults to whichever task is currently running.
        task_id: Option<String>,
    },
    /// Abort the running session.
    Abort {
        /// Reason recorded in the session's fail_reason.
        #[arg(default_value = "aborted by user")]
        reason: String,
    },
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Agent name to use (e.g. `cursor`, `auggie`); defaults to
    /// `agent.default` from config, or the single available agent.
    #[arg(long, env = "RALPH_AGENT")]
    pub agent: Option<String>,

    /// Model override; defaults to `agent.model` from config, or the
    /// agent's own default model.
    #[arg(long, env = "RALPH_MODEL")]
    pub model: Option<String>,

    /// Run exactly one task then stop.
    #[arg(short = 'o', long)]
    pub once: bool,

    /// Maximum tasks to process this invocation; unset means unlimited.
    #[arg(long, value_name = "N")]
    pub limit: Option<u32>,

    /// Resume an existing session by id instead of starting a fresh one.
    #[arg(long, value_name = "SESSION_ID")]
    pub resume: Option<String>,

    /// Project directory; defaults to walking up from the current directory.
    #[arg(long, value_name = "PATH")]
    pub project: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct TasksArgs {
    #[command(subcommand)]
    pub command: TasksCommand,
}

#[derive(Subcommand, Debug)]
pub enum TasksCommand {
    /// Import a Markdown or plain-text task list.
    Import {
        /// Path to the file to import.
        file: String,
        /// Override auto-detection of the import format.
        #[arg(long, value_enum)]
        format: Option<ImportFormatArg>,
    },
    /// List tasks and their current status.
    List,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum ImportFormatArg {
    Markdown,
    Text,
}
