//! Thin CLI driver: wires a chosen agent, the task list, and an event sink
//! into the loop engine, and exposes the out-of-process control commands
//! (`pause`/`resume`/`skip`/`abort`) as writes to a control file the
//! engine polls at its checkpoints (spec §6, §9).

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use ralph::agent::auggie::AuggieAgent;
use ralph::agent::custom::CustomAgent;
use ralph::agent::cursor::CursorAgent;
use ralph::agent::registry::{Registry, SelectError};
use ralph::agent::Agent;
use ralph::cli::{Args, Command, ImportFormatArg, RunArgs, TasksArgs, TasksCommand};
use ralph::config::Config;
use ralph::control;
use ralph::engine::EngineBuilder;
use ralph::events::{Event, EventSink};
use ralph::interrupt;
use ralph::output::console::{ConsoleEventSink, ConsoleRawSink};
use ralph::output::logger::FileEventLogger;
use ralph::project::{self, ProjectLayout};
use ralph::session::{generate_session_id, SessionState, SessionStore};
use ralph::task::import::{self, ImportFormat};
use ralph::task::store::TaskStore;
use ralph::task::TaskManager;

/// Exit codes distinguishing the caller-actionable outcomes named in
/// spec §6 from a generic failure.
const EXIT_COMPLETED: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_NO_AGENTS: u8 = 2;
const EXIT_NO_TASKS: u8 = 3;
const EXIT_CANCELLED: u8 = 4;

/// Emits every event to both the colored console sink and the per-run
/// JSON-lines log file.
struct TeeEventSink {
    console: Arc<dyn EventSink>,
    logger: Arc<dyn EventSink>,
}

impl EventSink for TeeEventSink {
    fn emit(&self, event: Event) {
        self.console.emit(event.clone());
        self.logger.emit(event);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::from(EXIT_FAILED)
        }
    }
}

async fn run() -> Result<u8> {
    let args = Args::parse();
    interrupt::register_signal_handler().context("failed to install SIGINT handler")?;

    match args.command {
        Command::Run(run_args) => cmd_run(run_args).await,
        Command::Tasks(tasks_args) => cmd_tasks(tasks_args),
        Command::Pause => cmd_control_write("pause"),
        Command::Resume => cmd_control_write("resume"),
        Command::Skip { task_id } => cmd_control_write(&match task_id {
            Some(id) => format!("skip:{id}"),
            None => "skip".to_string(),
        }),
        Command::Abort { reason } => cmd_control_write(&format!("abort:{reason}")),
    }
}

fn discover_layout(project: Option<&str>) -> Result<ProjectLayout> {
    match project {
        Some(path) => Ok(ProjectLayout::new(std::path::PathBuf::from(path))),
        None => project::discover(),
    }
}

/// Write a control command for a separately-running `ralph run` process to
/// pick up at its next checkpoint (spec §9's out-of-process control seam).
fn cmd_control_write(line: &str) -> Result<u8> {
    let layout = discover_layout(None)?;
    layout.ensure_dirs()?;
    std::fs::write(layout.control_path(), line)
        .with_context(|| format!("failed to write {}", layout.control_path().display()))?;
    println!("{} {line}", "ralph:".bold());
    Ok(EXIT_COMPLETED)
}

fn build_registry(config: &Config) -> Registry {
    let registry = Registry::new();
    registry.register(Arc::new(CursorAgent::new()));
    registry.register(Arc::new(AuggieAgent::new()));
    for custom in &config.agent.custom {
        registry.register(Arc::new(CustomAgent::new(custom.clone())));
    }
    registry
}

async fn cmd_run(run_args: RunArgs) -> Result<u8> {
    let layout = discover_layout(run_args.project.as_deref())?;
    layout.ensure_dirs()?;

    let config = Config::load(&layout.config_path())?;
    let registry = build_registry(&config);

    let agent_name = run_args.agent.clone().or_else(|| config.agent.default.clone());
    let agent = match registry.select(agent_name.as_deref()) {
        Ok(agent) => agent,
        Err(SelectError::NoAgents) => {
            eprintln!(
                "{}",
                "no agents available; install cursor-agent or auggie, or add agent.custom entries to config.yaml"
                    .red()
            );
            return Ok(EXIT_NO_AGENTS);
        }
        Err(SelectError::MultipleAgentsNeedSelection(names)) => {
            eprintln!(
                "{} {names:?}; set agent.default in config.yaml or pass --agent",
                "multiple agents available:".red()
            );
            return Ok(EXIT_NO_AGENTS);
        }
        Err(e) => {
            eprintln!("{} {e}", "error:".red());
            return Ok(EXIT_NO_AGENTS);
        }
    };

    if let Err(remediation) = agent.check_auth().await {
        eprintln!("{} {remediation}", "not authenticated:".red());
        return Ok(EXIT_NO_AGENTS);
    }

    let model = run_args
        .model
        .clone()
        .or_else(|| config.agent.model.clone())
        .unwrap_or_else(|| agent.default_model().id);

    let task_store = TaskStore::new(layout.tasks_path());
    let tasks = TaskManager::load(task_store)?;
    if tasks.all().is_empty() {
        eprintln!(
            "{}",
            "no tasks; import some with `ralph tasks import <file>`".red()
        );
        return Ok(EXIT_NO_TASKS);
    }

    let session_id = run_args.resume.clone().unwrap_or_else(generate_session_id);

    let console: Arc<dyn EventSink> = Arc::new(ConsoleEventSink);
    let logger: Arc<dyn EventSink> = Arc::new(FileEventLogger::open(&layout.logs_dir(), &session_id)?);
    let events: Arc<dyn EventSink> = Arc::new(TeeEventSink { console, logger });

    let (control_tx, control_rx) = control::channel();
    let interrupt_watcher = tokio::spawn(control::watch_interrupt_flag(
        control_tx.clone(),
        std::time::Duration::from_millis(200),
    ));
    let control_file_watcher = tokio::spawn(control::watch_control_file(
        layout.control_path(),
        control_tx,
        std::time::Duration::from_millis(500),
    ));

    let task_limit = if run_args.once { Some(1) } else { run_args.limit };

    let builder = EngineBuilder::new(
        config,
        layout.root.clone(),
        agent,
        tasks,
        SessionStore::new(layout.sessions_dir()),
        events,
        control_rx,
    )
    .with_raw_output(Arc::new(ConsoleRawSink))
    .with_task_limit(task_limit);

    let engine = if let Some(id) = &run_args.resume {
        let ctx = SessionStore::new(layout.sessions_dir())
            .load(id)
            .with_context(|| format!("no such session '{id}'"))?;
        builder.resume(ctx)
    } else {
        let analysis = layout.load_analysis()?;
        builder.with_analysis(analysis).start(session_id.clone(), model)
    };

    println!("{} session {session_id}", "ralph:".bold());
    let final_state = engine.run().await?;

    interrupt_watcher.abort();
    control_file_watcher.abort();

    match final_state {
        SessionState::Completed => Ok(EXIT_COMPLETED),
        SessionState::Paused => {
            println!(
                "{} paused after reaching this run's task limit; resume with `ralph run --resume {session_id}`",
                "ralph:".bold()
            );
            Ok(EXIT_COMPLETED)
        }
        SessionState::Failed => {
            let reason = SessionStore::new(layout.sessions_dir())
                .load(&session_id)
                .ok()
                .and_then(|ctx| ctx.fail_reason)
                .unwrap_or_default();
            if reason.contains("cancelled") || reason.contains("interrupted") {
                Ok(EXIT_CANCELLED)
            } else {
                Ok(EXIT_FAILED)
            }
        }
        SessionState::Idle | SessionState::Running | SessionState::Aborting => Ok(EXIT_FAILED),
    }
}

fn cmd_tasks(tasks_args: TasksArgs) -> Result<u8> {
    let layout = discover_layout(None)?;
    layout.ensure_dirs()?;
    let mut manager = TaskManager::load(TaskStore::new(layout.tasks_path()))?;

    match tasks_args.command {
        TasksCommand::Import { file, format } => {
            let path = std::path::Path::new(&file);
            let content =
                std::fs::read_to_string(path).with_context(|| format!("failed to read {file}"))?;
            let import_format = match format {
                Some(ImportFormatArg::Markdown) => ImportFormat::Markdown,
                Some(ImportFormatArg::Text) => ImportFormat::PlainText,
                None => import::detect_format(path),
            };
            let imported = import::parse(&content, import_format);
            let count = imported.len();
            for task in imported {
                manager.add_task(task)?;
            }
            println!("{} imported {count} tasks from {file}", "ralph:".bold());
            Ok(EXIT_COMPLETED)
        }
        TasksCommand::List => {
            for task in manager.all() {
                println!(
                    "{:<10} {:<8} {}",
                    task.id,
                    format!("{:?}", task.status).to_lowercase(),
                    task.title
                );
            }
            Ok(EXIT_COMPLETED)
        }
    }
}
