//! Event stream to front-ends (C8): structured events plus raw agent
//! output, delivered to caller-supplied sinks. Both are optional; a caller
//! that supplies neither still gets a fully functional loop.

use std::fmt;

/// One structured event in the ordering guaranteed by the spec's
/// concurrency section: task-level events in ordinal order, and within a
/// task, `TaskStarted < AgentInvoked < (AgentOutputChunk*) < AgentCompleted
/// < VerificationStarted < VerificationCompleted < TaskCompleted`.
#[derive(Debug, Clone)]
pub enum Event {
    SessionStarted {
        session_id: String,
    },
    TaskStarted {
        task_id: String,
        title: String,
    },
    AgentInvoked {
        task_id: String,
        agent_name: String,
        model: String,
    },
    AgentOutputChunk {
        task_id: String,
        chunk: String,
    },
    AgentCompleted {
        task_id: String,
        exit_code: i32,
    },
    VerificationStarted {
        task_id: String,
    },
    VerificationCompleted {
        task_id: String,
        passed: bool,
    },
    TaskCompleted {
        task_id: String,
        outcome: String,
    },
    Paused,
    Resumed,
    Aborted {
        reason: String,
    },
    SessionCompleted,
    SessionFailed {
        reason: String,
    },
    Warning {
        message: String,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::SessionStarted { session_id } => write!(f, "session started ({session_id})"),
            Event::TaskStarted { task_id, title } => write!(f, "task {task_id} started: {title}"),
            Event::AgentInvoked {
                task_id,
                agent_name,
                model,
            } => write!(f, "task {task_id}: invoking {agent_name} ({model})"),
            Event::AgentOutputChunk { task_id, .. } => write!(f, "task {task_id}: output"),
            Event::AgentCompleted { task_id, exit_code } => {
                write!(f, "task {task_id}: agent exited {exit_code}")
            }
            Event::VerificationStarted { task_id } => {
                write!(f, "task {task_id}: verification started")
            }
            Event::VerificationCompleted { task_id, passed } => {
                write!(f, "task {task_id}: verification {}", if *passed { "passed" } else { "failed" })
            }
            Event::TaskCompleted { task_id, outcome } => {
                write!(f, "task {task_id}: completed ({outcome})")
            }
            Event::Paused => write!(f, "paused"),
            Event::Resumed => write!(f, "resumed"),
            Event::Aborted { reason } => write!(f, "aborted: {reason}"),
            Event::SessionCompleted => write!(f, "session completed"),
            Event::SessionFailed { reason } => write!(f, "session failed: {reason}"),
            Event::Warning { message } => write!(f, "warning: {message}"),
        }
    }
}

/// Structured-event sink. Delivery is ordered and never drops events: a
/// caller under backpressure should buffer or block, not discard.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Raw, line-oriented agent stdout sink. Tolerant of backpressure by
/// dropping the oldest buffered chunk rather than blocking the engine.
pub trait RawOutputSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// An `EventSink` that drops every event. Useful when a caller only wants
/// raw output, or in tests.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: Event) {}
}

/// An `EventSink` that appends every event to a `Vec` behind a mutex;
/// handy for assertions in tests and for a headless runner's summary.
#[derive(Default)]
pub struct RecordingEventSink {
    events: std::sync::Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("event log poisoned").clone()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: Event) {
        self.events.lock().expect("event log poisoned").push(event);
    }
}
