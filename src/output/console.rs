//! Terminal event formatting, in the teacher's `colored`-based style:
//! plain info to stdout, warnings/errors colored to stderr.

use colored::Colorize;

use crate::events::{Event, EventSink, RawOutputSink};

/// Prints every [`Event`] as a single human-readable line. This is the
/// default sink a headless CLI run hands the engine; a richer terminal UI
/// is out of scope for this crate (spec §1) and would implement
/// `EventSink` the same way.
pub struct ConsoleEventSink;

impl EventSink for ConsoleEventSink {
    fn emit(&self, event: Event) {
        match &event {
            Event::Warning { message } => eprintln!("{} {message}", "warning:".yellow()),
            Event::SessionFailed { .. } | Event::Aborted { .. } => {
                eprintln!("{}", event.to_string().red())
            }
            Event::TaskCompleted { outcome, .. } if outcome.starts_with("AgentError") => {
                eprintln!("{}", event.to_string().red())
            }
            Event::SessionCompleted => println!("{}", event.to_string().green()),
            _ => println!("{event}"),
        }
    }
}

/// Tees raw agent stdout straight to the terminal, one line at a time.
pub struct ConsoleRawSink;

impl RawOutputSink for ConsoleRawSink {
    fn write_line(&self, line: &str) {
        println!("  {} {line}", ">".dimmed());
    }
}
