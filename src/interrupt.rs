//! SIGINT handling and interactive feedback collection.
//!
//! The signal handler only raises a flag (register-once `OnceLock<Arc<
//! AtomicBool>>`, double-Ctrl-C hard exit); turning that flag into an
//! `Abort` request is the Control Channel's job (spec §9: control as
//! messages, not a shared flag broadcast directly into the engine). See
//! `control::watch_interrupt_flag`.

use anyhow::Result;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::task::Task;

/// Global interrupt flag, registered once with SIGINT.
static INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Register the SIGINT handler. Safe to call multiple times (only the first
/// call registers; subsequent calls are no-ops).
pub fn register_signal_handler() -> Result<()> {
    let flag = INTERRUPT_FLAG.get_or_init(|| Arc::new(AtomicBool::new(false)));

    // First Ctrl+C: set the flag so the engine can abort at its next checkpoint.
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(flag))?;

    // Second Ctrl+C: force-exit immediately rather than waiting on a checkpoint.
    let flag_clone = Arc::clone(flag);
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGINT, move || {
            if flag_clone.load(Ordering::SeqCst) {
                std::process::exit(130);
            }
        })?;
    }

    Ok(())
}

/// Check whether the interrupt flag is set.
pub fn is_interrupted() -> bool {
    INTERRUPT_FLAG
        .get()
        .map(|f| f.load(Ordering::SeqCst))
        .unwrap_or(false)
}

/// Clear the interrupt flag so the next run starts clean.
pub fn clear_interrupt() {
    if let Some(flag) = INTERRUPT_FLAG.get() {
        flag.store(false, Ordering::SeqCst);
    }
}

/// Prompt the user for feedback on an interrupted task.
///
/// Returns `Some(feedback)` if the user typed something, or `None` if they
/// pressed Enter immediately or stdin is not a terminal.
pub fn prompt_for_feedback(task: &Task) -> Result<Option<String>> {
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }

    println!();
    println!("  Interrupted task {} — \"{}\"", task.id, task.title);
    println!();
    println!("  Provide feedback for this task (empty line to finish, Enter to skip):");

    let mut lines = Vec::new();
    loop {
        print!("  > ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');

        if trimmed.is_empty() {
            break;
        }
        lines.push(trimmed.to_string());
    }

    if lines.is_empty() {
        Ok(None)
    } else {
        Ok(Some(lines.join("\n")))
    }
}

/// Append user feedback to a task's free-text notes with a clear delimiter.
/// Multiple interventions stack at the end.
pub fn append_feedback_to_notes(notes: Option<&str>, feedback: &str, iteration: u32) -> String {
    let base = notes.unwrap_or_default();
    format!(
        "{}\n\n---\n**User Guidance (iteration {}):**\n{}\n---",
        base, iteration, feedback
    )
}
