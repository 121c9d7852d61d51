//! Status-marker and session-id extraction from agent stdout.
//!
//! These patterns are part of the external interface, not an implementation
//! detail: any adapter's output is scanned the same way.

use regex::Regex;
use std::sync::OnceLock;

/// Outcome extracted from an agent's stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMarker {
    Next,
    Done,
    Error,
    Fixed,
    Unknown,
}

fn session_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"session[_-]?id[:\s]+([A-Za-z0-9_-]+)").expect("valid regex"))
}

/// Scan the last 10 lines of stdout, most-recent first, for a status marker.
/// First match wins; `Unknown` if none found.
pub fn extract_status(stdout: &str) -> StatusMarker {
    let lines: Vec<&str> = stdout.lines().collect();
    let tail = lines.iter().rev().take(10);

    for line in tail {
        let trimmed = line.trim();
        if trimmed == "DONE" {
            return StatusMarker::Done;
        }
        if trimmed == "NEXT" {
            return StatusMarker::Next;
        }
        if trimmed == "FIXED" {
            return StatusMarker::Fixed;
        }
        if trimmed == "ERROR" || trimmed.starts_with("ERROR:") {
            return StatusMarker::Error;
        }
    }
    StatusMarker::Unknown
}

/// Extract the first `session_id: <token>` (or `session-id`, `sessionid`)
/// match anywhere in stdout.
pub fn extract_session_id(stdout: &str) -> Option<String> {
    session_id_re()
        .captures(stdout)
        .map(|c| c[1].to_string())
}
