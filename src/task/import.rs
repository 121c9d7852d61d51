//! Markdown / plain-text task list import (spec §4.3).
//!
//! Format is auto-detected from the file extension (`.md`/`.markdown` vs.
//! anything else) unless the caller overrides it.

use super::{Task, TaskStatus};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Markdown,
    PlainText,
}

pub fn detect_format(path: &Path) -> ImportFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("md") | Some("markdown") => ImportFormat::Markdown,
        _ => ImportFormat::PlainText,
    }
}

/// Parse `content` into freshly-minted `Task`s with ordinal 0 (the caller,
/// typically `TaskManager::add_task`, assigns the real ordinal on insert).
pub fn parse(content: &str, format: ImportFormat) -> Vec<Task> {
    match format {
        ImportFormat::Markdown => parse_markdown(content),
        ImportFormat::PlainText => parse_plain_text(content),
    }
}

/// Heading lines (`#`+) become a Pending task titled with the heading text
/// (no checkbox state to read). `[ ] item` / `[x] item` checkbox lines
/// become a task whose status follows the box.
fn parse_markdown(content: &str) -> Vec<Task> {
    let mut tasks = Vec::new();
    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(stripped) = strip_heading(line) {
            if !stripped.is_empty() {
                tasks.push(Task::new(stripped, "", 0));
            }
            continue;
        }

        if let Some((checked, title)) = parse_checkbox(line) {
            if !title.is_empty() {
                let mut task = Task::new(title, "", 0);
                if checked {
                    task.status = TaskStatus::Done;
                    task.completed_at = Some(task.created_at);
                }
                tasks.push(task);
            }
        }
    }
    tasks
}

fn strip_heading(line: &str) -> Option<&str> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 {
        return None;
    }
    Some(line[hashes..].trim())
}

fn parse_checkbox(line: &str) -> Option<(bool, &str)> {
    let rest = line.strip_prefix('-').or_else(|| line.strip_prefix('*'))?;
    let rest = rest.trim_start();
    if let Some(title) = rest.strip_prefix("[ ]") {
        return Some((false, title.trim()));
    }
    if let Some(title) = rest.strip_prefix("[x]").or_else(|| rest.strip_prefix("[X]")) {
        return Some((true, title.trim()));
    }
    None
}

/// Each non-blank line becomes a Pending task.
fn parse_plain_text(content: &str) -> Vec<Task> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| Task::new(l, "", 0))
        .collect()
}
