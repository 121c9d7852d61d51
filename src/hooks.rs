//! Pre/post-task hook execution.
//!
//! Hooks are shell-evaluated command lists (`sh -c`), the same documented
//! shell exception as the custom-agent model-list command. `git.auto_commit`
//! is not a distinct engine step: this crate treats commit as a post-task
//! hook responsibility (spec §9 open question, resolved that way).

use anyhow::Result;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct HookFailure {
    pub command: String,
    pub message: String,
}

/// Run each command in order, stopping at the first failure. Hook errors
/// never fail the task they're attached to — they're surfaced to the
/// caller as warnings.
pub async fn run_hooks(commands: &[String], working_dir: &Path) -> Vec<HookFailure> {
    let mut failures = Vec::new();
    for command in commands {
        if let Err(message) = run_one(command, working_dir).await {
            failures.push(HookFailure {
                command: command.clone(),
                message,
            });
        }
    }
    failures
}

async fn run_one(command: &str, working_dir: &Path) -> std::result::Result<(), String> {
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .output()
        .await
        .map_err(|e| e.to_string())?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(if stderr.trim().is_empty() {
            format!("hook exited with status {}", output.status)
        } else {
            stderr.trim().to_string()
        })
    }
}

/// Append a default `git commit` command to `post_task` when
/// `git.auto_commit` is enabled and the caller hasn't already configured
/// one of their own.
pub fn auto_commit_hook(message: &str) -> String {
    format!("git add -A && git commit -m {:?} --allow-empty", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn successful_hooks_produce_no_failures() {
        let tmp = TempDir::new().unwrap();
        let failures = run_hooks(&["true".to_string()], tmp.path()).await;
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn failing_hook_is_reported_but_does_not_panic() {
        let tmp = TempDir::new().unwrap();
        let failures = run_hooks(&["echo boom 1>&2; exit 1".to_string()], tmp.path()).await;
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("boom"));
    }

    #[tokio::test]
    async fn stops_before_running_hooks_is_not_required_but_all_run_independently() {
        let tmp = TempDir::new().unwrap();
        let failures = run_hooks(
            &["exit 1".to_string(), "exit 1".to_string()],
            tmp.path(),
        )
        .await;
        assert_eq!(failures.len(), 2);
    }

    #[test]
    fn auto_commit_hook_embeds_message() {
        let hook = auto_commit_hook("Ralph: complete task t-1");
        assert!(hook.contains("git commit"));
        assert!(hook.contains("Ralph: complete task t-1"));
    }
}
