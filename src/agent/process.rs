//! Shared subprocess invocation pipeline used by every adapter.
//!
//! Spawns argv, tees stdout to an in-memory buffer and an optional
//! streaming sink, drains stderr on the side, honors a deadline and a
//! stuck-output timeout, and classifies the result via [`super::parser`].
//! On cancellation the child is signalled (SIGTERM on unix) and given a
//! grace window before a hard kill; the invocation still returns a
//! best-effort `InvocationResult` rather than erroring out, per the spec's
//! "report cancellation in the error channel but still return a result"
//! rule.

use anyhow::{Context, Result};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::parser::{extract_session_id, extract_status};
use super::{InvocationResult, InvokeOpts};

/// Grace period between a graceful signal and a hard kill.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Run `argv` (program + args, already tokenized) to completion or
/// cancellation, tee'ing output per `opts`.
pub async fn invoke(
    argv: &[String],
    extra_env: &[(String, String)],
    opts: &InvokeOpts,
    cancel: CancellationToken,
) -> Result<InvocationResult> {
    let (program, args) = argv
        .split_first()
        .context("empty command template: nothing to execute")?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(&opts.working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (k, v) in extra_env {
        cmd.env(k, v);
    }

    let mut child = cmd.spawn().with_context(|| {
        format!("failed to spawn agent process '{}'", program)
    })?;

    let stdout = child.stdout.take().context("failed to capture stdout")?;
    let mut stderr = child.stderr.take().context("failed to capture stderr")?;

    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf).await;
        buf
    });

    let start = Instant::now();
    let mut lines = BufReader::new(stdout).lines();
    let mut stdout_buf = String::new();
    let mut cancelled = false;

    loop {
        let stuck_sleep = sleep_or_pending(opts.stuck_timeout);
        let deadline_sleep = sleep_or_pending(
            opts.deadline
                .map(|d| d.saturating_sub(start.elapsed())),
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            _ = deadline_sleep => {
                cancelled = true;
                break;
            }
            _ = stuck_sleep => {
                cancelled = true;
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(l)) => {
                        if let Some(sink) = &opts.stream {
                            sink.write_line(&l);
                        }
                        stdout_buf.push_str(&l);
                        stdout_buf.push('\n');
                    }
                    Ok(None) => break,
                    Err(_) => break,
                }
            }
        }
    }

    if cancelled {
        terminate(&mut child).await;
    }

    let wait_result = child.wait().await;
    let wall_duration = start.elapsed();
    let stderr_output = stderr_task.await.unwrap_or_default();

    let exit_code = match &wait_result {
        Ok(status) => status.code().unwrap_or(-1),
        Err(_) => -1,
    };

    let status = extract_status(&stdout_buf);
    let session_id = extract_session_id(&stdout_buf);

    let error = if cancelled {
        Some("cancelled".to_string())
    } else if exit_code != 0 {
        if stderr_output.trim().is_empty() {
            Some(format!("process exited with status {exit_code}"))
        } else {
            Some(stderr_output.trim().to_string())
        }
    } else {
        None
    };

    Ok(InvocationResult {
        stdout: stdout_buf,
        exit_code,
        wall_duration,
        status,
        session_id,
        error,
        cancelled,
    })
}

/// Returns a sleep future for `Some(d)`, or one that never completes for
/// `None` — lets a single `tokio::select!` arm cover "timeout configured or
/// not" without branching on an `Option` at the call site.
fn sleep_or_pending(d: Option<Duration>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    match d {
        Some(d) => Box::pin(tokio::time::sleep(d)),
        None => Box::pin(std::future::pending()),
    }
}

/// Signal the child to terminate, then escalate to a hard kill after a
/// grace window if it hasn't exited.
async fn terminate(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        let nix_pid = nix::unistd::Pid::from_raw(pid as i32);
        let _ = nix::sys::signal::kill(nix_pid, nix::sys::signal::Signal::SIGTERM);
    }

    let deadline = Instant::now() + KILL_GRACE;
    loop {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        if Instant::now() >= deadline {
            let _ = child.start_kill();
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
