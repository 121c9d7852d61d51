//! Control Channel (C7): external Pause/Resume/Skip/Abort requests,
//! consumed by the Loop Engine at its checkpoints.
//!
//! Control is messages, not a shared "paused" flag: the engine polls this
//! channel only at well-defined checkpoints, so persistence always happens
//! exactly at a boundary (spec §9 design note).

use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Pause,
    Resume,
    /// Skip the named task, or the current one if `None`.
    Skip(Option<String>),
    Abort(String),
}

/// The engine-facing half: non-blocking checkpoint polling.
pub struct ControlReceiver {
    rx: mpsc::UnboundedReceiver<ControlMessage>,
}

impl ControlReceiver {
    /// Drain every pending message without blocking. Checkpoints call this
    /// and fold the results into the state machine.
    pub fn drain(&mut self) -> Vec<ControlMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Block until the next message arrives. Used only while `Paused`,
    /// where the engine has nothing else to do but wait for Resume/Abort.
    pub async fn recv(&mut self) -> Option<ControlMessage> {
        self.rx.recv().await
    }
}

/// The caller-facing half: send control requests into a running engine.
#[derive(Clone)]
pub struct ControlSender {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ControlSender {
    pub fn send(&self, message: ControlMessage) {
        // The receiver only disappears once the engine has already
        // finished; a message arriving after that has no effect.
        let _ = self.tx.send(message);
    }

    pub fn pause(&self) {
        self.send(ControlMessage::Pause);
    }

    pub fn resume(&self) {
        self.send(ControlMessage::Resume);
    }

    pub fn skip(&self, task_id: Option<String>) {
        self.send(ControlMessage::Skip(task_id));
    }

    pub fn abort(&self, reason: impl Into<String>) {
        self.send(ControlMessage::Abort(reason.into()));
    }
}

pub fn channel() -> (ControlSender, ControlReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlSender { tx }, ControlReceiver { rx })
}

/// Parse one line written to the control file by a detached `ralph
/// pause|resume|skip|abort` invocation (spec §6's "minimal seam" for an
/// out-of-process caller) into a [`ControlMessage`].
pub fn parse_control_line(line: &str) -> Option<ControlMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (verb, rest) = line.split_once(':').unwrap_or((line, ""));
    match verb {
        "pause" => Some(ControlMessage::Pause),
        "resume" => Some(ControlMessage::Resume),
        "skip" => Some(ControlMessage::Skip(if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        })),
        "abort" => Some(ControlMessage::Abort(if rest.is_empty() {
            "aborted via control file".to_string()
        } else {
            rest.to_string()
        })),
        _ => None,
    }
}

/// Poll `path` at `interval` for a control command written by an external
/// process; on each read that yields a message, forward it through `sender`
/// and truncate the file so the same command isn't replayed. Runs until the
/// receiving half of `sender` is dropped (the engine has terminated).
pub async fn watch_control_file(
    path: std::path::PathBuf,
    sender: ControlSender,
    interval: std::time::Duration,
) {
    loop {
        if let Ok(content) = tokio::fs::read_to_string(&path).await {
            if !content.trim().is_empty() {
                if let Some(message) = parse_control_line(&content) {
                    sender.send(message);
                }
                let _ = tokio::fs::write(&path, b"").await;
            }
        }
        tokio::time::sleep(interval).await;
    }
}

/// Poll the process-wide SIGINT flag ([`crate::interrupt::is_interrupted`])
/// and translate the first Ctrl+C into an `Abort` request, the
/// generalization of a raw signal into a Control Channel message (spec §9).
pub async fn watch_interrupt_flag(sender: ControlSender, interval: std::time::Duration) {
    loop {
        if crate::interrupt::is_interrupted() {
            sender.abort("interrupted (SIGINT)");
            crate::interrupt::clear_interrupt();
            return;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_collects_all_pending_messages() {
        let (tx, mut rx) = channel();
        tx.pause();
        tx.skip(Some("t-1".to_string()));
        let drained = rx.drain();
        assert_eq!(
            drained,
            vec![
                ControlMessage::Pause,
                ControlMessage::Skip(Some("t-1".to_string()))
            ]
        );
    }

    #[tokio::test]
    async fn drain_is_empty_when_nothing_sent() {
        let (_tx, mut rx) = channel();
        assert!(rx.drain().is_empty());
    }

    #[tokio::test]
    async fn recv_blocks_until_a_message_arrives() {
        let (tx, mut rx) = channel();
        let handle = tokio::spawn(async move { rx.recv().await });
        tx.abort("testing");
        let message = handle.await.unwrap();
        assert_eq!(message, Some(ControlMessage::Abort("testing".to_string())));
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_is_a_silent_no_op() {
        let (tx, rx) = channel();
        drop(rx);
        tx.pause();
    }

    #[test]
    fn parse_control_line_handles_every_verb() {
        assert_eq!(parse_control_line("pause"), Some(ControlMessage::Pause));
        assert_eq!(parse_control_line("resume"), Some(ControlMessage::Resume));
        assert_eq!(parse_control_line("skip"), Some(ControlMessage::Skip(None)));
        assert_eq!(
            parse_control_line("skip:t-1"),
            Some(ControlMessage::Skip(Some("t-1".to_string())))
        );
        assert_eq!(
            parse_control_line("abort:build is broken"),
            Some(ControlMessage::Abort("build is broken".to_string()))
        );
    }

    #[test]
    fn parse_control_line_rejects_blank_and_unknown() {
        assert_eq!(parse_control_line(""), None);
        assert_eq!(parse_control_line("   "), None);
        assert_eq!(parse_control_line("frobnicate"), None);
    }

    #[tokio::test]
    async fn watch_control_file_forwards_and_truncates() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("control");
        tokio::fs::write(&path, b"pause").await.unwrap();

        let (tx, mut rx) = channel();
        let watcher = tokio::spawn(watch_control_file(
            path.clone(),
            tx,
            std::time::Duration::from_millis(10),
        ));

        let message = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(message, Some(ControlMessage::Pause));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let remaining = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(remaining.trim().is_empty());

        watcher.abort();
    }
}
