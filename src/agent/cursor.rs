//! Adapter for the `cursor-agent` CLI.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{tokenize_template, Agent, Detection, InvocationResult, InvokeOpts, LastSessionId, Model};
use crate::agent::process;

pub struct CursorAgent {
    command: String,
    last_session_id: LastSessionId,
}

impl CursorAgent {
    pub fn new() -> Self {
        Self {
            command: "cursor-agent".to_string(),
            last_session_id: LastSessionId::default(),
        }
    }

    fn build_argv(&self, opts: &InvokeOpts, session: Option<&str>, prompt: &str) -> Vec<String> {
        let mut argv = tokenize_template(&self.command).expect("built-in template is valid");
        argv.push("--print".to_string());
        argv.push("--quiet".to_string());
        if let Some(session_id) = session {
            argv.push("--continue".to_string());
            argv.push(session_id.to_string());
        }
        let model = opts.model.as_deref().unwrap_or(&self.default_model().id);
        argv.push("--model".to_string());
        argv.push(model.to_string());
        if opts.force {
            argv.push("--force".to_string());
        }
        argv.push(prompt.to_string());
        argv
    }
}

impl Default for CursorAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for CursorAgent {
    fn name(&self) -> &str {
        "cursor"
    }

    fn description(&self) -> &str {
        "Cursor's agentic CLI coding assistant"
    }

    fn available(&self) -> bool {
        Detection::Command(self.command.clone()).probe()
    }

    async fn check_auth(&self) -> Result<(), String> {
        let output = tokio::process::Command::new(&self.command)
            .arg("status")
            .output()
            .await;
        match output {
            Ok(o) if o.status.success() => Ok(()),
            _ => Err(format!(
                "not authenticated with {}; run `{} login`",
                self.command, self.command
            )),
        }
    }

    fn list_models(&self) -> Vec<Model> {
        vec![
            Model {
                id: "fast".to_string(),
                display_name: "Fast".to_string(),
            },
            Model {
                id: "thorough".to_string(),
                display_name: "Thorough".to_string(),
            },
        ]
    }

    fn default_model(&self) -> Model {
        self.list_models().remove(0)
    }

    async fn run(
        &self,
        prompt: &str,
        opts: &InvokeOpts,
        cancel: CancellationToken,
    ) -> anyhow::Result<InvocationResult> {
        let argv = self.build_argv(opts, None, prompt);
        let result = process::invoke(&argv, &[], opts, cancel).await?;
        self.last_session_id.record(&result);
        Ok(result)
    }

    async fn continue_session(
        &self,
        session_id: &str,
        prompt: &str,
        opts: &InvokeOpts,
        cancel: CancellationToken,
    ) -> anyhow::Result<InvocationResult> {
        let argv = self.build_argv(opts, Some(session_id), prompt);
        let result = process::invoke(&argv, &[], opts, cancel).await?;
        self.last_session_id.record(&result);
        Ok(result)
    }

    fn last_session_id(&self) -> Option<String> {
        self.last_session_id.get()
    }
}
