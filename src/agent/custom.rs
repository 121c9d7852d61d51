//! User-configured custom agent (`agent.custom[]` in config.yaml).
//!
//! Every field of the invocation pipeline is identical to the built-in
//! adapters except model enumeration: a custom agent's model-list command
//! is shell-evaluated, by contract (spec §4.1) — the one documented shell
//! exception in an otherwise argv-tokenized world.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{tokenize_template, Agent, Detection, InvocationResult, InvokeOpts, LastSessionId, Model};
use crate::agent::process;
use crate::config::CustomAgentConfig;

pub struct CustomAgent {
    config: CustomAgentConfig,
    last_session_id: LastSessionId,
}

impl CustomAgent {
    pub fn new(config: CustomAgentConfig) -> Self {
        Self {
            config,
            last_session_id: LastSessionId::default(),
        }
    }

    fn detection(&self) -> Detection {
        match self.config.detection_method.as_str() {
            "path" => Detection::Path(
                self.config
                    .detection_value
                    .clone()
                    .unwrap_or_default()
                    .into(),
            ),
            "env" => Detection::Env(self.config.detection_value.clone().unwrap_or_default()),
            "always" => Detection::Always,
            _ => Detection::Command(
                self.config
                    .detection_value
                    .clone()
                    .unwrap_or_else(|| self.config.command.clone()),
            ),
        }
    }

    fn build_argv(&self, opts: &InvokeOpts, session: Option<&str>, prompt: &str) -> anyhow::Result<Vec<String>> {
        let mut argv = tokenize_template(&self.config.command)?;
        argv.extend(self.config.args_prefix.iter().cloned());
        if let Some(session_id) = session {
            argv.push("--continue".to_string());
            argv.push(session_id.to_string());
        }
        if let Some(model) = opts.model.as_deref().or(self.config.default_model.as_deref()) {
            argv.push("--model".to_string());
            argv.push(model.to_string());
        }
        argv.push(prompt.to_string());
        Ok(argv)
    }
}

#[async_trait]
impl Agent for CustomAgent {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn available(&self) -> bool {
        self.detection().probe()
    }

    async fn check_auth(&self) -> Result<(), String> {
        // The custom-agent descriptor carries no auth-probe field; a custom
        // agent is assumed authenticated if it's available.
        Ok(())
    }

    fn list_models(&self) -> Vec<Model> {
        let Some(cmd) = &self.config.model_list_command else {
            return vec![self.default_model()];
        };

        let output = std::process::Command::new("sh").arg("-c").arg(cmd).output();
        match output {
            Ok(o) if o.status.success() => {
                let text = String::from_utf8_lossy(&o.stdout);
                let models: Vec<Model> = text
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(|id| Model {
                        id: id.to_string(),
                        display_name: id.to_string(),
                    })
                    .collect();
                if models.is_empty() {
                    vec![self.default_model()]
                } else {
                    models
                }
            }
            _ => vec![self.default_model()],
        }
    }

    fn default_model(&self) -> Model {
        let id = self
            .config
            .default_model
            .clone()
            .unwrap_or_else(|| "default".to_string());
        Model {
            display_name: id.clone(),
            id,
        }
    }

    async fn run(
        &self,
        prompt: &str,
        opts: &InvokeOpts,
        cancel: CancellationToken,
    ) -> anyhow::Result<InvocationResult> {
        let argv = self.build_argv(opts, None, prompt)?;
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
        let argv = self.build_argv(opts, Some(session_id), prompt)?;
        let result = process::invoke(&argv, &[], opts, cancel).await?;
        self.last_session_id.record(&result);
        Ok(result)
    }

    fn last_session_id(&self) -> Option<String> {
        self.last_session_id.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn base_config() -> CustomAgentConfig {
        CustomAgentConfig {
            name: "my-agent".to_string(),
            command: "my-agent-cli".to_string(),
            args_prefix: vec!["--yolo".to_string()],
            description: "an example custom agent".to_string(),
            detection_method: "always".to_string(),
            detection_value: None,
            model_list_command: None,
            default_model: Some("big".to_string()),
        }
    }

    #[test]
    fn always_detection_is_available() {
        let agent = CustomAgent::new(base_config());
        assert!(agent.available());
    }

    #[test]
    fn env_detection_checks_variable() {
        let mut config = base_config();
        config.detection_method = "env".to_string();
        config.detection_value = Some("RALPH_TEST_CUSTOM_AGENT_ENV".to_string());
        let agent = CustomAgent::new(config);

        assert!(!agent.available());
        std::env::set_var("RALPH_TEST_CUSTOM_AGENT_ENV", "1");
        assert!(agent.available());
        std::env::remove_var("RALPH_TEST_CUSTOM_AGENT_ENV");
    }

    #[test]
    fn build_argv_includes_args_prefix_and_default_model() {
        let agent = CustomAgent::new(base_config());
        let opts = InvokeOpts::new(PathBuf::from("."));
        let argv = agent.build_argv(&opts, None, "do it").unwrap();
        assert!(argv.contains(&"--yolo".to_string()));
        let idx = argv.iter().position(|a| a == "--model").unwrap();
        assert_eq!(argv[idx + 1], "big");
        assert_eq!(argv.last().unwrap(), "do it");
    }

    #[test]
    fn no_model_list_command_falls_back_to_default() {
        let agent = CustomAgent::new(base_config());
        let models = agent.list_models();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "big");
    }

    #[test]
    fn model_list_command_is_shell_evaluated() {
        let mut config = base_config();
        config.model_list_command = Some("echo alpha; echo beta".to_string());
        let agent = CustomAgent::new(config);
        let models = agent.list_models();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "alpha");
        assert_eq!(models[1].id, "beta");
    }
}
