//! Name → Agent registry and the three selection primitives (spec §4.2).
//!
//! A global default registry is acceptable (one process-wide singleton,
//! per spec's design notes) but this type carries no global state itself:
//! callers build one `Registry`, register adapters into it once at
//! startup, and never mutate it after selection.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::Agent;

/// Errors from registry lookups and selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("no agents registered")]
    NoAgents,
    #[error("multiple agents available, select one: {0:?}")]
    MultipleAgentsNeedSelection(Vec<String>),
    #[error("agent '{0}' not found")]
    AgentNotFound(String),
    #[error("agent '{0}' is not available")]
    AgentNotAvailable(String),
    #[error("selection failed: {0}")]
    SelectionFailed(String),
}

#[derive(Default)]
pub struct Registry {
    agents: RwLock<BTreeMap<String, Arc<dyn Agent>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register(&self, agent: Arc<dyn Agent>) {
        self.agents
            .write()
            .expect("registry lock poisoned")
            .insert(agent.name().to_string(), agent);
    }

    pub fn unregister(&self, name: &str) {
        self.agents
            .write()
            .expect("registry lock poisoned")
            .remove(name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// All registered agents, sorted by name (deterministic).
    pub fn list(&self) -> Vec<Arc<dyn Agent>> {
        self.agents
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Registered agents whose `available()` probe passes, sorted by name.
    pub fn list_available(&self) -> Vec<Arc<dyn Agent>> {
        self.list().into_iter().filter(|a| a.available()).collect()
    }

    /// Strict selection: if `name` is given, it must exist and be
    /// available. If empty, 0 available is `NoAgents`, exactly 1 is
    /// auto-selected, 2+ is `MultipleAgentsNeedSelection`.
    pub fn select(&self, name: Option<&str>) -> Result<Arc<dyn Agent>, SelectError> {
        match name {
            Some(name) => {
                let agent = self
                    .get(name)
                    .ok_or_else(|| SelectError::AgentNotFound(name.to_string()))?;
                if !agent.available() {
                    return Err(SelectError::AgentNotAvailable(name.to_string()));
                }
                Ok(agent)
            }
            None => {
                let available = self.list_available();
                match available.len() {
                    0 => Err(SelectError::NoAgents),
                    1 => Ok(available.into_iter().next().unwrap()),
                    _ => Err(SelectError::MultipleAgentsNeedSelection(
                        available.iter().map(|a| a.name().to_string()).collect(),
                    )),
                }
            }
        }
    }

    /// Lenient selection: availability is not enforced for an exact-name
    /// match; an empty name falls back to the first agent sorted by name.
    pub fn get_or_default(&self, name: Option<&str>) -> Result<Arc<dyn Agent>, SelectError> {
        match name {
            Some(name) => self
                .get(name)
                .ok_or_else(|| SelectError::AgentNotFound(name.to_string())),
            None => {
                let all = self.list();
                all.into_iter()
                    .next()
                    .ok_or(SelectError::NoAgents)
            }
        }
    }

    /// Interactive selection: delegates to `ui_callback` when 2+ agents are
    /// available, surfacing its error as `SelectionFailed`.
    pub fn prompt_selection<F>(&self, ui_callback: F) -> Result<Arc<dyn Agent>, SelectError>
    where
        F: FnOnce(&[Arc<dyn Agent>]) -> Result<usize, String>,
    {
        let available = self.list_available();
        match available.len() {
            0 => Err(SelectError::NoAgents),
            1 => Ok(available.into_iter().next().unwrap()),
            _ => {
                let idx = ui_callback(&available).map_err(SelectError::SelectionFailed)?;
                available
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| SelectError::SelectionFailed("index out of range".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{InvocationResult, InvokeOpts, Model};
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct FakeAgent {
        name: String,
        available: bool,
    }

    #[async_trait]
    impl Agent for FakeAgent {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "fake"
        }
        fn available(&self) -> bool {
            self.available
        }
        async fn check_auth(&self) -> Result<(), String> {
            Ok(())
        }
        fn list_models(&self) -> Vec<Model> {
            vec![]
        }
        fn default_model(&self) -> Model {
            Model {
                id: "x".into(),
                display_name: "x".into(),
            }
        }
        async fn run(
            &self,
            _prompt: &str,
            _opts: &InvokeOpts,
            _cancel: CancellationToken,
        ) -> anyhow::Result<InvocationResult> {
            unreachable!("not exercised by registry tests")
        }
        async fn continue_session(
            &self,
            _session_id: &str,
            _prompt: &str,
            _opts: &InvokeOpts,
            _cancel: CancellationToken,
        ) -> anyhow::Result<InvocationResult> {
            unreachable!("not exercised by registry tests")
        }
    }

    fn fake(name: &str, available: bool) -> Arc<dyn Agent> {
        Arc::new(FakeAgent {
            name: name.to_string(),
            available,
        })
    }

    #[test]
    fn select_with_zero_available_is_no_agents() {
        let registry = Registry::new();
        assert_eq!(registry.select(None), Err(SelectError::NoAgents));
    }

    #[test]
    fn select_with_exactly_one_available_auto_selects() {
        let registry = Registry::new();
        registry.register(fake("cursor", true));
        let agent = registry.select(None).unwrap();
        assert_eq!(agent.name(), "cursor");
    }

    #[test]
    fn select_with_multiple_available_is_ambiguous() {
        let registry = Registry::new();
        registry.register(fake("cursor", true));
        registry.register(fake("auggie", true));
        match registry.select(None) {
            Err(SelectError::MultipleAgentsNeedSelection(names)) => {
                assert_eq!(names, vec!["auggie".to_string(), "cursor".to_string()]);
            }
            other => panic!("expected MultipleAgentsNeedSelection, got {other:?}"),
        }
    }

    #[test]
    fn select_named_not_found() {
        let registry = Registry::new();
        assert_eq!(
            registry.select(Some("ghost")),
            Err(SelectError::AgentNotFound("ghost".to_string()))
        );
    }

    #[test]
    fn select_named_unavailable() {
        let registry = Registry::new();
        registry.register(fake("cursor", false));
        assert_eq!(
            registry.select(Some("cursor")),
            Err(SelectError::AgentNotAvailable("cursor".to_string()))
        );
    }

    #[test]
    fn get_or_default_ignores_availability_for_named_lookup() {
        let registry = Registry::new();
        registry.register(fake("cursor", false));
        let agent = registry.get_or_default(Some("cursor")).unwrap();
        assert_eq!(agent.name(), "cursor");
    }

    #[test]
    fn get_or_default_picks_first_sorted_when_unnamed() {
        let registry = Registry::new();
        registry.register(fake("zeta", true));
        registry.register(fake("alpha", false));
        let agent = registry.get_or_default(None).unwrap();
        assert_eq!(agent.name(), "alpha");
    }

    #[test]
    fn list_is_sorted_by_name() {
        let registry = Registry::new();
        registry.register(fake("zeta", true));
        registry.register(fake("alpha", true));
        registry.register(fake("mu", true));
        let names: Vec<_> = registry.list().iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["alpha", "mu", "zeta"]);
    }

    #[test]
    fn prompt_selection_auto_selects_single_without_calling_ui() {
        let registry = Registry::new();
        registry.register(fake("cursor", true));
        let agent = registry
            .prompt_selection(|_| panic!("ui should not be called"))
            .unwrap();
        assert_eq!(agent.name(), "cursor");
    }

    #[test]
    fn prompt_selection_delegates_to_ui_when_ambiguous() {
        let registry = Registry::new();
        registry.register(fake("cursor", true));
        registry.register(fake("auggie", true));
        let agent = registry.prompt_selection(|available| {
            available
                .iter()
                .position(|a| a.name() == "cursor")
                .ok_or_else(|| "not found".to_string())
        });
        assert_eq!(agent.unwrap().name(), "cursor");
    }

    #[test]
    fn prompt_selection_surfaces_ui_error() {
        let registry = Registry::new();
        registry.register(fake("cursor", true));
        registry.register(fake("auggie", true));
        let result = registry.prompt_selection(|_| Err("user aborted".to_string()));
        assert_eq!(
            result,
            Err(SelectError::SelectionFailed("user aborted".to_string()))
        );
    }

    #[test]
    fn unregister_removes_agent() {
        let registry = Registry::new();
        registry.register(fake("cursor", true));
        registry.unregister("cursor");
        assert!(registry.get("cursor").is_none());
    }
}
