//! Recognized `.ralph/config.yaml` options.
//!
//! All options are optional unless noted; unknown keys are ignored so older
//! config files keep loading after this crate adds fields.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// A custom-agent descriptor (`agent.custom[]`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CustomAgentConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args_prefix: Vec<String>,
    #[serde(default)]
    pub description: String,
    /// Availability probe: "command" | "path" | "env" | "always".
    #[serde(default = "default_detection_method")]
    pub detection_method: String,
    #[serde(default)]
    pub detection_value: Option<String>,
    #[serde(default)]
    pub model_list_command: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
}

fn default_detection_method() -> String {
    "command".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub custom: Vec<CustomAgentConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct BuildConfig {
    #[serde(default)]
    pub command: Option<String>,
}

/// Verification gate mode (`test.mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestMode {
    /// Any failure fails the gate.
    Gate,
    /// Only regressions against the baseline fail the gate.
    Tdd,
    /// Failures are reported, never fail the gate.
    Report,
}

impl Default for TestMode {
    fn default() -> Self {
        TestMode::Tdd
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestMode::Gate => write!(f, "gate"),
            TestMode::Tdd => write!(f, "tdd"),
            TestMode::Report => write!(f, "report"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TestConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub mode: TestMode,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            command: None,
            mode: TestMode::default(),
        }
    }
}

/// Wrapper so duration fields accept `"2h"`, `"30m"`, `"90s"` in YAML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw)
            .map(HumanDuration)
            .map_err(serde::de::Error::custom)
    }
}

/// Parse a duration string like `2h`, `30m`, `90s`. Bare integers are seconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        anyhow::bail!("empty duration");
    }
    let (digits, suffix) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let n: u64 = digits
        .parse()
        .with_context(|| format!("invalid duration '{raw}'"))?;
    let secs = match suffix {
        "s" | "" => n,
        "m" => n * 60,
        "h" => n * 3600,
        other => anyhow::bail!("unknown duration suffix '{other}' in '{raw}'"),
    };
    Ok(Duration::from_secs(secs))
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TimeoutConfig {
    #[serde(default = "default_active_timeout")]
    pub active: HumanDuration,
    #[serde(default = "default_stuck_timeout")]
    pub stuck: HumanDuration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            active: default_active_timeout(),
            stuck: default_stuck_timeout(),
        }
    }
}

fn default_active_timeout() -> HumanDuration {
    HumanDuration(Duration::from_secs(2 * 3600))
}

fn default_stuck_timeout() -> HumanDuration {
    HumanDuration(Duration::from_secs(30 * 60))
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct HooksConfig {
    #[serde(default)]
    pub pre_task: Vec<String>,
    #[serde(default)]
    pub post_task: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GitConfig {
    #[serde(default)]
    pub auto_commit: bool,
}

/// Parsed `.ralph/config.yaml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub test: TestConfig,
    #[serde(default)]
    pub timeout: TimeoutConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub git: GitConfig,
}

impl Config {
    /// Load config from a YAML file. A missing file yields the default
    /// config (every option is optional per the spec).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_test_mode_is_tdd() {
        assert_eq!(TestConfig::default().mode, TestMode::Tdd);
    }

    #[test]
    fn default_timeouts_match_spec() {
        let t = TimeoutConfig::default();
        assert_eq!(t.active.0, Duration::from_secs(2 * 3600));
        assert_eq!(t.stuck.0, Duration::from_secs(30 * 60));
    }

    #[test]
    fn parse_duration_hours() {
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn parse_duration_minutes() {
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
    }

    #[test]
    fn parse_duration_seconds_bare() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn parse_duration_rejects_unknown_suffix() {
        assert!(parse_duration("3x").is_err());
    }

    #[test]
    fn load_missing_file_yields_default() {
        let config = Config::load(Path::new("/nonexistent/config.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_parses_full_config() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"
agent:
  default: cursor
  model: fast
test:
  command: "cargo test"
  mode: gate
build:
  command: "cargo build"
timeout:
  active: "1h"
  stuck: "10m"
git:
  auto_commit: true
hooks:
  pre_task:
    - "echo starting"
  post_task:
    - "git commit -am wip"
"#,
        )
        .unwrap();

        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.agent.default, Some("cursor".to_string()));
        assert_eq!(config.test.mode, TestMode::Gate);
        assert_eq!(config.test.command, Some("cargo test".to_string()));
        assert_eq!(config.timeout.active.0, Duration::from_secs(3600));
        assert!(config.git.auto_commit);
        assert_eq!(config.hooks.pre_task, vec!["echo starting".to_string()]);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "totally_unknown_key: 5\n").unwrap();
        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config, Config::default());
    }
}
