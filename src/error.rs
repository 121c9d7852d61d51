//! Error taxonomy for the loop engine and its collaborators.
//!
//! Each variant carries a human message and, where the source names one, a
//! remediation string. Call sites that cross a process or filesystem
//! boundary still return `anyhow::Result` and attach one of these via
//! `anyhow::Error::from` / `?`; the taxonomy exists so callers can query
//! *kind* (retryable vs. user error) without string-matching messages.

use thiserror::Error;

/// Semantic error kinds produced by the loop engine and its collaborators.
#[derive(Debug, Error)]
pub enum RalphError {
    #[error("agent error: {message}")]
    Agent {
        message: String,
        remediation: Option<String>,
    },

    #[error("config error: {message}")]
    Config {
        message: String,
        remediation: Option<String>,
    },

    #[error("task error: {message}")]
    Task {
        message: String,
        remediation: Option<String>,
    },

    #[error("build failed (exit {exit_code}): {stderr_tail}")]
    Build { exit_code: i32, stderr_tail: String },

    #[error("test failures: {regressed:?}")]
    Test {
        /// Tests that regressed from a passing baseline (TDD mode), or all
        /// observed failures (gate mode).
        regressed: Vec<String>,
    },

    #[error("timeout: {kind}")]
    Timeout { kind: TimeoutKind },

    #[error("cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("git error: {message}")]
    Git {
        message: String,
        remediation: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Active,
    Stuck,
    Operation,
}

impl std::fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutKind::Active => write!(f, "active"),
            TimeoutKind::Stuck => write!(f, "stuck"),
            TimeoutKind::Operation => write!(f, "operation"),
        }
    }
}

impl RalphError {
    /// Whether retrying the same operation might succeed (network/timeout
    /// style failures), as opposed to needing a config or auth fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RalphError::Timeout { .. } | RalphError::Build { .. } | RalphError::Test { .. }
        )
    }

    /// Whether the failure is attributable to the user's configuration or
    /// environment (config/auth), as opposed to a transient condition.
    pub fn is_user_error(&self) -> bool {
        matches!(self, RalphError::Config { .. } | RalphError::Git { .. })
            || matches!(self, RalphError::Agent { remediation: Some(_), .. })
    }

    pub fn remediation(&self) -> Option<&str> {
        match self {
            RalphError::Agent { remediation, .. }
            | RalphError::Config { remediation, .. }
            | RalphError::Task { remediation, .. }
            | RalphError::Git { remediation, .. } => remediation.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retryable() {
        let e = RalphError::Timeout {
            kind: TimeoutKind::Active,
        };
        assert!(e.is_retryable());
        assert!(!e.is_user_error());
    }

    #[test]
    fn config_is_user_error() {
        let e = RalphError::Config {
            message: "missing field".into(),
            remediation: Some("add it".into()),
        };
        assert!(e.is_user_error());
        assert!(!e.is_retryable());
    }

    #[test]
    fn agent_with_remediation_is_user_error() {
        let e = RalphError::Agent {
            message: "not authenticated".into(),
            remediation: Some("run `cursor login`".into()),
        };
        assert!(e.is_user_error());
    }

    #[test]
    fn test_error_carries_regressed_list() {
        let e = RalphError::Test {
            regressed: vec!["TestFoo".to_string()],
        };
        match e {
            RalphError::Test { regressed } => assert_eq!(regressed, vec!["TestFoo".to_string()]),
            _ => panic!("wrong variant"),
        }
    }
}
