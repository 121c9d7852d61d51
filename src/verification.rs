//! Verification Gate (C4): build + test the project, classify outcomes,
//! and apply the TDD baseline/regression policy.
//!
//! Grounded in the same subprocess pipeline adapters use
//! ([`crate::agent::process`]) but invoking the project's own build/test
//! commands rather than an agent binary.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, TestMode};

/// A single test's last observed outcome, keyed by test identifier.
pub type TestBaseline = BTreeMap<String, TestOutcome>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildResult {
    Skipped { reason: String },
    Succeeded,
    Failed { exit_code: i32, stderr_tail: String },
}

impl BuildResult {
    pub fn success(&self) -> bool {
        !matches!(self, BuildResult::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFailure {
    pub name: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestResult {
    Skipped { reason: String },
    Succeeded { total: u32, passed: Vec<String> },
    Failed {
        exit_code: i32,
        failures: Vec<TestFailure>,
        passed: Vec<String>,
        duration: Duration,
    },
}

impl TestResult {
    pub fn failures(&self) -> &[TestFailure] {
        match self {
            TestResult::Failed { failures, .. } => failures,
            _ => &[],
        }
    }

    pub fn passed(&self) -> &[String] {
        match self {
            TestResult::Succeeded { passed, .. } => passed,
            TestResult::Failed { passed, .. } => passed,
            TestResult::Skipped { .. } => &[],
        }
    }
}

/// Per-task project info the gate needs (subset of the cached analyzer
/// output named by spec §3/§4.4; the analyzer itself is out of scope).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ProjectAnalysis {
    pub greenfield: bool,
    pub tests_ready: bool,
    pub has_test_files: bool,
}

/// Outcome of a full gate run: build, then (if build passed) test.
#[derive(Debug, Clone)]
pub struct GateResult {
    pub build: BuildResult,
    pub test: TestResult,
    pub passed: bool,
    pub regressed: Vec<String>,
}

/// Run the build command, if configured.
pub async fn run_build(
    command: Option<&str>,
    working_dir: &Path,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<BuildResult> {
    let Some(command) = command else {
        return Ok(BuildResult::Skipped {
            reason: "no build command configured".to_string(),
        });
    };

    let (exit_code, _stdout, stderr) = run_command(command, working_dir, timeout, cancel).await?;
    if exit_code == 0 {
        Ok(BuildResult::Succeeded)
    } else {
        Ok(BuildResult::Failed {
            exit_code,
            stderr_tail: tail_lines(&stderr, 20),
        })
    }
}

/// Run the test command, if configured and the project isn't greenfield.
pub async fn run_test(
    command: Option<&str>,
    analysis: &ProjectAnalysis,
    working_dir: &Path,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<TestResult> {
    if analysis.greenfield {
        return Ok(TestResult::Skipped {
            reason: "project is greenfield".to_string(),
        });
    }
    if !analysis.tests_ready || !analysis.has_test_files {
        return Ok(TestResult::Skipped {
            reason: "no test files present".to_string(),
        });
    }
    let Some(command) = command else {
        return Ok(TestResult::Skipped {
            reason: "no test command configured".to_string(),
        });
    };

    let start = Instant::now();
    let (exit_code, stdout, stderr, timed_out) =
        run_command_with_timeout_flag(command, working_dir, timeout, cancel).await?;
    let duration = start.elapsed();

    if timed_out {
        return Ok(TestResult::Failed {
            exit_code: -1,
            failures: vec![TestFailure {
                name: None,
                message: "tests timed out".to_string(),
            }],
            duration,
        });
    }

    if exit_code == 0 {
        return Ok(TestResult::Succeeded {
            total: count_passes(&stdout),
            passed: parse_passes(&stdout),
        });
    }

    let combined = format!("{stdout}\n{stderr}");
    Ok(TestResult::Failed {
        exit_code,
        failures: parse_failures(&combined),
        passed: parse_passes(&combined),
        duration,
    })
}

/// Apply the TDD mode policy: compare `test` against `baseline` and decide
/// whether the gate passes, attaching the regression set.
pub fn apply_policy(build: BuildResult, test: TestResult, mode: TestMode, baseline: &TestBaseline) -> GateResult {
    if !build.success() {
        return GateResult {
            passed: false,
            regressed: Vec::new(),
            build,
            test,
        };
    }

    let failures = test.failures();
    let regressed: Vec<String> = failures
        .iter()
        .filter_map(|f| f.name.as_ref())
        .filter(|name| baseline.get(*name) == Some(&TestOutcome::Pass))
        .cloned()
        .collect();

    let passed = match mode {
        TestMode::Gate => failures.is_empty(),
        TestMode::Tdd => regressed.is_empty(),
        TestMode::Report => true,
    };

    GateResult {
        build,
        test,
        passed,
        regressed,
    }
}

/// Update a baseline from a test result. Called once per session on the
/// first parseable result, and again after every gate, capturing both
/// passing and failing tests so later runs can tell a regression (a test
/// that was passing) from a test never before seen passing (spec §3).
pub fn update_baseline(baseline: &mut TestBaseline, test: &TestResult) {
    for name in test.passed() {
        baseline.insert(name.clone(), TestOutcome::Pass);
    }
    if let TestResult::Failed { failures, .. } = test {
        for failure in failures {
            if let Some(name) = &failure.name {
                baseline.insert(name.clone(), TestOutcome::Fail);
            }
        }
    }
}

/// Run the full gate: build, then test if the build passed, then apply policy.
pub async fn run_gate(
    config: &Config,
    analysis: &ProjectAnalysis,
    working_dir: &Path,
    baseline: &TestBaseline,
    cancel: CancellationToken,
) -> Result<GateResult> {
    let timeout = config.timeout.active.0;
    let build = run_build(
        config.build.command.as_deref(),
        working_dir,
        timeout,
        cancel.clone(),
    )
    .await?;

    if !build.success() {
        return Ok(GateResult {
            test: TestResult::Skipped {
                reason: "build failed".to_string(),
            },
            passed: false,
            regressed: Vec::new(),
            build,
        });
    }

    let test = run_test(
        config.test.command.as_deref(),
        analysis,
        working_dir,
        timeout,
        cancel,
    )
    .await?;

    Ok(apply_policy(build, test, config.test.mode, baseline))
}

async fn run_command(
    command: &str,
    working_dir: &Path,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<(i32, String, String)> {
    let (code, stdout, stderr, _timed_out) =
        run_command_with_timeout_flag(command, working_dir, timeout, cancel).await?;
    Ok((code, stdout, stderr))
}

async fn run_command_with_timeout_flag(
    command: &str,
    working_dir: &Path,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<(i32, String, String, bool)> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdout_pipe = child.stdout.take().expect("piped stdout");
    let mut stderr_pipe = child.stderr.take().expect("piped stderr");

    let stdout_task = tokio::spawn(async move {
        let mut buf = String::new();
        let _ = stdout_pipe.read_to_string(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        let _ = stderr_pipe.read_to_string(&mut buf).await;
        buf
    });

    let timed_out;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            let _ = child.start_kill();
            timed_out = true;
        }
        _ = tokio::time::sleep(timeout) => {
            let _ = child.start_kill();
            timed_out = true;
        }
        _ = child.wait() => {
            timed_out = false;
        }
    }

    let status = child.wait().await.ok();
    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();
    let exit_code = status.and_then(|s| s.code()).unwrap_or(-1);

    Ok((exit_code, stdout, stderr, timed_out))
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

fn count_passes(stdout: &str) -> u32 {
    stdout
        .lines()
        .filter(|l| l.contains("test result: ok") || l.trim_start().starts_with("PASS"))
        .count() as u32
}

/// Parse `--- FAIL: <name>` (+ optional `<file>:<line>: <msg>` on the next
/// line) and a generic `FAIL: <msg>` fallback, per spec §4.4.
fn parse_failures(text: &str) -> Vec<TestFailure> {
    let mut failures = Vec::new();
    let lines: Vec<&str> = text.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix("--- FAIL: ") {
            let name = name.trim().to_string();
            let message = lines
                .get(i + 1)
                .map(|next| next.trim())
                .filter(|next| next.contains(':'))
                .map(|next| next.to_string())
                .unwrap_or_else(|| "failed".to_string());
            failures.push(TestFailure {
                name: Some(name),
                message,
            });
        } else if let Some(msg) = trimmed.strip_prefix("FAIL: ") {
            failures.push(TestFailure {
                name: None,
                message: msg.trim().to_string(),
            });
        }
    }

    failures
}

/// Parse `--- PASS: <name>` lines (Go-style verbose test output) to seed
/// the baseline with tests observed passing.
fn parse_passes(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("--- PASS: "))
        .map(|name| name.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_build_command_is_skipped_and_succeeds() {
        let result = futures_skip(run_build(None, Path::new("."), Duration::from_secs(1), CancellationToken::new()));
        assert!(matches!(result, BuildResult::Skipped { .. }));
        assert!(result.success());
    }

    #[tokio::test]
    async fn build_failure_captures_stderr_tail() {
        let result = run_build(
            Some("echo boom 1>&2; exit 2"),
            Path::new("."),
            Duration::from_secs(5),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        match result {
            BuildResult::Failed { exit_code, stderr_tail } => {
                assert_eq!(exit_code, 2);
                assert!(stderr_tail.contains("boom"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn greenfield_project_skips_tests() {
        let analysis = ProjectAnalysis {
            greenfield: true,
            ..Default::default()
        };
        let result = run_test(
            Some("exit 1"),
            &analysis,
            Path::new("."),
            Duration::from_secs(1),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(matches!(result, TestResult::Skipped { .. }));
    }

    #[test]
    fn parse_failures_handles_go_style_fail_blocks() {
        let text = "--- FAIL: TestFoo\nfoo_test.go:12: expected true, got false\nPASS\n";
        let failures = parse_failures(text);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name.as_deref(), Some("TestFoo"));
        assert!(failures[0].message.contains("expected true"));
    }

    #[test]
    fn parse_failures_handles_generic_fallback() {
        let text = "FAIL: something broke\n";
        let failures = parse_failures(text);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, None);
        assert_eq!(failures[0].message, "something broke");
    }

    #[test]
    fn tdd_regression_law_no_regression_when_baseline_already_failing() {
        let mut baseline = TestBaseline::new();
        baseline.insert("X".to_string(), TestOutcome::Pass);
        baseline.insert("Y".to_string(), TestOutcome::Fail);

        let test = TestResult::Failed {
            exit_code: 1,
            failures: vec![
                TestFailure { name: Some("Y".to_string()), message: "".to_string() },
                TestFailure { name: Some("Z".to_string()), message: "".to_string() },
            ],
            passed: Vec::new(),
            duration: Duration::from_secs(1),
        };

        let gate = apply_policy(BuildResult::Succeeded, test, TestMode::Tdd, &baseline);
        assert!(gate.passed);
        assert!(gate.regressed.is_empty());
    }

    #[test]
    fn tdd_regression_law_fails_when_baseline_passing_test_now_fails() {
        let mut baseline = TestBaseline::new();
        baseline.insert("X".to_string(), TestOutcome::Pass);
        baseline.insert("Y".to_string(), TestOutcome::Fail);

        let test = TestResult::Failed {
            exit_code: 1,
            failures: vec![TestFailure {
                name: Some("X".to_string()),
                message: "".to_string(),
            }],
            passed: Vec::new(),
            duration: Duration::from_secs(1),
        };

        let gate = apply_policy(BuildResult::Succeeded, test, TestMode::Tdd, &baseline);
        assert!(!gate.passed);
        assert_eq!(gate.regressed, vec!["X".to_string()]);
    }

    #[test]
    fn gate_mode_fails_on_any_failure() {
        let baseline = TestBaseline::new();
        let test = TestResult::Failed {
            exit_code: 1,
            failures: vec![TestFailure {
                name: Some("Z".to_string()),
                message: "".to_string(),
            }],
            passed: Vec::new(),
            duration: Duration::from_secs(1),
        };
        let gate = apply_policy(BuildResult::Succeeded, test, TestMode::Gate, &baseline);
        assert!(!gate.passed);
    }

    #[test]
    fn report_mode_never_fails() {
        let baseline = TestBaseline::new();
        let test = TestResult::Failed {
            exit_code: 1,
            failures: vec![TestFailure {
                name: Some("Z".to_string()),
                message: "".to_string(),
            }],
            passed: Vec::new(),
            duration: Duration::from_secs(1),
        };
        let gate = apply_policy(BuildResult::Succeeded, test, TestMode::Report, &baseline);
        assert!(gate.passed);
    }

    #[test]
    fn parse_passes_extracts_go_style_pass_names() {
        let text = "--- PASS: TestFoo\n--- FAIL: TestBar\nbar_test.go:3: nope\nPASS\n";
        let passed = parse_passes(text);
        assert_eq!(passed, vec!["TestFoo".to_string()]);
    }

    #[test]
    fn update_baseline_captures_both_passes_and_failures() {
        let mut baseline = TestBaseline::new();
        let test = TestResult::Failed {
            exit_code: 1,
            failures: vec![TestFailure {
                name: Some("TestBar".to_string()),
                message: "nope".to_string(),
            }],
            passed: vec!["TestFoo".to_string()],
            duration: Duration::from_secs(1),
        };

        update_baseline(&mut baseline, &test);
        assert_eq!(baseline.get("TestFoo"), Some(&TestOutcome::Pass));
        assert_eq!(baseline.get("TestBar"), Some(&TestOutcome::Fail));
    }

    #[test]
    fn a_baseline_pass_later_failing_is_flagged_a_regression() {
        let mut baseline = TestBaseline::new();
        update_baseline(
            &mut baseline,
            &TestResult::Succeeded {
                total: 1,
                passed: vec!["TestFoo".to_string()],
            },
        );
        assert_eq!(baseline.get("TestFoo"), Some(&TestOutcome::Pass));

        let test = TestResult::Failed {
            exit_code: 1,
            failures: vec![TestFailure {
                name: Some("TestFoo".to_string()),
                message: "broke".to_string(),
            }],
            passed: Vec::new(),
            duration: Duration::from_secs(1),
        };
        let gate = apply_policy(BuildResult::Succeeded, test.clone(), TestMode::Tdd, &baseline);
        assert!(!gate.passed);
        assert_eq!(gate.regressed, vec!["TestFoo".to_string()]);

        update_baseline(&mut baseline, &test);
        assert_eq!(baseline.get("TestFoo"), Some(&TestOutcome::Fail));
    }

    #[test]
    fn failed_build_short_circuits_the_gate() {
        let build = BuildResult::Failed {
            exit_code: 1,
            stderr_tail: "nope".to_string(),
        };
        let gate = apply_policy(build, TestResult::Skipped { reason: "n/a".to_string() }, TestMode::Tdd, &TestBaseline::new());
        assert!(!gate.passed);
    }

    /// Drives a `Future` that's `tokio`-free to completion for a sync test;
    /// `run_build(None, ..)` never awaits the runtime, only the
    /// immediate-return branch, so a tiny manual block-on suffices.
    fn futures_skip<F: std::future::Future>(f: F) -> F::Output {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(f)
    }
}
