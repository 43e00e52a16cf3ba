// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution with hard limits.
//!
//! One interpreter subprocess per test case, spawned in its own process
//! group with a stripped environment. Wall-clock expiry signals the whole
//! group (SIGTERM, short grace, SIGKILL) and the child is always reaped.
//! Resource limits are applied by the wrapper inside the child, never via
//! a pre-exec hook.

use std::io::Write as _;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::report::{RunReport, TestCase, TestResult};
use crate::sanitize::sanitize_stderr;
use crate::wrapper::{self, Markers};

/// Maximum accepted user code size.
pub const MAX_CODE_BYTES: usize = 50 * 1024;

/// Grace between SIGTERM and SIGKILL when a case times out.
const KILL_GRACE: Duration = Duration::from_millis(250);

/// Hard limits applied to each test-case subprocess.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    pub memory_bytes: u64,
    pub cpu_seconds: u64,
    /// Wall-clock budget for one case, enforced by the parent.
    pub wall: Duration,
    pub max_open_files: u64,
    pub max_file_bytes: u64,
    pub max_processes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 512 * 1024 * 1024,
            cpu_seconds: 10,
            wall: Duration::from_secs(10),
            max_open_files: 64,
            max_file_bytes: 1024 * 1024,
            max_processes: 32,
        }
    }
}

/// Errors that abort a whole run before any case executes.
#[derive(Debug, PartialEq, Eq)]
pub enum SandboxError {
    /// Submitted code exceeds [`MAX_CODE_BYTES`].
    InputTooLarge { len: usize },
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InputTooLarge { len } => {
                write!(f, "code is {len} bytes; limit is {MAX_CODE_BYTES}")
            }
        }
    }
}

impl std::error::Error for SandboxError {}

/// Stateless test-case runner. Cheap to clone; safe to share across
/// concurrent submissions.
#[derive(Debug, Clone)]
pub struct Executor {
    python: String,
    limits: ResourceLimits,
}

/// What happened to one child process.
enum CaseOutcome {
    Completed { status: std::process::ExitStatus, stdout: String, stderr: String },
    TimedOut,
}

impl Executor {
    pub fn new(python: impl Into<String>) -> Self {
        Self { python: python.into(), limits: ResourceLimits::default() }
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Run `code` against every case in order. Any per-case failure —
    /// timeout, crash, signal, bad output — is reported as a failed
    /// record, never as an error from this function.
    pub async fn run_tests(
        &self,
        code: &str,
        cases: &[TestCase],
    ) -> Result<RunReport, SandboxError> {
        if code.len() > MAX_CODE_BYTES {
            return Err(SandboxError::InputTooLarge { len: code.len() });
        }

        let mut results = Vec::with_capacity(cases.len());
        for (idx, case) in cases.iter().enumerate() {
            let test_num = idx + 1;
            results.push(self.run_case(code, case, test_num).await);
        }
        Ok(RunReport::from_results(results))
    }

    async fn run_case(&self, code: &str, case: &TestCase, test_num: usize) -> TestResult {
        let markers = Markers::generate();
        let source = wrapper::generate(code, case, &self.limits, &markers);

        match self.spawn_and_collect(&source).await {
            Ok(outcome) => self.interpret(outcome, case, test_num, &markers),
            Err(e) => {
                warn!(test_num, err = %e, "sandbox spawn failed");
                TestResult::failure(test_num, case, "Invalid result from sandbox")
            }
        }
    }

    /// Spawn the wrapper and wait for exit or wall-clock expiry.
    async fn spawn_and_collect(&self, source: &str) -> anyhow::Result<CaseOutcome> {
        let mut file = tempfile::Builder::new()
            .prefix("sandbox-case-")
            .suffix(".py")
            .tempfile()
            .context("create wrapper file")?;
        file.write_all(source.as_bytes()).context("write wrapper file")?;
        file.flush().context("flush wrapper file")?;

        let mut child = Command::new(&self.python)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .env("PATH", "/usr/local/bin:/usr/bin:/bin")
            .env("HOME", std::env::temp_dir())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .context("spawn interpreter")?;

        let mut stdout_pipe = child.stdout.take().context("child stdout missing")?;
        let mut stderr_pipe = child.stderr.take().context("child stderr missing")?;
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let pid = child.id();

        let status = tokio::select! {
            status = child.wait() => Some(status.context("wait for child")?),
            _ = tokio::time::sleep(self.limits.wall) => None,
        };

        let outcome = match status {
            Some(status) => {
                let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default())
                    .into_owned();
                let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default())
                    .into_owned();
                CaseOutcome::Completed { status, stdout, stderr }
            }
            None => {
                debug!(?pid, "wall-clock limit hit; killing process group");
                if let Some(pid) = pid {
                    kill_group(pid).await;
                }
                // Reap so no zombie survives the timeout path.
                let _ = child.wait().await;
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                CaseOutcome::TimedOut
            }
        };

        Ok(outcome)
    }

    /// Turn a child outcome into a test record.
    fn interpret(
        &self,
        outcome: CaseOutcome,
        case: &TestCase,
        test_num: usize,
        markers: &Markers,
    ) -> TestResult {
        let (status, stdout, stderr) = match outcome {
            CaseOutcome::TimedOut => {
                let secs = self.limits.wall.as_secs();
                return TestResult::failure(
                    test_num,
                    case,
                    format!("Time Limit Exceeded ({secs} s)"),
                );
            }
            CaseOutcome::Completed { status, stdout, stderr } => (status, stdout, stderr),
        };

        let parsed = wrapper::parse_output(&stdout, markers);

        if let Some(signal) = status.signal() {
            return TestResult::failure(test_num, case, format!("Killed (signal {signal})"))
                .with_stdout(parsed.stdout);
        }

        if !status.success() {
            let detail = sanitize_stderr(stderr.trim());
            let error = if detail.is_empty() {
                format!("exited with status {}", status.code().unwrap_or(-1))
            } else {
                detail
            };
            return TestResult::failure(test_num, case, error).with_stdout(parsed.stdout);
        }

        let record = match parsed.record {
            Some(Ok(record)) => record,
            Some(Err(_)) | None => {
                return TestResult::failure(test_num, case, "Invalid result from sandbox")
                    .with_stdout(parsed.stdout);
            }
        };

        if let Some(error) = record.error {
            return TestResult::failure(test_num, case, sanitize_stderr(error.trim()))
                .with_stdout(parsed.stdout);
        }

        let actual = record.actual.unwrap_or(serde_json::Value::Null);
        let passed = actual == case.expected;
        TestResult {
            test_num,
            input: case.input.clone(),
            expected: case.expected.clone(),
            actual: Some(actual),
            passed,
            error: None,
            runtime_ms: record.runtime_ms,
            stdout: parsed.stdout,
        }
    }
}

/// SIGTERM the group, wait out the grace, then SIGKILL. Signals target
/// the group so descendants the user code forked die with it.
async fn kill_group(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    let group = Pid::from_raw(raw);
    let _ = killpg(group, Signal::SIGTERM);
    tokio::time::sleep(KILL_GRACE).await;
    let _ = killpg(group, Signal::SIGKILL);
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
