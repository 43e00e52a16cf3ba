// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `leettutor` binary against a temp catalog and a fake
//! agent, then exercises it over HTTP and WebSocket.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Resolve the path to the compiled `leettutor` binary.
pub fn leettutor_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("leettutor")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// True when a usable python3 is on PATH (needed for the sandbox and
/// the fake agent).
pub fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// The two-sum fixture problem, including one hidden case.
pub const TWO_SUM_JSON: &str = r#"{
  "id": "two-sum",
  "title": "Two Sum",
  "difficulty": "easy",
  "tags": ["array", "hash-table"],
  "description": "Return indices of two numbers adding to target.",
  "starter_code": "def twoSum(nums, target):\n    pass\n",
  "function_name": "twoSum",
  "test_cases": [{
    "input": {"nums": [2, 7, 11, 15], "target": 9},
    "expected": [0, 1],
    "function_call": "twoSum(nums, target)"
  }],
  "hidden_test_cases": [{
    "input": {"nums": [3, 3], "target": 6},
    "expected": [0, 1],
    "function_call": "twoSum(nums, target)"
  }],
  "hints": ["Think about what you need to find for each element."]
}"#;

/// A fake tutor agent: inits, then echoes every turn as one fragment
/// plus a result record.
pub const FAKE_AGENT: &str = r#"
import json
import sys

print(json.dumps({"type": "system", "subtype": "init"}), flush=True)
while True:
    line = sys.stdin.readline()
    if not line:
        break
    print(json.dumps({"type": "assistant", "message": {"content": [
        {"type": "text", "text": "tutor says hello"}]}}), flush=True)
    print(json.dumps({"type": "result", "subtype": "success"}), flush=True)
"#;

/// Builder for a [`TutorProcess`].
pub struct TutorBuilder {
    password: Option<String>,
    sandbox_timeout_secs: u64,
}

impl Default for TutorBuilder {
    fn default() -> Self {
        Self { password: None, sandbox_timeout_secs: 10 }
    }
}

impl TutorBuilder {
    /// Enable auth with this password.
    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_owned());
        self
    }

    /// Shorten the sandbox wall clock (for timeout specs).
    pub fn sandbox_timeout(mut self, secs: u64) -> Self {
        self.sandbox_timeout_secs = secs;
        self
    }

    /// Spawn the binary against a fresh temp catalog.
    pub fn spawn(self) -> anyhow::Result<TutorProcess> {
        let binary = leettutor_binary();
        anyhow::ensure!(binary.exists(), "leettutor binary not found at {}", binary.display());

        let dir = tempfile::tempdir()?;
        let problems = dir.path().join("problems");
        std::fs::create_dir_all(&problems)?;
        std::fs::write(problems.join("two-sum.json"), TWO_SUM_JSON)?;

        let agent_path = dir.path().join("fake_agent.py");
        let mut agent_file = std::fs::File::create(&agent_path)?;
        agent_file.write_all(FAKE_AGENT.as_bytes())?;
        agent_file.flush()?;

        let port = free_port()?;
        let mut args: Vec<String> = vec![
            "--host".into(),
            "127.0.0.1".into(),
            "--port".into(),
            port.to_string(),
            "--problems-dir".into(),
            problems.display().to_string(),
            "--sessions-dir".into(),
            dir.path().join("sessions").display().to_string(),
            "--workspace-dir".into(),
            dir.path().join("workspace").display().to_string(),
            "--agent-cmd".into(),
            format!("python3 {}", agent_path.display()),
            "--idle-nudge-minutes".into(),
            "0".into(),
            "--sandbox-timeout-secs".into(),
            self.sandbox_timeout_secs.to_string(),
            "--log-format".into(),
            "text".into(),
            "--log-level".into(),
            "warn".into(),
        ];
        args.extend(["--password".into(), self.password.clone().unwrap_or_default()]);

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(TutorProcess { child, port, _dir: dir })
    }
}

/// A running `leettutor` process, killed on drop.
pub struct TutorProcess {
    child: Child,
    port: u16,
    _dir: tempfile::TempDir,
}

impl TutorProcess {
    /// Spawn with defaults (no auth).
    pub fn start() -> anyhow::Result<Self> {
        TutorBuilder::default().spawn()
    }

    pub fn build() -> TutorBuilder {
        TutorBuilder::default()
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws/chat", self.port)
    }

    /// Poll the public auth-status route until the server answers.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let url = format!("{}/api/auth/status", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("leettutor did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for TutorProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
