// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: fixtures and a scriptable fake agent.

use std::io::Write as _;
use std::path::Path;

use crate::catalog::Problem;

/// The canonical fixture problem.
#[allow(clippy::panic)]
pub fn two_sum() -> Problem {
    let json = serde_json::json!({
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
    });
    serde_json::from_value(json).unwrap_or_else(|e| panic!("{e}"))
}

/// A fake agent that inits, then echoes each user turn as one assistant
/// fragment followed by a result record.
pub const ECHO_AGENT: &str = r#"
import json
import sys

print(json.dumps({"type": "system", "subtype": "init"}), flush=True)
while True:
    line = sys.stdin.readline()
    if not line:
        break
    msg = json.loads(line)
    content = msg["message"]["content"]
    tail = content[-60:]
    print(json.dumps({"type": "assistant", "message": {"content": [
        {"type": "text", "text": "echo: " + tail}]}}), flush=True)
    print(json.dumps({"type": "result", "subtype": "success"}), flush=True)
"#;

/// A fake agent whose first-ever turn fails with an error record; every
/// turn after that succeeds, even from a respawned process (the failure
/// is recorded in a marker file beside the script). Exercises the
/// respawn-then-retry path.
pub const FLAKY_AGENT: &str = r#"
import json
import os
import sys

print(json.dumps({"type": "system", "subtype": "init"}), flush=True)
marker = os.path.join(os.path.dirname(os.path.abspath(__file__)), "flaky-marker")
while True:
    line = sys.stdin.readline()
    if not line:
        break
    if not os.path.exists(marker):
        open(marker, "w").close()
        print(json.dumps({"type": "result", "is_error": True, "result": "transient"}),
              flush=True)
        continue
    print(json.dumps({"type": "assistant", "message": {"content": [
        {"type": "text", "text": "recovered"}]}}), flush=True)
    print(json.dumps({"type": "result", "subtype": "success"}), flush=True)
"#;

/// A fake agent that yields one fragment and then an error, never a
/// result. Exercises the no-retry-after-fragment rule.
pub const MIDSTREAM_FAIL_AGENT: &str = r#"
import json
import sys

print(json.dumps({"type": "system", "subtype": "init"}), flush=True)
while True:
    line = sys.stdin.readline()
    if not line:
        break
    print(json.dumps({"type": "assistant", "message": {"content": [
        {"type": "text", "text": "partial"}]}}), flush=True)
    print(json.dumps({"type": "result", "is_error": True, "result": "midstream"}),
          flush=True)
"#;

/// A fake agent that inits and then goes silent forever.
pub const SILENT_AGENT: &str = r#"
import json
import sys
import time

print(json.dumps({"type": "system", "subtype": "init"}), flush=True)
while True:
    line = sys.stdin.readline()
    if not line:
        break
    time.sleep(3600)
"#;

/// Write a fake agent script into `dir` and return the command that runs
/// it (the script ignores the standard agent flags).
pub fn write_fake_agent(dir: &Path, script: &str) -> anyhow::Result<String> {
    let path = dir.join("fake_agent.py");
    let mut file = std::fs::File::create(&path)?;
    file.write_all(script.as_bytes())?;
    file.flush()?;
    Ok(format!("python3 {}", path.display()))
}

/// Skip-guard: true when a usable interpreter is on PATH.
pub fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
