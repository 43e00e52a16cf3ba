// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serde_json::json;

use super::{Executor, ResourceLimits, SandboxError, MAX_CODE_BYTES};
use crate::report::TestCase;

const PYTHON: &str = "python3";

/// Skip-guard: true when a usable interpreter is on PATH.
fn python_available() -> bool {
    std::process::Command::new(PYTHON)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn two_sum_case() -> TestCase {
    let mut input = serde_json::Map::new();
    input.insert("nums".to_owned(), json!([2, 7, 11, 15]));
    input.insert("target".to_owned(), json!(9));
    TestCase { input, expected: json!([0, 1]), function_call: "twoSum(nums, target)".to_owned() }
}

const TWO_SUM_OK: &str = r#"
def twoSum(nums, target):
    seen = {}
    for i, n in enumerate(nums):
        if target - n in seen:
            return [seen[target - n], i]
        seen[n] = i
"#;

#[tokio::test]
async fn happy_path_passes() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let executor = Executor::new(PYTHON);
    let report = executor.run_tests(TWO_SUM_OK, &[two_sum_case()]).await?;

    assert_eq!(report.passed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.results.len(), 1);
    let r = &report.results[0];
    assert!(r.passed);
    assert_eq!(r.test_num, 1);
    assert_eq!(r.actual, Some(json!([0, 1])));
    assert!(r.error.is_none());
    assert!(r.runtime_ms.is_some_and(|ms| ms >= 0.0));
    Ok(())
}

#[tokio::test]
async fn wrong_answer_fails_with_actual() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let executor = Executor::new(PYTHON);
    let code = "def twoSum(nums, target):\n    return [1, 0]\n";
    let report = executor.run_tests(code, &[two_sum_case()]).await?;

    let r = &report.results[0];
    assert!(!r.passed);
    assert!(r.error.is_none());
    assert_eq!(r.actual, Some(json!([1, 0])));
    Ok(())
}

#[tokio::test]
async fn exception_surfaces_as_error() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let executor = Executor::new(PYTHON);
    let code = "def twoSum(nums, target):\n    return 1 // 0\n";
    let report = executor.run_tests(code, &[two_sum_case()]).await?;

    let r = &report.results[0];
    assert!(!r.passed);
    let error = r.error.as_deref().unwrap_or("");
    assert!(error.contains("ZeroDivisionError"), "error was: {error}");
    // Traceback paths never leak the host temp dir.
    assert!(!error.contains("/tmp/"), "unsanitized path in: {error}");
    Ok(())
}

#[tokio::test]
async fn stdout_is_captured_per_test() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let executor = Executor::new(PYTHON);
    let code = "def twoSum(nums, target):\n    print(\"debugging\", nums)\n    return [0, 1]\n";
    let report = executor.run_tests(code, &[two_sum_case()]).await?;

    let r = &report.results[0];
    assert!(r.passed);
    assert!(r.stdout.contains("debugging [2, 7, 11, 15]"), "stdout was: {:?}", r.stdout);
    Ok(())
}

#[tokio::test]
async fn infinite_loop_times_out_without_zombie() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let limits = ResourceLimits { wall: Duration::from_secs(1), ..Default::default() };
    let executor = Executor::new(PYTHON).with_limits(limits);
    let code = "def twoSum(nums, target):\n    while True:\n        pass\n";

    let started = std::time::Instant::now();
    let report = executor.run_tests(code, &[two_sum_case()]).await?;
    // Killed within a small grace past the 1 s budget.
    assert!(started.elapsed() < Duration::from_secs(5));

    let r = &report.results[0];
    assert!(!r.passed);
    let error = r.error.as_deref().unwrap_or("");
    assert!(error.contains("Time Limit Exceeded"), "error was: {error}");
    Ok(())
}

#[tokio::test]
async fn missing_function_reports_name_error() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let executor = Executor::new(PYTHON);
    let report = executor.run_tests("x = 1\n", &[two_sum_case()]).await?;

    let r = &report.results[0];
    assert!(!r.passed);
    assert!(r.error.as_deref().unwrap_or("").contains("NameError"));
    Ok(())
}

#[tokio::test]
async fn results_keep_input_order() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let executor = Executor::new(PYTHON);
    let code = "def double(n):\n    return n * 2\n";
    let cases: Vec<TestCase> = (1..=3)
        .map(|n| {
            let mut input = serde_json::Map::new();
            input.insert("n".to_owned(), json!(n));
            TestCase { input, expected: json!(n * 2), function_call: "double(n)".to_owned() }
        })
        .collect();

    let report = executor.run_tests(code, &cases).await?;
    assert_eq!(report.passed, 3);
    let nums: Vec<usize> = report.results.iter().map(|r| r.test_num).collect();
    assert_eq!(nums, vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn oversized_code_is_rejected_before_spawn() {
    let executor = Executor::new(PYTHON);
    let at_limit = "#".repeat(MAX_CODE_BYTES);
    let over_limit = "#".repeat(MAX_CODE_BYTES + 1);

    // Exactly at the limit is accepted (no cases, so no interpreter runs).
    let ok = executor.run_tests(&at_limit, &[]).await;
    assert!(ok.is_ok());

    let err = executor.run_tests(&over_limit, &[]).await;
    assert_eq!(err.err(), Some(SandboxError::InputTooLarge { len: MAX_CODE_BYTES + 1 }));
}

#[tokio::test]
async fn string_inputs_with_quotes_survive() -> anyhow::Result<()> {
    if !python_available() {
        return Ok(());
    }
    let executor = Executor::new(PYTHON);
    let code = "def shout(s):\n    return s.upper()\n";
    let mut input = serde_json::Map::new();
    input.insert("s".to_owned(), json!("it's \"quoted\" — ünïcode"));
    let case = TestCase {
        input,
        expected: json!("IT'S \"QUOTED\" — ÜNÏCODE"),
        function_call: "shout(s)".to_owned(),
    };

    let report = executor.run_tests(code, &[case]).await?;
    assert!(report.results[0].passed, "error: {:?}", report.results[0].error);
    Ok(())
}
