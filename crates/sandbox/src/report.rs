// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types produced by the executor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single catalog test case. `function_call` is a trusted template
/// validated at catalog load time — never client-supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// Argument bindings by name, evaluated into the wrapper's scope.
    pub input: serde_json::Map<String, Value>,
    /// Expected return value, compared with deep structural equality.
    pub expected: Value,
    /// Call expression, e.g. `twoSum(nums, target)`.
    pub function_call: String,
}

/// Outcome of one test case.
///
/// Exactly one of the two shapes holds: `passed` with `actual` set and
/// `error` empty, or failed with `error` set and/or `actual != expected`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub test_num: usize,
    pub input: serde_json::Map<String, Value>,
    pub expected: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
}

impl TestResult {
    /// A failed record carrying an executor- or user-level error.
    pub fn failure(test_num: usize, case: &TestCase, error: impl Into<String>) -> Self {
        Self {
            test_num,
            input: case.input.clone(),
            expected: case.expected.clone(),
            actual: None,
            passed: false,
            error: Some(error.into()),
            runtime_ms: None,
            stdout: String::new(),
        }
    }

    pub fn with_stdout(mut self, stdout: String) -> Self {
        self.stdout = stdout;
        self
    }
}

/// Aggregate result of a full `run_tests` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TestResult>,
}

impl RunReport {
    /// Tally pass/fail counts from a result list.
    pub fn from_results(results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let failed = results.len() - passed;
        Self { passed, failed, results }
    }

    /// True when every case passed (and at least one ran).
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.passed > 0
    }
}
