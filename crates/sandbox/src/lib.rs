// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandboxed executor for untrusted user code.
//!
//! Runs a user-submitted function against catalog test cases inside a
//! short-lived interpreter subprocess with hard resource limits, and
//! reports one structured record per case.

pub mod exec;
pub mod report;
pub mod sanitize;
pub mod wrapper;

pub use exec::{Executor, ResourceLimits, SandboxError, MAX_CODE_BYTES};
pub use report::{RunReport, TestCase, TestResult};
pub use sanitize::sanitize_stderr;
pub use wrapper::validate_function_call;
