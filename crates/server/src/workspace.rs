// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session scratch directory the tutor agent can read.
//!
//! `solution.py` and `test_results.json` are rewritten before every agent
//! turn and on every submission, so the agent always sees current state
//! from its working directory.

use std::path::{Path, PathBuf};

use anyhow::Context;
use sandbox::RunReport;

use crate::session_log::valid_session_id;

#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    /// Create (or reuse) `root/<session_id>/`.
    pub fn for_session(root: &Path, session_id: &str) -> anyhow::Result<Self> {
        if !valid_session_id(session_id) {
            anyhow::bail!("invalid session id: {session_id}");
        }
        let dir = root.join(session_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create workspace {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_solution(&self, code: &str) -> anyhow::Result<()> {
        std::fs::write(self.dir.join("solution.py"), code).context("write solution.py")
    }

    pub fn write_test_results(&self, report: &RunReport) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(report).context("serialize test results")?;
        std::fs::write(self.dir.join("test_results.json"), json).context("write test_results.json")
    }

    /// Best-effort cleanup when a session ends.
    pub fn remove(&self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}
