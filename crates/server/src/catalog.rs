// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static problem catalog, loaded once at startup and immutable after.
//!
//! Every call template in a problem file is validated at load time; a
//! file that fails validation is rejected before it can ever reach the
//! sandbox.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use rand::seq::IteratorRandom;
use sandbox::{validate_function_call, TestCase};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::ErrorCode;

/// A practice problem as stored in the catalog directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub title: String,
    pub difficulty: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub description: String,
    pub starter_code: String,
    pub function_name: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub hidden_test_cases: Vec<TestCase>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimal_complexity: Option<String>,
    #[serde(default)]
    pub approaches: Vec<String>,
    #[serde(default)]
    pub helpers: Vec<String>,
}

impl Problem {
    /// Visible plus hidden cases, submit order.
    pub fn all_cases(&self) -> Vec<TestCase> {
        let mut cases = self.test_cases.clone();
        cases.extend(self.hidden_test_cases.iter().cloned());
        cases
    }
}

/// Listing form of a problem, without bodies or test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemSummary {
    pub id: String,
    pub title: String,
    pub difficulty: String,
    pub tags: Vec<String>,
}

impl From<&Problem> for ProblemSummary {
    fn from(p: &Problem) -> Self {
        Self {
            id: p.id.clone(),
            title: p.title.clone(),
            difficulty: p.difficulty.clone(),
            tags: p.tags.clone(),
        }
    }
}

/// The immutable problem set.
#[derive(Debug, Default)]
pub struct Catalog {
    problems: HashMap<String, Arc<Problem>>,
}

impl Catalog {
    /// Load every `*.json` file under `dir`. Files that fail parsing or
    /// template validation are rejected and logged with
    /// [`ErrorCode::CatalogError`]; the rest of the catalog still loads.
    pub fn load_dir(dir: &Path) -> anyhow::Result<Self> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("read problems dir {}", dir.display()))?;

        let mut problems = HashMap::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_problem(&path) {
                Ok(problem) => {
                    problems.insert(problem.id.clone(), Arc::new(problem));
                }
                Err(e) => {
                    error!(
                        code = %ErrorCode::CatalogError,
                        file = %path.display(),
                        err = %e,
                        "rejected problem file"
                    );
                }
            }
        }

        info!(count = problems.len(), dir = %dir.display(), "catalog loaded");
        Ok(Self { problems })
    }

    /// Build a catalog from in-memory problems, validating each.
    pub fn from_problems(list: Vec<Problem>) -> anyhow::Result<Self> {
        let mut problems = HashMap::new();
        for problem in list {
            validate_problem(&problem).map_err(|e| anyhow::anyhow!("{}: {e}", problem.id))?;
            problems.insert(problem.id.clone(), Arc::new(problem));
        }
        Ok(Self { problems })
    }

    pub fn get(&self, id: &str) -> Option<Arc<Problem>> {
        self.problems.get(id).cloned()
    }

    /// Summaries sorted by id for stable listings.
    pub fn summaries(&self) -> Vec<ProblemSummary> {
        let mut out: Vec<ProblemSummary> =
            self.problems.values().map(|p| ProblemSummary::from(p.as_ref())).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Random pick from the problems matching the optional filters.
    pub fn random(&self, difficulty: Option<&str>, tag: Option<&str>) -> Option<Arc<Problem>> {
        self.problems
            .values()
            .filter(|p| difficulty.is_none_or(|d| p.difficulty.eq_ignore_ascii_case(d)))
            .filter(|p| tag.is_none_or(|t| p.tags.iter().any(|x| x.eq_ignore_ascii_case(t))))
            .choose(&mut rand::rng())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Parse and validate a single problem file.
pub fn load_problem(path: &Path) -> anyhow::Result<Problem> {
    let contents = std::fs::read_to_string(path).context("read problem file")?;
    let problem: Problem = serde_json::from_str(&contents).context("parse problem file")?;
    validate_problem(&problem).map_err(|e| anyhow::anyhow!(e))?;
    Ok(problem)
}

/// Reject problems whose call templates could reach the sandbox unsafely
/// or do not call the declared function.
pub fn validate_problem(problem: &Problem) -> Result<(), String> {
    if problem.id.trim().is_empty() {
        return Err("problem id is empty".to_owned());
    }
    for (kind, cases) in
        [("test_cases", &problem.test_cases), ("hidden_test_cases", &problem.hidden_test_cases)]
    {
        for (i, case) in cases.iter().enumerate() {
            validate_function_call(&case.function_call)
                .map_err(|e| format!("{kind}[{i}]: {e}"))?;
            let callee = sandbox::wrapper::template_callee(&case.function_call);
            if callee != Some(problem.function_name.as_str()) {
                return Err(format!(
                    "{kind}[{i}]: call template does not invoke `{}`",
                    problem.function_name
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
