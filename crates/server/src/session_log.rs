// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session documents on disk.
//!
//! One JSON file per session. Every mutation rewrites the whole document
//! atomically (temp file in the same directory, fsync, rename), so a
//! reader sees either the previous or the next state, never a torn file.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use sandbox::RunReport;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tutoring mode for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Learning,
    Interview,
    PatternQuiz,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learning => "learning",
            Self::Interview => "interview",
            Self::PatternQuiz => "pattern-quiz",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interview phase. Transitions are monotone:
/// clarification → coding → review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewPhase {
    Clarification,
    Coding,
    Review,
}

impl InterviewPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clarification => "clarification",
            Self::Coding => "coding",
            Self::Review => "review",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One chat history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp_ms: u64,
}

/// One recorded code submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub code: String,
    pub passed: usize,
    pub failed: usize,
    pub timestamp_ms: u64,
}

/// The on-disk session document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    pub session_id: String,
    pub problem_id: String,
    pub mode: Mode,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_s: Option<u64>,
    #[serde(default)]
    pub hints_requested: u32,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub code_submissions: Vec<Submission>,
    pub interview_phase: InterviewPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_remaining_s: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_editor_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whiteboard_state: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Listing form of a session document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub problem_id: String,
    pub mode: Mode,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    pub hints_requested: u32,
    pub submission_count: usize,
}

impl From<&SessionDocument> for SessionSummary {
    fn from(doc: &SessionDocument) -> Self {
        Self {
            session_id: doc.session_id.clone(),
            problem_id: doc.problem_id.clone(),
            mode: doc.mode,
            started_at_ms: doc.started_at_ms,
            ended_at_ms: doc.ended_at_ms,
            hints_requested: doc.hints_requested,
            submission_count: doc.code_submissions.len(),
        }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A session id is lowercase hex, at least 8 chars. Enforced before any
/// path join so an id can never traverse out of the sessions directory.
pub fn valid_session_id(id: &str) -> bool {
    id.len() >= 8 && id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// Directory of session documents.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create sessions dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Create a new session and write its initial document.
    pub fn start(&self, problem_id: &str, mode: Mode) -> anyhow::Result<SessionLog> {
        let session_id = new_session_id();
        let doc = SessionDocument {
            session_id,
            problem_id: problem_id.to_owned(),
            mode,
            started_at_ms: epoch_ms(),
            ended_at_ms: None,
            duration_s: None,
            hints_requested: 0,
            chat_history: Vec::new(),
            code_submissions: Vec::new(),
            interview_phase: InterviewPhase::Clarification,
            time_remaining_s: (mode == Mode::Interview).then_some(45 * 60),
            last_editor_code: None,
            whiteboard_state: None,
            final_result: None,
            notes: None,
        };
        self.write(&doc)?;
        Ok(SessionLog { doc, store: self.clone() })
    }

    /// Reopen an existing document for further mutation.
    pub fn resume(&self, doc: SessionDocument) -> SessionLog {
        SessionLog { doc, store: self.clone() }
    }

    /// Atomic whole-document rewrite.
    fn write(&self, doc: &SessionDocument) -> anyhow::Result<()> {
        if !valid_session_id(&doc.session_id) {
            anyhow::bail!("invalid session id: {}", doc.session_id);
        }
        let path = self.path_for(&doc.session_id);
        let json = serde_json::to_vec_pretty(doc).context("serialize session document")?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).context("create session temp file")?;
        tmp.write_all(&json).context("write session temp file")?;
        tmp.as_file().sync_all().context("fsync session temp file")?;
        tmp.persist(&path).with_context(|| format!("replace {}", path.display()))?;
        debug!(session = %doc.session_id, "session document written");
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> anyhow::Result<Option<SessionDocument>> {
        if !valid_session_id(session_id) {
            return Ok(None);
        }
        let path = self.path_for(session_id);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("read session document"),
        };
        let doc = serde_json::from_str(&contents).context("parse session document")?;
        Ok(Some(doc))
    }

    pub fn delete(&self, session_id: &str) -> anyhow::Result<bool> {
        if !valid_session_id(session_id) {
            return Ok(false);
        }
        match std::fs::remove_file(self.path_for(session_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).context("delete session document"),
        }
    }

    /// Summaries of every parseable document, newest first.
    pub fn list(&self) -> anyhow::Result<Vec<SessionSummary>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir).context("read sessions dir")? {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if path.extension().and_then(|e| e.to_str()) != Some("json")
                || !valid_session_id(stem)
            {
                continue;
            }
            if let Ok(Some(doc)) = self.get(stem) {
                out.push(SessionSummary::from(&doc));
            }
        }
        out.sort_by(|a, b| b.started_at_ms.cmp(&a.started_at_ms));
        Ok(out)
    }

    /// The newest un-ended session for a problem, if any.
    pub fn latest_resumable(&self, problem_id: &str) -> anyhow::Result<Option<SessionSummary>> {
        let latest = self
            .list()?
            .into_iter()
            .find(|s| s.problem_id == problem_id && s.ended_at_ms.is_none());
        Ok(latest)
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Generate a fresh 12-hex-char session id.
fn new_session_id() -> String {
    let full = uuid::Uuid::new_v4().simple().to_string();
    full[..12].to_owned()
}

/// The live, exclusively-owned handle to one session document. Every
/// mutator persists before returning.
#[derive(Debug)]
pub struct SessionLog {
    doc: SessionDocument,
    store: SessionStore,
}

impl SessionLog {
    pub fn session_id(&self) -> &str {
        &self.doc.session_id
    }

    pub fn document(&self) -> &SessionDocument {
        &self.doc
    }

    pub fn log_message(&mut self, role: Role, content: &str) -> anyhow::Result<()> {
        self.doc.chat_history.push(ChatMessage {
            role,
            content: content.to_owned(),
            timestamp_ms: epoch_ms(),
        });
        self.store.write(&self.doc)
    }

    pub fn log_submission(&mut self, code: &str, report: &RunReport) -> anyhow::Result<()> {
        self.doc.code_submissions.push(Submission {
            code: code.to_owned(),
            passed: report.passed,
            failed: report.failed,
            timestamp_ms: epoch_ms(),
        });
        self.doc.last_editor_code = Some(code.to_owned());
        self.store.write(&self.doc)
    }

    pub fn log_hint_requested(&mut self) -> anyhow::Result<()> {
        self.doc.hints_requested += 1;
        self.store.write(&self.doc)
    }

    pub fn update_time_remaining(&mut self, seconds: u32) -> anyhow::Result<()> {
        // Client clock is authoritative but bounded to the interview cap.
        self.doc.time_remaining_s = Some(seconds.min(45 * 60));
        self.store.write(&self.doc)
    }

    /// Phase is monotone; a backwards update is ignored.
    pub fn update_interview_phase(&mut self, phase: InterviewPhase) -> anyhow::Result<()> {
        if phase <= self.doc.interview_phase {
            return Ok(());
        }
        self.doc.interview_phase = phase;
        self.store.write(&self.doc)
    }

    pub fn update_editor_code(&mut self, code: &str) -> anyhow::Result<()> {
        self.doc.last_editor_code = Some(code.to_owned());
        self.store.write(&self.doc)
    }

    pub fn update_whiteboard(&mut self, state: serde_json::Value) -> anyhow::Result<()> {
        self.doc.whiteboard_state = Some(state);
        self.store.write(&self.doc)
    }

    /// Final write. Idempotent: a second call keeps the first end time.
    pub fn end(
        &mut self,
        final_result: Option<String>,
        notes: Option<String>,
    ) -> anyhow::Result<()> {
        if self.doc.ended_at_ms.is_none() {
            let now = epoch_ms();
            self.doc.ended_at_ms = Some(now);
            self.doc.duration_s = Some(now.saturating_sub(self.doc.started_at_ms) / 1000);
        }
        if final_result.is_some() {
            self.doc.final_result = final_result;
        }
        if notes.is_some() {
            self.doc.notes = notes;
        }
        self.store.write(&self.doc)
    }
}

#[cfg(test)]
#[path = "session_log_tests.rs"]
mod tests;
