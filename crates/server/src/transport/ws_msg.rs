// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket message types for `/ws/chat`.
//!
//! Frames are internally tagged JSON (`{"type": "message", ...}`); an
//! unknown discriminator fails deserialization and surfaces as
//! `INVALID_MESSAGE`.

use sandbox::RunReport;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::session_log::{ChatMessage, InterviewPhase, Mode};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth {
        token: String,
    },
    StartSession {
        problem_id: String,
        mode: Mode,
    },
    Message {
        content: String,
        #[serde(default)]
        code: Option<String>,
    },
    RequestHint {
        #[serde(default)]
        code: Option<String>,
    },
    ResumeSession {
        session_id: String,
    },
    EndSession {},
    TimeUpdate {
        time_remaining: u32,
    },
    TimeUp {
        #[serde(default)]
        code: Option<String>,
    },
    NudgeRequest {
        trigger: String,
        #[serde(default)]
        context: Option<serde_json::Value>,
    },
    TestResultsUpdate {
        test_results: RunReport,
        code: String,
        #[serde(default)]
        is_submit: bool,
        #[serde(default)]
        saved_solution_id: Option<String>,
    },
    SaveState {
        code: String,
        #[serde(default)]
        whiteboard_state: Option<serde_json::Value>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionStarted {
        session_id: String,
        problem_id: String,
        mode: Mode,
        #[serde(skip_serializing_if = "Option::is_none")]
        time_remaining: Option<u32>,
    },
    SessionResumed {
        session_id: String,
        mode: Mode,
        problem_id: String,
        chat_history: Vec<ChatMessage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time_remaining: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        interview_phase: Option<InterviewPhase>,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_editor_code: Option<String>,
    },
    AssistantChunk {
        content: String,
    },
    AssistantMessage {
        content: String,
        #[serde(default, skip_serializing_if = "is_false")]
        nudge: bool,
    },
    Error {
        code: String,
        content: String,
    },
    ReviewPhaseStarted {},
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Build a WebSocket error frame.
pub fn ws_error(code: ErrorCode, content: impl Into<String>) -> ServerMessage {
    ServerMessage::Error { code: code.as_str().to_owned(), content: content.into() }
}

#[cfg(test)]
#[path = "ws_msg_tests.rs"]
mod tests;
