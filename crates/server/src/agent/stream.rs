// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent stdio stream protocol.
//!
//! The tutor subprocess speaks newline-delimited JSON in both
//! directions. This module owns the incremental line parser and the
//! classification of decoded records into turn events.

use serde_json::Value;

/// Incremental line-buffered parser for newline-delimited JSON.
#[derive(Debug, Default)]
pub struct JsonlParser {
    line_buf: Vec<u8>,
}

impl JsonlParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every complete JSON record it finished.
    /// Non-JSON lines are dropped (agents may emit stray diagnostics).
    pub fn feed(&mut self, data: &[u8]) -> Vec<Value> {
        let mut out = Vec::new();
        for &byte in data {
            if byte != b'\n' {
                self.line_buf.push(byte);
                continue;
            }
            if let Ok(text) = std::str::from_utf8(&self.line_buf) {
                let text = text.trim();
                if !text.is_empty() {
                    if let Ok(value) = serde_json::from_str::<Value>(text) {
                        out.push(value);
                    }
                }
            }
            self.line_buf.clear();
        }
        out
    }
}

/// One decoded event from the agent's stdout stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// The subprocess finished initializing and accepts turns.
    Ready,
    /// Additive assistant text for the in-flight turn.
    Fragment(String),
    /// The in-flight turn completed.
    TurnComplete,
    /// The agent reported a failure.
    Error(String),
}

/// Classify a decoded stream record. Returns `None` for records that
/// carry no turn-relevant signal (tool use, thinking, user echoes).
pub fn classify_event(json: &Value) -> Option<AgentEvent> {
    if let Some(error) = json.get("error") {
        let detail = error.as_str().unwrap_or("unknown agent error").to_owned();
        return Some(AgentEvent::Error(detail));
    }

    match json.get("type").and_then(|v| v.as_str()) {
        Some("system") => (json.get("subtype").and_then(|v| v.as_str()) == Some("init"))
            .then_some(AgentEvent::Ready),
        Some("assistant") => extract_assistant_text(json).map(AgentEvent::Fragment),
        Some("result") => {
            if json.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false) {
                let detail = json
                    .get("result")
                    .and_then(|v| v.as_str())
                    .unwrap_or("agent reported an error")
                    .to_owned();
                Some(AgentEvent::Error(detail))
            } else {
                Some(AgentEvent::TurnComplete)
            }
        }
        _ => None,
    }
}

/// Extract the concatenated text content from an assistant record.
///
/// Returns `None` for non-assistant records or assistant messages with
/// no `type: "text"` blocks (pure tool-use turns).
pub fn extract_assistant_text(json: &Value) -> Option<String> {
    if json.get("type").and_then(|v| v.as_str()) != Some("assistant") {
        return None;
    }
    let content = json.get("message")?.get("content")?.as_array()?;
    let texts: Vec<&str> = content
        .iter()
        .filter(|b| b.get("type").and_then(|v| v.as_str()) == Some("text"))
        .filter_map(|b| b.get("text").and_then(|v| v.as_str()))
        .collect();
    if texts.is_empty() {
        return None;
    }
    Some(texts.join("\n"))
}

/// Encode one user turn as a JSONL record for the agent's stdin.
pub fn user_message_record(content: &str) -> String {
    let record = serde_json::json!({
        "type": "user",
        "message": { "role": "user", "content": content },
    });
    let mut line = record.to_string();
    line.push('\n');
    line
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
