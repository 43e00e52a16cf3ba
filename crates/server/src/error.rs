// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error codes shared by the HTTP and WebSocket surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InputTooLarge,
    InvalidMessage,
    AuthRequired,
    AgentUnavailable,
    AgentTimeout,
    AgentStreamFailed,
    SessionNotFound,
    SandboxFailure,
    CatalogError,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InputTooLarge => 413,
            Self::InvalidMessage => 400,
            Self::AuthRequired => 401,
            Self::AgentUnavailable => 503,
            Self::AgentTimeout => 504,
            Self::AgentStreamFailed => 502,
            Self::SessionNotFound => 404,
            Self::SandboxFailure => 500,
            Self::CatalogError => 500,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputTooLarge => "INPUT_TOO_LARGE",
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::AgentUnavailable => "AGENT_UNAVAILABLE",
            Self::AgentTimeout => "AGENT_TIMEOUT",
            Self::AgentStreamFailed => "AGENT_STREAM_FAILED",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SandboxFailure => "SANDBOX_FAILURE",
            Self::CatalogError => "CATALOG_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    /// Build the HTTP error response: status + `{"detail": ...}`.
    pub fn to_http_response(&self, detail: impl Into<String>) -> (StatusCode, Json<Detail>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(Detail { detail: detail.into() }))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detail {
    pub detail: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
