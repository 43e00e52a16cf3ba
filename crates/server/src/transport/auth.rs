// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

use crate::error::{Detail, ErrorCode};
use crate::state::AppState;

/// Constant-time string comparison to prevent timing side-channel attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// The bearer token handed out by `/api/login`: a hex SHA-256 digest of
/// the configured password. Deterministic, so it survives restarts.
pub fn derive_token(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"leettutor-token:");
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Validate a Bearer token from HTTP headers.
///
/// Returns `Ok(())` when `expected` is `None` (auth disabled) or when
/// the header matches.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ErrorCode> {
    let expected = match expected {
        Some(token) => token,
        None => return Ok(()),
    };

    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ErrorCode::AuthRequired)?;
    let token = header.strip_prefix("Bearer ").ok_or(ErrorCode::AuthRequired)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ErrorCode::AuthRequired)
    }
}

/// Validate the token from the WebSocket `auth` frame.
pub fn validate_ws_auth(token: &str, expected: Option<&str>) -> Result<(), ErrorCode> {
    match expected {
        None => Ok(()),
        Some(want) if constant_time_eq(token, want) => Ok(()),
        Some(_) => Err(ErrorCode::AuthRequired),
    }
}

/// Axum middleware enforcing Bearer auth on API routes.
///
/// `/api/auth/status` and `/api/login` are public; `/ws/chat`
/// authenticates via its first frame instead.
pub async fn auth_layer(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/api/auth/status" || path == "/api/login" || path == "/ws/chat" {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), state.auth_token.as_deref()) {
        let status =
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::UNAUTHORIZED);
        return (status, axum::Json(Detail { detail: "authentication required".to_owned() }))
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
