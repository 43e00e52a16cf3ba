// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the REST surface.
//!
//! Run and submit always return 200 with a structured result, even when
//! every test fails; a non-200 means the request itself was invalid.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use sandbox::{SandboxError, TestCase};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::{Problem, ProblemSummary};
use crate::error::{Detail, ErrorCode};
use crate::session_log::{valid_session_id, Mode, SessionSummary};
use crate::state::AppState;
use crate::transport::auth::{constant_time_eq, derive_token};
use crate::workspace::Workspace;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    pub auth_required: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Client-facing problem view: hidden cases stay hidden.
#[derive(Debug, Serialize)]
pub struct ProblemView {
    pub id: String,
    pub title: String,
    pub difficulty: String,
    pub tags: Vec<String>,
    pub description: String,
    pub starter_code: String,
    pub function_name: String,
    pub test_cases: Vec<TestCase>,
    pub hints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimal_complexity: Option<String>,
}

impl From<&Problem> for ProblemView {
    fn from(p: &Problem) -> Self {
        Self {
            id: p.id.clone(),
            title: p.title.clone(),
            difficulty: p.difficulty.clone(),
            tags: p.tags.clone(),
            description: p.description.clone(),
            starter_code: p.starter_code.clone(),
            function_name: p.function_name.clone(),
            test_cases: p.test_cases.clone(),
            hints: p.hints.clone(),
            optimal_complexity: p.optimal_complexity.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RandomQuery {
    pub difficulty: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub code: String,
    pub problem_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub code: String,
    pub problem_id: String,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResumableQuery {
    pub problem_id: String,
}

#[derive(Debug, Serialize)]
pub struct ResumableResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSummary>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

// -- Handlers -----------------------------------------------------------------

/// A 500 with `{detail}`; the underlying error stays in the logs.
fn internal_error(detail: &str) -> axum::response::Response {
    (axum::http::StatusCode::INTERNAL_SERVER_ERROR, Json(Detail { detail: detail.to_owned() }))
        .into_response()
}

/// `GET /api/auth/status`
pub async fn auth_status(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(AuthStatusResponse { auth_required: s.auth_required() })
}

/// `POST /api/login`
pub async fn login(
    State(s): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> axum::response::Response {
    // Same switch as the middleware: an unset or empty password means
    // auth is disabled, here included.
    let password = s.config.password.as_deref().filter(|_| s.auth_required());
    let Some(password) = password else {
        // Auth disabled: any login succeeds with an unused token.
        return Json(LoginResponse { token: String::new() }).into_response();
    };
    if !constant_time_eq(&req.password, password) {
        return ErrorCode::AuthRequired.to_http_response("invalid password").into_response();
    }
    Json(LoginResponse { token: derive_token(password) }).into_response()
}

/// `GET /api/problems`
pub async fn list_problems(State(s): State<Arc<AppState>>) -> Json<Vec<ProblemSummary>> {
    Json(s.catalog.summaries())
}

/// `GET /api/problems/random`
pub async fn random_problem(
    State(s): State<Arc<AppState>>,
    Query(query): Query<RandomQuery>,
) -> axum::response::Response {
    match s.catalog.random(query.difficulty.as_deref(), query.tag.as_deref()) {
        Some(problem) => Json(ProblemView::from(problem.as_ref())).into_response(),
        None => ErrorCode::SessionNotFound
            .to_http_response("no problem matches the filters")
            .into_response(),
    }
}

/// `GET /api/problems/{id}`
pub async fn get_problem(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match s.catalog.get(&id) {
        Some(problem) => Json(ProblemView::from(problem.as_ref())).into_response(),
        None => {
            ErrorCode::SessionNotFound.to_http_response("unknown problem").into_response()
        }
    }
}

/// `POST /api/run` — visible tests only.
pub async fn run_code(
    State(s): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> axum::response::Response {
    let Some(problem) = s.catalog.get(&req.problem_id) else {
        return ErrorCode::SessionNotFound.to_http_response("unknown problem").into_response();
    };
    execute(&s, &req.code, &problem.test_cases).await
}

/// `POST /api/submit` — visible plus hidden tests. When a session id is
/// supplied, the session workspace is refreshed so the agent can read
/// the submission; the session log itself is written by its owning
/// WebSocket connection.
pub async fn submit_code(
    State(s): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest>,
) -> axum::response::Response {
    let Some(problem) = s.catalog.get(&req.problem_id) else {
        return ErrorCode::SessionNotFound.to_http_response("unknown problem").into_response();
    };
    tracing::debug!(problem = %req.problem_id, mode = ?req.mode, "submit received");

    let response = execute(&s, &req.code, &problem.all_cases()).await;

    if let Some(ref session_id) = req.session_id {
        if valid_session_id(session_id) {
            refresh_workspace(&s, session_id, &req.code);
        }
    }

    response
}

/// Run the sandbox and map the outcome to an HTTP response.
async fn execute(s: &AppState, code: &str, cases: &[TestCase]) -> axum::response::Response {
    match s.executor.run_tests(code, cases).await {
        Ok(report) => {
            info!(passed = report.passed, failed = report.failed, "sandbox run complete");
            Json(report).into_response()
        }
        Err(e @ SandboxError::InputTooLarge { .. }) => {
            ErrorCode::InputTooLarge.to_http_response(e.to_string()).into_response()
        }
    }
}

/// Best-effort rewrite of the agent-visible workspace after a submit.
fn refresh_workspace(s: &AppState, session_id: &str, code: &str) {
    match Workspace::for_session(&s.config.workspace_dir, session_id) {
        Ok(ws) => {
            if let Err(e) = ws.write_solution(code) {
                warn!(session = %session_id, err = %e, "workspace solution write failed");
            }
        }
        Err(e) => warn!(session = %session_id, err = %e, "workspace open failed"),
    }
}

/// `GET /api/sessions`
pub async fn list_sessions(State(s): State<Arc<AppState>>) -> axum::response::Response {
    match s.sessions.list() {
        Ok(list) => Json(list).into_response(),
        Err(e) => {
            warn!(err = %e, "session listing failed");
            internal_error("session listing failed")
        }
    }
}

/// `GET /api/sessions/latest-resumable`
pub async fn latest_resumable(
    State(s): State<Arc<AppState>>,
    Query(query): Query<ResumableQuery>,
) -> axum::response::Response {
    match s.sessions.latest_resumable(&query.problem_id) {
        Ok(session) => Json(ResumableResponse { session }).into_response(),
        Err(e) => {
            warn!(err = %e, "resumable lookup failed");
            internal_error("session lookup failed")
        }
    }
}

/// `GET /api/sessions/{id}`
pub async fn get_session(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match s.sessions.get(&id) {
        Ok(Some(doc)) => Json(doc).into_response(),
        Ok(None) => {
            ErrorCode::SessionNotFound.to_http_response("unknown session").into_response()
        }
        Err(e) => {
            warn!(session = %id, err = %e, "session read failed");
            internal_error("session read failed")
        }
    }
}

/// `DELETE /api/sessions/{id}`
pub async fn delete_session(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match s.sessions.delete(&id) {
        Ok(true) => Json(DeleteResponse { deleted: true }).into_response(),
        Ok(false) => {
            ErrorCode::SessionNotFound.to_http_response("unknown session").into_response()
        }
        Err(e) => {
            warn!(session = %id, err = %e, "session delete failed");
            internal_error("session delete failed")
        }
    }
}
