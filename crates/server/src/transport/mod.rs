// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport.

pub mod auth;
pub mod handler;
pub mod http;
pub mod ws;
pub mod ws_msg;

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::state::AppState;

/// Build the axum `Router` with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Auth (public)
        .route("/api/auth/status", get(http::auth_status))
        .route("/api/login", axum::routing::post(http::login))
        // Problems
        .route("/api/problems", get(http::list_problems))
        .route("/api/problems/random", get(http::random_problem))
        .route("/api/problems/{id}", get(http::get_problem))
        // Code execution
        .route("/api/run", axum::routing::post(http::run_code))
        .route("/api/submit", axum::routing::post(http::submit_code))
        // Session history
        .route("/api/sessions", get(http::list_sessions))
        .route("/api/sessions/latest-resumable", get(http::latest_resumable))
        .route(
            "/api/sessions/{id}",
            get(http::get_session).delete(http::delete_session),
        )
        // Live tutoring
        .route("/ws/chat", get(ws::ws_chat_handler))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), auth::auth_layer));

    if let Some(cors) = cors_layer(&state) {
        router = router.layer(cors);
    }
    router.with_state(state)
}

/// CORS from the configured exact-origin allowlist. No configuration
/// means no cross-origin access; wildcards are rejected at startup.
fn cors_layer(state: &AppState) -> Option<CorsLayer> {
    let origins = state.config.cors_origin_list();
    if origins.is_empty() {
        return None;
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%origin, err = %e, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    if parsed.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE]),
    )
}
