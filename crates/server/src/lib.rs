// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LeetTutor: interactive coding-practice tutoring server.
//!
//! One process serves the REST catalog/execution API and the `/ws/chat`
//! tutoring protocol. Each live connection owns a tutor agent
//! subprocess; submissions run in the sandbox crate under hard resource
//! limits.

pub mod agent;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hints;
pub mod nudge;
pub mod registry;
pub mod session_log;
pub mod state;
pub mod test_support;
pub mod transport;
pub mod workspace;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::catalog::Catalog;
use crate::config::ServerConfig;
use crate::session_log::SessionStore;
use crate::state::AppState;
use crate::transport::build_router;

/// Run the server until shutdown. Bind failure is the nonzero-exit path.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let catalog = Catalog::load_dir(&config.problems_dir)?;
    if catalog.is_empty() {
        tracing::warn!(dir = %config.problems_dir.display(), "catalog is empty");
    }
    let sessions = SessionStore::new(&config.sessions_dir)?;
    std::fs::create_dir_all(&config.workspace_dir)
        .with_context(|| format!("create workspace dir {}", config.workspace_dir.display()))?;

    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(config, catalog, sessions, shutdown.clone()));

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_shutdown.cancel();
        }
    });

    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("bind {addr}"))?;
    info!("leettutor listening on {addr}");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
