// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use sandbox::Executor;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::config::ServerConfig;
use crate::registry::TutorRegistry;
use crate::session_log::SessionStore;
use crate::transport::auth::derive_token;

/// Shared server state. The catalog is immutable after startup; the
/// registry is the only process-wide mutable structure.
pub struct AppState {
    pub config: ServerConfig,
    pub catalog: Arc<Catalog>,
    pub registry: TutorRegistry,
    pub sessions: SessionStore,
    pub executor: Executor,
    /// Bearer token derived from the configured password; `None`
    /// disables auth.
    pub auth_token: Option<String>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        catalog: Catalog,
        sessions: SessionStore,
        shutdown: CancellationToken,
    ) -> Self {
        let auth_token = config
            .auth_enabled()
            .then(|| config.password.as_deref().map(derive_token))
            .flatten();
        let limits = sandbox::ResourceLimits {
            wall: std::time::Duration::from_secs(config.sandbox_timeout_secs),
            ..Default::default()
        };
        let executor = Executor::new(config.python.clone()).with_limits(limits);
        Self {
            config,
            catalog: Arc::new(catalog),
            registry: TutorRegistry::new(),
            sessions,
            executor,
            auth_token,
            shutdown,
        }
    }

    pub fn auth_required(&self) -> bool {
        self.auth_token.is_some()
    }
}
