// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Interactive coding-practice tutoring server.
#[derive(Debug, Clone, Parser)]
#[command(name = "leettutor", version, about)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[arg(long, env = "LEETTUTOR_HOST", default_value = "localhost")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "LEETTUTOR_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Shared password. Auth is enabled when set.
    #[arg(long, env = "LEETTUTOR_PASSWORD")]
    pub password: Option<String>,

    /// Comma-separated CORS origin allowlist. No wildcards.
    #[arg(long, env = "LEETTUTOR_CORS_ORIGINS")]
    pub cors_origins: Option<String>,

    /// Directory of per-problem JSON files, loaded at startup.
    #[arg(long, env = "LEETTUTOR_PROBLEMS_DIR", default_value = "problems")]
    pub problems_dir: PathBuf,

    /// Directory for per-session JSON documents.
    #[arg(long, env = "LEETTUTOR_SESSIONS_DIR", default_value = "sessions")]
    pub sessions_dir: PathBuf,

    /// Root of per-session agent workspaces.
    #[arg(long, env = "LEETTUTOR_WORKSPACE_DIR", default_value = "workspace")]
    pub workspace_dir: PathBuf,

    /// Tutor agent command. Extra words become leading arguments.
    #[arg(long, env = "LEETTUTOR_AGENT_CMD", default_value = "claude")]
    pub agent_cmd: String,

    /// Interpreter used by the code sandbox.
    #[arg(long, env = "LEETTUTOR_PYTHON", default_value = "python3")]
    pub python: String,

    /// Idle-nudge threshold in minutes (0 disables idle nudges).
    #[arg(long, env = "LEETTUTOR_IDLE_NUDGE_MINUTES", default_value_t = 2)]
    pub idle_nudge_minutes: u64,

    /// Per-test wall-clock limit for the sandbox, in seconds.
    #[arg(long, env = "LEETTUTOR_SANDBOX_TIMEOUT_SECS", default_value_t = 10)]
    pub sandbox_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LEETTUTOR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (json or text).
    #[arg(long, env = "LEETTUTOR_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl ServerConfig {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agent_cmd.trim().is_empty() {
            anyhow::bail!("--agent-cmd must not be empty");
        }
        if self.python.trim().is_empty() {
            anyhow::bail!("--python must not be empty");
        }
        if self.sandbox_timeout_secs == 0 {
            anyhow::bail!("--sandbox-timeout-secs must be positive");
        }
        for origin in self.cors_origin_list() {
            if origin.contains('*') {
                anyhow::bail!("wildcard CORS origin is not allowed: {origin}");
            }
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    /// True when a password is configured and auth must be enforced.
    pub fn auth_enabled(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Parsed CORS origin allowlist.
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Idle-nudge threshold, `None` when disabled.
    pub fn idle_nudge(&self) -> Option<Duration> {
        (self.idle_nudge_minutes > 0).then(|| Duration::from_secs(self.idle_nudge_minutes * 60))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
