// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the session client.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Base URL of the site's API server.
    #[arg(long, default_value = "http://127.0.0.1:5000", env = "LICHSU_API_URL")]
    pub api_url: String,

    /// Path of the persisted session file. Defaults to `session.json` in the state dir.
    #[arg(long, env = "LICHSU_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Refresh the access token when it expires within this many seconds.
    #[arg(long, default_value_t = 180, env = "LICHSU_REFRESH_THRESHOLD_SECS")]
    pub refresh_threshold_secs: u64,

    /// Periodic token check interval in seconds.
    #[arg(long, default_value_t = 60, env = "LICHSU_CHECK_INTERVAL_SECS")]
    pub check_interval_secs: u64,

    /// Minimum seconds between activity-triggered token checks.
    #[arg(long, default_value_t = 30, env = "LICHSU_ACTIVITY_DEBOUNCE_SECS")]
    pub activity_debounce_secs: u64,

    /// Timeout for general API requests in seconds.
    #[arg(long, default_value_t = 30, env = "LICHSU_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    /// Timeout for connectivity probes in seconds.
    #[arg(long, default_value_t = 5, env = "LICHSU_PROBE_TIMEOUT_SECS")]
    pub probe_timeout_secs: u64,

    /// Path prefix of the end-user auth endpoints.
    #[arg(long, default_value = "/api/auth", env = "LICHSU_USER_AUTH_PATH")]
    pub user_auth_path: String,

    /// Path prefix of the admin auth endpoints.
    #[arg(long, default_value = "/api/admin/auth", env = "LICHSU_ADMIN_AUTH_PATH")]
    pub admin_auth_path: String,
}

impl SessionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_url.trim().is_empty() {
            anyhow::bail!("--api-url must not be empty");
        }
        for (name, value) in [
            ("--check-interval-secs", self.check_interval_secs),
            ("--activity-debounce-secs", self.activity_debounce_secs),
            ("--request-timeout-secs", self.request_timeout_secs),
            ("--probe-timeout-secs", self.probe_timeout_secs),
        ] {
            if value == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }
        Ok(())
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            threshold: Duration::from_secs(self.refresh_threshold_secs),
            check_interval: Duration::from_secs(self.check_interval_secs),
            activity_debounce: Duration::from_secs(self.activity_debounce_secs),
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            request: Duration::from_secs(self.request_timeout_secs),
            probe: Duration::from_secs(self.probe_timeout_secs),
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(|| state_dir().join("session.json"))
    }
}

/// When and how often the access token is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Refresh once the remaining lifetime drops to this.
    pub threshold: Duration,
    pub check_interval: Duration,
    pub activity_debounce: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(180),
            check_interval: Duration::from_secs(60),
            activity_debounce: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request: Duration,
    pub probe: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request: Duration::from_secs(30), probe: Duration::from_secs(5) }
    }
}

/// Resolve the state directory for persisted sessions.
///
/// Checks `LICHSU_STATE_DIR`, then `$XDG_STATE_HOME/lichsu`,
/// then `$HOME/.local/state/lichsu`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LICHSU_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("lichsu");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/lichsu");
    }
    PathBuf::from(".lichsu")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
