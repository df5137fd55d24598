// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line front end: drives a [`SessionManager`] backed by a
//! [`FileStore`] against a live API server.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::api::{AuthApi, Credentials, HttpAuthApi};
use crate::client::ApiClient;
use crate::config::SessionConfig;
use crate::events::SessionEvent;
use crate::manager::SessionManager;
use crate::session::{SessionKind, SessionStore};
use crate::store::FileStore;
use crate::token;
use crate::triggers::spawn_periodic_check;

#[derive(Debug, Parser)]
#[command(name = "lichsu-session", version, about = "Session client for the lichsu API")]
pub struct Cli {
    #[command(flatten)]
    pub config: SessionConfig,

    /// Log format (text or json).
    #[arg(long, env = "LICHSU_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LICHSU_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and make the session active.
    Login {
        #[arg(value_enum)]
        kind: SessionKind,
        #[arg(long)]
        username: String,
        #[arg(long, env = "LICHSU_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log out and clear the stored session.
    Logout {
        #[arg(value_enum)]
        kind: SessionKind,
    },
    /// Make another stored session the active one.
    Switch {
        #[arg(value_enum)]
        kind: SessionKind,
    },
    /// Print the stored sessions.
    Status,
    /// Authenticated GET; prints the JSON body.
    Get { path: String },
    /// Unauthenticated connectivity check; prints the status code.
    Probe { path: String },
    /// Keep the active token fresh until interrupted.
    Watch,
}

impl Cli {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.config.validate()?;
        match self.log_format.as_str() {
            "text" | "json" => Ok(()),
            other => anyhow::bail!("--log-format must be text or json, got {other:?}"),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    active: SessionKind,
    sessions: Vec<SessionReport>,
}

#[derive(Debug, Serialize)]
struct SessionReport {
    kind: SessionKind,
    name: Option<String>,
    role: Option<String>,
    valid: bool,
    expires_in_secs: u64,
}

/// Execute one command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config;
    let timeouts = config.timeouts();
    let state_file = config.state_file();
    tracing::debug!(path = %state_file.display(), "opening session store");

    let store = SessionStore::open(Box::new(FileStore::new(state_file)));
    let api: Arc<dyn AuthApi> = Arc::new(HttpAuthApi::new(
        config.api_url.as_str(),
        config.user_auth_path.as_str(),
        config.admin_auth_path.as_str(),
        timeouts.request,
    )?);
    let manager = SessionManager::new(config.refresh_policy(), store, api).await;

    match cli.command {
        Command::Login { kind, username, password } => {
            let session = manager.login(kind, &Credentials { username, password }).await?;
            println!("logged in as {} ({kind})", session.principal.name().unwrap_or("?"));
        }
        Command::Logout { kind } => {
            manager.logout(kind).await;
            println!("logged out of {kind}; active session is {}", manager.store().active_kind().await);
        }
        Command::Switch { kind } => {
            if manager.store().get(kind).await.is_none() {
                anyhow::bail!("no stored {kind} session");
            }
            manager.switch_to(kind).await;
            println!("active session is {kind}");
        }
        Command::Status => {
            let report = status_report(&manager).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Get { path } => {
            let client = ApiClient::new(config.api_url.as_str(), manager, timeouts)?;
            let body: serde_json::Value = client.get_json(&path).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Probe { path } => {
            let client = ApiClient::new(config.api_url.as_str(), manager, timeouts)?;
            println!("{}", client.probe(&path).await?);
        }
        Command::Watch => watch(manager).await?,
    }
    Ok(())
}

async fn status_report(manager: &SessionManager) -> StatusReport {
    let store = manager.store();
    let mut sessions = Vec::new();
    for kind in [SessionKind::User, SessionKind::Admin] {
        if let Some(session) = store.get(kind).await {
            sessions.push(SessionReport {
                kind,
                name: session.principal.name().map(str::to_owned),
                role: session.principal.role().map(str::to_owned),
                valid: session.is_valid(),
                expires_in_secs: token::remaining_lifetime(&session.access_token).as_secs(),
            });
        }
    }
    StatusReport { active: store.active_kind().await, sessions }
}

/// Run the periodic check until Ctrl-C or until the session is terminated.
async fn watch(manager: Arc<SessionManager>) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let mut events = manager.subscribe();
    let policy = manager.policy();
    let checker =
        spawn_periodic_check(Arc::clone(manager.refresher()), policy.check_interval, cancel.clone());
    tracing::info!(interval = ?policy.check_interval, "watching session");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Terminated { kind, login_path }) => {
                    println!("{kind} session ended; log in again at {login_path}");
                    break;
                }
                Ok(event) => tracing::debug!(?event, "session event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            },
        }
    }

    cancel.cancel();
    checker.await?;
    Ok(())
}
