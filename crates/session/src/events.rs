// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle events.
//!
//! UI layers subscribe to these instead of inspecting every request error.
//! `Terminated` is the forced-logout signal: the refresh credential was
//! rejected and the UI should navigate to [`SessionKind::login_path`].

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::session::SessionKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    LoggedIn { kind: SessionKind },
    LoggedOut { kind: SessionKind },
    Switched { kind: SessionKind },
    /// The session ended because its refresh credential was rejected.
    Terminated { kind: SessionKind, login_path: String },
}

impl SessionEvent {
    pub fn terminated(kind: SessionKind) -> Self {
        Self::Terminated { kind, login_path: kind.login_path().to_owned() }
    }

    pub fn kind(&self) -> SessionKind {
        match self {
            Self::LoggedIn { kind }
            | Self::LoggedOut { kind }
            | Self::Switched { kind }
            | Self::Terminated { kind, .. } => *kind,
        }
    }
}

pub fn channel() -> broadcast::Sender<SessionEvent> {
    let (tx, _) = broadcast::channel(64);
    tx
}
