// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session store: two parallel login contexts (end-user, admin) and a
//! pointer to the active one, persisted through a [`KeyValueStore`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::store::{Entry, KeyValueStore};
use crate::token;

const SESSION_TYPE_KEY: &str = "sessionType";

/// Which login context a session belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    #[default]
    User,
    Admin,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::User => Self::Admin,
            Self::Admin => Self::User,
        }
    }

    /// Login entry point the UI navigates to when this session ends.
    pub fn login_path(&self) -> &'static str {
        match self {
            Self::User => "/login",
            Self::Admin => "/admin/login",
        }
    }

    fn token_key(&self) -> &'static str {
        match self {
            Self::User => "accessToken",
            Self::Admin => "adminAccessToken",
        }
    }

    fn principal_key(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "adminUser",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-identity record as returned by the server. Kept opaque; the
/// accessors only read well-known fields when they happen to be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(serde_json::Value);

impl Principal {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").or_else(|| self.0.get("username")).and_then(|v| v.as_str())
    }

    pub fn role(&self) -> Option<&str> {
        self.0.get("role").and_then(|v| v.as_str())
    }

    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(|v| v.as_str())
    }
}

/// An access token paired with its principal.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub principal: Principal,
}

impl Session {
    pub fn new(access_token: impl Into<String>, principal: Principal) -> Self {
        Self { access_token: access_token.into(), principal }
    }

    pub fn is_valid(&self) -> bool {
        token::is_valid(&self.access_token)
    }
}

#[derive(Debug, Default)]
struct State {
    user: Option<Session>,
    admin: Option<Session>,
    active: SessionKind,
}

impl State {
    fn slot(&self, kind: SessionKind) -> &Option<Session> {
        match kind {
            SessionKind::User => &self.user,
            SessionKind::Admin => &self.admin,
        }
    }

    fn slot_mut(&mut self, kind: SessionKind) -> &mut Option<Session> {
        match kind {
            SessionKind::User => &mut self.user,
            SessionKind::Admin => &mut self.admin,
        }
    }
}

/// Typed, durable storage of both sessions and the active pointer.
///
/// Every mutation updates memory and storage under one write lock, so a
/// reader sees either a whole `(token, principal)` pair or nothing.
pub struct SessionStore {
    state: RwLock<State>,
    backend: Box<dyn KeyValueStore>,
}

impl SessionStore {
    /// Load persisted state. Unreadable storage starts empty.
    pub fn open(backend: Box<dyn KeyValueStore>) -> Self {
        let entries = match backend.load() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(err = %e, "failed to load persisted session state");
                HashMap::new()
            }
        };
        let state = State {
            user: load_session(&entries, SessionKind::User),
            admin: load_session(&entries, SessionKind::Admin),
            active: entries
                .get(SESSION_TYPE_KEY)
                .and_then(|s| SessionKind::parse(s))
                .unwrap_or_default(),
        };
        tracing::debug!(
            active = %state.active,
            user = state.user.is_some(),
            admin = state.admin.is_some(),
            "session store opened"
        );
        Self { state: RwLock::new(state), backend }
    }

    pub async fn active_kind(&self) -> SessionKind {
        self.state.read().await.active
    }

    /// The active kind together with its session, read atomically.
    pub async fn active(&self) -> (SessionKind, Option<Session>) {
        let state = self.state.read().await;
        (state.active, state.slot(state.active).clone())
    }

    pub async fn active_token(&self) -> Option<String> {
        let state = self.state.read().await;
        state.slot(state.active).as_ref().map(|s| s.access_token.clone())
    }

    pub async fn get(&self, kind: SessionKind) -> Option<Session> {
        self.state.read().await.slot(kind).clone()
    }

    /// Change the active pointer. The other kind's session is untouched.
    pub async fn switch_to(&self, kind: SessionKind) {
        let mut state = self.state.write().await;
        state.active = kind;
        self.persist(&[(SESSION_TYPE_KEY, Some(kind.as_str()))]);
    }

    /// Store a session for `kind`, replacing any previous one.
    pub async fn save(&self, kind: SessionKind, session: Session) {
        let mut state = self.state.write().await;
        let principal = session.principal.as_value().to_string();
        self.persist(&[
            (kind.token_key(), Some(session.access_token.as_str())),
            (kind.principal_key(), Some(principal.as_str())),
        ]);
        *state.slot_mut(kind) = Some(session);
    }

    /// Replace the access token (and optionally the principal) of an
    /// existing session. Returns `false` if `kind` holds no session.
    pub async fn update_token(
        &self,
        kind: SessionKind,
        access_token: String,
        principal: Option<Principal>,
    ) -> bool {
        let mut state = self.state.write().await;
        let Some(session) = state.slot_mut(kind).as_mut() else {
            return false;
        };
        session.access_token = access_token;
        if let Some(p) = principal {
            session.principal = p;
        }
        let principal = session.principal.as_value().to_string();
        let token = session.access_token.clone();
        self.persist(&[
            (kind.token_key(), Some(token.as_str())),
            (kind.principal_key(), Some(principal.as_str())),
        ]);
        true
    }

    /// Remove the session for `kind`. When it was active, fall over to the
    /// other kind if that one is still valid, otherwise back to `User`.
    /// Returns the kind that is active afterwards.
    pub async fn clear(&self, kind: SessionKind) -> SessionKind {
        let mut state = self.state.write().await;
        *state.slot_mut(kind) = None;

        if state.active == kind {
            let other = kind.other();
            let other_valid = state.slot(other).as_ref().is_some_and(Session::is_valid);
            state.active = if other_valid { other } else { SessionKind::User };
        }
        let active = state.active;
        self.persist(&[
            (kind.token_key(), None),
            (kind.principal_key(), None),
            (SESSION_TYPE_KEY, Some(active.as_str())),
        ]);
        tracing::debug!(cleared = %kind, active = %active, "session cleared");
        active
    }

    fn persist(&self, batch: &[Entry<'_>]) {
        if let Err(e) = self.backend.write_batch(batch) {
            tracing::warn!(err = %e, "failed to persist session state");
        }
    }
}

fn load_session(entries: &HashMap<String, String>, kind: SessionKind) -> Option<Session> {
    let token = entries.get(kind.token_key()).filter(|t| !t.is_empty())?;
    let principal = entries.get(kind.principal_key())?;
    match serde_json::from_str::<serde_json::Value>(principal) {
        Ok(value) if !value.is_null() => Some(Session::new(token.clone(), Principal::new(value))),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(kind = %kind, err = %e, "discarding unreadable persisted principal");
            None
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
