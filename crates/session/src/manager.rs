// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: login, logout, and switching between login contexts.
//!
//! Explicitly constructed and passed to [`ApiClient`](crate::client::ApiClient)
//! and the triggers; there is no process-wide session state.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::api::{AuthApi, Credentials};
use crate::config::RefreshPolicy;
use crate::error::AuthError;
use crate::events::SessionEvent;
use crate::refresh::RefreshOrchestrator;
use crate::session::{Session, SessionKind, SessionStore};

pub struct SessionManager {
    store: Arc<SessionStore>,
    api: Arc<dyn AuthApi>,
    refresher: Arc<RefreshOrchestrator>,
    policy: RefreshPolicy,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub async fn new(
        policy: RefreshPolicy,
        store: SessionStore,
        api: Arc<dyn AuthApi>,
    ) -> Arc<Self> {
        let store = Arc::new(store);
        let events = crate::events::channel();
        let refresher = RefreshOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&api),
            policy.threshold,
            events.clone(),
        );
        refresher.reschedule().await;
        Arc::new(Self { store, api, refresher, policy, events })
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn refresher(&self) -> &Arc<RefreshOrchestrator> {
        &self.refresher
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Receive session lifecycle events, including forced logouts.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Log in and make `kind` the active session.
    pub async fn login(
        &self,
        kind: SessionKind,
        credentials: &Credentials,
    ) -> Result<Session, AuthError> {
        let resp = self.api.login(kind, credentials).await?;
        if let Some(expires_in) = resp.expires_in {
            tracing::debug!(kind = %kind, expires_in, "login token lifetime");
        }
        let session = Session::new(resp.access_token, resp.principal);
        self.store.save(kind, session.clone()).await;
        self.store.switch_to(kind).await;
        self.refresher.reschedule().await;
        tracing::info!(kind = %kind, user = ?session.principal.name(), "logged in");
        let _ = self.events.send(SessionEvent::LoggedIn { kind });
        Ok(session)
    }

    /// Log out of `kind`. The server call is best-effort; local state is
    /// cleared regardless.
    pub async fn logout(&self, kind: SessionKind) {
        if let Err(e) = self.api.logout(kind).await {
            tracing::debug!(kind = %kind, err = %e, "logout call failed, clearing locally");
        }
        let active = self.store.clear(kind).await;
        self.refresher.reschedule().await;
        tracing::info!(kind = %kind, active = %active, "logged out");
        let _ = self.events.send(SessionEvent::LoggedOut { kind });
    }

    pub async fn switch_to(&self, kind: SessionKind) {
        self.store.switch_to(kind).await;
        self.refresher.reschedule().await;
        tracing::debug!(kind = %kind, "switched active session");
        let _ = self.events.send(SessionEvent::Switched { kind });
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
