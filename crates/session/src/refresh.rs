// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access token refresh with single-flight de-duplication.
//!
//! At most one refresh call is outstanding at any time. The first caller
//! spawns the network task and parks a shared handle in `in_flight`; every
//! caller that arrives while it runs awaits the same handle and sees the
//! same token or the same error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{broadcast, watch, Mutex};

use crate::api::AuthApi;
use crate::error::AuthError;
use crate::events::SessionEvent;
use crate::session::{SessionKind, SessionStore};
use crate::token;

type SharedRefresh = Shared<BoxFuture<'static, Result<String, AuthError>>>;

struct InFlight {
    generation: u64,
    handle: SharedRefresh,
}

/// Decides when to refresh and serializes refresh calls.
pub struct RefreshOrchestrator {
    store: Arc<SessionStore>,
    api: Arc<dyn AuthApi>,
    threshold: Duration,
    events: broadcast::Sender<SessionEvent>,
    /// Wall-clock instant at which the active token is next due.
    schedule: watch::Sender<Option<SystemTime>>,
    in_flight: Mutex<Option<InFlight>>,
    generation: AtomicU64,
}

impl RefreshOrchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        api: Arc<dyn AuthApi>,
        threshold: Duration,
        events: broadcast::Sender<SessionEvent>,
    ) -> Arc<Self> {
        let (schedule, _) = watch::channel(None);
        Arc::new(Self {
            store,
            api,
            threshold,
            events,
            schedule,
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
        })
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Watch the next proactive refresh deadline.
    pub fn schedule(&self) -> watch::Receiver<Option<SystemTime>> {
        self.schedule.subscribe()
    }

    pub async fn is_refreshing(&self) -> bool {
        self.in_flight.lock().await.is_some()
    }

    /// Recompute the refresh deadline from the active session's token.
    pub async fn reschedule(&self) {
        let deadline = self
            .store
            .active_token()
            .await
            .and_then(|t| token::refresh_deadline(&t, self.threshold));
        self.schedule.send_replace(deadline);
    }

    /// Refresh the active token if it is expired or about to expire.
    ///
    /// Returns the token to use, or `None` when there is no active session.
    /// Performs no network call while the token is comfortably valid.
    pub async fn ensure_fresh(self: &Arc<Self>) -> Result<Option<String>, AuthError> {
        let Some(current) = self.store.active_token().await else {
            return Ok(None);
        };
        if !token::needs_refresh(&current, self.threshold) {
            return Ok(Some(current));
        }
        tracing::debug!(
            remaining_secs = token::remaining_lifetime(&current).as_secs(),
            "access token due for refresh"
        );
        self.refresh_after(Some(&current)).await.map(Some)
    }

    /// Obtain a new access token, joining the in-flight refresh if any.
    pub async fn refresh(self: &Arc<Self>) -> Result<String, AuthError> {
        self.refresh_after(None).await
    }

    /// Like [`refresh`](Self::refresh), but when no refresh is running and the
    /// active token has already moved on from `stale` (and is not due), that
    /// newer token is returned without another network call. If the session
    /// has ended in the meantime the result is [`AuthError::SessionExpired`].
    pub async fn refresh_after(
        self: &Arc<Self>,
        stale: Option<&str>,
    ) -> Result<String, AuthError> {
        let handle = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(in_flight) => {
                    tracing::debug!(generation = in_flight.generation, "joining in-flight refresh");
                    in_flight.handle.clone()
                }
                None => {
                    if let Some(stale) = stale {
                        match self.store.active_token().await {
                            // The session this token belonged to has already ended.
                            None => return Err(AuthError::SessionExpired),
                            Some(current)
                                if current != stale
                                    && !token::needs_refresh(&current, self.threshold) =>
                            {
                                return Ok(current);
                            }
                            Some(_) => {}
                        }
                    }
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                    let handle = self.start(generation);
                    *slot = Some(InFlight { generation, handle: handle.clone() });
                    handle
                }
            }
        };
        handle.await
    }

    /// Spawn the refresh task so it completes even if every waiter goes away.
    fn start(self: &Arc<Self>, generation: u64) -> SharedRefresh {
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = this.perform().await;
            this.finish(generation).await;
            result
        });

        let this = Arc::clone(self);
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    this.finish(generation).await;
                    Err(AuthError::Internal(format!("refresh task failed: {e}")))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn finish(&self, generation: u64) {
        let mut slot = self.in_flight.lock().await;
        if slot.as_ref().is_some_and(|f| f.generation == generation) {
            *slot = None;
        }
    }

    async fn perform(&self) -> Result<String, AuthError> {
        let kind = self.store.active_kind().await;
        tracing::debug!(kind = %kind, "refreshing access token");

        match self.api.refresh(kind).await {
            Ok(resp) => {
                let access_token = resp.access_token;
                if !self.store.update_token(kind, access_token.clone(), resp.principal).await {
                    tracing::debug!(kind = %kind, "session ended during refresh, discarding token");
                    return Err(AuthError::SessionExpired);
                }
                self.reschedule().await;
                tracing::info!(
                    kind = %kind,
                    expires_in_secs = token::remaining_lifetime(&access_token).as_secs(),
                    "access token refreshed"
                );
                Ok(access_token)
            }
            Err(AuthError::Rejected { status }) => {
                self.terminate(kind, status).await;
                Err(AuthError::SessionExpired)
            }
            Err(e) => {
                tracing::warn!(kind = %kind, err = %e, "token refresh failed, keeping session");
                Err(e)
            }
        }
    }

    /// The only path that forces a logout.
    async fn terminate(&self, kind: SessionKind, status: u16) {
        let existed = self.store.get(kind).await.is_some();
        self.store.clear(kind).await;
        self.reschedule().await;
        if !existed {
            tracing::debug!(kind = %kind, status, "refresh rejected for a session that is already gone");
            return;
        }
        tracing::warn!(kind = %kind, status, "refresh credential rejected, ending session");
        let _ = self.events.send(SessionEvent::terminated(kind));
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
