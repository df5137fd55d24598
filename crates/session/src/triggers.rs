// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Passive refresh triggers: user activity and a periodic timer.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::refresh::RefreshOrchestrator;

/// Kind of user interaction reported by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Pointer,
    Key,
    Scroll,
    Touch,
}

/// Fan-out point for user activity. Handlers are registered explicitly and
/// live until their [`Subscription`] is unsubscribed or dropped.
pub struct ActivitySource {
    tx: broadcast::Sender<Activity>,
}

impl Default for ActivitySource {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivitySource {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Report an interaction. Returns the number of live subscriptions.
    pub fn emit(&self, activity: Activity) -> usize {
        self.tx.send(activity).unwrap_or(0)
    }

    /// Run `handler` for every activity until the subscription ends.
    pub fn on_activity<F>(&self, handler: F) -> Subscription
    where
        F: Fn(Activity) + Send + Sync + 'static,
    {
        let mut rx = self.tx.subscribe();
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(activity) => handler(activity),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    },
                }
            }
        });
        Subscription { cancel, task: Some(task) }
    }
}

/// Handle to a registered activity handler.
pub struct Subscription {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop the handler and wait until it has been torn down.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Admits at most one event per interval.
#[derive(Debug)]
pub struct Debounce {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Debounce {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: Mutex::new(None) }
    }

    /// True if an event at `now` should go through; records it if so.
    pub fn ready(&self, now: Instant) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Check the token on user activity, at most once per `debounce`.
pub fn spawn_activity_refresh(
    source: &ActivitySource,
    refresher: Arc<RefreshOrchestrator>,
    debounce: Duration,
) -> Subscription {
    let gate = Debounce::new(debounce);
    source.on_activity(move |activity| {
        if !gate.ready(Instant::now()) {
            return;
        }
        let refresher = Arc::clone(&refresher);
        tokio::spawn(async move {
            if let Err(e) = refresher.ensure_fresh().await {
                tracing::debug!(?activity, err = %e, "activity token check failed");
            }
        });
    })
}

/// Check the token every `interval` and at the scheduled refresh deadline
/// until `cancel` fires. A token that is already due is handled right away
/// through its deadline; the first interval tick comes one interval in.
pub fn spawn_periodic_check(
    refresher: Arc<RefreshOrchestrator>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut schedule = refresher.schedule();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval_at(Instant::now() + interval, interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // A deadline fires once; if the refresh fails the interval takes over
        // until a new deadline is published.
        let mut fired: Option<SystemTime> = None;

        loop {
            let deadline = (*schedule.borrow_and_update()).filter(|d| Some(*d) != fired);
            let until_deadline = deadline
                .map(|d| d.duration_since(SystemTime::now()).unwrap_or_default());

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
                _ = sleep_for(until_deadline) => {
                    tracing::debug!("refresh deadline reached");
                    fired = deadline;
                }
                changed = schedule.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(e) = refresher.ensure_fresh().await {
                tracing::debug!(err = %e, "periodic token check failed");
            }
        }
    })
}

async fn sleep_for(duration: Option<Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "triggers_tests.rs"]
mod tests;
