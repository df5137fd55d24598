// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Abort-previous-start-new for listing requests.
//!
//! A paginated search issues a new request on every term or page change.
//! Running each through the same [`Supersede`] cancels the older request so
//! its response can never land after the newer one.

use std::future::Future;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::AuthError;

#[derive(Debug, Default)]
pub struct Supersede {
    current: Mutex<Option<CancellationToken>>,
}

impl Supersede {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel whatever request is running and return the token for a new one.
    async fn begin(&self) -> CancellationToken {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        *current = Some(token.clone());
        token
    }

    /// Cancel the running request without starting a new one.
    pub async fn cancel(&self) {
        if let Some(previous) = self.current.lock().await.take() {
            previous.cancel();
        }
    }

    /// Run `fut`, cancelling any request started earlier through this handle.
    ///
    /// A cancelled request is dropped (closing its connection) and resolves
    /// to [`AuthError::Superseded`].
    pub async fn run<T, F>(&self, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        let token = self.begin().await;
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(AuthError::Superseded),
            result = fut => result,
        }
    }
}

#[cfg(test)]
#[path = "supersede_tests.rs"]
mod tests;
