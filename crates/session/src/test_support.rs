// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for unit tests: token builders and a scripted auth API.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::api::{AuthApi, Credentials, LoginResponse, RefreshResponse};
use crate::error::AuthError;
use crate::session::{Principal, Session, SessionKind};

/// Build an unsigned JWT-shaped token whose `exp` is `offset_secs` from now.
pub fn token_expiring_in(offset_secs: i64) -> String {
    token_for("1", offset_secs)
}

pub fn token_for(subject: &str, offset_secs: i64) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    token_with_payload(&serde_json::json!({ "sub": subject, "exp": now + offset_secs }))
}

pub fn token_with_payload(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.signature")
}

pub fn principal(name: &str, role: &str) -> Principal {
    Principal::new(serde_json::json!({
        "id": 7,
        "name": name,
        "role": role,
        "status": "active",
    }))
}

pub fn session_expiring_in(offset_secs: i64, name: &str) -> Session {
    Session::new(token_expiring_in(offset_secs), principal(name, "editor"))
}

/// One scripted refresh outcome.
#[derive(Debug, Clone)]
pub enum RefreshScript {
    Issue { expires_in: i64 },
    Fail(AuthError),
}

/// Auth API fake that counts calls and answers refreshes from a script.
///
/// Once the script runs out it keeps issuing tokens valid for an hour.
pub struct FakeAuthApi {
    pub refresh_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub delay: Duration,
    pub fail_logout: bool,
    script: Mutex<VecDeque<RefreshScript>>,
}

impl FakeAuthApi {
    pub fn new(delay: Duration) -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            delay,
            fail_logout: false,
            script: Mutex::new(VecDeque::new()),
        }
    }

    pub fn scripted(delay: Duration, script: Vec<RefreshScript>) -> Arc<Self> {
        let api = Self::new(delay);
        if let Ok(mut s) = api.script.lock() {
            s.extend(script);
        }
        Arc::new(api)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn login(
        &self,
        kind: SessionKind,
        credentials: &Credentials,
    ) -> Result<LoginResponse, AuthError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if credentials.password != "secret" {
            return Err(AuthError::Rejected { status: 401 });
        }
        Ok(LoginResponse {
            access_token: token_for(&credentials.username, 3600),
            principal: principal(&credentials.username, kind.as_str()),
            expires_in: Some(3600),
        })
    }

    async fn refresh(&self, _kind: SessionKind) -> Result<RefreshResponse, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(RefreshScript::Fail(e)) => Err(e),
            Some(RefreshScript::Issue { expires_in }) => Ok(RefreshResponse {
                access_token: token_expiring_in(expires_in),
                principal: None,
            }),
            None => Ok(RefreshResponse { access_token: token_expiring_in(3600), principal: None }),
        }
    }

    async fn logout(&self, _kind: SessionKind) -> Result<(), AuthError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout {
            return Err(AuthError::Network("connection refused".to_owned()));
        }
        Ok(())
    }
}

/// Assert that an expression is an `Err` whose message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
