// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Login, refresh, and logout endpoints.
//!
//! The refresh credential travels in an HTTP-only cookie set by the server
//! on login. It lives in the HTTP client's cookie jar and is never read here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::session::{Principal, SessionKind};

/// Username/password pair submitted to the login endpoint.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("username", &self.username).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(alias = "user")]
    pub principal: Principal,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default, alias = "user")]
    pub principal: Option<Principal>,
}

/// Server-side auth endpoints consumed by the session core.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(
        &self,
        kind: SessionKind,
        credentials: &Credentials,
    ) -> Result<LoginResponse, AuthError>;

    /// Exchange the refresh cookie for a new access token. 401/403 map to
    /// [`AuthError::Rejected`].
    async fn refresh(&self, kind: SessionKind) -> Result<RefreshResponse, AuthError>;

    /// Invalidate the server-side refresh credential.
    async fn logout(&self, kind: SessionKind) -> Result<(), AuthError>;
}

/// HTTP implementation of [`AuthApi`] with a cookie jar for the refresh
/// credential.
pub struct HttpAuthApi {
    base_url: String,
    user_path: String,
    admin_path: String,
    client: Client,
}

impl HttpAuthApi {
    pub fn new(
        base_url: impl Into<String>,
        user_path: impl Into<String>,
        admin_path: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = Client::builder().cookie_store(true).timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            user_path: user_path.into(),
            admin_path: admin_path.into(),
            client,
        })
    }

    fn url(&self, kind: SessionKind, action: &str) -> String {
        let prefix = match kind {
            SessionKind::User => &self.user_path,
            SessionKind::Admin => &self.admin_path,
        };
        format!("{}{}/{}", self.base_url, prefix.trim_end_matches('/'), action)
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(
        &self,
        kind: SessionKind,
        credentials: &Credentials,
    ) -> Result<LoginResponse, AuthError> {
        let resp = self.client.post(self.url(kind, "login")).json(credentials).send().await?;
        let resp = check_auth_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn refresh(&self, kind: SessionKind) -> Result<RefreshResponse, AuthError> {
        let resp = self.client.post(self.url(kind, "refresh")).send().await?;
        let resp = check_auth_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn logout(&self, kind: SessionKind) -> Result<(), AuthError> {
        let resp = self.client.post(self.url(kind, "logout")).send().await?;
        check_auth_status(resp).await?;
        Ok(())
    }
}

async fn check_auth_status(resp: reqwest::Response) -> Result<reqwest::Response, AuthError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(AuthError::Rejected { status: status.as_u16() });
    }
    let body = resp.text().await.unwrap_or_else(|e| {
        tracing::debug!(status = status.as_u16(), err = %e, "failed to read error body");
        String::new()
    });
    Err(AuthError::Status { status: status.as_u16(), body })
}
