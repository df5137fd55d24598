// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the site's resource endpoints with transparent auth.
//!
//! Before a request goes out the active token is checked (and refreshed if
//! due) and attached as a bearer header. A 401 triggers one refresh and one
//! replay with the token that refresh produced.

use std::sync::Arc;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Timeouts;
use crate::error::AuthError;
use crate::manager::SessionManager;

/// Per-request auth handling flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Do not check or refresh the token before sending.
    pub skip_refresh: bool,
    /// Do not refresh and replay on 401.
    pub skip_auth_retry: bool,
}

impl RequestOptions {
    /// Neither pre-request refresh nor 401 replay.
    pub fn anonymous() -> Self {
        Self { skip_refresh: true, skip_auth_retry: true }
    }
}

/// HTTP client wrapper bound to one [`SessionManager`].
pub struct ApiClient {
    base_url: String,
    session: Arc<SessionManager>,
    timeouts: Timeouts,
    client: Client,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        session: Arc<SessionManager>,
        timeouts: Timeouts,
    ) -> Result<Self, AuthError> {
        let client = Client::builder().timeout(timeouts.request).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            session,
            timeouts,
            client,
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn build(
        &self,
        method: &Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method.clone(), self.url(path));
        if let Some(body) = body {
            req = req.json(body);
        }
        match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send a request and return the successful response.
    ///
    /// Non-2xx responses become [`AuthError::Status`]; a refresh that ends
    /// the session surfaces as [`AuthError::SessionExpired`].
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        opts: RequestOptions,
    ) -> Result<reqwest::Response, AuthError> {
        let refresher = self.session.refresher();

        if !opts.skip_refresh {
            match refresher.ensure_fresh().await {
                Ok(_) => {}
                Err(AuthError::SessionExpired) => return Err(AuthError::SessionExpired),
                Err(e) => {
                    tracing::warn!(path, err = %e, "pre-request refresh failed, sending current token");
                }
            }
        }

        let token = self.session.store().active_token().await;
        let resp = self.build(&method, path, body, token.as_deref()).send().await?;

        // Without a token there is no session to recover; a 401 is final.
        let Some(sent) = token.as_deref() else {
            return check_status(resp).await;
        };
        if resp.status() != StatusCode::UNAUTHORIZED || opts.skip_auth_retry {
            return check_status(resp).await;
        }

        tracing::debug!(path, "401 from resource endpoint, refreshing and replaying once");
        let fresh = refresher.refresh_after(Some(sent)).await?;
        let retry = self.build(&method, path, body, Some(&fresh)).send().await?;
        check_status(retry).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AuthError> {
        let resp = self.send(Method::GET, path, None, RequestOptions::default()).await?;
        Ok(resp.json().await?)
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AuthError> {
        let body = serde_json::to_value(body)?;
        let resp = self.send(Method::POST, path, Some(&body), RequestOptions::default()).await?;
        json_or_null(resp).await
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AuthError> {
        let body = serde_json::to_value(body)?;
        let resp = self.send(Method::PUT, path, Some(&body), RequestOptions::default()).await?;
        json_or_null(resp).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), AuthError> {
        self.send(Method::DELETE, path, None, RequestOptions::default()).await?;
        Ok(())
    }

    /// Lightweight connectivity check with the short probe timeout. No auth
    /// handling is applied.
    pub async fn probe(&self, path: &str) -> Result<StatusCode, AuthError> {
        let resp = self.client.get(self.url(path)).timeout(self.timeouts.probe).send().await?;
        Ok(resp.status())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, AuthError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_else(|e| {
        tracing::debug!(status = status.as_u16(), err = %e, "failed to read error body");
        String::new()
    });
    Err(AuthError::Status { status: status.as_u16(), body })
}

/// Decode a JSON body, treating an empty body as `null`.
async fn json_or_null<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, AuthError> {
    let bytes = resp.bytes().await?;
    if bytes.is_empty() {
        return Ok(serde_json::from_value(serde_json::Value::Null)?);
    }
    Ok(serde_json::from_slice(&bytes)?)
}
