// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests against a fake API server on a loopback port.
//!
//! The server issues JWT-shaped tokens, sets the refresh cookie on login,
//! and can be told to answer the next resource requests with 401.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};

use lichsu_session::api::{Credentials, HttpAuthApi};
use lichsu_session::client::{ApiClient, RequestOptions};
use lichsu_session::config::{RefreshPolicy, Timeouts};
use lichsu_session::error::AuthError;
use lichsu_session::events::SessionEvent;
use lichsu_session::manager::SessionManager;
use lichsu_session::session::{Principal, Session, SessionKind, SessionStore};
use lichsu_session::store::MemoryStore;
use lichsu_session::supersede::Supersede;

static CRYPTO: Once = Once::new();

fn ensure_crypto() {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

fn jwt(subject: &str, serial: usize, offset_secs: i64) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD
        .encode(json!({ "sub": subject, "n": serial, "exp": now + offset_secs }).to_string());
    format!("{header}.{body}.sig")
}

struct Backend {
    issued: AtomicUsize,
    refreshes: AtomicUsize,
    logouts: AtomicUsize,
    resource_hits: AtomicUsize,
    /// Upcoming resource requests to answer with 401.
    reject_resources: AtomicUsize,
    /// Lifetime of tokens issued at login.
    login_ttl: AtomicI64,
    last_bearer: Mutex<Option<String>>,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            issued: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            resource_hits: AtomicUsize::new(0),
            reject_resources: AtomicUsize::new(0),
            login_ttl: AtomicI64::new(3600),
            last_bearer: Mutex::new(None),
        }
    }
}

impl Backend {
    fn issue(&self, subject: &str, ttl: i64) -> String {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst);
        jwt(subject, serial, ttl)
    }

    fn last_bearer(&self) -> Option<String> {
        self.last_bearer.lock().ok().and_then(|g| g.clone())
    }
}

type Shared = State<Arc<Backend>>;

async fn login(State(backend): Shared, Json(body): Json<Value>) -> Response {
    let username = body["username"].as_str().unwrap_or_default().to_owned();
    if body["password"] != "secret" {
        return (StatusCode::UNAUTHORIZED, "bad credentials").into_response();
    }
    let ttl = backend.login_ttl.load(Ordering::SeqCst);
    let token = backend.issue(&username, ttl);
    (
        [(header::SET_COOKIE, format!("refreshToken=rt-{username}; Path=/; HttpOnly"))],
        Json(json!({
            "accessToken": token,
            "user": { "id": 1, "name": username, "role": "editor", "status": "active" },
            "expiresIn": ttl,
        })),
    )
        .into_response()
}

async fn refresh(State(backend): Shared, headers: HeaderMap) -> Response {
    let cookie = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()).unwrap_or_default();
    if !cookie.contains("refreshToken=rt-") {
        return (StatusCode::UNAUTHORIZED, "no refresh credential").into_response();
    }
    backend.refreshes.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(20)).await;
    Json(json!({ "accessToken": backend.issue("refreshed", 3600) })).into_response()
}

async fn logout(State(backend): Shared) -> Response {
    backend.logouts.fetch_add(1, Ordering::SeqCst);
    ([(header::SET_COOKIE, "refreshToken=; Path=/; Max-Age=0")], StatusCode::NO_CONTENT)
        .into_response()
}

async fn books(State(backend): Shared, headers: HeaderMap) -> Response {
    backend.resource_hits.fetch_add(1, Ordering::SeqCst);
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);
    if let Ok(mut last) = backend.last_bearer.lock() {
        last.clone_from(&bearer);
    }
    let rejected = backend
        .reject_resources
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if rejected || bearer.is_none() {
        return (StatusCode::UNAUTHORIZED, "token expired").into_response();
    }
    Json(json!({ "items": [{ "title": "Đại Việt sử ký toàn thư" }] })).into_response()
}

async fn search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let ms = params.get("ms").and_then(|v| v.parse().ok()).unwrap_or(0);
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(json!({ "q": params.get("q") }))
}

async fn slow() -> StatusCode {
    tokio::time::sleep(Duration::from_secs(2)).await;
    StatusCode::OK
}

async fn spawn_backend() -> anyhow::Result<(String, Arc<Backend>)> {
    let backend = Arc::new(Backend::default());
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/admin/auth/login", post(login))
        .route("/api/admin/auth/refresh", post(refresh))
        .route("/api/admin/auth/logout", post(logout))
        .route("/api/books", get(books))
        .route("/api/search", get(search))
        .route("/api/slow", get(slow))
        .route("/health", get(|| async { StatusCode::OK }))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), backend))
}

struct Harness {
    backend: Arc<Backend>,
    manager: Arc<SessionManager>,
    client: Arc<ApiClient>,
}

async fn harness() -> anyhow::Result<Harness> {
    ensure_crypto();
    let (base, backend) = spawn_backend().await?;
    let api = HttpAuthApi::new(&base, "/api/auth", "/api/admin/auth", Duration::from_secs(5))?;
    let store = SessionStore::open(Box::new(MemoryStore::new()));
    let manager = SessionManager::new(RefreshPolicy::default(), store, Arc::new(api)).await;
    let timeouts = Timeouts { request: Duration::from_secs(5), probe: Duration::from_millis(200) };
    let client = Arc::new(ApiClient::new(&base, Arc::clone(&manager), timeouts)?);
    Ok(Harness { backend, manager, client })
}

fn credentials(username: &str) -> Credentials {
    Credentials { username: username.to_owned(), password: "secret".to_owned() }
}

#[tokio::test]
async fn login_stores_session_and_attaches_bearer() -> anyhow::Result<()> {
    let h = harness().await?;
    let session = h.manager.login(SessionKind::User, &credentials("an")).await?;
    assert_eq!(session.principal.name(), Some("an"));

    let body: Value = h.client.get_json("/api/books").await?;
    assert!(body["items"].is_array());
    assert_eq!(h.backend.last_bearer(), Some(session.access_token));
    assert_eq!(h.backend.refreshes.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_rejected() -> anyhow::Result<()> {
    let h = harness().await?;
    let bad = Credentials { username: "an".to_owned(), password: "nope".to_owned() };
    let err = h.manager.login(SessionKind::User, &bad).await.err();
    assert_eq!(err, Some(AuthError::Rejected { status: 401 }));
    assert!(h.manager.store().active_token().await.is_none());
    Ok(())
}

#[tokio::test]
async fn unauthorized_response_refreshes_and_replays_once() -> anyhow::Result<()> {
    let h = harness().await?;
    let session = h.manager.login(SessionKind::User, &credentials("an")).await?;
    h.backend.reject_resources.store(1, Ordering::SeqCst);

    let body: Value = h.client.get_json("/api/books").await?;
    assert!(body["items"].is_array());

    assert_eq!(h.backend.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.resource_hits.load(Ordering::SeqCst), 2);
    let fresh = h.manager.store().active_token().await;
    assert_ne!(fresh.as_deref(), Some(session.access_token.as_str()));
    assert_eq!(h.backend.last_bearer(), fresh);
    Ok(())
}

#[tokio::test]
async fn second_unauthorized_response_is_final() -> anyhow::Result<()> {
    let h = harness().await?;
    h.manager.login(SessionKind::User, &credentials("an")).await?;
    h.backend.reject_resources.store(2, Ordering::SeqCst);

    let err = h.client.get_json::<Value>("/api/books").await.err();
    assert!(matches!(err, Some(AuthError::Status { status: 401, .. })), "got {err:?}");
    assert_eq!(h.backend.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.resource_hits.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn auth_retry_can_be_skipped() -> anyhow::Result<()> {
    let h = harness().await?;
    h.manager.login(SessionKind::User, &credentials("an")).await?;
    h.backend.reject_resources.store(1, Ordering::SeqCst);

    let opts = RequestOptions { skip_auth_retry: true, ..Default::default() };
    let err = h.client.send(reqwest::Method::GET, "/api/books", None, opts).await.err();
    assert_eq!(err.and_then(|e| e.status()), Some(401));
    assert_eq!(h.backend.refreshes.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn anonymous_unauthorized_response_is_final() -> anyhow::Result<()> {
    let h = harness().await?;
    let mut events = h.manager.subscribe();

    let err = h.client.get_json::<Value>("/api/books").await.err();
    assert!(matches!(err, Some(AuthError::Status { status: 401, .. })), "got {err:?}");
    assert_eq!(h.backend.refreshes.load(Ordering::SeqCst), 0);
    assert_eq!(h.backend.resource_hits.load(Ordering::SeqCst), 1);
    assert!(events.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn expiring_token_is_refreshed_before_request() -> anyhow::Result<()> {
    let h = harness().await?;
    h.backend.login_ttl.store(60, Ordering::SeqCst);
    let session = h.manager.login(SessionKind::User, &credentials("an")).await?;

    let _: Value = h.client.get_json("/api/books").await?;

    assert_eq!(h.backend.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.resource_hits.load(Ordering::SeqCst), 1);
    assert_ne!(h.backend.last_bearer(), Some(session.access_token));
    Ok(())
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() -> anyhow::Result<()> {
    let h = harness().await?;
    h.backend.login_ttl.store(60, Ordering::SeqCst);
    h.manager.login(SessionKind::User, &credentials("an")).await?;

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let client = Arc::clone(&h.client);
        tasks.push(tokio::spawn(async move { client.get_json::<Value>("/api/books").await }));
    }
    for task in tasks {
        task.await??;
    }

    assert_eq!(h.backend.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.resource_hits.load(Ordering::SeqCst), 5);
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_ends_session() -> anyhow::Result<()> {
    let h = harness().await?;
    // Stored without logging in, so the cookie jar holds no refresh credential.
    let principal = Principal::new(json!({ "id": 1, "name": "an" }));
    h.manager.store().save(SessionKind::User, Session::new(jwt("an", 0, 60), principal)).await;
    let mut events = h.manager.subscribe();

    let err = h.client.get_json::<Value>("/api/books").await.err();
    assert_eq!(err, Some(AuthError::SessionExpired));
    assert_eq!(h.backend.resource_hits.load(Ordering::SeqCst), 0);
    assert!(h.manager.store().active_token().await.is_none());

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv()).await??;
    assert_eq!(event, SessionEvent::terminated(SessionKind::User));
    Ok(())
}

#[tokio::test]
async fn logout_clears_session_and_cookie() -> anyhow::Result<()> {
    let h = harness().await?;
    h.manager.login(SessionKind::User, &credentials("an")).await?;
    h.manager.logout(SessionKind::User).await;

    assert_eq!(h.backend.logouts.load(Ordering::SeqCst), 1);
    assert!(h.manager.store().get(SessionKind::User).await.is_none());

    // The cookie was expired by the server, so a forced refresh is rejected.
    let principal = Principal::new(json!({ "id": 1, "name": "an" }));
    h.manager.store().save(SessionKind::User, Session::new(jwt("an", 0, 60), principal)).await;
    let err = h.manager.refresher().refresh().await.err();
    assert_eq!(err, Some(AuthError::SessionExpired));
    assert_eq!(h.backend.refreshes.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn admin_and_user_sessions_coexist() -> anyhow::Result<()> {
    let h = harness().await?;
    h.manager.login(SessionKind::User, &credentials("an")).await?;
    h.manager.login(SessionKind::Admin, &credentials("binh")).await?;
    assert_eq!(h.manager.store().active_kind().await, SessionKind::Admin);

    h.manager.logout(SessionKind::Admin).await;
    assert_eq!(h.manager.store().active_kind().await, SessionKind::User);
    assert!(h.manager.store().get(SessionKind::User).await.is_some());
    Ok(())
}

#[tokio::test]
async fn probe_reports_status() -> anyhow::Result<()> {
    let h = harness().await?;
    assert_eq!(h.client.probe("/health").await?, reqwest::StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn probe_times_out_quickly() -> anyhow::Result<()> {
    let h = harness().await?;
    let started = std::time::Instant::now();
    let err = h.client.probe("/api/slow").await.err();
    assert_eq!(err, Some(AuthError::Timeout));
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[tokio::test]
async fn newer_search_supersedes_older_one() -> anyhow::Result<()> {
    let h = harness().await?;
    let search = Arc::new(Supersede::new());

    let first = {
        let (search, client) = (Arc::clone(&search), Arc::clone(&h.client));
        tokio::spawn(async move {
            search.run(client.get_json::<Value>("/api/search?q=ly&ms=1000")).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = search.run(h.client.get_json::<Value>("/api/search?q=tran&ms=0")).await?;
    assert_eq!(second["q"], "tran");
    assert_eq!(first.await?, Err(AuthError::Superseded));
    Ok(())
}
