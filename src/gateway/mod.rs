//! Axum-based HTTP gateway.
//!
//! Request flow: session guard (cookie lookup) → credential store →
//! handler → transcript or credential store → JSON/HTML response. Each
//! request is handled independently; the only shared mutable state is the
//! filesystem and the in-memory session map.

pub mod pages;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use parking_lot::Mutex;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::accounts::{username_is_valid, AccountError, AccountStore};
use crate::config::{Config, GatewayConfig};
use crate::session::SessionStore;
use crate::transcript::TranscriptStore;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "coffer_session";
/// Sliding window used by credential rate limiting.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// How often the rate limiter sweeps stale client entries from its map.
const RATE_LIMITER_SWEEP_INTERVAL_SECS: u64 = 300; // 5 minutes

/// Per-client sliding-window limiter for credential attempts
/// (login + register share one budget).
#[derive(Debug)]
pub struct CredentialRateLimiter {
    limit_per_window: u32,
    window: Duration,
    attempts: Mutex<(HashMap<String, Vec<Instant>>, Instant)>,
}

impl CredentialRateLimiter {
    fn new(limit_per_window: u32) -> Self {
        Self {
            limit_per_window,
            window: Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
            attempts: Mutex::new((HashMap::new(), Instant::now())),
        }
    }

    fn allow(&self, key: &str) -> bool {
        if self.limit_per_window == 0 {
            return true;
        }

        let now = Instant::now();
        // A monotonic clock younger than the window means every recorded
        // attempt is still inside it, so `None` retains everything.
        let cutoff = now.checked_sub(self.window);
        let in_window = |t: &Instant| cutoff.map_or(true, |c| *t > c);

        let mut guard = self.attempts.lock();
        let (attempts, last_sweep) = &mut *guard;

        // Periodic sweep: drop clients with no recent attempts
        if last_sweep.elapsed() >= Duration::from_secs(RATE_LIMITER_SWEEP_INTERVAL_SECS) {
            attempts.retain(|_, timestamps| {
                timestamps.retain(in_window);
                !timestamps.is_empty()
            });
            *last_sweep = now;
        }

        let entry = attempts.entry(key.to_owned()).or_default();
        entry.retain(in_window);

        if entry.len() >= self.limit_per_window as usize {
            return false;
        }

        entry.push(now);
        true
    }
}

fn client_key_from_headers(headers: &HeaderMap) -> String {
    for header_name in ["X-Forwarded-For", "X-Real-IP"] {
        if let Some(value) = headers.get(header_name).and_then(|v| v.to_str().ok()) {
            let first = value.split(',').next().unwrap_or("").trim();
            if !first.is_empty() {
                return first.to_owned();
            }
        }
    }
    "unknown".into()
}

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountStore>,
    pub transcripts: Arc<TranscriptStore>,
    pub sessions: Arc<SessionStore>,
    pub rate_limiter: Arc<CredentialRateLimiter>,
    /// Whether new user registration is allowed.
    pub allow_registration: bool,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let root = config.storage.accounts_dir.clone();
        Self {
            accounts: Arc::new(AccountStore::new(root.clone())),
            transcripts: Arc::new(TranscriptStore::new(root)),
            sessions: Arc::new(SessionStore::new(Duration::from_secs(
                config.auth.session_ttl_secs,
            ))),
            rate_limiter: Arc::new(CredentialRateLimiter::new(
                config.gateway.credential_rate_limit_per_minute,
            )),
            allow_registration: config.auth.allow_registration,
        }
    }
}

/// Run the HTTP gateway.
pub async fn run_gateway(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let display_addr = listener.local_addr()?;

    std::fs::create_dir_all(&config.storage.accounts_dir)?;
    tracing::info!(
        accounts_dir = %config.storage.accounts_dir.display(),
        "accounts root ready"
    );

    let state = AppState::from_config(&config);
    let app = build_router(state, &config.gateway);

    println!("💰 Coffer listening on http://{display_addr}");
    println!("  GET  /                — landing page");
    println!("  GET  /register        — create an account");
    println!("  GET  /login           — log in");
    println!("  GET  /profile         — your account (session)");
    println!("  POST /save_transcript — {{\"data\": [...]}} (session)");
    println!("  GET  /load_transcript — last-saved entries (session)");
    println!("  GET  /health          — health check");
    println!("  Press Ctrl+C to stop.\n");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router with middleware. Split out from [`run_gateway`] so tests
/// can drive it without binding a socket.
pub fn build_router(state: AppState, gateway: &GatewayConfig) -> Router {
    // CORS for the JSON API — the HTML flow is same-origin anyway
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/", get(handle_index))
        .route(
            "/register",
            get(handle_register_page).post(handle_register_submit),
        )
        .route("/login", get(handle_login_page).post(handle_login_submit))
        .route("/logout", get(handle_logout))
        .route("/profile", get(handle_profile))
        .route(
            "/save_transcript",
            axum::routing::post(handle_save_transcript),
        )
        .route("/load_transcript", get(handle_load_transcript))
        .route("/health", get(handle_health))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(gateway.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            gateway.request_timeout_secs,
        )))
}

// ── Session guard ───────────────────────────────────────────────────

/// The authenticated identity for one request, resolved from the session
/// cookie. Extracting it on a handler makes that handler protected:
/// anonymous requests are redirected to `/login?next=<original path>`.
pub struct SessionUser {
    pub username: String,
    pub token: String,
}

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(token) = session_token_from_headers(&parts.headers) {
            if let Some(username) = state.sessions.resolve(&token) {
                return Ok(SessionUser { username, token });
            }
        }
        let next = urlencoding::encode(parts.uri.path()).into_owned();
        Err(Redirect::to(&format!("/login?next={next}")))
    }
}

fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

fn set_session_cookie(resp: &mut Response, token: &str) {
    let raw = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
    match HeaderValue::from_str(&raw) {
        Ok(value) => {
            resp.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("failed to build session cookie header: {e}"),
    }
}

fn clear_session_cookie(resp: &mut Response) {
    resp.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_static("coffer_session=; Path=/; HttpOnly; Max-Age=0"),
    );
}

/// Post-login redirect targets must be same-site paths; anything else
/// (absolute URLs, protocol-relative `//host`) falls back to the profile.
fn sanitize_next(next: Option<&str>) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n.to_string(),
        _ => "/profile".to_string(),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health — always public.
async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "active_sessions": state.sessions.len(),
    }))
}

/// GET / — landing page; greets the user when a session is live.
async fn handle_index(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let user =
        session_token_from_headers(&headers).and_then(|token| state.sessions.resolve(&token));
    Html(pages::render_index(user.as_deref()))
}

/// Shared body for the register and login forms.
#[derive(Deserialize)]
struct CredentialForm {
    username: String,
    password: String,
    #[serde(default)]
    next: Option<String>,
}

/// GET /register
async fn handle_register_page() -> Html<String> {
    Html(pages::render_register(None))
}

/// POST /register — create the account, then send the user to login.
async fn handle_register_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CredentialForm>,
) -> Response {
    let client_key = client_key_from_headers(&headers);
    if !state.rate_limiter.allow(&client_key) {
        tracing::warn!(client_key, "register rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, Html(pages::render_slow_down())).into_response();
    }
    if !state.allow_registration {
        return (
            StatusCode::FORBIDDEN,
            Html(pages::render_register(Some("Registration is disabled."))),
        )
            .into_response();
    }

    match state.accounts.create(&form.username, &form.password) {
        Ok(account) => {
            tracing::info!(username = %account.username, "new account registered");
            Redirect::to("/login?registered=1").into_response()
        }
        Err(AccountError::InvalidUsername) => (
            StatusCode::BAD_REQUEST,
            Html(pages::render_register(Some(
                "Invalid username. Use 3-32 chars: letters, digits, underscore.",
            ))),
        )
            .into_response(),
        Err(AccountError::EmptyPassword) => (
            StatusCode::BAD_REQUEST,
            Html(pages::render_register(Some("Password is required."))),
        )
            .into_response(),
        Err(AccountError::UsernameTaken) => (
            StatusCode::CONFLICT,
            Html(pages::render_register(Some("Username already taken."))),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("registration failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(pages::render_register(Some(
                    "Something went wrong. Please try again.",
                ))),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct LoginQuery {
    next: Option<String>,
    registered: Option<String>,
}

/// GET /login — `next` rides through a hidden form field; `registered=1`
/// shows the post-registration notice.
async fn handle_login_page(Query(query): Query<LoginQuery>) -> Html<String> {
    let next = sanitize_next(query.next.as_deref());
    let notice = query
        .registered
        .is_some()
        .then_some("Account created. You can log in now.");
    Html(pages::render_login(&next, None, notice))
}

/// POST /login — verify credentials, mint a session, redirect to `next`.
async fn handle_login_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CredentialForm>,
) -> Response {
    let client_key = client_key_from_headers(&headers);
    if !state.rate_limiter.allow(&client_key) {
        tracing::warn!(client_key, "login rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, Html(pages::render_slow_down())).into_response();
    }

    let next = sanitize_next(form.next.as_deref());
    let username = form.username.trim();
    if !username_is_valid(username) {
        return (
            StatusCode::BAD_REQUEST,
            Html(pages::render_login(&next, Some("Invalid username format."), None)),
        )
            .into_response();
    }

    match state.accounts.verify(username, &form.password) {
        Ok(true) => {
            let token = state.sessions.create(username);
            tracing::info!(username, "login succeeded");
            let mut resp = Redirect::to(&next).into_response();
            set_session_cookie(&mut resp, &token);
            resp
        }
        Ok(false) => {
            // Same message for bad password and unknown username.
            tracing::warn!(username, "login failed");
            (
                StatusCode::UNAUTHORIZED,
                Html(pages::render_login(&next, Some("Invalid username or password."), None)),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("credential verification failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(pages::render_login(
                    &next,
                    Some("Something went wrong. Please try again."),
                    None,
                )),
            )
                .into_response()
        }
    }
}

/// GET /logout — revoke the session and drop the cookie. Plain 302 rather
/// than the 303 the form handlers use; there is no method change to force.
async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token_from_headers(&headers) {
        state.sessions.revoke(&token);
    }
    let mut resp = (
        StatusCode::FOUND,
        [(header::LOCATION, HeaderValue::from_static("/"))],
    )
        .into_response();
    clear_session_cookie(&mut resp);
    resp
}

/// GET /profile — the authenticated user's record. A session whose backing
/// account has vanished is cleared and answered with 403.
async fn handle_profile(State(state): State<AppState>, user: SessionUser) -> Response {
    match state.accounts.load(&user.username) {
        Ok(Some(account)) => {
            let path = state.accounts.account_path(&account.username);
            Html(pages::render_profile(&account, &path.display().to_string())).into_response()
        }
        Ok(None) => {
            tracing::warn!(username = %user.username, "session referenced a missing account");
            state.sessions.revoke(&user.token);
            let mut resp =
                (StatusCode::FORBIDDEN, Html(pages::render_forbidden())).into_response();
            clear_session_cookie(&mut resp);
            resp
        }
        Err(e) => {
            tracing::error!("profile lookup failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Html(pages::render_forbidden())).into_response()
        }
    }
}

/// Request body for POST /save_transcript.
#[derive(Deserialize)]
struct SaveTranscriptBody {
    data: serde_json::Value,
}

/// POST /save_transcript — wholesale replace the user's transcript.
async fn handle_save_transcript(
    State(state): State<AppState>,
    user: SessionUser,
    body: Result<Json<SaveTranscriptBody>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Missing 'data' field"})),
        )
            .into_response();
    };

    // The account may have been removed out from under a live session.
    match state.accounts.load(&user.username) {
        Ok(Some(_)) => {}
        Ok(None) => {
            tracing::warn!(username = %user.username, "save_transcript for a vanished account");
            state.sessions.revoke(&user.token);
            let mut resp = (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "Account not found"})),
            )
                .into_response();
            clear_session_cookie(&mut resp);
            return resp;
        }
        Err(e) => {
            tracing::error!("account lookup failed: {e}");
            return internal_json_error();
        }
    }

    match state.transcripts.save(&user.username, &body.data) {
        Ok(()) => {
            let saved_items = body.data.as_array().map_or(1, Vec::len);
            (
                StatusCode::OK,
                Json(serde_json::json!({"status": "success", "saved_items": saved_items})),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("transcript save failed: {e}");
            internal_json_error()
        }
    }
}

/// GET /load_transcript — last-saved entries, or 404 before the first save.
async fn handle_load_transcript(State(state): State<AppState>, user: SessionUser) -> Response {
    match state.transcripts.load(&user.username) {
        Ok(Some(entries)) => {
            (StatusCode::OK, Json(serde_json::json!({"data": entries}))).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "No transcript saved yet"})),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("transcript load failed: {e}");
            internal_json_error()
        }
    }
}

fn internal_json_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "Internal storage error"})),
    )
        .into_response()
}

// ── Tests ───────────────────────────────────────────────────────────
