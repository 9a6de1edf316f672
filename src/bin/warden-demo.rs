//! Demo application guarded by warden.
//!
//! Two accounts: `admin` / `admin123!` and `user` / `user123!`.
//!
//! ```text
//! GET  /           → redirect to /login
//! GET  /login      → login form
//! POST /login      → authenticate, set session cookie, redirect
//! GET  /dashboard  → any authenticated user
//! GET  /admin      → users whose role includes `admin`
//! GET  /logout     → end the session
//! ```
//!
//! Environment: `WARDEN_ADDR` (default `127.0.0.1:3000`),
//! `WARDEN_SECURE_COOKIES`, plus everything read by
//! `SecurityConfig::from_env` and `ObservabilityConfig::from_env`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Form, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use tracing::{info, warn};

use warden::alerting::{AlertConfig, AlertManager};
use warden::audit::AuditLogger;
use warden::auth::{AuthenticationEnforcer, CredentialMap, LoginOutcome};
use warden::authz::AuthorizationEnforcer;
use warden::error::{self, AppError, ErrorConfig};
use warden::guard::{GuardChain, GuardServices, RequestContext};
use warden::http::{
    clear_session_cookie, client_ip, session_cookie, session_id_from_headers, LoginForm,
};
use warden::observability::{self, ObservabilityConfig};
use warden::session::{RegistrySession, SessionRegistry, SessionStore};
use warden::validation::{InputValidator, Validate};
use warden::{SecureRouter, SecurityConfig};

#[derive(Clone)]
struct AppState {
    auth: AuthenticationEnforcer,
    users: Arc<CredentialMap>,
    registry: SessionRegistry,
    login_screen: GuardChain,
    signed_in: GuardChain,
    admin_only: GuardChain,
    secure_cookies: bool,
}

impl AppState {
    fn new(services: GuardServices, users: CredentialMap, secure_cookies: bool) -> Self {
        Self {
            auth: services.auth.clone(),
            users: Arc::new(users),
            registry: SessionRegistry::new(),
            login_screen: GuardChain::new(services.clone()).reject_suspicious_input(["username"]),
            signed_in: GuardChain::new(services.clone()).require_authentication(),
            admin_only: GuardChain::new(services)
                .require_authentication()
                .require_permission("admin"),
            secure_cookies,
        }
    }

    /// Session named by the request cookie, or an empty throwaway one
    fn session(&self, headers: &HeaderMap) -> RegistrySession {
        match session_id_from_headers(headers) {
            Some(id) => self.registry.handle(id),
            None => self.registry.handle(SessionRegistry::new_session_id()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init(ObservabilityConfig::from_env())?;
    error::init(ErrorConfig::from_env());

    let config = SecurityConfig::from_env();
    config.validate()?;

    let alerts = AlertManager::new(AlertConfig::default());
    alerts.register_handler(|alert| {
        warn!(
            severity = ?alert.severity,
            category = ?alert.category,
            source = %alert.source,
            "ALERT: {}",
            alert.summary
        );
    });

    let audit = AuditLogger::from_config(&config, Some(alerts.clone()))
        .context("opening audit log")?;
    let auth = AuthenticationEnforcer::from_config(&config, audit.clone(), Some(alerts.clone()))?;
    let authz = AuthorizationEnforcer::new().with_audit(audit);

    let mut users = CredentialMap::new();
    users.insert_hash("admin", auth.hash_password_async("admin123!".into()).await?);
    users.insert_hash("user", auth.hash_password_async("user123!".into()).await?);

    let services = GuardServices::new(auth.clone(), authz)
        .login_path(config.login_path.clone())
        .alerts(alerts);
    let secure_cookies = std::env::var("WARDEN_SECURE_COOKIES")
        .ok()
        .and_then(|v| warden::parse_bool(&v))
        .unwrap_or(false);

    let state = AppState::new(services, users, secure_cookies);
    spawn_housekeeping(state.clone());

    let app = router(state, &config);

    let addr: SocketAddr = std::env::var("WARDEN_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()
        .context("WARDEN_ADDR must be host:port")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "warden demo listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    auth.audit().flush();
    Ok(())
}

fn router(state: AppState, config: &SecurityConfig) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::to("/login") }))
        .route("/login", get(login_page).post(login_submit))
        .route("/dashboard", get(dashboard))
        .route("/admin", get(admin))
        .route("/logout", get(logout))
        .with_state(state)
        .with_security(config)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("Could not install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Drop idle sessions and expired lockout records once a minute
fn spawn_housekeeping(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let now = Utc::now();
            let sessions = state
                .registry
                .purge_inactive(state.auth.session_policy(), now);
            let lockouts = state.auth.tracker().purge_expired_at(now);
            if sessions + lockouts > 0 {
                info!(sessions, lockouts, "Housekeeping purged stale entries");
            }
        }
    });
}

// ============================================================================
// Handlers
// ============================================================================

async fn login_page() -> Html<String> {
    render_login(None)
}

async fn login_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let ip = client_ip(&headers);

    if let Err(e) = form.validate() {
        return Err(AppError::bad_request("Username and password are required")
            .with_details(e.to_string()));
    }

    // Screen before anything touches the credential store
    {
        let mut scratch = state.session(&headers);
        let mut ctx = RequestContext::new(&mut scratch, "/login")
            .with_ip(ip.as_deref())
            .with_input("username", &form.username);
        if let Err(denial) = state.login_screen.protect(&mut ctx, |_| ()) {
            return Ok(denial.into_response());
        }
    }

    // Fresh id on every login so a pre-login cookie is never promoted
    let previous = session_id_from_headers(&headers);
    let mut session = state.registry.open();
    let worker = state.clone();
    let worker_ip = ip.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let outcome = worker.auth.attempt_login(
            &mut session,
            worker.users.as_ref(),
            &form.username,
            &form.password,
            worker_ip.as_deref(),
        );
        (outcome, session)
    })
    .await;

    let (outcome, session) = match joined {
        Ok(done) => done,
        Err(e) => {
            let mut data = serde_json::Map::new();
            data.insert("path".to_string(), "/login".into());
            data.insert("error".to_string(), e.to_string().into());
            state.auth.audit().anomaly(None, ip.as_deref(), "internal_error", data);
            return Err(AppError::internal("Login failed", e));
        }
    };

    match outcome {
        LoginOutcome::Authenticated => {
            if let Some(old) = previous {
                state.registry.handle(old).clear();
            }
            let mut response = Redirect::to("/dashboard").into_response();
            if let Some(cookie) = session_cookie(session.id(), state.secure_cookies) {
                response.headers_mut().insert(header::SET_COOKIE, cookie);
            }
            Ok(response)
        }
        LoginOutcome::Unavailable => Err(AppError::unavailable("Service temporarily unavailable")),
        failed => Ok((StatusCode::UNAUTHORIZED, render_login(Some(failed))).into_response()),
    }
}

async fn dashboard(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ip = client_ip(&headers);
    let mut session = state.session(&headers);
    let mut ctx = RequestContext::new(&mut session, "/dashboard").with_ip(ip.as_deref());

    match state.signed_in.protect(&mut ctx, |ctx| {
        let user = InputValidator::sanitize_html(ctx.user().unwrap_or_default());
        page(
            "Dashboard",
            &format!(
                "<h1>Welcome, {user}</h1>\
                 <p><a href=\"/admin\">Admin</a> | <a href=\"/logout\">Log out</a></p>"
            ),
        )
    }) {
        Ok(html) => html.into_response(),
        Err(denial) => denial.into_response(),
    }
}

async fn admin(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ip = client_ip(&headers);
    let mut session = state.session(&headers);
    let mut ctx = RequestContext::new(&mut session, "/admin").with_ip(ip.as_deref());

    match state.admin_only.protect(&mut ctx, |_| {
        page("Admin", "<h1>Administration</h1><p><a href=\"/dashboard\">Back</a></p>")
    }) {
        Ok(html) => html.into_response(),
        Err(denial) => denial.into_response(),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ip = client_ip(&headers);
    let mut session = state.session(&headers);
    state.auth.logout_user(&mut session, ip.as_deref());

    let mut response = Redirect::to("/login").into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, clear_session_cookie());
    response
}

// ============================================================================
// Pages
// ============================================================================

fn render_login(outcome: Option<LoginOutcome>) -> Html<String> {
    let error = outcome
        .map(|o| format!("<p class=\"error\">{}</p>", o.public_message()))
        .unwrap_or_default();
    page(
        "Sign in",
        &format!(
            "<h1>Sign in</h1>{error}\
             <form method=\"post\" action=\"/login\">\
             <label>Username <input name=\"username\" autocomplete=\"username\"></label>\
             <label>Password <input name=\"password\" type=\"password\" autocomplete=\"current-password\"></label>\
             <button type=\"submit\">Sign in</button></form>"
        ),
    )
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head><body>{body}</body></html>"
    ))
}
