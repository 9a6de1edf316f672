//! Login, guarded pages and logout over HTTP with an in-process router.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Form, State};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceExt;

use warden::audit::{MemorySink, ACCESS_DENIED, ANOMALY, LOGIN_ATTEMPT, LOGOUT};
use warden::auth::{AuthenticationEnforcer, CredentialMap};
use warden::guard::{GuardChain, RequestContext};
use warden::http::{
    clear_session_cookie, client_ip, session_cookie, session_id_from_headers, LoginForm,
};
use warden::session::{RegistrySession, SessionRegistry};
use warden::validation::Validate;
use warden::testing::TestHarness;
use warden::{SecureRouter, SecurityConfig};

#[derive(Clone)]
struct TestState {
    auth: AuthenticationEnforcer,
    users: Arc<CredentialMap>,
    registry: SessionRegistry,
    screen: GuardChain,
    signed_in: GuardChain,
    admin_only: GuardChain,
}

impl TestState {
    fn session(&self, headers: &HeaderMap) -> RegistrySession {
        let id = session_id_from_headers(headers).unwrap_or_else(SessionRegistry::new_session_id);
        self.registry.handle(id)
    }
}

async fn login(
    State(state): State<TestState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let ip = client_ip(&headers);
    if form.validate().is_err() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    {
        let mut scratch = state.session(&headers);
        let mut ctx = RequestContext::new(&mut scratch, "/login")
            .with_ip(ip.as_deref())
            .with_input("username", &form.username);
        if let Err(denial) = state.screen.protect(&mut ctx, |_| ()) {
            return denial.into_response();
        }
    }

    let mut session = state.registry.open();
    let outcome = state.auth.attempt_login(
        &mut session,
        state.users.as_ref(),
        &form.username,
        &form.password,
        ip.as_deref(),
    );
    if outcome.is_success() {
        let mut response = Redirect::to("/dashboard").into_response();
        if let Some(cookie) = session_cookie(session.id(), false) {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
        response
    } else {
        (StatusCode::UNAUTHORIZED, outcome.public_message()).into_response()
    }
}

fn guarded(state: &TestState, chain: &GuardChain, headers: &HeaderMap, path: &str) -> Response {
    let ip = client_ip(headers);
    let mut session = state.session(headers);
    let mut ctx = RequestContext::new(&mut session, path).with_ip(ip.as_deref());
    let page = chain.protect(&mut ctx, |ctx| format!("hello {}", ctx.user().unwrap_or_default()));
    match page {
        Ok(body) => body.into_response(),
        Err(denial) => denial.into_response(),
    }
}

async fn dashboard(State(state): State<TestState>, headers: HeaderMap) -> Response {
    guarded(&state, &state.signed_in, &headers, "/dashboard")
}

async fn admin(State(state): State<TestState>, headers: HeaderMap) -> Response {
    guarded(&state, &state.admin_only, &headers, "/admin")
}

async fn logout(State(state): State<TestState>, headers: HeaderMap) -> Response {
    let ip = client_ip(&headers);
    let mut session = state.session(&headers);
    state.auth.logout_user(&mut session, ip.as_deref());
    let mut response = Redirect::to("/login").into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, clear_session_cookie());
    response
}

fn app() -> (Router, MemorySink) {
    let h = TestHarness::new().unwrap();
    let services = h.services();
    let state = TestState {
        auth: h.auth.clone(),
        users: Arc::new(h.users.clone()),
        registry: SessionRegistry::new(),
        screen: GuardChain::new(services.clone()).reject_suspicious_input(["username"]),
        signed_in: GuardChain::new(services.clone()).require_authentication(),
        admin_only: GuardChain::new(services)
            .require_authentication()
            .require_permission("admin"),
    };

    let router = Router::new()
        .route("/login", post(login))
        .route("/dashboard", get(dashboard))
        .route("/admin", get(admin))
        .route("/logout", get(logout))
        .with_state(state)
        .with_security(&SecurityConfig::builder().disable_tracing().build());
    (router, h.sink)
}

fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::post("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header("x-forwarded-for", "203.0.113.10")
        .body(Body::from(format!("username={username}&password={password}")))
        .unwrap()
}

fn get_with_cookie(path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(path);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// `name=value` part of the Set-Cookie header
fn cookie_pair(response: &Response) -> String {
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_login_dashboard_logout_flow() {
    let (app, sink) = app();

    let response = app.clone().oneshot(login_request("user", "user123%21")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/dashboard");
    let cookie = cookie_pair(&response);

    let response = app
        .clone()
        .oneshot(get_with_cookie("/dashboard", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(body_text(response).await, "hello user");

    let response = app
        .clone()
        .oneshot(get_with_cookie("/logout", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = app
        .oneshot(get_with_cookie("/dashboard", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");

    let logins = sink.events_of(LOGIN_ATTEMPT);
    assert_eq!(logins.len(), 1);
    assert_eq!(logins[0].ip.as_deref(), Some("203.0.113.10"));
    assert_eq!(sink.events_of(LOGOUT).len(), 1);
}

#[tokio::test]
async fn test_bad_credentials_are_generic() {
    let (app, _) = app();

    let wrong = app.clone().oneshot(login_request("user", "nope")).await.unwrap();
    let unknown = app.oneshot(login_request("ghost", "nope")).await.unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(wrong).await, body_text(unknown).await);
}

#[tokio::test]
async fn test_editor_is_forbidden_from_admin() {
    let (app, sink) = app();

    let response = app.clone().oneshot(login_request("user", "user123%21")).await.unwrap();
    let cookie = cookie_pair(&response);

    let response = app
        .oneshot(get_with_cookie("/admin", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_text(response).await;
    assert!(!body.contains("action"), "detail leaked: {body}");
    assert_eq!(sink.events_of(ACCESS_DENIED).len(), 1);
}

#[tokio::test]
async fn test_admin_reaches_admin_page() {
    let (app, _) = app();

    let response = app.clone().oneshot(login_request("admin", "admin123%21")).await.unwrap();
    let cookie = cookie_pair(&response);

    let response = app
        .oneshot(get_with_cookie("/admin", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_injection_in_username_is_rejected() {
    let (app, sink) = app();

    let response = app
        .oneshot(login_request("admin%27%20OR%201%3D1%20--", "x"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(sink.events_of(ANOMALY).len(), 1);
    assert!(sink.events_of(LOGIN_ATTEMPT).is_empty());
}

#[tokio::test]
async fn test_anonymous_is_redirected() {
    let (app, _) = app();
    let response = app.oneshot(get_with_cookie("/dashboard", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
}
