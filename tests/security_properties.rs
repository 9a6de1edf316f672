//! End-to-end behavior of the enforcers through the public API.

use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use warden::audit::{AuditSeverity, ACCESS_DENIED, ANOMALY, LOGOUT, PERMISSION_CHANGE};
use warden::auth::{LoginOutcome, LOGIN_FAILED_MESSAGE};
use warden::guard::{Denial, GuardChain, RequestContext};
use warden::session::{SessionContext, SessionRecord, SessionStatus, SessionStore};
use warden::testing::{check_user_enumeration, TestHarness};
use warden::validation::InputValidator;

fn harness() -> TestHarness {
    TestHarness::new().unwrap()
}

// ============================================================================
// Authentication
// ============================================================================

#[test]
fn test_valid_login_establishes_session() {
    let h = harness();
    for (name, password) in [("admin", "admin123!"), ("user", "user123!")] {
        let mut session = SessionContext::default();
        assert!(h
            .auth
            .login_user(&mut session, &h.users, name, password, Some("127.0.0.1")));
        assert!(h.auth.is_authenticated(&mut session));
        assert_eq!(h.auth.current_user(&mut session).as_deref(), Some(name));
    }
}

#[test]
fn test_failures_share_one_public_message() {
    let h = harness();
    let mut session = SessionContext::default();

    let wrong_password = h.login(&mut session, "admin", "nope");
    let unknown_user = h.login(&mut session, "ghost", "nope");
    assert_eq!(wrong_password, LoginOutcome::InvalidCredentials);
    assert_eq!(unknown_user, LoginOutcome::InvalidCredentials);
    assert_eq!(wrong_password.public_message(), LOGIN_FAILED_MESSAGE);
    assert_eq!(unknown_user.public_message(), LOGIN_FAILED_MESSAGE);
    assert!(session.load().is_none());
}

#[test]
fn test_unknown_user_costs_a_hash() {
    let h = harness();
    let mut session = SessionContext::default();
    // Warm the decoy hash
    h.login(&mut session, "nobody", "x");

    let start = Instant::now();
    let known = h.login(&mut session, "admin", "wrong-password");
    let known_time = start.elapsed();

    let start = Instant::now();
    let unknown = h.login(&mut session, "ghost", "wrong-password");
    let unknown_time = start.elapsed();

    let result = check_user_enumeration(
        known.public_message(),
        unknown.public_message(),
        known_time,
        unknown_time,
        std::time::Duration::from_millis(250),
    );
    assert!(!result.vulnerable, "{:?}", result.issues);
}

#[test]
fn test_lockout_after_five_failures_then_recovery() {
    let h = harness();
    let start = Utc::now();
    let mut session = SessionContext::default();

    for i in 0..5 {
        let at = start + ChronoDuration::seconds(i);
        let outcome =
            h.auth
                .attempt_login_at(&mut session, &h.users, "user", "bad", None, at);
        assert_eq!(outcome, LoginOutcome::InvalidCredentials);
    }

    // Correct password is refused while locked
    let at = start + ChronoDuration::seconds(10);
    let outcome =
        h.auth
            .attempt_login_at(&mut session, &h.users, "user", "user123!", None, at);
    assert!(matches!(outcome, LoginOutcome::Locked { .. }));
    assert_eq!(outcome.public_message(), LOGIN_FAILED_MESSAGE);
    assert!(session.load().is_none());

    // Other accounts are unaffected
    let outcome =
        h.auth
            .attempt_login_at(&mut session, &h.users, "admin", "admin123!", None, at);
    assert!(outcome.is_success());
    session.clear();

    // Window measured from the last failure (t+4s)
    let after = start + ChronoDuration::seconds(4) + ChronoDuration::minutes(10);
    let outcome =
        h.auth
            .attempt_login_at(&mut session, &h.users, "user", "user123!", None, after);
    assert!(outcome.is_success());
}

#[test]
fn test_each_login_audits_once_with_severity() {
    let h = harness();
    let start = Utc::now();
    let mut session = SessionContext::default();

    h.auth
        .attempt_login_at(&mut session, &h.users, "admin", "admin123!", None, start);
    for i in 1..=5 {
        let at = start + ChronoDuration::seconds(i);
        h.auth
            .attempt_login_at(&mut session, &h.users, "user", "bad", None, at);
    }
    let at = start + ChronoDuration::seconds(6);
    h.auth
        .attempt_login_at(&mut session, &h.users, "user", "user123!", None, at);

    let events = h.login_events();
    assert_eq!(events.len(), 7);
    assert_eq!(events[0].severity, AuditSeverity::Info);
    assert_eq!(events[0].details["success"], json!(true));
    for event in &events[1..6] {
        assert_eq!(event.severity, AuditSeverity::Warning);
        assert_eq!(event.details["locked"], json!(false));
    }
    assert_eq!(events[6].severity, AuditSeverity::Error);
    assert_eq!(events[6].details["locked"], json!(true));
}

// ============================================================================
// Sessions
// ============================================================================

#[test]
fn test_idle_session_expires_and_is_cleared() {
    let h = harness();
    let login_at = Utc::now() - ChronoDuration::minutes(31);
    let mut session = SessionContext::with_record(SessionRecord::new("user", login_at));

    assert!(!h.auth.is_authenticated(&mut session));
    assert!(session.load().is_none());
}

#[test]
fn test_activity_slides_the_window() {
    let h = harness();
    let start = Utc::now();
    let mut session = SessionContext::with_record(SessionRecord::new("user", start));

    // Each check within 30 minutes of the previous one keeps the session
    for step in 1..=4 {
        let at = start + ChronoDuration::minutes(25 * step);
        assert!(h.auth.is_authenticated_at(&mut session, at));
    }
    let idle = start + ChronoDuration::minutes(100 + 31);
    assert_eq!(h.auth.session_status_at(&mut session, idle), SessionStatus::Expired);
}

#[test]
fn test_malformed_timestamp_is_not_authenticated() {
    let h = harness();
    let mut session = SessionContext::with_record(SessionRecord {
        username: "user".to_string(),
        timestamp: "yesterday-ish".to_string(),
    });

    assert!(!h.auth.is_authenticated(&mut session));
    assert!(session.load().is_none());
    let anomalies = h.sink.events_of(ANOMALY);
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].details["kind"], json!("corrupt_session"));
}

#[test]
fn test_logout_is_idempotent() {
    let h = harness();
    let mut session = SessionContext::default();
    assert!(h.login(&mut session, "user", "user123!").is_success());

    h.auth.logout_user(&mut session, None);
    h.auth.logout_user(&mut session, None);
    assert!(!h.auth.is_authenticated(&mut session));
    assert_eq!(h.sink.events_of(LOGOUT).len(), 1);
}

// ============================================================================
// Authorization
// ============================================================================

#[test]
fn test_role_table_decisions() {
    let h = harness();
    assert!(h.authz.can_access("admin", "admin"));
    assert!(!h.authz.can_access("user", "admin"));
    assert!(h.authz.can_access("user", "write"));
    assert!(h.authz.can_access("unknown_user", "read"));
    assert!(!h.authz.can_access("unknown_user", "admin"));
    assert!(!h.authz.can_access("unknown_user", "launch_missiles"));
}

#[test]
fn test_role_change_is_audited_and_applied() {
    let h = harness();
    assert!(!h.authz.can_access("carol", "write"));

    let before = h
        .authz
        .change_role("admin", "carol", "editor", Some("10.0.0.5"))
        .unwrap();
    assert_eq!(before, "viewer");
    assert!(h.authz.can_access("carol", "write"));

    let changes = h.sink.events_of(PERMISSION_CHANGE);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].user, "admin");
    assert_eq!(changes[0].details["target"], json!("carol"));

    // Non-admins cannot change roles
    assert!(h.authz.change_role("user", "carol", "admin", None).is_err());
    assert!(!h.authz.can_access("carol", "admin"));
}

#[test]
fn test_guard_chain_orders_decisions() {
    let h = harness();
    let chain = GuardChain::new(h.services())
        .reject_suspicious_input(["q"])
        .require_authentication()
        .require_permission("admin");

    // Anonymous: redirected
    let mut anon = SessionContext::default();
    let mut ctx = RequestContext::new(&mut anon, "/admin");
    assert!(matches!(
        chain.protect(&mut ctx, |_| ()),
        Err(Denial::AuthenticationRequired { .. })
    ));

    // Editor: forbidden and audited
    let mut editor = SessionContext::default();
    assert!(h.login(&mut editor, "user", "user123!").is_success());
    let mut ctx = RequestContext::new(&mut editor, "/admin").with_ip(Some("10.9.9.9"));
    assert!(matches!(
        chain.protect(&mut ctx, |_| ()),
        Err(Denial::Forbidden { .. })
    ));
    assert_eq!(h.sink.events_of(ACCESS_DENIED).len(), 1);

    // Admin with hostile input: rejected before authorization
    let mut admin = SessionContext::default();
    assert!(h.login(&mut admin, "admin", "admin123!").is_success());
    let mut ctx = RequestContext::new(&mut admin, "/admin").with_input("q", "1 UNION SELECT 1");
    assert!(matches!(
        chain.protect(&mut ctx, |_| ()),
        Err(Denial::InvalidInput { .. })
    ));

    // Admin with clean input: allowed
    let mut ctx = RequestContext::new(&mut admin, "/admin").with_input("q", "reports");
    let user = chain.protect(&mut ctx, |ctx| ctx.user().map(str::to_owned));
    assert_eq!(user, Ok(Some("admin".to_string())));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_validators() {
    assert!(InputValidator::validate_password("Abc123!@"));
    assert!(!InputValidator::validate_password("abc123"));
    assert!(InputValidator::detect_sql_injection("admin' OR 1=1 --"));
    assert!(!InputValidator::detect_sql_injection("normal_user42"));

    let escaped = InputValidator::sanitize_html("<script>");
    assert!(!escaped.contains('<') && !escaped.contains('>'));
}
