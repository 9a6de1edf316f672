//! Security Testing Utilities
//!
//! Payload lists, assertion helpers and a ready-wired [`TestHarness`] for
//! exercising guarded applications in tests. Nothing here attacks anything;
//! the payloads are inputs your own code should escape or reject.
//!
//! # Usage
//!
//! ```ignore
//! use warden::testing::{sql_injection_payloads, TestHarness};
//!
//! let harness = TestHarness::new()?;
//! for payload in sql_injection_payloads() {
//!     assert!(InputValidator::detect_sql_injection(payload));
//! }
//! ```

use std::time::Duration;

use crate::audit::{AuditEvent, AuditLogger, MemorySink, LOGIN_ATTEMPT};
use crate::auth::{AuthenticationEnforcer, CredentialMap, LoginOutcome};
use crate::authz::AuthorizationEnforcer;
use crate::error::SecurityError;
use crate::guard::GuardServices;
use crate::login::LockoutPolicy;
use crate::password::{HashCost, PasswordHasher};
use crate::session::{SessionPolicy, SessionStore};

// ============================================================================
// Attack Payloads
// ============================================================================

/// SQL injection payloads the screening heuristic must flag
pub fn sql_injection_payloads() -> Vec<&'static str> {
    vec![
        // Tautologies
        "' OR '1'='1",
        "' OR 1=1--",
        "1 OR 1=1",
        "admin' or 'x'='x",
        // Union-based
        "' UNION SELECT NULL--",
        "1 UNION SELECT username, password FROM users",
        // Stacked queries
        "'; DROP TABLE users;--",
        "'; INSERT INTO users VALUES('x','y');--",
        "1; UPDATE accounts SET role='admin'",
        "1; DELETE FROM sessions",
        // Comments
        "admin'--",
        "admin'/*",
        "*/ OR 1=1",
        // Time-based blind
        "' AND SLEEP(5)--",
        "'; WAITFOR DELAY '0:0:5'--",
        // Server variables
        "SELECT @@version",
    ]
}

/// XSS payloads that must come out of HTML escaping inert
pub fn xss_payloads() -> Vec<&'static str> {
    vec![
        "<script>alert('xss')</script>",
        "<img src=x onerror=alert('xss')>",
        "<svg onload=alert(1)>",
        "\"><script>alert(1)</script>",
        "'><a href='javascript:alert(1)'>x</a>",
        "<iframe src=\"javascript:alert(1)\">",
    ]
}

/// Common weak passwords the password policy must reject
pub fn weak_passwords() -> Vec<&'static str> {
    vec![
        "password",
        "123456",
        "12345678",
        "qwerty",
        "abc123",
        "password1",
        "Password1",
        "admin",
        "letmein",
        "passw0rd",
        "P@ss1",
        "ALLUPPER1!",
        "alllower1!",
        "NoDigits!!",
    ]
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Whether `output` is a safe HTML rendering of `input`
pub fn is_html_sanitized(input: &str, output: &str) -> bool {
    if ['<', '>', '"', '\''].iter().any(|c| output.contains(*c)) {
        return false;
    }

    // Every ampersand must begin one of the entities we emit
    let entities = ["&amp;", "&lt;", "&gt;", "&quot;", "&#x27;"];
    let ampersands_ok = output
        .match_indices('&')
        .all(|(i, _)| entities.iter().any(|e| output[i..].starts_with(e)));

    ampersands_ok && !(input.contains('<') && output.to_lowercase().contains("<script"))
}

/// Result of a user enumeration check
#[derive(Debug, Clone)]
pub struct UserEnumerationResult {
    /// Whether the responses leak account existence
    pub vulnerable: bool,
    /// Specific issues found
    pub issues: Vec<String>,
}

/// Compare the failure for a known user with the failure for an unknown one.
///
/// Any difference in the message counts. Timing differences above
/// `tolerance` are reported too.
pub fn check_user_enumeration(
    known_user_message: &str,
    unknown_user_message: &str,
    known_user_timing: Duration,
    unknown_user_timing: Duration,
    tolerance: Duration,
) -> UserEnumerationResult {
    let mut issues = Vec::new();

    if known_user_message != unknown_user_message {
        issues.push(format!(
            "Different messages: {known_user_message:?} vs {unknown_user_message:?}"
        ));
    }

    let timing_diff = if known_user_timing > unknown_user_timing {
        known_user_timing - unknown_user_timing
    } else {
        unknown_user_timing - known_user_timing
    };
    if timing_diff > tolerance {
        issues.push(format!(
            "Timing difference of {:?} between known and unknown users",
            timing_diff
        ));
    }

    UserEnumerationResult {
        vulnerable: !issues.is_empty(),
        issues,
    }
}

// ============================================================================
// Test Harness
// ============================================================================

/// Enforcers wired to an in-memory audit trail with cheap hashing.
///
/// Accounts: `admin` / `admin123!` (role admin) and `user` / `user123!`
/// (role editor).
#[derive(Debug, Clone)]
pub struct TestHarness {
    /// Authentication enforcer
    pub auth: AuthenticationEnforcer,
    /// Authorization enforcer (shares the audit trail)
    pub authz: AuthorizationEnforcer,
    /// Audit logger
    pub audit: AuditLogger,
    /// Where audit lines land
    pub sink: MemorySink,
    /// Credential store with the two demo accounts
    pub users: CredentialMap,
    hasher: PasswordHasher,
}

impl TestHarness {
    /// Harness with default session and lockout policies
    pub fn new() -> Result<Self, SecurityError> {
        Self::with_policies(SessionPolicy::default(), LockoutPolicy::default())
    }

    /// Harness with explicit policies
    pub fn with_policies(
        sessions: SessionPolicy,
        lockout: LockoutPolicy,
    ) -> Result<Self, SecurityError> {
        let (audit, sink) = AuditLogger::in_memory();
        let hasher = PasswordHasher::with_cost(HashCost::minimal())?;

        let auth = AuthenticationEnforcer::builder(audit.clone())
            .hasher(hasher.clone())
            .session_policy(sessions)
            .lockout_policy(lockout)
            .build();
        let authz = AuthorizationEnforcer::new().with_audit(audit.clone());

        let mut users = CredentialMap::new();
        users.insert_password(&hasher, "admin", "admin123!")?;
        users.insert_password(&hasher, "user", "user123!")?;

        Ok(Self {
            auth,
            authz,
            audit,
            sink,
            users,
            hasher,
        })
    }

    /// Register another account
    pub fn add_user(&mut self, username: &str, password: &str) -> Result<(), SecurityError> {
        self.users.insert_password(&self.hasher, username, password)?;
        Ok(())
    }

    /// Guard services over this harness' enforcers
    pub fn services(&self) -> GuardServices {
        GuardServices::new(self.auth.clone(), self.authz.clone())
    }

    /// Attempt a login against the harness' credential store
    pub fn login<S: SessionStore + ?Sized>(
        &self,
        session: &mut S,
        username: &str,
        password: &str,
    ) -> LoginOutcome {
        self.auth
            .attempt_login(session, &self.users, username, password, None)
    }

    /// Audited login attempts so far
    pub fn login_events(&self) -> Vec<AuditEvent> {
        self.sink.events_of(LOGIN_ATTEMPT)
    }
}
