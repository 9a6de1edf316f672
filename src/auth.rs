//! Authentication and Session Lifecycle
//!
//! [`AuthenticationEnforcer`] owns the login decision:
//!
//! 1. A locked account fails immediately; the credential store is not read.
//!    Attempts still being verified count toward the threshold, so
//!    concurrent guesses cannot overshoot it.
//! 2. The stored hash is looked up and the password verified. An unknown
//!    username and a wrong password are the same failure and both count
//!    toward lockout.
//! 3. On success the failure record is cleared and the session record is
//!    created (or overwritten) with the username and the current time.
//!
//! Every attempt produces exactly one `LOGIN_ATTEMPT` audit event.
//!
//! Session checks slide the window: a valid session's timestamp is
//! refreshed on each check, an idle or malformed one is destroyed.
//!
//! Ordinary outcomes (bad password, lockout, expired session) are values,
//! never errors. The user-facing text for every failed login is the same.
//!
//! # Usage
//!
//! ```ignore
//! use warden::auth::{AuthenticationEnforcer, CredentialMap, LoginOutcome};
//! use warden::session::SessionContext;
//!
//! let auth = AuthenticationEnforcer::new(audit);
//! let mut users = CredentialMap::new();
//! users.insert_hash("admin", auth.hash_password("admin123!")?);
//!
//! let mut session = SessionContext::default();
//! match auth.attempt_login(&mut session, &users, "admin", "admin123!", Some(ip)) {
//!     LoginOutcome::Authenticated => { /* redirect to dashboard */ }
//!     other => { /* show other.public_message() */ }
//! }
//!
//! assert!(auth.is_authenticated(&mut session));
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::alerting::{alert_account_locked, alert_credential_store_unavailable, AlertManager};
use crate::audit::AuditLogger;
use crate::config::SecurityConfig;
use crate::error::SecurityError;
use crate::login::{LockoutPolicy, LoginTracker};
use crate::observability::SecurityEvent;
use crate::password::PasswordHasher;
use crate::session::{
    log_session_created, log_session_terminated, SessionPolicy, SessionRecord, SessionStatus,
    SessionStore, SessionTerminationReason,
};

/// Text shown to the user for every unsuccessful login
pub const LOGIN_FAILED_MESSAGE: &str = "Invalid username or password.";

// ============================================================================
// Credential Store
// ============================================================================

/// Read access to username → password hash.
///
/// Only single-username lookups are needed; the store is never iterated.
pub trait CredentialStore {
    /// Stored PHC hash for `username`, `Ok(None)` if unknown.
    ///
    /// `Err` means the lookup itself failed (store offline).
    fn password_hash(&self, username: &str) -> Result<Option<String>, SecurityError>;
}

impl CredentialStore for HashMap<String, String> {
    fn password_hash(&self, username: &str) -> Result<Option<String>, SecurityError> {
        Ok(self.get(username).cloned())
    }
}

impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    fn password_hash(&self, username: &str) -> Result<Option<String>, SecurityError> {
        (**self).password_hash(username)
    }
}

impl<T: CredentialStore + ?Sized> CredentialStore for &T {
    fn password_hash(&self, username: &str) -> Result<Option<String>, SecurityError> {
        (**self).password_hash(username)
    }
}

/// In-memory credential table
#[derive(Debug, Clone, Default)]
pub struct CredentialMap {
    hashes: HashMap<String, String>,
}

impl CredentialMap {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an existing hash
    pub fn insert_hash(&mut self, username: impl Into<String>, hash: impl Into<String>) {
        self.hashes.insert(username.into(), hash.into());
    }

    /// Hash `password` and store it
    pub fn insert_password(
        &mut self,
        hasher: &PasswordHasher,
        username: impl Into<String>,
        password: &str,
    ) -> Result<(), SecurityError> {
        let hash = hasher.hash(password)?;
        self.hashes.insert(username.into(), hash);
        Ok(())
    }

    /// Number of users
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl CredentialStore for CredentialMap {
    fn password_hash(&self, username: &str) -> Result<Option<String>, SecurityError> {
        Ok(self.hashes.get(username).cloned())
    }
}

// ============================================================================
// Login Outcome
// ============================================================================

/// Result of a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Credentials verified, session record written
    Authenticated,
    /// Unknown username or wrong password
    InvalidCredentials,
    /// Account locked; the credential store was not consulted
    Locked {
        /// Time until the lockout lifts
        retry_after: Duration,
    },
    /// The credential store could not be read
    Unavailable,
}

impl LoginOutcome {
    /// Whether the user is now logged in
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Text safe to show the user. Identical for every failure.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Authenticated => "Signed in.",
            _ => LOGIN_FAILED_MESSAGE,
        }
    }
}

// ============================================================================
// Authentication Enforcer
// ============================================================================

/// Login, lockout and session-validity decisions.
///
/// Cheap to clone; clones share the lockout table and audit writer.
#[derive(Debug, Clone)]
pub struct AuthenticationEnforcer {
    hasher: PasswordHasher,
    sessions: SessionPolicy,
    tracker: LoginTracker,
    audit: AuditLogger,
    alerts: Option<AlertManager>,
}

impl AuthenticationEnforcer {
    /// Enforcer with default hashing cost, 30 minute sessions and
    /// 5 failures / 10 minute lockout
    pub fn new(audit: AuditLogger) -> Self {
        Self::builder(audit).build()
    }

    /// Create a builder
    pub fn builder(audit: AuditLogger) -> AuthenticationEnforcerBuilder {
        AuthenticationEnforcerBuilder {
            hasher: PasswordHasher::default(),
            sessions: SessionPolicy::default(),
            lockout: LockoutPolicy::default(),
            audit,
            alerts: None,
        }
    }

    /// Enforcer with every policy taken from the configuration
    pub fn from_config(
        config: &SecurityConfig,
        audit: AuditLogger,
        alerts: Option<AlertManager>,
    ) -> Result<Self, SecurityError> {
        let mut builder = Self::builder(audit)
            .hasher(PasswordHasher::from_config(config)?)
            .session_policy(SessionPolicy::from_config(config))
            .lockout_policy(LockoutPolicy::from_config(config));
        if let Some(alerts) = alerts {
            builder = builder.alerts(alerts);
        }
        Ok(builder.build())
    }

    /// Session policy in force
    pub fn session_policy(&self) -> &SessionPolicy {
        &self.sessions
    }

    /// Failed-login tracker
    pub fn tracker(&self) -> &LoginTracker {
        &self.tracker
    }

    /// Audit logger
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    // ------------------------------------------------------------------------
    // Passwords
    // ------------------------------------------------------------------------

    /// Salted hash of `password`; different on every call
    pub fn hash_password(&self, password: &str) -> Result<String, SecurityError> {
        Ok(self.hasher.hash(password)?)
    }

    /// [`hash_password`](Self::hash_password) on the blocking pool
    pub async fn hash_password_async(&self, password: String) -> Result<String, SecurityError> {
        Ok(self.hasher.hash_async(password).await?)
    }

    /// Check `password` against a stored hash. Malformed hashes give `false`.
    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        self.hasher.verify(password, hash)
    }

    // ------------------------------------------------------------------------
    // Login
    // ------------------------------------------------------------------------

    /// Boolean login: true only when the session record was written
    pub fn login_user<S, C>(
        &self,
        session: &mut S,
        credentials: &C,
        username: &str,
        password: &str,
        ip: Option<&str>,
    ) -> bool
    where
        S: SessionStore + ?Sized,
        C: CredentialStore + ?Sized,
    {
        self.attempt_login(session, credentials, username, password, ip)
            .is_success()
    }

    /// Login with the reason for failure
    pub fn attempt_login<S, C>(
        &self,
        session: &mut S,
        credentials: &C,
        username: &str,
        password: &str,
        ip: Option<&str>,
    ) -> LoginOutcome
    where
        S: SessionStore + ?Sized,
        C: CredentialStore + ?Sized,
    {
        self.attempt_login_at(session, credentials, username, password, ip, Utc::now())
    }

    /// Login evaluated at `now`
    pub fn attempt_login_at<S, C>(
        &self,
        session: &mut S,
        credentials: &C,
        username: &str,
        password: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> LoginOutcome
    where
        S: SessionStore + ?Sized,
        C: CredentialStore + ?Sized,
    {
        let attempt = match self.tracker.begin_attempt_at(username, now) {
            Ok(attempt) => attempt,
            Err(lockout) => {
                let retry_after = lockout.remaining(now);
                crate::security_event!(
                    SecurityEvent::LockedAccountAttempt,
                    username = %username,
                    ip_address = %ip.unwrap_or("unknown"),
                    retry_after_secs = retry_after.as_secs(),
                    "Login refused: account locked"
                );
                self.audit.login_attempt(username, ip, false, true);
                return LoginOutcome::Locked { retry_after };
            }
        };

        let stored = match credentials.password_hash(username) {
            Ok(stored) => stored,
            Err(e) => {
                crate::security_event!(
                    SecurityEvent::CredentialStoreUnavailable,
                    username = %username,
                    error = %e,
                    "Credential store lookup failed"
                );
                attempt.release();
                if let Some(alerts) = &self.alerts {
                    alert_credential_store_unavailable(&e.to_string(), alerts);
                }
                self.audit.login_attempt(username, ip, false, false);
                return LoginOutcome::Unavailable;
            }
        };

        let verified = match stored.as_deref() {
            Some(hash) => self.hasher.verify(password, hash),
            None => self.hasher.verify_missing(password),
        };

        if !verified {
            let result = attempt.fail_at(now);
            if result.newly_locked {
                if let Some(alerts) = &self.alerts {
                    alert_account_locked(username, result.failed_count, alerts);
                }
            }
            self.audit.login_attempt(username, ip, false, false);
            return LoginOutcome::InvalidCredentials;
        }

        attempt.succeed();
        session.store(SessionRecord::new(username, now));

        crate::security_event!(
            SecurityEvent::AuthenticationSuccess,
            username = %username,
            ip_address = %ip.unwrap_or("unknown"),
            "Login succeeded"
        );
        log_session_created(username);
        self.audit.login_attempt(username, ip, true, false);

        LoginOutcome::Authenticated
    }

    // ------------------------------------------------------------------------
    // Session Checks
    // ------------------------------------------------------------------------

    /// Whether the session is authenticated; refreshes it if so
    pub fn is_authenticated<S: SessionStore + ?Sized>(&self, session: &mut S) -> bool {
        self.is_authenticated_at(session, Utc::now())
    }

    /// [`is_authenticated`](Self::is_authenticated) evaluated at `now`
    pub fn is_authenticated_at<S: SessionStore + ?Sized>(
        &self,
        session: &mut S,
        now: DateTime<Utc>,
    ) -> bool {
        self.session_status_at(session, now).is_active()
    }

    /// Classify the session and apply the consequence
    pub fn session_status<S: SessionStore + ?Sized>(&self, session: &mut S) -> SessionStatus {
        self.session_status_at(session, Utc::now())
    }

    /// Classify the session at `now`.
    ///
    /// - `Active`: timestamp refreshed to `now`
    /// - `Expired`: record destroyed
    /// - `Corrupt`: record destroyed, `ANOMALY` audited
    /// - `Missing`: nothing to do
    pub fn session_status_at<S: SessionStore + ?Sized>(
        &self,
        session: &mut S,
        now: DateTime<Utc>,
    ) -> SessionStatus {
        let record = session.load();
        let status = self.sessions.evaluate(record.as_ref(), now);

        match (status, record) {
            (SessionStatus::Active, Some(mut record)) => {
                record.touch(now);
                session.store(record);
            }
            (SessionStatus::Expired, Some(record)) => {
                session.clear();
                log_session_terminated(&record.username, SessionTerminationReason::IdleTimeout);
            }
            (SessionStatus::Corrupt, Some(record)) => {
                session.clear();
                log_session_terminated(&record.username, SessionTerminationReason::CorruptRecord);
                let mut data = serde_json::Map::new();
                data.insert("timestamp".to_string(), record.timestamp.clone().into());
                self.audit
                    .anomaly(Some(&record.username), None, "corrupt_session", data);
            }
            _ => {}
        }

        status
    }

    /// Username of an authenticated session (refreshes it)
    pub fn current_user<S: SessionStore + ?Sized>(&self, session: &mut S) -> Option<String> {
        self.current_user_at(session, Utc::now())
    }

    /// [`current_user`](Self::current_user) evaluated at `now`
    pub fn current_user_at<S: SessionStore + ?Sized>(
        &self,
        session: &mut S,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if self.session_status_at(session, now).is_active() {
            session.load().map(|record| record.username)
        } else {
            None
        }
    }

    // ------------------------------------------------------------------------
    // Logout and Admin
    // ------------------------------------------------------------------------

    /// Destroy the session record. Idempotent; `LOGOUT` is audited only
    /// when a record existed.
    pub fn logout_user<S: SessionStore + ?Sized>(&self, session: &mut S, ip: Option<&str>) {
        let record = session.load();
        session.clear();

        if let Some(record) = record {
            crate::security_event!(
                SecurityEvent::Logout,
                username = %record.username,
                "User logged out"
            );
            log_session_terminated(&record.username, SessionTerminationReason::UserLogout);
            self.audit.logout(&record.username, ip);
        }
    }

    /// Clear a lockout. Returns whether a failure record existed.
    pub fn unlock(&self, username: &str) -> bool {
        self.tracker.unlock(username)
    }
}

/// Builder for [`AuthenticationEnforcer`]
#[derive(Debug)]
pub struct AuthenticationEnforcerBuilder {
    hasher: PasswordHasher,
    sessions: SessionPolicy,
    lockout: LockoutPolicy,
    audit: AuditLogger,
    alerts: Option<AlertManager>,
}

impl AuthenticationEnforcerBuilder {
    /// Set the password hasher
    pub fn hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Set the session policy
    pub fn session_policy(mut self, policy: SessionPolicy) -> Self {
        self.sessions = policy;
        self
    }

    /// Set the lockout policy
    pub fn lockout_policy(mut self, policy: LockoutPolicy) -> Self {
        self.lockout = policy;
        self
    }

    /// Send lockout and store-failure alerts
    pub fn alerts(mut self, alerts: AlertManager) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Build the enforcer
    pub fn build(self) -> AuthenticationEnforcer {
        AuthenticationEnforcer {
            hasher: self.hasher,
            sessions: self.sessions,
            tracker: LoginTracker::new(self.lockout),
            audit: self.audit,
            alerts: self.alerts,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
