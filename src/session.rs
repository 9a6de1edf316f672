//! Session Records and Idle Timeout
//!
//! A session is the pair (username, last-activity timestamp) kept in a
//! caller-provided [`SessionStore`]. The authentication enforcer reads and
//! writes exactly those two fields; everything else about the session
//! (cookie, id, transport) belongs to the caller.
//!
//! Expiry is a sliding window. A session whose last activity is older than
//! the idle timeout is expired the next time it is checked; there is no
//! background timer.
//!
//! # Usage
//!
//! ```ignore
//! use warden::session::{SessionContext, SessionPolicy, SessionRecord, SessionStore};
//! use std::time::Duration;
//!
//! let policy = SessionPolicy::builder()
//!     .idle_timeout(Duration::from_secs(15 * 60))
//!     .build();
//!
//! let mut session = SessionContext::default();
//! session.store(SessionRecord::new("alice", chrono::Utc::now()));
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::observability::SecurityEvent;

// ============================================================================
// Session Policy
// ============================================================================

/// Session timeout policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Inactivity after which the session is terminated
    pub idle_timeout: Duration,
}

impl Default for SessionPolicy {
    /// 30 minute idle timeout
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl SessionPolicy {
    /// Create a new builder
    pub fn builder() -> SessionPolicyBuilder {
        SessionPolicyBuilder::default()
    }

    /// Policy derived from the crate configuration
    pub fn from_config(config: &crate::config::SecurityConfig) -> Self {
        Self {
            idle_timeout: config.session_timeout,
        }
    }

    /// Classify a stored record at time `now`.
    ///
    /// A timestamp in the future counts as zero idle time.
    pub fn evaluate(&self, record: Option<&SessionRecord>, now: DateTime<Utc>) -> SessionStatus {
        let Some(record) = record else {
            return SessionStatus::Missing;
        };
        let Some(last_activity) = record.last_activity() else {
            return SessionStatus::Corrupt;
        };

        let idle = now
            .signed_duration_since(last_activity)
            .to_std()
            .unwrap_or(Duration::ZERO);

        if idle > self.idle_timeout {
            SessionStatus::Expired
        } else {
            SessionStatus::Active
        }
    }
}

/// Builder for SessionPolicy
#[derive(Debug, Clone, Default)]
pub struct SessionPolicyBuilder {
    policy: SessionPolicy,
}

impl SessionPolicyBuilder {
    /// Set idle timeout
    pub fn idle_timeout(mut self, duration: Duration) -> Self {
        self.policy.idle_timeout = duration;
        self
    }

    /// Build the policy
    pub fn build(self) -> SessionPolicy {
        self.policy
    }
}

/// Result of checking a stored session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Record present and inside the idle window
    Active,
    /// No record in the store
    Missing,
    /// Idle longer than the timeout
    Expired,
    /// Timestamp absent or unparsable
    Corrupt,
}

impl SessionStatus {
    /// Whether the session counts as authenticated
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

// ============================================================================
// Session Record
// ============================================================================

/// The two fields kept per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Authenticated username
    pub username: String,
    /// Login / last-activity time, ISO-8601 UTC
    pub timestamp: String,
}

impl SessionRecord {
    /// Create a record stamped at `at`
    pub fn new(username: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            username: username.into(),
            timestamp: format_timestamp(at),
        }
    }

    /// Parsed last-activity time, `None` if the stored string is malformed
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Refresh the activity timestamp
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.timestamp = format_timestamp(now);
    }
}

/// Format a session timestamp (RFC 3339, microseconds, `Z` suffix)
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a session timestamp.
///
/// Accepts RFC 3339 with any offset, and offset-less ISO-8601 date-times,
/// which are read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Session Stores
// ============================================================================

/// Caller-provided storage scope for one client session.
pub trait SessionStore {
    /// Current record, if any
    fn load(&self) -> Option<SessionRecord>;
    /// Create or overwrite the record
    fn store(&mut self, record: SessionRecord);
    /// Remove the record; must be idempotent
    fn clear(&mut self);
}

/// Session scope held by value, e.g. deserialized from a signed cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    record: Option<SessionRecord>,
}

impl SessionContext {
    /// Context that already holds a record
    pub fn with_record(record: SessionRecord) -> Self {
        Self {
            record: Some(record),
        }
    }

    /// Borrow the record
    pub fn record(&self) -> Option<&SessionRecord> {
        self.record.as_ref()
    }
}

impl SessionStore for SessionContext {
    fn load(&self) -> Option<SessionRecord> {
        self.record.clone()
    }

    fn store(&mut self, record: SessionRecord) {
        self.record = Some(record);
    }

    fn clear(&mut self) {
        self.record = None;
    }
}

/// In-process server-side session table keyed by an opaque id.
///
/// Cheap to clone; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh random session id with no record yet
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Store scope for the given id
    pub fn handle(&self, id: impl Into<String>) -> RegistrySession {
        RegistrySession {
            id: id.into(),
            registry: self.clone(),
        }
    }

    /// Store scope under a freshly generated id
    pub fn open(&self) -> RegistrySession {
        self.handle(Self::new_session_id())
    }

    /// Copy of the record for `id`
    pub fn get(&self, id: &str) -> Option<SessionRecord> {
        self.sessions.read().get(id).cloned()
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// True if no sessions are stored
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drop every record the policy no longer considers active.
    ///
    /// Optional housekeeping; expiry is still enforced on access without it.
    pub fn purge_inactive(&self, policy: &SessionPolicy, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, record| policy.evaluate(Some(record), now).is_active());
        before - sessions.len()
    }
}

/// One session inside a [`SessionRegistry`].
#[derive(Debug, Clone)]
pub struct RegistrySession {
    id: String,
    registry: SessionRegistry,
}

impl RegistrySession {
    /// The session id (put this in the cookie)
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl SessionStore for RegistrySession {
    fn load(&self) -> Option<SessionRecord> {
        self.registry.get(&self.id)
    }

    fn store(&mut self, record: SessionRecord) {
        self.registry.sessions.write().insert(self.id.clone(), record);
    }

    fn clear(&mut self) {
        self.registry.sessions.write().remove(&self.id);
    }
}

// ============================================================================
// Session Termination
// ============================================================================

/// Reason a session record was destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTerminationReason {
    /// Idle timeout exceeded
    IdleTimeout,
    /// User requested logout
    UserLogout,
    /// Stored timestamp could not be parsed
    CorruptRecord,
}

impl SessionTerminationReason {
    /// Get a user-friendly message for this reason
    pub fn message(&self) -> &'static str {
        match self {
            Self::IdleTimeout => "Your session timed out due to inactivity. Please sign in again.",
            Self::UserLogout => "You have been signed out.",
            Self::CorruptRecord => "Your session is no longer valid. Please sign in again.",
        }
    }

    /// Get the reason as a string code
    pub fn code(&self) -> &'static str {
        match self {
            Self::IdleTimeout => "idle_timeout",
            Self::UserLogout => "user_logout",
            Self::CorruptRecord => "corrupt_record",
        }
    }
}

impl std::fmt::Display for SessionTerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Session Event Logging
// ============================================================================

/// Log session creation
pub fn log_session_created(username: &str) {
    crate::security_event!(
        SecurityEvent::SessionCreated,
        username = %username,
        "Session created"
    );
}

/// Log session termination
pub fn log_session_terminated(username: &str, reason: SessionTerminationReason) {
    if reason == SessionTerminationReason::CorruptRecord {
        crate::security_event!(
            SecurityEvent::SessionCorrupt,
            username = %username,
            reason = %reason.code(),
            "Session record malformed; session discarded"
        );
    } else {
        crate::security_event!(
            SecurityEvent::SessionDestroyed,
            username = %username,
            reason = %reason.code(),
            "Session terminated"
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
