//! Failed Login Tracking and Account Lockout
//!
//! Counts consecutive failed logins per username. An account with at least
//! `max_attempts` failures whose most recent failure is younger than
//! `lockout_window` is locked.
//!
//! Expiry is lazy: a record whose last failure is `lockout_window` old or
//! older is discarded the next time it is looked at, so the account unlocks
//! without any background task. A new failure after the window starts a
//! fresh count.
//!
//! # Concurrent Attempts
//!
//! Records live in memory behind a single mutex. An attempt takes a slot
//! with [`LoginTracker::begin_attempt`] before the credentials are read,
//! and the slot counts against the threshold until the returned
//! [`LoginAttempt`] is settled. With four failures on record and a
//! threshold of five, only one of any number of simultaneous guesses gets
//! as far as password verification. A dropped attempt gives its slot back
//! without counting as a failure.
//!
//! # Usage
//!
//! ```ignore
//! use warden::login::{LoginTracker, LockoutPolicy};
//!
//! let tracker = LoginTracker::new(LockoutPolicy::default()); // 5 failures / 10 min
//!
//! let attempt = match tracker.begin_attempt("alice") {
//!     Ok(attempt) => attempt,
//!     Err(lockout) => return refuse(lockout), // credential store untouched
//! };
//!
//! // after verifying the password...
//! if ok {
//!     attempt.succeed();
//! } else {
//!     let result = attempt.fail();
//!     if result.newly_locked { /* alert */ }
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::observability::SecurityEvent;

// ============================================================================
// Lockout Policy
// ============================================================================

/// Lockout policy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that lock the account
    pub max_attempts: u32,

    /// How long after the last failure the account stays locked,
    /// and how long a partial count is remembered
    pub lockout_window: Duration,
}

impl Default for LockoutPolicy {
    /// 5 failed attempts, 10 minute window
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_window: Duration::from_secs(10 * 60),
        }
    }
}

impl LockoutPolicy {
    /// Create a new builder
    pub fn builder() -> LockoutPolicyBuilder {
        LockoutPolicyBuilder::default()
    }

    /// Policy derived from the crate configuration
    pub fn from_config(config: &crate::config::SecurityConfig) -> Self {
        Self {
            max_attempts: config.lockout_threshold,
            lockout_window: config.lockout_window,
        }
    }
}

/// Builder for LockoutPolicy
#[derive(Debug, Clone, Default)]
pub struct LockoutPolicyBuilder {
    policy: LockoutPolicy,
}

impl LockoutPolicyBuilder {
    /// Set failures before lockout
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Set the lockout window
    pub fn lockout_window(mut self, duration: Duration) -> Self {
        self.policy.lockout_window = duration;
        self
    }

    /// Build the policy
    pub fn build(self) -> LockoutPolicy {
        self.policy
    }
}

// ============================================================================
// Attempt Records
// ============================================================================

/// Failed-attempt state for one username
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// Consecutive failures
    pub failures: u32,
    /// Attempts admitted but not yet settled
    pub in_flight: u32,
    /// Time of the most recent failure
    pub last_failure: DateTime<Utc>,
}

impl AttemptRecord {
    /// Time since the last failure; zero if it lies in the future
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.last_failure)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Whether the record has aged out of the window
    pub fn is_expired(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) >= window
    }

    /// Whether this record locks the account
    pub fn is_locked(&self, policy: &LockoutPolicy, now: DateTime<Utc>) -> bool {
        self.failures >= policy.max_attempts && !self.is_expired(policy.lockout_window, now)
    }
}

/// Result of recording a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptResult {
    /// Consecutive failures including this one
    pub failed_count: u32,
    /// Failures left before lockout
    pub remaining_attempts: u32,
    /// Whether the account is locked after this failure
    pub is_locked_out: bool,
    /// Whether this failure is the one that locked it
    pub newly_locked: bool,
}

/// Details of an active lockout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutInfo {
    /// Failures on record
    pub failures: u32,
    /// Time of the most recent failure
    pub last_failure: DateTime<Utc>,
    /// Window measured from `last_failure`
    pub window: Duration,
}

impl LockoutInfo {
    /// Time until the lockout lifts
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let elapsed = now
            .signed_duration_since(self.last_failure)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.window.saturating_sub(elapsed)
    }

    /// Remaining lockout in whole seconds
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        self.remaining(now).as_secs()
    }
}

// ============================================================================
// Login Tracker
// ============================================================================

/// In-memory failed-login tracker.
///
/// Cheap to clone; clones share the same table.
#[derive(Debug, Clone)]
pub struct LoginTracker {
    policy: LockoutPolicy,
    records: Arc<Mutex<HashMap<String, AttemptRecord>>>,
}

impl Default for LoginTracker {
    fn default() -> Self {
        Self::new(LockoutPolicy::default())
    }
}

impl LoginTracker {
    /// Create a new tracker with the given policy
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy,
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The active policy
    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Check whether `username` is locked right now
    pub fn check_lockout(&self, username: &str) -> Option<LockoutInfo> {
        self.check_lockout_at(username, Utc::now())
    }

    /// Check whether `username` is locked at `now`.
    ///
    /// An aged-out record is removed as a side effect.
    pub fn check_lockout_at(&self, username: &str, now: DateTime<Utc>) -> Option<LockoutInfo> {
        let mut records = self.records.lock();
        let record = records.get_mut(username)?;

        if record.is_expired(self.policy.lockout_window, now) {
            if record.in_flight == 0 {
                records.remove(username);
            } else {
                record.failures = 0;
            }
            return None;
        }

        record.is_locked(&self.policy, now).then(|| LockoutInfo {
            failures: record.failures,
            last_failure: record.last_failure,
            window: self.policy.lockout_window,
        })
    }

    /// Admit a login attempt now
    pub fn begin_attempt(&self, username: &str) -> Result<LoginAttempt, LockoutInfo> {
        self.begin_attempt_at(username, Utc::now())
    }

    /// Admit a login attempt at `now`, reserving one slot under the threshold.
    ///
    /// Refused when failures on record plus attempts still in flight have
    /// reached `max_attempts`.
    pub fn begin_attempt_at(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginAttempt, LockoutInfo> {
        let window = self.policy.lockout_window;
        let mut records = self.records.lock();
        let record = records
            .entry(username.to_string())
            .or_insert(AttemptRecord {
                failures: 0,
                in_flight: 0,
                last_failure: now,
            });

        if record.is_expired(window, now) {
            record.failures = 0;
        }

        if record.failures.saturating_add(record.in_flight) >= self.policy.max_attempts {
            let info = LockoutInfo {
                failures: record.failures,
                last_failure: record.last_failure,
                window,
            };
            if record.failures == 0 && record.in_flight == 0 {
                records.remove(username);
            }
            return Err(info);
        }

        record.in_flight += 1;
        Ok(LoginAttempt {
            tracker: self.clone(),
            username: username.to_string(),
            settled: false,
        })
    }

    /// Record a failed login attempt now
    pub fn record_failure(&self, username: &str) -> AttemptResult {
        self.record_failure_at(username, Utc::now())
    }

    /// Record a failed login attempt at `now`
    pub fn record_failure_at(&self, username: &str, now: DateTime<Utc>) -> AttemptResult {
        self.apply_failure(username, now, false)
    }

    fn apply_failure(&self, username: &str, now: DateTime<Utc>, settles: bool) -> AttemptResult {
        let max = self.policy.max_attempts;
        let window = self.policy.lockout_window;

        let (failed_count, was_locked) = {
            let mut records = self.records.lock();
            let record = records
                .entry(username.to_string())
                .or_insert(AttemptRecord {
                    failures: 0,
                    in_flight: 0,
                    last_failure: now,
                });

            if settles {
                record.in_flight = record.in_flight.saturating_sub(1);
            }
            if record.is_expired(window, now) {
                record.failures = 0;
            }
            let was_locked = record.is_locked(&self.policy, now);

            record.failures = record.failures.saturating_add(1);
            record.last_failure = now;

            (record.failures, was_locked)
        };

        let is_locked_out = failed_count >= max;
        let newly_locked = is_locked_out && !was_locked;
        let remaining = max.saturating_sub(failed_count);

        log_login_failure(username, failed_count, remaining);
        if newly_locked {
            log_account_locked(username, failed_count, window);
        }

        AttemptResult {
            failed_count,
            remaining_attempts: remaining,
            is_locked_out,
            newly_locked,
        }
    }

    /// Clear the failure record after a successful login
    pub fn record_success(&self, username: &str) {
        self.clear_failures(username, false);
    }

    fn clear_failures(&self, username: &str, settles: bool) {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(username) {
            if settles {
                record.in_flight = record.in_flight.saturating_sub(1);
            }
            record.failures = 0;
            if record.in_flight == 0 {
                records.remove(username);
            }
        }
    }

    fn release(&self, username: &str) {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(username) {
            record.in_flight = record.in_flight.saturating_sub(1);
            if record.failures == 0 && record.in_flight == 0 {
                records.remove(username);
            }
        }
    }

    /// Manually unlock a username (admin action).
    ///
    /// Returns whether a record existed.
    pub fn unlock(&self, username: &str) -> bool {
        let removed = self.records.lock().remove(username).is_some();
        if removed {
            log_account_unlocked(username);
        }
        removed
    }

    /// Copy of the record for a username (for admin/debugging)
    pub fn attempt_info(&self, username: &str) -> Option<AttemptRecord> {
        self.records.lock().get(username).cloned()
    }

    /// Drop every aged-out record. Optional; expiry is enforced on access.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let window = self.policy.lockout_window;
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| record.in_flight > 0 || !record.is_expired(window, now));
        before - records.len()
    }

    /// Number of usernames with a failure on record
    pub fn tracked_count(&self) -> usize {
        self.records.lock().len()
    }
}

/// An admitted login attempt holding one slot under the lockout threshold.
///
/// Settle it with [`fail`](Self::fail) or [`succeed`](Self::succeed).
/// Dropping it unsettled releases the slot without recording a failure.
#[derive(Debug)]
#[must_use = "the slot stays reserved until the attempt is settled or dropped"]
pub struct LoginAttempt {
    tracker: LoginTracker,
    username: String,
    settled: bool,
}

impl LoginAttempt {
    /// Username this attempt is for
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Count the attempt as a failure now
    pub fn fail(self) -> AttemptResult {
        self.fail_at(Utc::now())
    }

    /// Count the attempt as a failure at `now`
    pub fn fail_at(mut self, now: DateTime<Utc>) -> AttemptResult {
        self.settled = true;
        self.tracker.apply_failure(&self.username, now, true)
    }

    /// Clear the failure record
    pub fn succeed(mut self) {
        self.settled = true;
        self.tracker.clear_failures(&self.username, true);
    }

    /// Give the slot back without counting a failure
    pub fn release(self) {}
}

impl Drop for LoginAttempt {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.release(&self.username);
        }
    }
}

// ============================================================================
// Security Event Logging
// ============================================================================

fn log_login_failure(username: &str, failed_count: u32, remaining: u32) {
    crate::security_event!(
        SecurityEvent::AuthenticationFailure,
        username = %username,
        failed_count = failed_count,
        remaining_attempts = remaining,
        "Login failed"
    );
}

fn log_account_locked(username: &str, failed_count: u32, window: Duration) {
    crate::security_event!(
        SecurityEvent::AccountLocked,
        username = %username,
        failed_count = failed_count,
        lockout_window_secs = window.as_secs(),
        "Account locked due to failed login attempts"
    );
}

fn log_account_unlocked(username: &str) {
    crate::security_event!(
        SecurityEvent::AccountUnlocked,
        username = %username,
        "Account unlocked"
    );
}

// ============================================================================
// Tests
// ============================================================================
