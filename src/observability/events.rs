//! Security Event Logging
//!
//! Structured `tracing` events for security-relevant occurrences. These are
//! operational log lines; the append-only audit stream lives in
//! [`crate::audit`].
//!
//! # Usage
//!
//! ```ignore
//! use warden::observability::{SecurityEvent, security_event};
//!
//! security_event!(
//!     SecurityEvent::AuthenticationFailure,
//!     username = %username,
//!     failures = 3,
//!     "Login failed"
//! );
//! ```

use std::fmt;

/// Security event kinds emitted by the enforcers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    // Authentication events
    /// Successful login
    AuthenticationSuccess,
    /// Failed login attempt
    AuthenticationFailure,
    /// Login refused because the account is locked
    LockedAccountAttempt,
    /// User logout
    Logout,
    /// Session created
    SessionCreated,
    /// Session expired or invalidated
    SessionDestroyed,
    /// Session record could not be parsed
    SessionCorrupt,

    // Authorization events
    /// Access granted to an action
    AccessGranted,
    /// Access denied to an action
    AccessDenied,
    /// Role or permission assignment changed
    PermissionChanged,

    // Lockout events
    /// Account locked after repeated failures
    AccountLocked,
    /// Account unlocked by an administrator
    AccountUnlocked,

    // Input and infrastructure events
    /// Input matched an injection heuristic
    SuspiciousInput,
    /// Credential store lookup failed
    CredentialStoreUnavailable,
    /// Audit sink rejected a write
    AuditDeliveryFailed,
}

impl SecurityEvent {
    /// Get the event category for filtering/grouping
    pub fn category(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess
            | Self::AuthenticationFailure
            | Self::LockedAccountAttempt
            | Self::Logout => "authentication",

            Self::SessionCreated
            | Self::SessionDestroyed
            | Self::SessionCorrupt => "session",

            Self::AccessGranted
            | Self::AccessDenied
            | Self::PermissionChanged => "authorization",

            Self::AccountLocked
            | Self::AccountUnlocked
            | Self::SuspiciousInput => "security",

            Self::CredentialStoreUnavailable
            | Self::AuditDeliveryFailed => "system",
        }
    }

    /// Get the severity level for the event
    pub fn severity(&self) -> Severity {
        match self {
            Self::AccountLocked
            | Self::AuditDeliveryFailed
            | Self::LockedAccountAttempt => Severity::Critical,

            Self::AuthenticationFailure
            | Self::AccessDenied
            | Self::SuspiciousInput
            | Self::SessionCorrupt
            | Self::CredentialStoreUnavailable => Severity::High,

            Self::AuthenticationSuccess
            | Self::PermissionChanged
            | Self::AccountUnlocked => Severity::Medium,

            Self::AccessGranted
            | Self::Logout
            | Self::SessionCreated
            | Self::SessionDestroyed => Severity::Low,
        }
    }

    /// Get the event name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess => "authentication_success",
            Self::AuthenticationFailure => "authentication_failure",
            Self::LockedAccountAttempt => "locked_account_attempt",
            Self::Logout => "logout",
            Self::SessionCreated => "session_created",
            Self::SessionDestroyed => "session_destroyed",
            Self::SessionCorrupt => "session_corrupt",
            Self::AccessGranted => "access_granted",
            Self::AccessDenied => "access_denied",
            Self::PermissionChanged => "permission_changed",
            Self::AccountLocked => "account_locked",
            Self::AccountUnlocked => "account_unlocked",
            Self::SuspiciousInput => "suspicious_input",
            Self::CredentialStoreUnavailable => "credential_store_unavailable",
            Self::AuditDeliveryFailed => "audit_delivery_failed",
        }
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Routine operations
    Low,
    /// Important state changes
    Medium,
    /// Security-relevant failures
    High,
    /// Immediate attention required
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Log a security event with structured fields.
///
/// The macro adds three fields to every event:
/// - `security_event`: event name
/// - `category`: event category
/// - `severity`: event severity
///
/// and chooses the `tracing` level from the severity.
///
/// # Examples
///
/// ```ignore
/// security_event!(
///     SecurityEvent::AccountLocked,
///     username = %username,
///     failures = 5,
///     "Account locked"
/// );
/// ```
#[macro_export]
macro_rules! security_event {
    ($event:expr, $($field:tt)*) => {{
        let event = $event;
        let severity = event.severity();
        let category = event.category();
        let event_name = event.name();

        match severity {
            $crate::observability::Severity::Critical => {
                ::tracing::error!(
                    security_event = event_name,
                    category = category,
                    severity = "critical",
                    $($field)*
                );
            }
            $crate::observability::Severity::High => {
                ::tracing::warn!(
                    security_event = event_name,
                    category = category,
                    severity = "high",
                    $($field)*
                );
            }
            $crate::observability::Severity::Medium => {
                ::tracing::info!(
                    security_event = event_name,
                    category = category,
                    severity = "medium",
                    $($field)*
                );
            }
            $crate::observability::Severity::Low => {
                ::tracing::debug!(
                    security_event = event_name,
                    category = category,
                    severity = "low",
                    $($field)*
                );
            }
        }
    }};
}

pub use security_event;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_categories() {
        assert_eq!(SecurityEvent::AuthenticationSuccess.category(), "authentication");
        assert_eq!(SecurityEvent::SessionCorrupt.category(), "session");
        assert_eq!(SecurityEvent::AccessDenied.category(), "authorization");
        assert_eq!(SecurityEvent::AccountLocked.category(), "security");
        assert_eq!(SecurityEvent::AuditDeliveryFailed.category(), "system");
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(SecurityEvent::AccountLocked.severity(), Severity::Critical);
        assert_eq!(SecurityEvent::AuthenticationFailure.severity(), Severity::High);
        assert_eq!(SecurityEvent::AuthenticationSuccess.severity(), Severity::Medium);
        assert_eq!(SecurityEvent::SessionCreated.severity(), Severity::Low);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_event_name_matches_display() {
        for event in [
            SecurityEvent::AuthenticationFailure,
            SecurityEvent::SuspiciousInput,
            SecurityEvent::CredentialStoreUnavailable,
        ] {
            assert_eq!(event.to_string(), event.name());
        }
    }
}
