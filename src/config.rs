//! Security configuration
//!
//! One builder-pattern configuration for every policy knob: session expiry,
//! lockout, hashing cost, the audit stream and the HTTP layer limits.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::parse::{parse_bool, parse_duration, parse_minutes, parse_size};
use crate::password::HashCost;

/// Configuration errors reported by [`SecurityConfig::validate`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value no component can run with
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Security configuration.
///
/// # Example
///
/// ```ignore
/// use warden::SecurityConfig;
///
/// // Load from environment variables
/// let config = SecurityConfig::from_env();
///
/// // Or build programmatically
/// let config = SecurityConfig::builder()
///     .session_timeout(Duration::from_secs(15 * 60))
///     .lockout(3, Duration::from_secs(15 * 60))
///     .audit_path("/var/log/app/security_audit.log")
///     .build();
/// config.validate()?;
/// ```
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Idle time after which a session is no longer authenticated
    pub session_timeout: Duration,

    /// Consecutive failed logins that lock an account
    pub lockout_threshold: u32,

    /// Lockout duration, measured from the latest failure
    pub lockout_window: Duration,

    /// Argon2 cost for new hashes
    pub hash_cost: HashCost,

    /// Audit log file. `None` writes the audit stream to stdout only.
    pub audit_path: Option<PathBuf>,

    /// Rotate the audit file once it would exceed this many bytes
    pub audit_max_bytes: u64,

    /// Rotated audit files to keep
    pub audit_backups: usize,

    /// Mirror the audit stream to stdout when writing to a file
    pub audit_console: bool,

    /// Request timeout for the HTTP layer
    pub request_timeout: Duration,

    /// Maximum request body size in bytes
    pub max_request_size: usize,

    /// Where unauthenticated requests are redirected
    pub login_path: String,

    /// Enable security response headers
    pub security_headers_enabled: bool,

    /// Enable request/response tracing
    pub tracing_enabled: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(30 * 60),
            lockout_threshold: 5,
            lockout_window: Duration::from_secs(10 * 60),
            hash_cost: HashCost::default(),
            audit_path: None,
            audit_max_bytes: 1_000_000,
            audit_backups: 5,
            audit_console: true,
            request_timeout: Duration::from_secs(30),
            max_request_size: 64 * 1024,
            login_path: "/login".to_string(),
            security_headers_enabled: true,
            tracing_enabled: true,
        }
    }
}

impl SecurityConfig {
    /// Create configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to the default.
    ///
    /// # Environment Variables
    ///
    /// - `SESSION_TIMEOUT_MINUTES`: idle timeout (default: 30)
    /// - `LOCKOUT_THRESHOLD`: failures before lockout (default: 5)
    /// - `LOCKOUT_WINDOW_MINUTES`: lockout window (default: 10)
    /// - `PASSWORD_HASH_COST`: argon2 iterations (default: 2)
    /// - `PASSWORD_HASH_MEMORY_KIB`: argon2 memory (default: 19456)
    /// - `AUDIT_LOG_PATH`: audit file (default: unset, stdout)
    /// - `AUDIT_MAX_SIZE`: e.g. "1000000", "10MB" (default: 1000000)
    /// - `AUDIT_BACKUP_COUNT`: rotated files kept (default: 5)
    /// - `AUDIT_CONSOLE`: "true"/"false" (default: "true")
    /// - `REQUEST_TIMEOUT`: e.g. "30s", "5m" (default: "30s")
    /// - `MAX_REQUEST_SIZE`: e.g. "64KB", "1MB" (default: "64KB")
    /// - `LOGIN_PATH`: redirect target (default: "/login")
    /// - `SECURITY_HEADERS_ENABLED`: "true"/"false" (default: "true")
    /// - `TRACING_ENABLED`: "true"/"false" (default: "true")
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` uses the process
    /// environment; tests pass a map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let session_timeout = get("SESSION_TIMEOUT_MINUTES")
            .and_then(|s| parse_minutes(&s))
            .unwrap_or(defaults.session_timeout);

        let lockout_threshold = get("LOCKOUT_THRESHOLD")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.lockout_threshold);

        let lockout_window = get("LOCKOUT_WINDOW_MINUTES")
            .and_then(|s| parse_minutes(&s))
            .unwrap_or(defaults.lockout_window);

        let hash_cost = HashCost {
            iterations: get("PASSWORD_HASH_COST")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.hash_cost.iterations),
            memory_kib: get("PASSWORD_HASH_MEMORY_KIB")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.hash_cost.memory_kib),
            parallelism: defaults.hash_cost.parallelism,
        };

        let audit_path = get("AUDIT_LOG_PATH").map(|s| PathBuf::from(s.trim()));

        let audit_max_bytes = get("AUDIT_MAX_SIZE")
            .and_then(|s| parse_size(&s))
            .unwrap_or(defaults.audit_max_bytes);

        let audit_backups = get("AUDIT_BACKUP_COUNT")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.audit_backups);

        let audit_console = get("AUDIT_CONSOLE")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.audit_console);

        let request_timeout = get("REQUEST_TIMEOUT")
            .and_then(|s| parse_duration(&s))
            .unwrap_or(defaults.request_timeout);

        let max_request_size = get("MAX_REQUEST_SIZE")
            .and_then(|s| parse_size(&s))
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(defaults.max_request_size);

        let login_path = get("LOGIN_PATH")
            .map(|s| s.trim().to_string())
            .unwrap_or(defaults.login_path);

        let security_headers_enabled = get("SECURITY_HEADERS_ENABLED")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(true);

        let tracing_enabled = get("TRACING_ENABLED")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(true);

        Self {
            session_timeout,
            lockout_threshold,
            lockout_window,
            hash_cost,
            audit_path,
            audit_max_bytes,
            audit_backups,
            audit_console,
            request_timeout,
            max_request_size,
            login_path,
            security_headers_enabled,
            tracing_enabled,
        }
    }

    /// Create a new builder for programmatic configuration.
    pub fn builder() -> SecurityConfigBuilder {
        SecurityConfigBuilder::default()
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_timeout.is_zero() {
            return Err(ConfigError::invalid("session_timeout", "must be positive"));
        }
        if self.lockout_threshold == 0 {
            return Err(ConfigError::invalid("lockout_threshold", "must be at least 1"));
        }
        if self.lockout_window.is_zero() {
            return Err(ConfigError::invalid("lockout_window", "must be positive"));
        }
        crate::password::PasswordHasher::with_cost(self.hash_cost)
            .map_err(|e| ConfigError::invalid("hash_cost", e.to_string()))?;
        if self.audit_max_bytes == 0 {
            return Err(ConfigError::invalid("audit_max_bytes", "must be positive"));
        }
        if self.max_request_size == 0 {
            return Err(ConfigError::invalid("max_request_size", "must be positive"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("request_timeout", "must be positive"));
        }
        if !self.login_path.starts_with('/') {
            return Err(ConfigError::invalid(
                "login_path",
                format!("'{}' must start with '/'", self.login_path),
            ));
        }
        Ok(())
    }
}

/// Builder for SecurityConfig
#[derive(Debug, Clone, Default)]
pub struct SecurityConfigBuilder {
    config: SecurityConfig,
}

impl SecurityConfigBuilder {
    /// Set the session idle timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_timeout = timeout;
        self
    }

    /// Set lockout threshold and window.
    pub fn lockout(mut self, threshold: u32, window: Duration) -> Self {
        self.config.lockout_threshold = threshold;
        self.config.lockout_window = window;
        self
    }

    /// Set the argon2 cost.
    pub fn hash_cost(mut self, cost: HashCost) -> Self {
        self.config.hash_cost = cost;
        self
    }

    /// Write the audit stream to a rotating file.
    pub fn audit_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.audit_path = Some(path.into());
        self
    }

    /// Set audit rotation size and backup count.
    pub fn audit_rotation(mut self, max_bytes: u64, backups: usize) -> Self {
        self.config.audit_max_bytes = max_bytes;
        self.config.audit_backups = backups;
        self
    }

    /// Mirror the audit stream to stdout.
    pub fn audit_console(mut self, enabled: bool) -> Self {
        self.config.audit_console = enabled;
        self
    }

    /// Set request timeout duration.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set maximum request body size in bytes.
    pub fn max_request_size(mut self, size: usize) -> Self {
        self.config.max_request_size = size;
        self
    }

    /// Set the login redirect path.
    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.config.login_path = path.into();
        self
    }

    /// Disable security headers.
    pub fn disable_security_headers(mut self) -> Self {
        self.config.security_headers_enabled = false;
        self
    }

    /// Disable request/response tracing.
    pub fn disable_tracing(mut self) -> Self {
        self.config.tracing_enabled = false;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SecurityConfig {
        self.config
    }
}
