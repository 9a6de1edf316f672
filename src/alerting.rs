//! Security Alerting
//!
//! Secondary alert channel for events that need a human: account lockouts,
//! suspicious input, a credential store or audit sink that stopped working.
//! The audit stream records everything; alerts are the short list someone
//! should look at now.
//!
//! Delivery is through registered handlers (webhook, pager, test counter).
//! The manager deduplicates identical alerts and rate-limits each category so
//! a brute-force run or a full disk does not produce an alert storm.
//!
//! # Usage
//!
//! ```ignore
//! use warden::alerting::{Alert, AlertConfig, AlertManager, AlertSeverity};
//!
//! let alerts = AlertManager::new(AlertConfig::default());
//!
//! alerts.register_handler(|alert| {
//!     eprintln!("ALERT: {}", alert.summary);
//! });
//!
//! alerts.send(Alert::new(
//!     AlertSeverity::Critical,
//!     "Audit sink failing",
//!     "security_audit.log: No space left on device",
//! ));
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::observability::{SecurityEvent, Severity};

// ============================================================================
// Alert Configuration
// ============================================================================

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlertSeverity {
    /// Informational - no action required
    Info,
    /// Warning - investigation may be needed
    Warning,
    /// Error - action should be taken
    Error,
    /// Critical - immediate action required
    Critical,
}

impl From<Severity> for AlertSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => AlertSeverity::Info,
            Severity::Medium => AlertSeverity::Warning,
            Severity::High => AlertSeverity::Error,
            Severity::Critical => AlertSeverity::Critical,
        }
    }
}

/// Alert categories for routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertCategory {
    /// Login and logout
    Authentication,
    /// Access control decisions and permission changes
    Authorization,
    /// Session lifecycle
    Session,
    /// Lockouts and suspicious input
    SecurityIncident,
    /// Credential store and audit sink health
    SystemHealth,
    /// Custom category
    Custom,
}

impl From<SecurityEvent> for AlertCategory {
    fn from(event: SecurityEvent) -> Self {
        match event {
            SecurityEvent::AuthenticationSuccess
            | SecurityEvent::AuthenticationFailure
            | SecurityEvent::LockedAccountAttempt
            | SecurityEvent::Logout => AlertCategory::Authentication,

            SecurityEvent::AccessGranted
            | SecurityEvent::AccessDenied
            | SecurityEvent::PermissionChanged => AlertCategory::Authorization,

            SecurityEvent::SessionCreated
            | SecurityEvent::SessionDestroyed
            | SecurityEvent::SessionCorrupt => AlertCategory::Session,

            SecurityEvent::AccountLocked
            | SecurityEvent::AccountUnlocked
            | SecurityEvent::SuspiciousInput => AlertCategory::SecurityIncident,

            SecurityEvent::CredentialStoreUnavailable
            | SecurityEvent::AuditDeliveryFailed => AlertCategory::SystemHealth,
        }
    }
}

/// Alert configuration
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Minimum severity to trigger alerts
    pub min_severity: AlertSeverity,

    /// Rate limit: max alerts per category per time window
    pub rate_limit_per_category: u32,

    /// Rate limit window
    pub rate_limit_window: Duration,

    /// Suppress duplicate alerts within this duration
    pub dedup_window: Duration,

    /// Categories that bypass rate limiting (still deduplicated)
    pub critical_categories: Vec<AlertCategory>,

    /// Security events that trigger alerts through [`AlertManager::send_event`]
    pub alertable_events: Vec<SecurityEvent>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            min_severity: AlertSeverity::Warning,
            rate_limit_per_category: 10,
            rate_limit_window: Duration::from_secs(60),
            dedup_window: Duration::from_secs(300),
            critical_categories: vec![AlertCategory::SecurityIncident],
            alertable_events: vec![
                SecurityEvent::AccountLocked,
                SecurityEvent::SuspiciousInput,
                SecurityEvent::CredentialStoreUnavailable,
                SecurityEvent::AuditDeliveryFailed,
            ],
        }
    }
}

impl AlertConfig {
    /// Create a builder for custom configuration
    pub fn builder() -> AlertConfigBuilder {
        AlertConfigBuilder::default()
    }

    /// Alert on every failure and denial as well
    pub fn high_sensitivity() -> Self {
        Self {
            min_severity: AlertSeverity::Info,
            rate_limit_per_category: 50,
            rate_limit_window: Duration::from_secs(60),
            dedup_window: Duration::from_secs(60),
            critical_categories: vec![
                AlertCategory::SecurityIncident,
                AlertCategory::SystemHealth,
            ],
            alertable_events: vec![
                SecurityEvent::AuthenticationFailure,
                SecurityEvent::LockedAccountAttempt,
                SecurityEvent::AccessDenied,
                SecurityEvent::PermissionChanged,
                SecurityEvent::SessionCorrupt,
                SecurityEvent::AccountLocked,
                SecurityEvent::SuspiciousInput,
                SecurityEvent::CredentialStoreUnavailable,
                SecurityEvent::AuditDeliveryFailed,
            ],
        }
    }

    /// Check if an event should trigger an alert
    pub fn should_alert(&self, event: &SecurityEvent) -> bool {
        self.alertable_events.contains(event)
    }
}

/// Builder for AlertConfig
#[derive(Default)]
pub struct AlertConfigBuilder {
    config: AlertConfig,
}

impl AlertConfigBuilder {
    /// Set minimum severity
    pub fn min_severity(mut self, severity: AlertSeverity) -> Self {
        self.config.min_severity = severity;
        self
    }

    /// Set rate limit per category
    pub fn rate_limit(mut self, count: u32, window: Duration) -> Self {
        self.config.rate_limit_per_category = count;
        self.config.rate_limit_window = window;
        self
    }

    /// Set deduplication window
    pub fn dedup_window(mut self, duration: Duration) -> Self {
        self.config.dedup_window = duration;
        self
    }

    /// Set critical categories
    pub fn critical_categories(mut self, categories: Vec<AlertCategory>) -> Self {
        self.config.critical_categories = categories;
        self
    }

    /// Set alertable events
    pub fn alertable_events(mut self, events: Vec<SecurityEvent>) -> Self {
        self.config.alertable_events = events;
        self
    }

    /// Build the configuration
    pub fn build(self) -> AlertConfig {
        self.config
    }
}

// ============================================================================
// Alert Structure
// ============================================================================

/// A security alert
#[derive(Debug, Clone)]
pub struct Alert {
    /// Alert severity
    pub severity: AlertSeverity,
    /// Alert category
    pub category: AlertCategory,
    /// Short summary
    pub summary: String,
    /// Detailed description
    pub description: String,
    /// Component that raised it (e.g. "login_tracker", "audit_writer")
    pub source: String,
    /// Additional context as key-value pairs
    pub context: HashMap<String, String>,
    /// When the alert was created
    pub timestamp: Instant,
    /// Fingerprint for deduplication
    pub fingerprint: String,
    /// Related security event (if any)
    pub event: Option<SecurityEvent>,
}

impl Alert {
    /// Create a new alert
    pub fn new(
        severity: AlertSeverity,
        summary: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let summary = summary.into();
        let description = description.into();
        let fingerprint = Self::compute_fingerprint(&summary, &description);

        Self {
            severity,
            category: AlertCategory::Custom,
            summary,
            description,
            source: String::new(),
            context: HashMap::new(),
            timestamp: Instant::now(),
            fingerprint,
            event: None,
        }
    }

    /// Create an alert from a security event
    pub fn from_event(event: SecurityEvent, description: impl Into<String>) -> Self {
        let mut alert = Self::new(event.severity().into(), event.name(), description);
        alert.category = event.into();
        alert.event = Some(event);
        alert
    }

    /// Set the alert category
    pub fn with_category(mut self, category: AlertCategory) -> Self {
        self.category = category;
        self
    }

    /// Set the alert source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Add context to the alert
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    fn compute_fingerprint(summary: &str, description: &str) -> String {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        summary.hash(&mut hasher);
        description.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }
}

// ============================================================================
// Alert Manager
// ============================================================================

#[derive(Debug, Default)]
struct RateLimitState {
    /// Send times per category within the current window
    category_counts: HashMap<AlertCategory, Vec<Instant>>,
    /// Recent fingerprints for deduplication
    recent_fingerprints: HashMap<String, Instant>,
}

/// Alert handler function type
pub type AlertHandler = Box<dyn Fn(&Alert) + Send + Sync>;

/// Alert manager coordinating delivery to handlers.
///
/// Clones share state and handlers.
pub struct AlertManager {
    config: AlertConfig,
    state: Arc<Mutex<RateLimitState>>,
    handlers: Arc<RwLock<Vec<AlertHandler>>>,
}

impl AlertManager {
    /// Create a new alert manager
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(RateLimitState::default())),
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create with default configuration
    pub fn with_default_config() -> Self {
        Self::new(AlertConfig::default())
    }

    /// Register an alert handler
    pub fn register_handler<F>(&self, handler: F)
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.handlers.write().push(Box::new(handler));
    }

    /// Send an alert
    ///
    /// Returns true if the alert was dispatched, false if it was filtered,
    /// rate-limited or deduplicated.
    pub fn send(&self, alert: Alert) -> bool {
        if alert.severity < self.config.min_severity {
            return false;
        }

        // Check and record under one lock so concurrent duplicates collapse
        if !self.admit(&alert) {
            return false;
        }

        for handler in self.handlers.read().iter() {
            handler(&alert);
        }

        log_alert(&alert);
        true
    }

    /// Send an alert for a security event if the config lists it
    pub fn send_event(&self, event: SecurityEvent, description: impl Into<String>) -> bool {
        if !self.config.should_alert(&event) {
            return false;
        }
        self.send(Alert::from_event(event, description))
    }

    fn admit(&self, alert: &Alert) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();

        if let Some(&last_seen) = state.recent_fingerprints.get(&alert.fingerprint) {
            if now.duration_since(last_seen) < self.config.dedup_window {
                return false;
            }
        }

        let window = self.config.rate_limit_window;
        let bypass = self.config.critical_categories.contains(&alert.category);
        let counts = state.category_counts.entry(alert.category).or_default();
        counts.retain(|&t| now.duration_since(t) < window);

        if !bypass && counts.len() as u32 >= self.config.rate_limit_per_category {
            return false;
        }
        counts.push(now);

        state
            .recent_fingerprints
            .insert(alert.fingerprint.clone(), now);

        if state.recent_fingerprints.len() > 1000 {
            let dedup = self.config.dedup_window;
            state
                .recent_fingerprints
                .retain(|_, &mut t| now.duration_since(t) < dedup);
        }

        true
    }

    /// Current alert counts by category within the rate-limit window
    pub fn get_alert_counts(&self) -> HashMap<AlertCategory, usize> {
        let state = self.state.lock();
        let now = Instant::now();

        state
            .category_counts
            .iter()
            .map(|(cat, times)| {
                let count = times
                    .iter()
                    .filter(|&&t| now.duration_since(t) < self.config.rate_limit_window)
                    .count();
                (*cat, count)
            })
            .collect()
    }

    /// Clear dedup and rate-limit state
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.category_counts.clear();
        state.recent_fingerprints.clear();
    }
}

impl Clone for AlertManager {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertManager")
            .field("config", &self.config)
            .field("handlers", &self.handlers.read().len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Logging
// ============================================================================

fn log_alert(alert: &Alert) {
    use tracing::{error, info, warn};

    let severity_str = format!("{:?}", alert.severity);
    let category_str = format!("{:?}", alert.category);

    match alert.severity {
        AlertSeverity::Critical | AlertSeverity::Error => {
            error!(
                severity = %severity_str,
                category = %category_str,
                summary = %alert.summary,
                source = %alert.source,
                fingerprint = %alert.fingerprint,
                "[ALERT] {}",
                alert.description
            );
        }
        AlertSeverity::Warning => {
            warn!(
                severity = %severity_str,
                category = %category_str,
                summary = %alert.summary,
                source = %alert.source,
                "[ALERT] {}",
                alert.description
            );
        }
        AlertSeverity::Info => {
            info!(
                severity = %severity_str,
                category = %category_str,
                summary = %alert.summary,
                source = %alert.source,
                "[ALERT] {}",
                alert.description
            );
        }
    }
}

// ============================================================================
// Convenience Functions
// ============================================================================

/// Alert that an account was locked
pub fn alert_account_locked(username: &str, failures: u32, manager: &AlertManager) -> bool {
    let alert = Alert::from_event(
        SecurityEvent::AccountLocked,
        format!("Account '{}' locked after {} failed logins", username, failures),
    )
    .with_source("login_tracker")
    .with_context("username", username)
    .with_context("failures", failures.to_string());

    manager.send(alert)
}

/// Alert that input matched the injection heuristic
pub fn alert_suspicious_input(
    field: &str,
    user: Option<&str>,
    ip: Option<&str>,
    manager: &AlertManager,
) -> bool {
    let mut alert = Alert::from_event(
        SecurityEvent::SuspiciousInput,
        format!("Suspicious input rejected in field '{}'", field),
    )
    .with_source("input_validator")
    .with_context("field", field);

    if let Some(user) = user {
        alert = alert.with_context("user", user);
    }
    if let Some(ip) = ip {
        alert = alert.with_context("ip_address", ip);
    }

    manager.send(alert)
}

/// Alert that the credential store could not be read
pub fn alert_credential_store_unavailable(reason: &str, manager: &AlertManager) -> bool {
    let alert = Alert::from_event(
        SecurityEvent::CredentialStoreUnavailable,
        format!("Credential store unavailable: {}", reason),
    )
    .with_source("authentication")
    .with_context("reason", reason);

    manager.send(alert)
}

/// Alert that the audit sink rejected a write
pub fn alert_audit_delivery_failed(sink: &str, reason: &str, manager: &AlertManager) -> bool {
    let alert = Alert::from_event(
        SecurityEvent::AuditDeliveryFailed,
        format!("Audit sink '{}' failed: {}", sink, reason),
    )
    .with_source("audit_writer")
    .with_context("sink", sink)
    .with_context("reason", reason);

    manager.send(alert)
}

// ============================================================================
// Tests
// ============================================================================
