//! Security Audit Log
//!
//! Append-only stream of structured security events: login attempts,
//! logouts, access denials, permission changes and anomalies. Each event is
//! one JSON object per line with the fields, in order:
//!
//! `timestamp, event_type, user, severity, ip, path, details`
//!
//! ```text
//! {"timestamp":"2024-05-01T12:00:00Z","event_type":"LOGIN_ATTEMPT","user":"alice","severity":"WARNING","ip":"10.0.0.7","path":null,"details":{"locked":false,"success":false}}
//! ```
//!
//! # Delivery
//!
//! Logging never blocks on I/O and never fails the caller. In
//! [`Delivery::Background`] mode events go over an unbounded channel to a
//! dedicated writer thread, which keeps per-process order. [`Delivery::Inline`]
//! writes on the calling thread under a mutex (tests, short-lived tools).
//!
//! A sink write that fails is logged through `tracing`, counted in
//! [`AuditLogger::failure_count`], and raised as an alert when an
//! [`AlertManager`] is attached.
//!
//! # Usage
//!
//! ```ignore
//! use warden::audit::{AuditLogger, RotatingFileSink};
//!
//! let audit = AuditLogger::builder()
//!     .sink(RotatingFileSink::open("logs/security_audit.log", 1_000_000, 5)?)
//!     .build()?;
//!
//! audit.login_attempt("alice", Some("10.0.0.7"), false, false);
//! audit.flush();
//! ```

mod sink;

pub use sink::{AuditSink, ConsoleSink, MemorySink, RotatingFileSink};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::alerting::{alert_audit_delivery_failed, AlertManager};
use crate::config::SecurityConfig;
use crate::observability::SecurityEvent;

// ============================================================================
// Event Types
// ============================================================================

/// Login attempt, successful or not
pub const LOGIN_ATTEMPT: &str = "LOGIN_ATTEMPT";
/// Session ended by the user
pub const LOGOUT: &str = "LOGOUT";
/// Authenticated request refused by authorization
pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
/// Role or permission assignment changed
pub const PERMISSION_CHANGE: &str = "PERMISSION_CHANGE";
/// Anything suspicious: injection-looking input, corrupt session records
pub const ANOMALY: &str = "ANOMALY";

/// User recorded when none is known
pub const ANONYMOUS: &str = "anonymous";

/// Audit severity, serialized uppercase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditSeverity {
    /// Routine
    Info,
    /// Worth a look
    Warning,
    /// A policy stopped something
    Error,
    /// Immediate attention
    Critical,
}

impl AuditSeverity {
    /// Uppercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Audit Event
// ============================================================================

/// One audit record. Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// UTC, second precision, `Z` suffix
    pub timestamp: String,
    /// Event type, e.g. [`LOGIN_ATTEMPT`]
    pub event_type: String,
    /// Acting user, [`ANONYMOUS`] when unknown
    pub user: String,
    /// Severity
    pub severity: AuditSeverity,
    /// Client address
    pub ip: Option<String>,
    /// Request path
    pub path: Option<String>,
    /// Event-specific data
    pub details: Map<String, Value>,
}

impl AuditEvent {
    /// New event stamped with the current time
    pub fn new(event_type: impl Into<String>, severity: AuditSeverity) -> Self {
        Self {
            timestamp: format_audit_timestamp(Utc::now()),
            event_type: event_type.into(),
            user: ANONYMOUS.to_string(),
            severity,
            ip: None,
            path: None,
            details: Map::new(),
        }
    }

    /// Override the timestamp
    pub fn at(mut self, when: DateTime<Utc>) -> Self {
        self.timestamp = format_audit_timestamp(when);
        self
    }

    /// Set the user; `None` or empty keeps [`ANONYMOUS`]
    pub fn user(mut self, user: Option<&str>) -> Self {
        self.user = match user {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => ANONYMOUS.to_string(),
        };
        self
    }

    /// Set the client address
    pub fn ip(mut self, ip: Option<&str>) -> Self {
        self.ip = ip.map(str::to_string);
        self
    }

    /// Set the request path
    pub fn path(mut self, path: Option<&str>) -> Self {
        self.path = path.map(str::to_string);
        self
    }

    /// Add one detail entry
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Merge detail entries; later keys win
    pub fn details(mut self, details: Map<String, Value>) -> Self {
        self.details.extend(details);
        self
    }

    /// One JSON line
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// `2024-05-01T12:00:00Z`
pub fn format_audit_timestamp(when: DateTime<Utc>) -> String {
    when.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// Delivery
// ============================================================================

/// How events reach the sinks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delivery {
    /// Writer thread fed by an unbounded channel
    #[default]
    Background,
    /// Write on the calling thread
    Inline,
}

enum Command {
    Write(String),
    Flush(std::sync::mpsc::SyncSender<()>),
}

/// Shared failure accounting for the writer and inline paths
struct FailureReporter {
    failures: AtomicU64,
    alerts: Option<AlertManager>,
}

impl FailureReporter {
    fn report(&self, sink: &str, error: &dyn fmt::Display) {
        let total = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::error!(
            security_event = SecurityEvent::AuditDeliveryFailed.name(),
            sink = %sink,
            error = %error,
            failures = total,
            "Audit write failed"
        );
        if let Some(alerts) = &self.alerts {
            alert_audit_delivery_failed(sink, &error.to_string(), alerts);
        }
    }

    fn report_all(&self, failed: Vec<SinkFailure>) {
        for (sink, error) in failed {
            self.report(&sink, &error);
        }
    }
}

/// Sink name and the error it returned
type SinkFailure = (String, std::io::Error);

struct SinkSet {
    sinks: Vec<Box<dyn AuditSink>>,
    reporter: Arc<FailureReporter>,
}

impl SinkSet {
    // Callers report failures after releasing the inline lock
    fn write(&mut self, line: &str) -> Vec<SinkFailure> {
        self.sinks
            .iter_mut()
            .filter_map(|sink| {
                sink.write_line(line)
                    .err()
                    .map(|e| (sink.name().to_string(), e))
            })
            .collect()
    }

    fn flush(&mut self) -> Vec<SinkFailure> {
        self.sinks
            .iter_mut()
            .filter_map(|sink| sink.flush().err().map(|e| (sink.name().to_string(), e)))
            .collect()
    }
}

enum Writer {
    Background {
        tx: Option<mpsc::UnboundedSender<Command>>,
        handle: Option<JoinHandle<()>>,
    },
    Inline(Mutex<SinkSet>),
}

struct Inner {
    writer: Writer,
    reporter: Arc<FailureReporter>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Writer::Background { tx, handle } = &mut self.writer {
            // Closing the channel lets the writer drain and exit
            tx.take();
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn run_writer(mut rx: mpsc::UnboundedReceiver<Command>, mut sinks: SinkSet) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Write(line) => {
                let failed = sinks.write(&line);
                sinks.reporter.report_all(failed);
            }
            Command::Flush(ack) => {
                let failed = sinks.flush();
                sinks.reporter.report_all(failed);
                let _ = ack.send(());
            }
        }
    }
    let failed = sinks.flush();
    sinks.reporter.report_all(failed);
}

// ============================================================================
// Audit Logger
// ============================================================================

/// Structured audit emitter.
///
/// Cheap to clone; clones share the writer. The background writer drains
/// and stops when the last clone is dropped.
#[derive(Clone)]
pub struct AuditLogger {
    inner: Arc<Inner>,
}

impl fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.inner.writer {
            Writer::Background { .. } => Delivery::Background,
            Writer::Inline(_) => Delivery::Inline,
        };
        f.debug_struct("AuditLogger")
            .field("delivery", &mode)
            .field("failures", &self.failure_count())
            .finish_non_exhaustive()
    }
}

impl AuditLogger {
    /// Create a builder
    pub fn builder() -> AuditLoggerBuilder {
        AuditLoggerBuilder::default()
    }

    /// Sinks described by the configuration: a rotating file when
    /// `audit_path` is set (mirrored to stdout if `audit_console`),
    /// otherwise stdout.
    pub fn from_config(
        config: &SecurityConfig,
        alerts: Option<AlertManager>,
    ) -> std::io::Result<Self> {
        let mut builder = Self::builder();
        match &config.audit_path {
            Some(path) => {
                builder = builder.sink(RotatingFileSink::open(
                    path,
                    config.audit_max_bytes,
                    config.audit_backups,
                )?);
                if config.audit_console {
                    builder = builder.sink(ConsoleSink);
                }
            }
            None => builder = builder.sink(ConsoleSink),
        }
        if let Some(alerts) = alerts {
            builder = builder.alerts(alerts);
        }
        builder.build()
    }

    /// Inline logger writing to a fresh [`MemorySink`]
    pub fn in_memory() -> (Self, MemorySink) {
        let sink = MemorySink::new();
        let logger = Self::build_inline(vec![Box::new(sink.clone())], None);
        (logger, sink)
    }

    fn build_inline(sinks: Vec<Box<dyn AuditSink>>, alerts: Option<AlertManager>) -> Self {
        let reporter = Arc::new(FailureReporter {
            failures: AtomicU64::new(0),
            alerts,
        });
        let set = SinkSet {
            sinks,
            reporter: Arc::clone(&reporter),
        };
        Self {
            inner: Arc::new(Inner {
                writer: Writer::Inline(Mutex::new(set)),
                reporter,
            }),
        }
    }

    /// Append an event. Never fails the caller.
    pub fn record(&self, event: AuditEvent) {
        let line = match event.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                self.inner.reporter.report("serializer", &e);
                return;
            }
        };

        match &self.inner.writer {
            Writer::Background { tx: Some(tx), .. } => {
                if tx.send(Command::Write(line)).is_err() {
                    self.inner
                        .reporter
                        .report("writer", &"audit writer thread has stopped");
                }
            }
            Writer::Background { tx: None, .. } => {
                self.inner
                    .reporter
                    .report("writer", &"audit writer closed");
            }
            Writer::Inline(sinks) => {
                let failed = sinks.lock().write(&line);
                self.inner.reporter.report_all(failed);
            }
        }
    }

    /// Build and append an event.
    ///
    /// `user` defaults to [`ANONYMOUS`].
    pub fn log_event(
        &self,
        event_type: &str,
        user: Option<&str>,
        severity: AuditSeverity,
        ip: Option<&str>,
        details: Map<String, Value>,
        path: Option<&str>,
    ) {
        self.record(
            AuditEvent::new(event_type, severity)
                .user(user)
                .ip(ip)
                .path(path)
                .details(details),
        );
    }

    /// `LOGIN_ATTEMPT`: INFO on success, WARNING on failure, ERROR when the
    /// account was already locked.
    pub fn login_attempt(&self, user: &str, ip: Option<&str>, success: bool, locked: bool) {
        let severity = if success {
            AuditSeverity::Info
        } else if locked {
            AuditSeverity::Error
        } else {
            AuditSeverity::Warning
        };
        self.record(
            AuditEvent::new(LOGIN_ATTEMPT, severity)
                .user(Some(user))
                .ip(ip)
                .detail("success", success)
                .detail("locked", locked),
        );
    }

    /// `LOGOUT` at INFO
    pub fn logout(&self, user: &str, ip: Option<&str>) {
        self.record(AuditEvent::new(LOGOUT, AuditSeverity::Info).user(Some(user)).ip(ip));
    }

    /// `ACCESS_DENIED` at WARNING; reason defaults to `forbidden`
    pub fn access_denied(
        &self,
        user: Option<&str>,
        ip: Option<&str>,
        path: &str,
        reason: Option<&str>,
    ) {
        self.record(
            AuditEvent::new(ACCESS_DENIED, AuditSeverity::Warning)
                .user(user)
                .ip(ip)
                .path(Some(path))
                .detail("reason", reason.unwrap_or("forbidden")),
        );
    }

    /// `PERMISSION_CHANGE` at INFO
    pub fn permission_change(
        &self,
        admin: &str,
        target: &str,
        before: impl Into<Value>,
        after: impl Into<Value>,
        ip: Option<&str>,
    ) {
        self.record(
            AuditEvent::new(PERMISSION_CHANGE, AuditSeverity::Info)
                .user(Some(admin))
                .ip(ip)
                .detail("target", target)
                .detail("before", before)
                .detail("after", after),
        );
    }

    /// `ANOMALY` at WARNING; `data` is merged after `kind`
    pub fn anomaly(&self, user: Option<&str>, ip: Option<&str>, kind: &str, data: Map<String, Value>) {
        self.record(
            AuditEvent::new(ANOMALY, AuditSeverity::Warning)
                .user(user)
                .ip(ip)
                .detail("kind", kind)
                .details(data),
        );
    }

    /// Block until every event recorded so far has been written
    pub fn flush(&self) {
        match &self.inner.writer {
            Writer::Background { tx: Some(tx), .. } => {
                let (ack_tx, ack_rx) = std::sync::mpsc::sync_channel(1);
                if tx.send(Command::Flush(ack_tx)).is_ok() {
                    let _ = ack_rx.recv();
                }
            }
            Writer::Background { tx: None, .. } => {}
            Writer::Inline(sinks) => {
                let failed = sinks.lock().flush();
                self.inner.reporter.report_all(failed);
            }
        }
    }

    /// Sink writes that have failed since start
    pub fn failure_count(&self) -> u64 {
        self.inner.reporter.failures.load(Ordering::Relaxed)
    }
}

/// Builder for [`AuditLogger`]
#[derive(Default)]
pub struct AuditLoggerBuilder {
    sinks: Vec<Box<dyn AuditSink>>,
    delivery: Delivery,
    alerts: Option<AlertManager>,
}

impl AuditLoggerBuilder {
    /// Add a sink; events go to every sink in insertion order
    pub fn sink(mut self, sink: impl AuditSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Choose delivery mode
    pub fn delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Raise sink failures as alerts
    pub fn alerts(mut self, alerts: AlertManager) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Build the logger, starting the writer thread in background mode
    pub fn build(self) -> std::io::Result<AuditLogger> {
        if self.delivery == Delivery::Inline {
            return Ok(AuditLogger::build_inline(self.sinks, self.alerts));
        }

        let reporter = Arc::new(FailureReporter {
            failures: AtomicU64::new(0),
            alerts: self.alerts,
        });
        let set = SinkSet {
            sinks: self.sinks,
            reporter: Arc::clone(&reporter),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = std::thread::Builder::new()
            .name("warden-audit".to_string())
            .spawn(move || run_writer(rx, set))?;

        Ok(AuditLogger {
            inner: Arc::new(Inner {
                writer: Writer::Background {
                    tx: Some(tx),
                    handle: Some(handle),
                },
                reporter,
            }),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::io;

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn write_line(&mut self, _line: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[test]
    fn test_event_serializes_in_field_order() {
        let when = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let event = AuditEvent::new(LOGIN_ATTEMPT, AuditSeverity::Warning)
            .at(when)
            .user(Some("alice"))
            .ip(Some("10.0.0.7"))
            .detail("success", false);

        assert_eq!(
            event.to_json_line().unwrap(),
            r#"{"timestamp":"2024-05-01T12:00:00Z","event_type":"LOGIN_ATTEMPT","user":"alice","severity":"WARNING","ip":"10.0.0.7","path":null,"details":{"success":false}}"#
        );
    }

    #[test]
    fn test_user_defaults_to_anonymous() {
        let event = AuditEvent::new(ANOMALY, AuditSeverity::Warning).user(None);
        assert_eq!(event.user, "anonymous");
        let event = AuditEvent::new(ANOMALY, AuditSeverity::Warning).user(Some(""));
        assert_eq!(event.user, "anonymous");
    }

    #[test]
    fn test_timestamp_has_second_precision() {
        let event = AuditEvent::new(LOGOUT, AuditSeverity::Info);
        assert_eq!(event.timestamp.len(), "2024-05-01T12:00:00Z".len());
        assert!(event.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_login_attempt_severity() {
        let (audit, sink) = AuditLogger::in_memory();
        audit.login_attempt("alice", None, true, false);
        audit.login_attempt("alice", None, false, false);
        audit.login_attempt("alice", None, false, true);

        let severities: Vec<_> = sink.events().iter().map(|e| e.severity).collect();
        assert_eq!(
            severities,
            vec![AuditSeverity::Info, AuditSeverity::Warning, AuditSeverity::Error]
        );
        let last = &sink.events()[2];
        assert_eq!(last.details["success"], json!(false));
        assert_eq!(last.details["locked"], json!(true));
    }

    #[test]
    fn test_helper_details() {
        let (audit, sink) = AuditLogger::in_memory();
        audit.logout("bob", Some("::1"));
        audit.access_denied(Some("bob"), Some("::1"), "/admin", None);
        audit.permission_change("admin", "bob", "viewer", "editor", None);

        let mut data = Map::new();
        data.insert("field".to_string(), json!("username"));
        audit.anomaly(None, Some("::1"), "sql_injection", data);

        let events = sink.events();
        assert_eq!(events[0].event_type, LOGOUT);
        assert!(events[0].details.is_empty());

        assert_eq!(events[1].event_type, ACCESS_DENIED);
        assert_eq!(events[1].path.as_deref(), Some("/admin"));
        assert_eq!(events[1].details["reason"], json!("forbidden"));

        assert_eq!(events[2].event_type, PERMISSION_CHANGE);
        assert_eq!(events[2].user, "admin");
        assert_eq!(events[2].details["target"], json!("bob"));
        assert_eq!(events[2].details["before"], json!("viewer"));
        assert_eq!(events[2].details["after"], json!("editor"));

        assert_eq!(events[3].event_type, ANOMALY);
        assert_eq!(events[3].user, "anonymous");
        assert_eq!(events[3].details["kind"], json!("sql_injection"));
        assert_eq!(events[3].details["field"], json!("username"));
    }

    #[test]
    fn test_background_delivery_preserves_order() {
        let sink = MemorySink::new();
        let audit = AuditLogger::builder().sink(sink.clone()).build().unwrap();

        for n in 0..200 {
            audit.log_event("TEST", None, AuditSeverity::Info, None, Map::new(), Some(&format!("/{n}")));
        }
        audit.flush();

        let paths: Vec<_> = sink.events().into_iter().filter_map(|e| e.path).collect();
        let expected: Vec<_> = (0..200).map(|n| format!("/{n}")).collect();
        assert_eq!(paths, expected);
    }

    #[test]
    fn test_drop_drains_background_writer() {
        let sink = MemorySink::new();
        {
            let audit = AuditLogger::builder().sink(sink.clone()).build().unwrap();
            let clone = audit.clone();
            clone.logout("alice", None);
            audit.logout("bob", None);
        }
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_sink_failure_is_counted_and_alerted() {
        use std::sync::atomic::AtomicUsize;

        let alerts = AlertManager::with_default_config();
        let raised = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&raised);
        alerts.register_handler(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let good = MemorySink::new();
        let audit = AuditLogger::builder()
            .sink(FailingSink)
            .sink(good.clone())
            .alerts(alerts)
            .build()
            .unwrap();

        audit.logout("alice", None);
        audit.logout("bob", None);
        audit.flush();

        assert_eq!(audit.failure_count(), 2);
        // Identical failures collapse into one alert
        assert_eq!(raised.load(Ordering::SeqCst), 1);
        // The healthy sink still got everything
        assert_eq!(good.len(), 2);
    }

    #[test]
    fn test_inline_alert_handler_may_log_through_the_logger() {
        let alerts = AlertManager::with_default_config();
        let slot: Arc<std::sync::OnceLock<AuditLogger>> = Arc::default();
        let handler_slot = Arc::clone(&slot);
        alerts.register_handler(move |_| {
            if let Some(audit) = handler_slot.get() {
                audit.anomaly(None, None, "audit_degraded", Map::new());
            }
        });

        let good = MemorySink::new();
        let audit = AuditLogger::builder()
            .sink(FailingSink)
            .sink(good.clone())
            .delivery(Delivery::Inline)
            .alerts(alerts)
            .build()
            .unwrap();
        assert!(slot.set(audit.clone()).is_ok());

        audit.logout("alice", None);

        assert_eq!(good.events_of(LOGOUT).len(), 1);
        assert_eq!(good.events_of(ANOMALY).len(), 1);
        assert_eq!(audit.failure_count(), 2);
    }

    #[test]
    fn test_from_config_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("security_audit.log");
        let config = SecurityConfig::builder()
            .audit_path(&path)
            .audit_console(false)
            .build();

        let audit = AuditLogger::from_config(&config, None).unwrap();
        audit.login_attempt("alice", Some("127.0.0.1"), true, false);
        audit.flush();

        let contents = std::fs::read_to_string(&path).unwrap();
        let event: AuditEvent = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(event.event_type, LOGIN_ATTEMPT);
        assert_eq!(event.ip.as_deref(), Some("127.0.0.1"));
    }
}
