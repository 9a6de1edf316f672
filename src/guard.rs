//! Route Guards
//!
//! A [`GuardChain`] is an ordered list of [`Check`]s run before a protected
//! operation. Each check either allows the request to continue or denies it
//! with a tagged [`Denial`] the route layer turns into a response:
//!
//! | Denial                   | Typical response       |
//! |--------------------------|------------------------|
//! | `AuthenticationRequired` | redirect to login      |
//! | `Forbidden`              | 403                    |
//! | `InvalidInput`           | 400                    |
//!
//! The operation runs only if every check allows. Forbidden denials are
//! audited as `ACCESS_DENIED`, suspicious input as `ANOMALY`.
//!
//! # Usage
//!
//! ```ignore
//! use warden::guard::{GuardChain, GuardServices, RequestContext};
//!
//! let admin_only = GuardChain::new(services.clone())
//!     .require_authentication()
//!     .require_permission("admin");
//!
//! let mut ctx = RequestContext::new(&mut session, "/admin").with_ip(Some(ip));
//! match admin_only.protect(&mut ctx, |ctx| render_admin(ctx.user())) {
//!     Ok(page) => page,
//!     Err(denial) => denial.into_response(),
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::alerting::{alert_suspicious_input, AlertManager};
use crate::auth::AuthenticationEnforcer;
use crate::authz::{log_access_decision, AuthorizationEnforcer};
use crate::config::SecurityConfig;
use crate::observability::SecurityEvent;
use crate::session::SessionStore;
use crate::validation::InputValidator;

// ============================================================================
// Outcomes
// ============================================================================

/// Why a guarded operation was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// No valid session; send the client to `redirect_to`
    AuthenticationRequired {
        /// Login location
        redirect_to: String,
    },
    /// Authenticated but the role lacks `action`
    Forbidden {
        /// Action that was required
        action: String,
    },
    /// A field was rejected by input screening
    InvalidInput {
        /// Offending field
        field: String,
    },
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationRequired { .. } => write!(f, "authentication required"),
            Self::Forbidden { action } => write!(f, "forbidden: {action}"),
            Self::InvalidInput { field } => write!(f, "invalid input: {field}"),
        }
    }
}

impl std::error::Error for Denial {}

/// Result of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Continue with the next check
    Allow,
    /// Stop the chain
    Deny(Denial),
}

// ============================================================================
// Request Context
// ============================================================================

/// Per-request state seen by the checks
pub struct RequestContext<'a> {
    session: &'a mut dyn SessionStore,
    ip: Option<&'a str>,
    path: &'a str,
    inputs: Vec<(&'a str, &'a str)>,
    identity: Option<String>,
}

impl<'a> RequestContext<'a> {
    /// Context for a request to `path` using `session`
    pub fn new(session: &'a mut dyn SessionStore, path: &'a str) -> Self {
        Self {
            session,
            ip: None,
            path,
            inputs: Vec::new(),
            identity: None,
        }
    }

    /// Client address
    pub fn with_ip(mut self, ip: Option<&'a str>) -> Self {
        self.ip = ip;
        self
    }

    /// Add an untrusted input field for screening
    pub fn with_input(mut self, field: &'a str, value: &'a str) -> Self {
        self.inputs.push((field, value));
        self
    }

    /// Authenticated username, once a check has established it
    pub fn user(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Client address
    pub fn ip(&self) -> Option<&str> {
        self.ip
    }

    /// Request path
    pub fn path(&self) -> &str {
        self.path
    }

    /// Session store, e.g. for logout inside the guarded operation
    pub fn session(&mut self) -> &mut dyn SessionStore {
        &mut *self.session
    }

    /// Input fields in insertion order
    pub fn inputs(&self) -> &[(&'a str, &'a str)] {
        &self.inputs
    }
}

impl fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("ip", &self.ip)
            .field("path", &self.path)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Services
// ============================================================================

/// The enforcers a chain consults
#[derive(Debug, Clone)]
pub struct GuardServices {
    /// Authentication and sessions
    pub auth: AuthenticationEnforcer,
    /// Role-based authorization
    pub authz: AuthorizationEnforcer,
    /// Where unauthenticated requests go
    pub login_path: String,
    /// Alerts for suspicious input
    pub alerts: Option<AlertManager>,
}

impl GuardServices {
    /// Services with the default login path `/login`
    pub fn new(auth: AuthenticationEnforcer, authz: AuthorizationEnforcer) -> Self {
        Self {
            auth,
            authz,
            login_path: SecurityConfig::default().login_path,
            alerts: None,
        }
    }

    /// Set the login path
    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Raise alerts for suspicious input
    pub fn alerts(mut self, alerts: AlertManager) -> Self {
        self.alerts = Some(alerts);
        self
    }

    fn authenticate(&self, ctx: &mut RequestContext<'_>, now: DateTime<Utc>) -> Option<String> {
        if ctx.identity.is_none() {
            ctx.identity = self.auth.current_user_at(&mut *ctx.session, now);
        }
        ctx.identity.clone()
    }

    fn login_redirect(&self) -> GuardOutcome {
        GuardOutcome::Deny(Denial::AuthenticationRequired {
            redirect_to: self.login_path.clone(),
        })
    }
}

// ============================================================================
// Checks
// ============================================================================

/// One step of a guard chain
pub trait Check: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Decide at `now`
    fn check(
        &self,
        services: &GuardServices,
        ctx: &mut RequestContext<'_>,
        now: DateTime<Utc>,
    ) -> GuardOutcome;
}

/// Deny unless the session is authenticated
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireAuthentication;

impl Check for RequireAuthentication {
    fn name(&self) -> &str {
        "require_authentication"
    }

    fn check(
        &self,
        services: &GuardServices,
        ctx: &mut RequestContext<'_>,
        now: DateTime<Utc>,
    ) -> GuardOutcome {
        match services.authenticate(ctx, now) {
            Some(_) => GuardOutcome::Allow,
            None => services.login_redirect(),
        }
    }
}

/// Deny unless the authenticated user's role includes the action.
///
/// Authenticates first if no earlier check has.
#[derive(Debug, Clone)]
pub struct RequirePermission(pub String);

impl RequirePermission {
    /// Require `action`
    pub fn new(action: impl Into<String>) -> Self {
        Self(action.into())
    }
}

impl Check for RequirePermission {
    fn name(&self) -> &str {
        "require_permission"
    }

    fn check(
        &self,
        services: &GuardServices,
        ctx: &mut RequestContext<'_>,
        now: DateTime<Utc>,
    ) -> GuardOutcome {
        let Some(user) = services.authenticate(ctx, now) else {
            return services.login_redirect();
        };

        let action = self.0.as_str();
        let allowed = services.authz.can_access(&user, action);
        log_access_decision(&user, &services.authz.resolve_role(&user), action, allowed);

        if allowed {
            return GuardOutcome::Allow;
        }

        services
            .auth
            .audit()
            .access_denied(Some(user.as_str()), ctx.ip, ctx.path, None);
        GuardOutcome::Deny(Denial::Forbidden {
            action: action.to_string(),
        })
    }
}

/// Deny when a listed input field matches the injection heuristic.
///
/// An empty list screens every input.
#[derive(Debug, Clone, Default)]
pub struct RejectSuspiciousInput(pub Vec<String>);

impl RejectSuspiciousInput {
    /// Screen the named fields
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    fn screens(&self, field: &str) -> bool {
        self.0.is_empty() || self.0.iter().any(|f| f == field)
    }
}

impl Check for RejectSuspiciousInput {
    fn name(&self) -> &str {
        "reject_suspicious_input"
    }

    fn check(
        &self,
        services: &GuardServices,
        ctx: &mut RequestContext<'_>,
        _now: DateTime<Utc>,
    ) -> GuardOutcome {
        let flagged = ctx
            .inputs
            .iter()
            .find(|(field, value)| self.screens(field) && InputValidator::detect_sql_injection(value))
            .copied();

        let Some((field, value)) = flagged else {
            return GuardOutcome::Allow;
        };

        let indicators = InputValidator::sql_injection_indicators(value);
        crate::security_event!(
            SecurityEvent::SuspiciousInput,
            field = %field,
            indicators = ?indicators,
            ip_address = %ctx.ip.unwrap_or("unknown"),
            path = %ctx.path,
            "Suspicious input rejected"
        );

        let mut data = serde_json::Map::new();
        data.insert("field".to_string(), field.into());
        data.insert("path".to_string(), ctx.path.into());
        data.insert("indicators".to_string(), indicators.into());
        services
            .auth
            .audit()
            .anomaly(ctx.identity.as_deref(), ctx.ip, "sql_injection", data);

        if let Some(alerts) = &services.alerts {
            alert_suspicious_input(field, ctx.identity.as_deref(), ctx.ip, alerts);
        }

        GuardOutcome::Deny(Denial::InvalidInput {
            field: field.to_string(),
        })
    }
}

// ============================================================================
// Guard Chain
// ============================================================================

/// Ordered checks guarding an operation. Cheap to clone.
#[derive(Clone)]
pub struct GuardChain {
    services: GuardServices,
    checks: Vec<Arc<dyn Check>>,
}

impl fmt::Debug for GuardChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.checks.iter().map(|c| c.name()).collect();
        f.debug_struct("GuardChain").field("checks", &names).finish()
    }
}

impl GuardChain {
    /// Empty chain (allows everything)
    pub fn new(services: GuardServices) -> Self {
        Self {
            services,
            checks: Vec::new(),
        }
    }

    /// Append a check
    pub fn check(mut self, check: impl Check + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    /// Append [`RequireAuthentication`]
    pub fn require_authentication(self) -> Self {
        self.check(RequireAuthentication)
    }

    /// Append [`RequirePermission`]
    pub fn require_permission(self, action: impl Into<String>) -> Self {
        self.check(RequirePermission::new(action))
    }

    /// Append [`RejectSuspiciousInput`] for the named fields
    pub fn reject_suspicious_input<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check(RejectSuspiciousInput::fields(fields))
    }

    /// The services the checks consult
    pub fn services(&self) -> &GuardServices {
        &self.services
    }

    /// Run the checks in order at `now`; the first denial wins
    pub fn evaluate_at(&self, ctx: &mut RequestContext<'_>, now: DateTime<Utc>) -> GuardOutcome {
        for check in &self.checks {
            if let GuardOutcome::Deny(denial) = check.check(&self.services, ctx, now) {
                tracing::debug!(check = check.name(), denial = %denial, path = %ctx.path, "Guard denied request");
                return GuardOutcome::Deny(denial);
            }
        }
        GuardOutcome::Allow
    }

    /// Run `op` if every check allows
    pub fn protect<T>(
        &self,
        ctx: &mut RequestContext<'_>,
        op: impl FnOnce(&mut RequestContext<'_>) -> T,
    ) -> Result<T, Denial> {
        self.protect_at(ctx, Utc::now(), op)
    }

    /// [`protect`](Self::protect) evaluated at `now`
    pub fn protect_at<T>(
        &self,
        ctx: &mut RequestContext<'_>,
        now: DateTime<Utc>,
        op: impl FnOnce(&mut RequestContext<'_>) -> T,
    ) -> Result<T, Denial> {
        match self.evaluate_at(ctx, now) {
            GuardOutcome::Allow => Ok(op(ctx)),
            GuardOutcome::Deny(denial) => Err(denial),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditLogger, MemorySink, ACCESS_DENIED, ANOMALY};
    use crate::auth::CredentialMap;
    use crate::password::{HashCost, PasswordHasher};
    use crate::session::SessionContext;
    use serde_json::json;

    fn setup() -> (GuardServices, CredentialMap, MemorySink) {
        let (audit, sink) = AuditLogger::in_memory();
        let hasher = PasswordHasher::with_cost(HashCost::minimal()).unwrap();
        let auth = AuthenticationEnforcer::builder(audit.clone())
            .hasher(hasher.clone())
            .build();
        let authz = AuthorizationEnforcer::new().with_audit(audit);

        let mut users = CredentialMap::new();
        users.insert_password(&hasher, "admin", "admin123!").unwrap();
        users.insert_password(&hasher, "user", "user123!").unwrap();

        (GuardServices::new(auth, authz), users, sink)
    }

    fn logged_in(services: &GuardServices, users: &CredentialMap, name: &str, pw: &str) -> SessionContext {
        let mut session = SessionContext::default();
        assert!(services.auth.login_user(&mut session, users, name, pw, None));
        session
    }

    #[test]
    fn test_empty_chain_allows() {
        let (services, _, _) = setup();
        let chain = GuardChain::new(services);
        let mut session = SessionContext::default();
        let mut ctx = RequestContext::new(&mut session, "/");
        assert_eq!(chain.protect(&mut ctx, |_| 42), Ok(42));
    }

    #[test]
    fn test_unauthenticated_is_redirected() {
        let (services, _, _) = setup();
        let chain = GuardChain::new(services.login_path("/signin")).require_authentication();

        let mut session = SessionContext::default();
        let mut ctx = RequestContext::new(&mut session, "/dashboard");
        let mut ran = false;
        let result = chain.protect(&mut ctx, |_| ran = true);

        assert_eq!(
            result,
            Err(Denial::AuthenticationRequired {
                redirect_to: "/signin".to_string()
            })
        );
        assert!(!ran);
    }

    #[test]
    fn test_authenticated_user_is_visible_to_op() {
        let (services, users, _) = setup();
        let chain = GuardChain::new(services.clone()).require_authentication();

        let mut session = logged_in(&services, &users, "user", "user123!");
        let mut ctx = RequestContext::new(&mut session, "/dashboard");
        let user = chain.protect(&mut ctx, |ctx| ctx.user().map(str::to_string));
        assert_eq!(user, Ok(Some("user".to_string())));
    }

    #[test]
    fn test_forbidden_is_audited() {
        let (services, users, sink) = setup();
        let chain = GuardChain::new(services.clone())
            .require_authentication()
            .require_permission("admin");

        let mut session = logged_in(&services, &users, "user", "user123!");
        let mut ctx = RequestContext::new(&mut session, "/admin").with_ip(Some("10.1.1.1"));
        let result = chain.protect(&mut ctx, |_| ());

        assert_eq!(
            result,
            Err(Denial::Forbidden {
                action: "admin".to_string()
            })
        );
        let denied = sink.events_of(ACCESS_DENIED);
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].user, "user");
        assert_eq!(denied[0].path.as_deref(), Some("/admin"));
        assert_eq!(denied[0].ip.as_deref(), Some("10.1.1.1"));
        assert_eq!(denied[0].details["reason"], json!("forbidden"));
    }

    #[test]
    fn test_admin_is_allowed() {
        let (services, users, sink) = setup();
        let chain = GuardChain::new(services.clone())
            .require_authentication()
            .require_permission("admin");

        let mut session = logged_in(&services, &users, "admin", "admin123!");
        let mut ctx = RequestContext::new(&mut session, "/admin");
        assert!(chain.protect(&mut ctx, |_| ()).is_ok());
        assert!(sink.events_of(ACCESS_DENIED).is_empty());
    }

    #[test]
    fn test_permission_without_session_redirects() {
        let (services, _, sink) = setup();
        let chain = GuardChain::new(services).require_permission("read");

        let mut session = SessionContext::default();
        let mut ctx = RequestContext::new(&mut session, "/dashboard");
        assert!(matches!(
            chain.protect(&mut ctx, |_| ()),
            Err(Denial::AuthenticationRequired { .. })
        ));
        assert!(sink.events_of(ACCESS_DENIED).is_empty());
    }

    #[test]
    fn test_suspicious_input_is_rejected_and_audited() {
        let (services, _, sink) = setup();
        let chain = GuardChain::new(services).reject_suspicious_input(["username"]);

        let mut session = SessionContext::default();
        let mut ctx = RequestContext::new(&mut session, "/login")
            .with_input("username", "admin' OR 1=1 --")
            .with_input("password", "x");
        let result = chain.protect(&mut ctx, |_| ());

        assert_eq!(
            result,
            Err(Denial::InvalidInput {
                field: "username".to_string()
            })
        );
        let anomalies = sink.events_of(ANOMALY);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].details["kind"], json!("sql_injection"));
        assert_eq!(anomalies[0].details["field"], json!("username"));
    }

    #[test]
    fn test_unlisted_fields_are_not_screened() {
        let (services, _, _) = setup();
        let chain = GuardChain::new(services).reject_suspicious_input(["username"]);

        let mut session = SessionContext::default();
        let mut ctx = RequestContext::new(&mut session, "/login")
            .with_input("username", "alice")
            .with_input("password", "P@ss;word1");
        assert!(chain.protect(&mut ctx, |_| ()).is_ok());
    }

    #[test]
    fn test_first_denial_wins() {
        let (services, _, sink) = setup();
        let chain = GuardChain::new(services)
            .reject_suspicious_input(Vec::<String>::new())
            .require_authentication();

        let mut session = SessionContext::default();
        let mut ctx = RequestContext::new(&mut session, "/search").with_input("q", "1; DROP TABLE");
        assert!(matches!(
            chain.protect(&mut ctx, |_| ()),
            Err(Denial::InvalidInput { .. })
        ));
        assert_eq!(sink.events_of(ANOMALY).len(), 1);
    }

    #[test]
    fn test_custom_check() {
        struct BlockPath;
        impl Check for BlockPath {
            fn name(&self) -> &str {
                "block_path"
            }
            fn check(
                &self,
                _services: &GuardServices,
                ctx: &mut RequestContext<'_>,
                _now: DateTime<Utc>,
            ) -> GuardOutcome {
                if ctx.path().starts_with("/internal") {
                    GuardOutcome::Deny(Denial::Forbidden {
                        action: "internal".to_string(),
                    })
                } else {
                    GuardOutcome::Allow
                }
            }
        }

        let (services, _, _) = setup();
        let chain = GuardChain::new(services).check(BlockPath);
        let mut session = SessionContext::default();
        let mut ctx = RequestContext::new(&mut session, "/internal/metrics");
        assert!(chain.protect(&mut ctx, |_| ()).is_err());
        assert_eq!(format!("{chain:?}"), r#"GuardChain { checks: ["block_path"] }"#);
    }
}
