//! # Warden
//!
//! Session security middleware for Axum applications.
//!
//! Warden sits between HTTP routes and application logic and decides, for
//! each request, whether the client is authenticated, whether the user's
//! role permits the action, and whether the submitted input is acceptable.
//! Every security-relevant decision is written to an append-only audit trail.
//!
//! ## Features
//!
//! - **Authentication**: Argon2id password hashing, session establishment,
//!   a single public failure message for every failed login
//! - **Account Lockout**: 5 failures within 10 minutes lock the account for
//!   the rest of the window
//! - **Session Timeout**: 30 minutes of inactivity ends the session
//! - **RBAC**: role/permission table with audited grants and role changes
//! - **Input Screening**: email, username, password and age validators, HTML
//!   escaping and a SQL-injection heuristic
//! - **Audit Trail**: JSON-lines events with size-based file rotation
//! - **Alerting**: rate-limited alerts for lockouts and suspicious input
//!
//! ## Quick Start
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use warden::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     init(ObservabilityConfig::from_env())?;
//!
//!     let config = SecurityConfig::from_env();
//!     let audit = AuditLogger::from_config(&config, None)?;
//!     let auth = AuthenticationEnforcer::from_config(&config, audit.clone(), None)?;
//!     let authz = AuthorizationEnforcer::new().with_audit(audit);
//!
//!     let services = GuardServices::new(auth, authz).login_path(&config.login_path);
//!     let admin_only = GuardChain::new(services)
//!         .require_authentication()
//!         .require_permission("admin");
//!
//!     let app = Router::new()
//!         .route("/", get(|| async { "Hello" }))
//!         .with_security(&config);
//!
//!     // Serve...
//!     Ok(())
//! }
//! ```

pub mod alerting;
pub mod audit;
pub mod auth;
pub mod authz;
mod config;
pub mod error;
pub mod guard;
pub mod http;
mod layers;
pub mod login;
pub mod observability;
mod parse;
pub mod password;
pub mod prelude;
pub mod session;
pub mod testing;
pub mod validation;

// Re-exports
pub use audit::AuditLogger;
pub use auth::{AuthenticationEnforcer, CredentialStore, LoginOutcome};
pub use authz::{AuthorizationEnforcer, RolePermissionTable};
pub use config::{ConfigError, SecurityConfig, SecurityConfigBuilder};
pub use error::{AppError, SecurityError};
pub use guard::{Denial, GuardChain, GuardServices, RequestContext};
pub use layers::SecureRouter;
pub use observability::ObservabilityConfigBuilder;
pub use parse::{parse_bool, parse_duration, parse_size};
pub use validation::InputValidator;
