//! Warden Prelude - Common imports for guarded applications
//!
//! # Usage
//!
//! ```ignore
//! use warden::prelude::*;
//!
//! let app = Router::new()
//!     .route("/", get(handler))
//!     .with_security(&SecurityConfig::from_env());
//! ```
//!
//! # What's Included
//!
//! ## Core Configuration
//! - [`SecurityConfig`], [`SecurityConfigBuilder`]
//!
//! ## Authentication and Lockout
//! - [`AuthenticationEnforcer`], [`CredentialStore`], [`LoginOutcome`]
//! - [`LockoutPolicy`], [`LoginTracker`]
//!
//! ## Sessions
//! - [`SessionPolicy`], [`SessionStore`], [`SessionRegistry`]
//!
//! ## Authorization
//! - [`AuthorizationEnforcer`], [`RolePermissionTable`]
//!
//! ## Guards
//! - [`GuardChain`], [`GuardServices`], [`RequestContext`], [`Denial`]
//!
//! ## Audit, Alerts and Errors
//! - [`AuditLogger`], [`AlertManager`], [`AppError`], [`SecurityError`]

// =============================================================================
// Core Configuration
// =============================================================================

pub use crate::config::{SecurityConfig, SecurityConfigBuilder};
pub use crate::layers::SecureRouter;

// =============================================================================
// Authentication and Sessions
// =============================================================================

pub use crate::auth::{AuthenticationEnforcer, CredentialMap, CredentialStore, LoginOutcome};
pub use crate::login::{LockoutPolicy, LoginTracker};
pub use crate::password::{HashCost, PasswordHasher};
pub use crate::session::{
    SessionContext, SessionPolicy, SessionRecord, SessionRegistry, SessionStatus, SessionStore,
};

// =============================================================================
// Authorization and Guards
// =============================================================================

pub use crate::authz::{AuthorizationEnforcer, RolePermissionTable, RoleResolver};
pub use crate::guard::{Check, Denial, GuardChain, GuardOutcome, GuardServices, RequestContext};
pub use crate::http::{extract_client_ip, session_id_from_headers, LoginForm};
pub use crate::validation::{InputValidator, Validate, ValidationError};

// =============================================================================
// Observability, Audit and Errors
// =============================================================================

pub use crate::alerting::{AlertConfig, AlertManager};
pub use crate::audit::{AuditEvent, AuditLogger, AuditSeverity};
pub use crate::error::{AppError, ErrorConfig, SecurityError};
pub use crate::observability::{init, LogFormat, ObservabilityConfig, SecurityEvent};

// =============================================================================
// External Re-exports for Convenience
// =============================================================================

pub use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};

pub use tracing::{debug, error, info, warn};
