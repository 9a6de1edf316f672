//! Error Handling
//!
//! Two layers:
//!
//! - [`SecurityError`] is the library taxonomy: validation failures,
//!   authentication and authorization failures, suspicious input, and
//!   infrastructure faults (credential store, hashing, audit sink,
//!   configuration). Ordinary decisions such as "wrong password" or
//!   "account locked" are values (`LoginOutcome`, `GuardOutcome`), not errors.
//! - [`AppError`] maps any of that onto an HTTP response without leaking
//!   why a request failed.
//!
//! # Enumeration Resistance
//!
//! 401, 403 and 500 responses carry fixed generic messages in production.
//! A client cannot tell an unknown username from a wrong password or a
//! locked account by reading the body.
//!
//! # Usage
//!
//! ```ignore
//! use warden::error::{AppError, ErrorConfig};
//!
//! warden::error::init(ErrorConfig::from_env());
//!
//! async fn handler() -> Result<String, AppError> {
//!     let data = load().map_err(|e| AppError::internal("Failed to load data", e))?;
//!     Ok(data)
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;
use crate::password::PasswordError;
use crate::validation::ValidationError;

// ============================================================================
// Security Error Taxonomy
// ============================================================================

/// Errors raised by the security components
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Input failed a format rule
    #[error("validation failed: {0}")]
    Validation(ValidationError),

    /// No authenticated session
    #[error("authentication required")]
    Authentication,

    /// Authenticated but not permitted
    #[error("not permitted: {action}")]
    Authorization {
        /// The action that was refused
        action: String,
    },

    /// Input matched the injection heuristic
    #[error("suspicious input in {field}")]
    Anomaly {
        /// Field that carried the input
        field: String,
        /// Indicator names that matched
        indicators: Vec<&'static str>,
    },

    /// A dependency failed (credential store, hashing, audit sink, config)
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl SecurityError {
    /// Infrastructure failure with a message
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure(message.into())
    }

    /// Short category name for logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Authentication => "authentication",
            Self::Authorization { .. } => "authorization",
            Self::Anomaly { .. } => "anomaly",
            Self::Infrastructure(_) => "infrastructure",
        }
    }
}

impl From<ValidationError> for SecurityError {
    /// Injection-heuristic rejections become [`SecurityError::Anomaly`]
    fn from(err: ValidationError) -> Self {
        if err.is_suspicious() {
            Self::Anomaly {
                field: err.field.unwrap_or_default(),
                indicators: Vec::new(),
            }
        } else {
            Self::Validation(err)
        }
    }
}

impl From<PasswordError> for SecurityError {
    fn from(err: PasswordError) -> Self {
        Self::Infrastructure(err.to_string())
    }
}

impl From<ConfigError> for SecurityError {
    fn from(err: ConfigError) -> Self {
        Self::Infrastructure(err.to_string())
    }
}

// ============================================================================
// Error Configuration
// ============================================================================

/// Error response configuration
#[derive(Debug, Clone)]
pub struct ErrorConfig {
    /// Whether to expose detailed error messages.
    /// Should be `false` in production
    pub expose_details: bool,

    /// Whether to log errors
    pub log_errors: bool,

    /// Whether to include request ID in error responses
    pub include_request_id: bool,

    /// Message for internal errors in production
    pub internal_error_message: String,
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl ErrorConfig {
    /// Production configuration (secure defaults)
    pub fn production() -> Self {
        Self {
            expose_details: false,
            log_errors: true,
            include_request_id: true,
            internal_error_message: "An internal error occurred".to_string(),
        }
    }

    /// Development configuration (detailed errors)
    pub fn development() -> Self {
        Self {
            expose_details: true,
            log_errors: true,
            include_request_id: true,
            internal_error_message: "Internal server error".to_string(),
        }
    }

    /// Load from environment
    ///
    /// Uses `RUST_ENV` or `APP_ENV`:
    /// - "production" or "prod" -> production config
    /// - anything else -> development config
    pub fn from_env() -> Self {
        let env = std::env::var("RUST_ENV")
            .or_else(|_| std::env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "production" | "prod" => Self::production(),
            _ => Self::development(),
        }
    }
}

// Global configuration (set once at startup)
static ERROR_CONFIG: std::sync::OnceLock<ErrorConfig> = std::sync::OnceLock::new();

/// Initialize error handling configuration. Later calls are ignored.
pub fn init(config: ErrorConfig) {
    let _ = ERROR_CONFIG.set(config);
}

/// Get the current error configuration
pub fn config() -> &'static ErrorConfig {
    ERROR_CONFIG.get_or_init(ErrorConfig::default)
}

// ============================================================================
// Application Error
// ============================================================================

/// HTTP-facing error.
///
/// Logs internal details and returns a safe message.
#[derive(Debug)]
pub struct AppError {
    /// Error kind determines HTTP status and handling
    pub kind: ErrorKind,
    /// User-facing message (safe to expose)
    pub message: String,
    /// Internal details (logged, not exposed in production)
    pub details: Option<String>,
    /// Original error (for logging)
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Request ID for correlation
    pub request_id: Option<String>,
}

/// Error categories with their HTTP status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad request (400): malformed or suspicious input
    BadRequest,
    /// Unauthorized (401): authentication required
    Unauthorized,
    /// Forbidden (403): authenticated but not authorized
    Forbidden,
    /// Unprocessable entity (422): a field failed a format rule
    Validation,
    /// Internal server error (500)
    Internal,
    /// Service unavailable (503): a dependency is down
    Unavailable,
}

impl ErrorKind {
    /// HTTP status code for this kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether the message can be shown in production
    pub fn expose_details(&self) -> bool {
        matches!(self, Self::BadRequest | Self::Validation)
    }
}

impl AppError {
    /// Create a new error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            source: None,
            request_id: None,
        }
    }

    /// Create a bad request error (400)
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    /// Create an unauthorized error (401)
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    /// Create a forbidden error (403)
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    /// Create a validation error (422)
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create an internal error (500) with source.
    ///
    /// The message is what users see; the source is logged.
    pub fn internal(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: ErrorKind::Internal,
            message: message.into(),
            details: Some(source.to_string()),
            source: Some(Box::new(source)),
            request_id: None,
        }
    }

    /// Create an internal error without a source
    pub fn internal_msg(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Create a service unavailable error (503)
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// Add internal details (logged but not exposed)
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Add request ID for correlation
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Message the client sees under `cfg`
    fn public_message(&self, cfg: &ErrorConfig) -> String {
        if cfg.expose_details || self.kind.expose_details() {
            return self.message.clone();
        }
        match self.kind {
            ErrorKind::Unauthorized => "Authentication required".to_string(),
            ErrorKind::Forbidden => "Access denied".to_string(),
            ErrorKind::Unavailable => "Service temporarily unavailable".to_string(),
            _ => cfg.internal_error_message.clone(),
        }
    }

    fn log(&self) {
        if !config().log_errors {
            return;
        }

        let request_id = self.request_id.as_deref().unwrap_or("unknown");
        let details = self.details.as_deref().unwrap_or("none");

        match self.kind {
            ErrorKind::Internal | ErrorKind::Unavailable => {
                tracing::error!(
                    error_kind = %self.kind,
                    message = %self.message,
                    details = %details,
                    request_id = %request_id,
                    "Internal error"
                );
            }
            ErrorKind::Unauthorized | ErrorKind::Forbidden => {
                tracing::warn!(
                    error_kind = %self.kind,
                    message = %self.message,
                    request_id = %request_id,
                    "Auth error"
                );
            }
            _ => {
                tracing::debug!(
                    error_kind = %self.kind,
                    message = %self.message,
                    request_id = %request_id,
                    "Client error"
                );
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest => write!(f, "bad_request"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::Validation => write!(f, "validation_error"),
            Self::Internal => write!(f, "internal_error"),
            Self::Unavailable => write!(f, "service_unavailable"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

// ============================================================================
// Error Response
// ============================================================================

/// JSON error response format
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,
    /// Human-readable message
    pub message: String,
    /// Request ID for support/debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Error details (only in development)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    /// Build the response body without consuming the error
    pub fn to_response_body(&self, cfg: &ErrorConfig) -> ErrorResponse {
        ErrorResponse {
            error: self.kind.to_string(),
            message: self.public_message(cfg),
            request_id: if cfg.include_request_id {
                self.request_id.clone()
            } else {
                None
            },
            details: if cfg.expose_details {
                self.details.clone()
            } else {
                None
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let body = self.to_response_body(config());
        (self.kind.status_code(), Json(body)).into_response()
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<SecurityError> for AppError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::Validation(e) => AppError::validation(e.to_string()),
            SecurityError::Authentication => AppError::unauthorized("Authentication required"),
            SecurityError::Authorization { action } => {
                AppError::forbidden("Access denied").with_details(format!("action: {action}"))
            }
            SecurityError::Anomaly { field, .. } => {
                AppError::bad_request("Input contains disallowed characters")
                    .with_details(format!("field: {field}"))
            }
            SecurityError::Infrastructure(msg) => {
                AppError::unavailable("Service temporarily unavailable").with_details(msg)
            }
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::internal("IO error", err)
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        SecurityError::from(err).into()
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::internal("Password hashing failed", err)
    }
}

/// Result type alias for handlers returning AppError
pub type Result<T> = std::result::Result<T, AppError>;

// ============================================================================
// Tests
// ============================================================================
