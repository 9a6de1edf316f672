//! HTTP glue for Axum handlers
//!
//! Client address extraction, the session id cookie, the login form and the
//! response mapping for guard denials. Denial responses never say more than
//! the status requires.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::error::AppError;
use crate::guard::Denial;
use crate::validation::{InputValidator, Validate, ValidationError};

/// Name of the cookie carrying the opaque session id
pub const SESSION_COOKIE: &str = "warden_session";

/// Placeholder when no proxy header names the client
pub const UNKNOWN_IP: &str = "unknown";

// ============================================================================
// Client Address
// ============================================================================

/// Client IP from proxy headers.
///
/// Checks `X-Forwarded-For` (first entry), `X-Real-IP` and
/// `CF-Connecting-IP` in that order; falls back to `"unknown"`.
pub fn extract_client_ip(headers: &HeaderMap) -> String {
    client_ip(headers).unwrap_or_else(|| UNKNOWN_IP.to_string())
}

/// Like [`extract_client_ip`] but `None` when no header is usable
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    // X-Forwarded-For may list several hops; the first is the client
    if let Some(first) = header_str("x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return Some(first.to_string());
    }

    header_str("x-real-ip")
        .or_else(|| header_str("cf-connecting-ip"))
        .map(str::to_string)
}

// ============================================================================
// Session Cookie
// ============================================================================

/// Session id from the `Cookie` header(s), if present and non-empty
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|id| is_session_id(id))
}

// Registry ids are simple-format UUIDs; anything else is ignored
fn is_session_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// `Set-Cookie` value binding the client to `id`
pub fn session_cookie(id: &str, secure: bool) -> Option<HeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("warden_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

// ============================================================================
// Login Form
// ============================================================================

/// Form body posted to the login route
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    /// Submitted username
    #[serde(default)]
    pub username: String,
    /// Submitted password
    #[serde(default)]
    pub password: String,
}

impl Validate for LoginForm {
    fn validate(&self) -> Result<(), ValidationError> {
        InputValidator::check_required(&self.username, "username")?;
        InputValidator::check_required(&self.password, "password")?;
        Ok(())
    }
}

// ============================================================================
// Denial Responses
// ============================================================================

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        match self {
            Denial::AuthenticationRequired { redirect_to } => {
                Redirect::to(&redirect_to).into_response()
            }
            Denial::Forbidden { action } => AppError::forbidden("Access denied")
                .with_details(format!("action: {action}"))
                .into_response(),
            Denial::InvalidInput { field } => {
                AppError::bad_request("Input contains disallowed characters")
                    .with_details(format!("field: {field}"))
                    .into_response()
            }
        }
    }
}

impl Denial {
    /// Status the response will carry
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired { .. } => StatusCode::SEE_OTHER,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
