//! Security layer application for Axum routers
//!
//! Provides the `SecureRouter` trait that wraps any router with the
//! transport-level layers around the guarded routes.

use axum::http::{header, HeaderValue, StatusCode};
use axum::Router;
use tower_http::{
    limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::SecurityConfig;

/// Extension trait for applying security layers to an Axum Router.
///
/// # Example
///
/// ```ignore
/// use axum::{Router, routing::get};
/// use warden::{SecurityConfig, SecureRouter};
///
/// async fn handler() -> &'static str { "Hello" }
///
/// let config = SecurityConfig::from_env();
/// let app = Router::new()
///     .route("/", get(handler))
///     .with_security(&config);
/// ```
pub trait SecureRouter {
    /// Apply the layers enabled in `config`.
    ///
    /// From outermost to innermost:
    /// 1. TraceLayer
    /// 2. Security headers
    /// 3. Request body limit
    /// 4. Timeout
    fn with_security(self, config: &SecurityConfig) -> Self;
}

impl<S> SecureRouter for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_security(self, config: &SecurityConfig) -> Self {
        let mut router = self;

        router = router.layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ));

        router = router.layer(RequestBodyLimitLayer::new(config.max_request_size));

        if config.security_headers_enabled {
            router = router
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                // Pages are server-rendered; no scripts or framing
                .layer(SetResponseHeaderLayer::overriding(
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static(
                        "default-src 'self'; script-src 'none'; frame-ancestors 'none'",
                    ),
                ))
                // Session-bound pages must not be cached
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("same-origin"),
                ));
        }

        if config.tracing_enabled {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use tower::ServiceExt;

    fn app(config: &SecurityConfig) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .route("/echo", post(|body: String| async move { body }))
            .with_security(config)
    }

    #[tokio::test]
    async fn test_security_headers_applied() {
        let config = SecurityConfig::default();
        let response = app(&config)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert!(headers[header::CACHE_CONTROL]
            .to_str()
            .unwrap()
            .contains("no-store"));
    }

    #[tokio::test]
    async fn test_security_headers_can_be_disabled() {
        let config = SecurityConfig::builder().disable_security_headers().build();
        let response = app(&config)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().get(header::X_FRAME_OPTIONS).is_none());
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let config = SecurityConfig::builder().max_request_size(16).build();
        let response = app(&config)
            .oneshot(
                Request::post("/echo")
                    .header(header::CONTENT_LENGTH, "64")
                    .body(Body::from("x".repeat(64)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
