//! Request perimeter: origin guard, CORS and security headers

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{
        HeaderName, HeaderValue, Method, Request, StatusCode,
        header::{
            ACCEPT, CONTENT_TYPE, HOST, ORIGIN, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
            X_XSS_PROTECTION,
        },
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::credentials::API_KEY_HEADER;
use crate::error::rpc_codes;
use crate::security::OriginPolicy;

/// Liveness check path; never origin-checked
pub const HEALTH_PATH: &str = "/health";

/// Session header shared by the Streamable HTTP handlers
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Reject requests whose `Host`/`Origin` pair looks like DNS rebinding.
pub async fn origin_guard(
    State(policy): State<Arc<OriginPolicy>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.uri().path() == HEALTH_PATH {
        return next.run(request).await;
    }

    let allowed = {
        let headers = request.headers();
        // HTTP/2 carries the host in the :authority pseudo-header
        let host = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| request.uri().authority().map(|a| a.as_str()));
        let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
        policy.allows(host, origin)
    };

    if allowed {
        next.run(request).await
    } else {
        forbidden_response()
    }
}

fn forbidden_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "Invalid request - potential DNS rebinding attack",
            "code": rpc_codes::INVALID_REQUEST
        })),
    )
        .into_response()
}

/// CORS that mirrors the caller's origin; the origin guard is the real gate.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(SESSION_HEADER),
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .expose_headers([HeaderName::from_static(SESSION_HEADER)])
}

/// Wrap routes in the outer perimeter, innermost first: CORS, panic
/// recovery, security headers, request tracing.
///
/// Security headers sit outside panic recovery so a 500 from a panicking
/// handler still carries them.
pub fn harden<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let router = router.layer(cors_layer()).layer(CatchPanicLayer::new());
    with_security_headers(router).layer(TraceLayer::new_for_http())
}

/// Stamp the fixed security headers on every response
pub fn with_security_headers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(SetResponseHeaderLayer::overriding(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
}
