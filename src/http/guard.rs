//! Rate limiting middleware for axum routers.

use axum::extract::{Request, State};
use axum::http::{HeaderName, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use tracing::warn;

use super::{error_response, with_retry_after};
use crate::error::Result;
use crate::ratelimit::{
    client_key_from_header, scoped_key, validate_scope, Quota, RateLimiter, FORWARDED_FOR,
};

/// Guards a route with a single quota per client.
///
/// ```ignore
/// let guard = RateLimitGuard::new(limiter, "login", Quota::new(5, 60_000)?)?;
/// let app = Router::new()
///     .route("/login", post(login))
///     .layer(axum::middleware::from_fn_with_state(guard, enforce));
/// ```
#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: Arc<RateLimiter>,
    scope: Arc<str>,
    quota: Quota,
    client_header: HeaderName,
}

impl RateLimitGuard {
    /// Create a guard; `scope` must not contain the scope separator.
    pub fn new(limiter: Arc<RateLimiter>, scope: &str, quota: Quota) -> Result<Self> {
        validate_scope(scope)?;
        Ok(Self {
            limiter,
            scope: Arc::from(scope),
            quota,
            client_header: FORWARDED_FOR,
        })
    }

    /// Read client identity from a different header.
    pub fn with_client_header(mut self, header: HeaderName) -> Self {
        self.client_header = header;
        self
    }
}

/// Admit the request or answer `429 Too Many Requests` without running the handler.
pub async fn enforce(State(guard): State<RateLimitGuard>, request: Request, next: Next) -> Response {
    let client = client_key_from_header(request.headers(), &guard.client_header);
    let key = scoped_key(&guard.scope, &client);

    let admission = guard.limiter.admit(&key, &guard.quota);
    if admission.admitted {
        return next.run(request).await;
    }

    warn!(key = %key, retry_after_ms = admission.retry_after_ms, "Request rate limited");
    with_retry_after(
        error_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded"),
        &admission,
    )
}
