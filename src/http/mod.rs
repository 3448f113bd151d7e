//! HTTP surface for the rate limiter.
//!
//! Two call sites are provided: an admission endpoint that remote request
//! handlers can query, and a middleware guard for in-process axum routers.

mod guard;
mod server;
mod service;

pub use guard::{enforce, RateLimitGuard};
pub use server::HttpServer;
pub use service::{router, AdmitRequest, AppState};

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::ratelimit::Admission;

/// JSON body returned with error statuses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Attach `Retry-After` to a rejection.
pub(crate) fn with_retry_after(mut response: Response, admission: &Admission) -> Response {
    response.headers_mut().insert(
        header::RETRY_AFTER,
        HeaderValue::from(admission.retry_after_secs()),
    );
    response
}
