//! Admission endpoint implementation.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{error_response, with_retry_after};
use crate::ratelimit::{client_key_from_header, scoped_key, PolicySet, RateLimiter, FORWARDED_FOR};

/// Shared state for the admission endpoint.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub policies: Arc<PolicySet>,
    pub client_header: HeaderName,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>, policies: PolicySet) -> Self {
        Self {
            limiter,
            policies: Arc::new(policies),
            client_header: FORWARDED_FOR,
        }
    }

    /// Read client identity from a different header.
    pub fn with_client_header(mut self, header: HeaderName) -> Self {
        self.client_header = header;
        self
    }
}

/// Optional body for an admission request.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AdmitRequest {
    /// Explicit client key; when absent the key is read from headers
    #[serde(default)]
    pub key: Option<String>,
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/admit/{policy}", post(admit))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Decide whether the caller may perform the action protected by `policy`.
#[instrument(skip_all, fields(policy = %policy))]
async fn admit(
    State(state): State<AppState>,
    Path(policy): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(quota) = state.policies.get(&policy) else {
        warn!("Received admission request for unknown policy");
        return error_response(StatusCode::NOT_FOUND, format!("unknown policy '{}'", policy));
    };

    let request = if body.is_empty() {
        AdmitRequest::default()
    } else {
        match serde_json::from_slice::<AdmitRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Received malformed admission request");
                return error_response(StatusCode::BAD_REQUEST, format!("invalid request body: {}", e));
            }
        }
    };

    let client = match request.key {
        Some(key) if key.trim().is_empty() => {
            return error_response(StatusCode::BAD_REQUEST, "key must not be blank");
        }
        Some(key) => key,
        None => client_key_from_header(&headers, &state.client_header),
    };

    let key = scoped_key(&policy, &client);
    debug!(key = %key, "Processing admission request");

    let admission = state.limiter.admit(&key, &quota);

    info!(
        key = %key,
        admitted = admission.admitted,
        remaining = admission.remaining,
        "Admission decision made"
    );

    if admission.admitted {
        (StatusCode::OK, Json(admission)).into_response()
    } else {
        with_retry_after((StatusCode::TOO_MANY_REQUESTS, Json(admission)).into_response(), &admission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ManualClock, Quota};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn test_state(limit: u64) -> (Arc<ManualClock>, AppState) {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(RateLimiter::with_clock(clock.clone()));
        let mut policies = PolicySet::new();
        policies.insert("login", Quota::new(limit, 1000).unwrap()).unwrap();
        (clock, AppState::new(limiter, policies))
    }

    fn admit_request(policy: &str, forwarded_for: Option<&str>, body: Body) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/v1/admit/{}", policy));
        if let Some(addr) = forwarded_for {
            builder = builder.header("x-forwarded-for", addr);
        }
        builder.body(body).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let (_, state) = test_state(1);
        let response = router(state)
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admitted_then_rejected() {
        let (_, state) = test_state(1);
        let app = router(state);

        let response = app
            .clone()
            .oneshot(admit_request("login", Some("203.0.113.5"), Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["admitted"], true);
        assert_eq!(body["remaining"], 0);

        let response = app
            .oneshot(admit_request("login", Some("203.0.113.5, 10.0.0.1"), Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
        let body = json_body(response).await;
        assert_eq!(body["admitted"], false);
    }

    #[tokio::test]
    async fn test_keys_scoped_by_policy_and_client() {
        let (_, state) = test_state(1);
        let limiter = state.limiter.clone();
        let app = router(state);

        for addr in ["198.51.100.1", "198.51.100.2"] {
            let response = app
                .clone()
                .oneshot(admit_request("login", Some(addr), Body::empty()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert!(limiter.window("login:198.51.100.1").is_some());
        assert!(limiter.window("login:198.51.100.2").is_some());
    }

    #[tokio::test]
    async fn test_explicit_key_in_body() {
        let (_, state) = test_state(5);
        let limiter = state.limiter.clone();

        let response = router(state)
            .oneshot(admit_request(
                "login",
                Some("203.0.113.5"),
                Body::from(r#"{"key":"user-42"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(limiter.window("login:user-42").is_some());
        assert!(limiter.window("login:203.0.113.5").is_none());
    }

    #[tokio::test]
    async fn test_missing_header_uses_unknown_bucket() {
        let (_, state) = test_state(5);
        let limiter = state.limiter.clone();

        router(state)
            .oneshot(admit_request("login", None, Body::empty()))
            .await
            .unwrap();
        assert!(limiter.window("login:unknown").is_some());
    }

    #[tokio::test]
    async fn test_unknown_policy_rejected() {
        let (_, state) = test_state(1);
        let response = router(state)
            .oneshot(admit_request("upgrade", Some("203.0.113.5"), Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_bodies_rejected() {
        let (_, state) = test_state(1);
        let app = router(state);

        let response = app
            .clone()
            .oneshot(admit_request("login", None, Body::from("not json")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(admit_request("login", None, Body::from(r#"{"key":"  "}"#)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "key must not be blank");
    }

    #[tokio::test]
    async fn test_new_window_after_reset_time() {
        let (clock, state) = test_state(1);
        let app = router(state);

        app.clone()
            .oneshot(admit_request("login", Some("203.0.113.5"), Body::empty()))
            .await
            .unwrap();

        clock.set(1001);
        let response = app
            .oneshot(admit_request("login", Some("203.0.113.5"), Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
