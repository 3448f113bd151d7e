//! Client identity extraction for rate limit keys.
//!
//! The identity read here is best effort, not authenticated. Any caller can
//! send its own `X-Forwarded-For`, so keys derived from it are only as
//! trustworthy as the proxy in front of this service: deployments must put a
//! reverse proxy at the trust boundary that strips or overwrites the header.
//! Every caller without a usable header shares the [`UNKNOWN_CLIENT`] bucket.

use axum::http::{HeaderMap, HeaderName};

use crate::error::{Result, TurnstileError};

/// Header consulted by [`extract_client_key`].
pub const FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Key assigned to callers that carry no usable identity.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Extract the caller's address from `X-Forwarded-For`.
///
/// Takes the first comma-separated entry, trimmed. Falls back to
/// [`UNKNOWN_CLIENT`] when the header is missing, blank, or not valid text.
pub fn extract_client_key(headers: &HeaderMap) -> String {
    client_key_from_header(headers, &FORWARDED_FOR)
}

/// Extract the caller's address from an arbitrary forwarding header.
pub fn client_key_from_header(headers: &HeaderMap, name: &HeaderName) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|client| !client.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

/// Separator between scope and client in a scoped key.
pub const SCOPE_SEPARATOR: char = ':';

/// Check that `scope` can prefix a client key without ambiguity.
///
/// Client keys may contain the separator (IPv6 addresses do), so it is
/// scopes that must not.
pub fn validate_scope(scope: &str) -> Result<()> {
    if scope.is_empty() {
        return Err(TurnstileError::Config("scope must not be empty".to_string()));
    }
    if scope.contains(SCOPE_SEPARATOR) {
        return Err(TurnstileError::Config(format!(
            "scope '{}' must not contain '{}'",
            scope, SCOPE_SEPARATOR
        )));
    }
    Ok(())
}

/// Namespace a client key under a scope such as a policy name.
///
/// The scope must have passed [`validate_scope`].
pub fn scoped_key(scope: &str, client: &str) -> String {
    format!("{}{}{}", scope, SCOPE_SEPARATOR, client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: &'static str, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_first_forwarded_address_wins() {
        let headers = headers_with("x-forwarded-for", "203.0.113.5, 70.41.3.18");
        assert_eq!(extract_client_key(&headers), "203.0.113.5");
    }

    #[test]
    fn test_missing_header_is_unknown() {
        assert_eq!(extract_client_key(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let headers = headers_with("x-forwarded-for", " 198.51.100.9 ");
        assert_eq!(extract_client_key(&headers), "198.51.100.9");
    }

    #[test]
    fn test_blank_header_is_unknown() {
        assert_eq!(extract_client_key(&headers_with("x-forwarded-for", "")), "unknown");
        assert_eq!(extract_client_key(&headers_with("x-forwarded-for", " , 10.0.0.1")), "unknown");
    }

    #[test]
    fn test_non_text_header_is_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_bytes(b"\xff\xfe").unwrap(),
        );
        assert_eq!(extract_client_key(&headers), "unknown");
    }

    #[test]
    fn test_custom_header() {
        let headers = headers_with("x-real-ip", "192.0.2.44");
        let name = HeaderName::from_static("x-real-ip");

        assert_eq!(client_key_from_header(&headers, &name), "192.0.2.44");
        assert_eq!(extract_client_key(&headers), "unknown");
    }

    #[test]
    fn test_scoped_key() {
        assert_eq!(scoped_key("login", "203.0.113.5"), "login:203.0.113.5");
        assert_eq!(scoped_key("login", "2001:db8::1"), "login:2001:db8::1");
    }

    #[test]
    fn test_validate_scope() {
        assert!(validate_scope("login").is_ok());
        assert!(validate_scope("adminBadges").is_ok());

        // "a:b" + "c" would collide with "a" + "b:c"
        assert!(matches!(validate_scope("a:b"), Err(TurnstileError::Config(_))));
        assert!(validate_scope("").is_err());
    }
}
