//! Security response headers.
//!
//! Applied to every response that passes the session stage. HSTS is only
//! sent in production, where the service sits behind TLS.

use axum::http::{header, HeaderMap, HeaderValue};

const STATIC_HEADERS: [(header::HeaderName, &str); 4] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::REFERRER_POLICY, "no-referrer"),
    (header::CONTENT_SECURITY_POLICY, "default-src 'none'; frame-ancestors 'none'"),
];

const HSTS_VALUE: &str = "max-age=63072000; includeSubDomains";

/// Insert security headers, leaving any a handler already set untouched.
pub fn apply(headers: &mut HeaderMap, hsts: bool) {
    for (name, value) in STATIC_HEADERS {
        headers
            .entry(name)
            .or_insert_with(|| HeaderValue::from_static(value));
    }

    if hsts {
        headers
            .entry(header::STRICT_TRANSPORT_SECURITY)
            .or_insert_with(|| HeaderValue::from_static(HSTS_VALUE));
    }
}
