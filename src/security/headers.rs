//! Security response headers (§6), applied uniformly via a `tower` layer
//! rather than inlined per handler — grounded in `tower-http`'s
//! `SetResponseHeaderLayer`, which the teacher already depends on.

use axum::http::{HeaderName, HeaderValue};
use tower_http::set_header::SetResponseHeaderLayer;

/// One `SetResponseHeaderLayer` per header, chained with `.layer(...)` at
/// the router level. Returned as a `Vec` so callers can fold them onto a
/// `Router` without hand-writing each header's name/value pair again.
pub fn security_header_layers() -> Vec<SetResponseHeaderLayer<HeaderValue>> {
    let pairs: [(&str, &str); 7] = [
        ("x-frame-options", "DENY"),
        ("x-content-type-options", "nosniff"),
        ("x-xss-protection", "1; mode=block"),
        (
            "strict-transport-security",
            "max-age=31536000; includeSubDomains",
        ),
        ("content-security-policy", "default-src 'self'"),
        ("referrer-policy", "strict-origin-when-cross-origin"),
        (
            "permissions-policy",
            "geolocation=(), microphone=(), camera=()",
        ),
    ];

    pairs
        .into_iter()
        .map(|(name, value)| {
            SetResponseHeaderLayer::overriding(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            )
        })
        .collect()
}

/// Name of the header carrying the gate's rejection reason (§8 Scenario E).
pub const SECURITY_REASON_HEADER: &str = "X-Security-Reason";

/// Advertised WebDAV auth realm (§6).
pub const WEBDAV_REALM: &str = "FileManagement WebDAV";
