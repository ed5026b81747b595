//! Pulls `(username, secret)` out of the `Authorization` header. WebDAV
//! clients send both passwords and bearer tokens inside HTTP Basic auth
//! (the token rides in the password field) — `auth::token::classify`
//! handles telling them apart downstream, so this layer only has to decode
//! the header.

use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine as _};

pub fn extract_basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, secret) = decoded.split_once(':')?;
    Some((username.to_string(), secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn decodes_username_and_secret() {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode("alice:hunter2");
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        let (username, secret) = extract_basic_credentials(&headers).unwrap();
        assert_eq!(username, "alice");
        assert_eq!(secret, "hunter2");
    }

    #[test]
    fn missing_header_is_none() {
        assert!(extract_basic_credentials(&HeaderMap::new()).is_none());
    }

    #[test]
    fn non_basic_scheme_is_none() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert!(extract_basic_credentials(&headers).is_none());
    }
}
