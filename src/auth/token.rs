//! Secret classification and bearer token validation (§4.2, §9 "Authentication
//! modes"). The password/token split is a cheap structural check on the
//! secret's shape, not a separate auth-method field.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    Password,
    BearerToken,
}

/// A secret is treated as a bearer token if it parses as a three-segment,
/// dot-delimited, base64url-looking string (no signature check happens
/// here — that's `validate_claims`'s job). Anything else is a password.
pub fn classify(secret: &str) -> SecretKind {
    let segments: Vec<&str> = secret.split('.').collect();
    let looks_like_jwt = segments.len() == 3
        && segments
            .iter()
            .all(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

    if looks_like_jwt {
        SecretKind::BearerToken
    } else {
        SecretKind::Password
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub username: String,
    pub role: Option<String>,
    pub iss: Option<String>,
    pub exp: usize,
    pub nbf: Option<usize>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature invalid")]
    SignatureInvalid,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("token missing required claims")]
    MissingClaims,
}

/// Verifies signature and standard claims (issuer, not-before, expiry).
/// `subject` and `username` are required by construction of `TokenClaims`
/// (serde fails the whole decode if absent); `role` stays optional.
pub fn validate_claims(token: &str, secret: &str, issuer: &str) -> Result<TokenClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[issuer]);
    validation.validate_nbf = true;

    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation).map_err(
        |e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
            jsonwebtoken::errors::ErrorKind::ImmatureSignature => TokenError::NotYetValid,
            jsonwebtoken::errors::ErrorKind::InvalidSignature | jsonwebtoken::errors::ErrorKind::InvalidToken => {
                TokenError::SignatureInvalid
            }
            _ => TokenError::MissingClaims,
        },
    )?;

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(secret: &str, issuer: &str, username: &str, exp_offset_secs: i64) -> String {
        let claims = TokenClaims {
            sub: "user-1".to_string(),
            username: username.to_string(),
            role: Some("USER".to_string()),
            iss: Some(issuer.to_string()),
            exp: (chrono::Utc::now().timestamp() + exp_offset_secs) as usize,
            nbf: Some(0),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn classifies_three_segment_strings_as_tokens() {
        let token = make_token("s3cret", "issuer", "alice", 3600);
        assert_eq!(classify(&token), SecretKind::BearerToken);
    }

    #[test]
    fn classifies_plain_strings_as_passwords() {
        assert_eq!(classify("hunter2"), SecretKind::Password);
        assert_eq!(classify(""), SecretKind::Password);
        assert_eq!(classify("a.b"), SecretKind::Password);
    }

    #[test]
    fn validates_well_formed_token() {
        let token = make_token("s3cret", "dav-gateway", "alice", 3600);
        let claims = validate_claims(&token, "s3cret", "dav-gateway").unwrap();
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn rejects_expired_token() {
        let token = make_token("s3cret", "dav-gateway", "alice", -3600);
        let err = validate_claims(&token, "s3cret", "dav-gateway").unwrap_err();
        assert_eq!(err, TokenError::Expired);
    }

    #[test]
    fn rejects_bad_signature() {
        let token = make_token("s3cret", "dav-gateway", "alice", 3600);
        let err = validate_claims(&token, "wrong-secret", "dav-gateway").unwrap_err();
        assert_eq!(err, TokenError::SignatureInvalid);
    }
}
