//! The Authentication Resolver (§4.2): turns a `(username, secret)` pair
//! into a `Principal`, dispatching on whether the secret looks like a
//! password or a bearer token.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::auth::cache::{cache_key, AuthCache, AuthCacheEntry, RevocationCache, RevocationCacheEntry};
use crate::auth::token::{self, SecretKind, TokenError};
use crate::common::config::{CacheConfig, JwtConfig};
use crate::domain::principal::Principal;
use crate::rpc::{BackendRpcClient, RpcCallMeta, RpcError};

/// §4.2 "Failure taxonomy". The first five map to `unauthorized` at the
/// HTTP layer; `BackendUnavailable`/`Internal` are distinct so the caller
/// can choose a different status (§7: `UPSTREAM_UNAVAILABLE`/`INTERNAL`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("token signature invalid")]
    TokenSignatureInvalid,
    #[error("token revoked")]
    TokenRevoked,
    #[error("username does not match token")]
    UsernameMismatch,
    #[error("backend unavailable")]
    BackendUnavailable,
    #[error("internal authentication error")]
    Internal,
}

impl AuthError {
    /// The first five propagate as "unauthorized"; the last two do not
    /// (§4.2).
    pub fn is_unauthorized(&self) -> bool {
        !matches!(self, AuthError::BackendUnavailable | AuthError::Internal)
    }
}

impl From<RpcError> for AuthError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Unavailable(_) => AuthError::BackendUnavailable,
            RpcError::Unauthenticated => AuthError::InvalidCredentials,
            RpcError::PermissionDenied => AuthError::InvalidCredentials,
            RpcError::Malformed(_) | RpcError::Internal(_) => AuthError::Internal,
        }
    }
}

pub struct AuthenticationResolver {
    backend: Arc<dyn BackendRpcClient>,
    auth_cache: AuthCache,
    revocation_cache: RevocationCache,
    jwt: JwtConfig,
}

impl AuthenticationResolver {
    pub fn new(
        backend: Arc<dyn BackendRpcClient>,
        auth_cache_config: &CacheConfig,
        revocation_cache_config: &CacheConfig,
        jwt: JwtConfig,
    ) -> Self {
        Self {
            backend,
            auth_cache: AuthCache::new(auth_cache_config.max_size, auth_cache_config.expire()),
            revocation_cache: RevocationCache::new(revocation_cache_config.max_size, revocation_cache_config.expire()),
            jwt,
        }
    }

    /// Resolves a `(username, secret)` pair into a `Principal`, per §4.2.
    pub async fn resolve(&self, username: &str, secret: &str, meta: &RpcCallMeta) -> Result<Principal, AuthError> {
        match token::classify(secret) {
            SecretKind::Password => self.resolve_password(username, secret, meta).await,
            SecretKind::BearerToken => self.resolve_token(username, secret, meta).await,
        }
    }

    async fn resolve_password(&self, username: &str, password: &str, meta: &RpcCallMeta) -> Result<Principal, AuthError> {
        let key = cache_key(username, password);

        if let Some(entry) = self.auth_cache.get(&key).await {
            tracing::debug!(username, "auth cache hit");
            return if entry.authenticated {
                Ok(Principal::new(entry.user_id, entry.username, entry.role))
            } else {
                Err(AuthError::InvalidCredentials)
            };
        }

        tracing::debug!(username, "auth cache miss, calling backend");
        let result = self.backend.authenticate(username, password, meta).await?;

        let entry = AuthCacheEntry {
            user_id: result.user_id.clone().unwrap_or_default(),
            username: username.to_string(),
            role: result.role.clone().unwrap_or_default(),
            authenticated: result.success,
        };
        self.auth_cache.put(key, entry).await;

        if result.success {
            Ok(Principal::new(
                result.user_id.unwrap_or_default(),
                username.to_string(),
                result.role.unwrap_or_default(),
            ))
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    async fn resolve_token(&self, username: &str, token: &str, meta: &RpcCallMeta) -> Result<Principal, AuthError> {
        let claims = token::validate_claims(token, &self.jwt.secret, &self.jwt.issuer).map_err(|e| match e {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::NotYetValid | TokenError::SignatureInvalid => AuthError::TokenSignatureInvalid,
            TokenError::MissingClaims => AuthError::TokenSignatureInvalid,
        })?;

        if claims.username != username {
            return Err(AuthError::UsernameMismatch);
        }

        let token_hash = cache_key(username, token);
        let revoked = match self.revocation_cache.get(&token_hash).await {
            Some(entry) => {
                tracing::debug!(username, "revocation cache hit");
                entry.revoked
            }
            None => {
                tracing::debug!(username, "revocation cache miss, calling backend");
                let result = self
                    .backend
                    .check_jwt_revocation(token, Some(&claims.sub), Some(&claims.sub), meta)
                    .await?;
                if !result.success {
                    return Err(AuthError::BackendUnavailable);
                }

                let remaining = remaining_lifetime(claims.exp);
                self.revocation_cache
                    .put(token_hash, RevocationCacheEntry { revoked: result.revoked }, remaining)
                    .await;
                result.revoked
            }
        };

        if revoked {
            return Err(AuthError::TokenRevoked);
        }

        Ok(Principal::new(claims.sub, claims.username, claims.role.unwrap_or_default()))
    }
}

/// Caps the revocation cache TTL at the token's own remaining lifetime
/// (§4.2: "Cache the revocation answer with TTL ≤ the token's remaining
/// lifetime"), never negative.
fn remaining_lifetime(exp: usize) -> Duration {
    let now = Utc::now().timestamp();
    let exp = exp as i64;
    if exp <= now {
        Duration::from_secs(0)
    } else {
        Duration::from_secs((exp - now) as u64)
    }
}

/// Masks a token for audit/log output: first/last 10 chars shown, per
/// §4.2's caching key invariant.
pub fn mask_token(token: &str) -> String {
    if token.len() <= 20 {
        "*".repeat(token.len())
    } else {
        format!("{}...{}", &token[..10], &token[token.len() - 10..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::MockBackendRpcClient;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

    fn meta() -> RpcCallMeta {
        RpcCallMeta::default()
    }

    fn config() -> (CacheConfig, CacheConfig, JwtConfig) {
        (
            CacheConfig { max_size: 100, expire_minutes: 5 },
            CacheConfig { max_size: 100, expire_minutes: 5 },
            JwtConfig { secret: "test-secret".to_string(), issuer: "dav-gateway-tests".to_string() },
        )
    }

    #[tokio::test]
    async fn password_path_resolves_valid_credentials() {
        let backend = Arc::new(MockBackendRpcClient::new().with_user("alice", "pw", "1", "USER"));
        let (auth_cfg, rev_cfg, jwt) = config();
        let resolver = AuthenticationResolver::new(backend, &auth_cfg, &rev_cfg, jwt);

        let principal = resolver.resolve("alice", "pw", &meta()).await.unwrap();
        assert_eq!(principal.username, "alice");
        assert_eq!(principal.user_id, "1");
    }

    #[tokio::test]
    async fn password_path_rejects_invalid_credentials() {
        let backend = Arc::new(MockBackendRpcClient::new().with_user("alice", "pw", "1", "USER"));
        let (auth_cfg, rev_cfg, jwt) = config();
        let resolver = AuthenticationResolver::new(backend, &auth_cfg, &rev_cfg, jwt);

        let err = resolver.resolve("alice", "wrong", &meta()).await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn password_path_caches_result_and_skips_second_backend_call() {
        let backend = Arc::new(MockBackendRpcClient::new().with_user("alice", "pw", "1", "USER"));
        let (auth_cfg, rev_cfg, jwt) = config();
        let resolver = AuthenticationResolver::new(backend.clone(), &auth_cfg, &rev_cfg, jwt);

        resolver.resolve("alice", "pw", &meta()).await.unwrap();
        resolver.resolve("alice", "pw", &meta()).await.unwrap();
        assert_eq!(backend.authenticate_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    fn make_token(secret: &str, issuer: &str, username: &str, sub: &str, exp_offset_secs: i64) -> String {
        #[derive(serde::Serialize)]
        struct Claims<'a> {
            sub: &'a str,
            username: &'a str,
            role: Option<&'a str>,
            iss: &'a str,
            exp: usize,
            nbf: usize,
        }
        let claims = Claims {
            sub,
            username,
            role: Some("USER"),
            iss: issuer,
            exp: (chrono::Utc::now().timestamp() + exp_offset_secs) as usize,
            nbf: 0,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[tokio::test]
    async fn token_path_resolves_valid_token() {
        let backend = Arc::new(MockBackendRpcClient::new());
        let (auth_cfg, rev_cfg, jwt) = config();
        let token = make_token(&jwt.secret, &jwt.issuer, "alice", "1", 3600);
        let resolver = AuthenticationResolver::new(backend, &auth_cfg, &rev_cfg, jwt);

        let principal = resolver.resolve("alice", &token, &meta()).await.unwrap();
        assert_eq!(principal.username, "alice");
        assert_eq!(principal.user_id, "1");
    }

    #[tokio::test]
    async fn token_path_rejects_username_mismatch() {
        let backend = Arc::new(MockBackendRpcClient::new());
        let (auth_cfg, rev_cfg, jwt) = config();
        let token = make_token(&jwt.secret, &jwt.issuer, "alice", "1", 3600);
        let resolver = AuthenticationResolver::new(backend, &auth_cfg, &rev_cfg, jwt);

        let err = resolver.resolve("mallory", &token, &meta()).await.unwrap_err();
        assert_eq!(err, AuthError::UsernameMismatch);
    }

    #[tokio::test]
    async fn token_path_rejects_revoked_token() {
        let backend = Arc::new(MockBackendRpcClient::new());
        let (auth_cfg, rev_cfg, jwt) = config();
        let token = make_token(&jwt.secret, &jwt.issuer, "alice", "1", 3600);
        backend.revoke(&token);
        let resolver = AuthenticationResolver::new(backend, &auth_cfg, &rev_cfg, jwt);

        let err = resolver.resolve("alice", &token, &meta()).await.unwrap_err();
        assert_eq!(err, AuthError::TokenRevoked);
    }

    #[tokio::test]
    async fn token_path_rejects_expired_token() {
        let backend = Arc::new(MockBackendRpcClient::new());
        let (auth_cfg, rev_cfg, jwt) = config();
        let token = make_token(&jwt.secret, &jwt.issuer, "alice", "1", -3600);
        let resolver = AuthenticationResolver::new(backend, &auth_cfg, &rev_cfg, jwt);

        let err = resolver.resolve("alice", &token, &meta()).await.unwrap_err();
        assert_eq!(err, AuthError::TokenExpired);
    }

    #[test]
    fn mask_token_hides_middle_of_long_tokens() {
        let masked = mask_token("abcdefghijklmnopqrstuvwxyz0123456789");
        assert!(masked.starts_with("abcdefghij"));
        assert!(masked.ends_with("0123456789"));
        assert!(!masked.contains("klmnop"));
    }
}
