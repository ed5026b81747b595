//! Auth Cache and Revocation Cache (§3, §4.2). Both are keyed by
//! `base64(sha256(username || ":" || secret))` — the plaintext credential
//! is never stored, logged, or audited; only this digest is.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

/// Computes the cache key for a `(username, secret)` pair. `secret` is
/// either a password or a bearer token — the caller has already classified
/// it (see `auth::token::classify`), but the key derivation is identical
/// either way.
pub fn cache_key(username: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    STANDARD.encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct AuthCacheEntry {
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub authenticated: bool,
}

/// Bounded, TTL'd cache of authentication outcomes (both success and
/// failure are cached, per §4.2, to avoid hammering the backend with
/// repeated bad credentials).
pub struct AuthCache {
    inner: moka::future::Cache<String, AuthCacheEntry>,
}

impl AuthCache {
    pub fn new(max_size: u64, ttl: std::time::Duration) -> Self {
        Self {
            inner: moka::future::Cache::builder()
                .max_capacity(max_size)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<AuthCacheEntry> {
        self.inner.get(key).await
    }

    pub async fn put(&self, key: String, entry: AuthCacheEntry) {
        self.inner.insert(key, entry).await;
    }

    /// Evicts every entry for a user across the cache — called on password
    /// change or explicit invalidation (§4.4 `clearUserCache`, mirrored here
    /// for the auth side of user state).
    pub async fn invalidate_user(&self, username: &str) {
        let username = username.to_string();
        self.inner.invalidate_entries_if(move |_, v| v.username == username).ok();
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[derive(Debug, Clone)]
pub struct RevocationCacheEntry {
    pub revoked: bool,
}

/// Caches revocation answers keyed by token hash, TTL bounded by the
/// token's own remaining lifetime (§4.2 step 3).
pub struct RevocationCache {
    inner: moka::future::Cache<String, RevocationCacheEntry>,
    default_ttl: std::time::Duration,
}

impl RevocationCache {
    pub fn new(max_size: u64, default_ttl: std::time::Duration) -> Self {
        Self {
            inner: moka::future::Cache::builder()
                .max_capacity(max_size)
                .time_to_live(default_ttl)
                .build(),
            default_ttl,
        }
    }

    pub async fn get(&self, token_hash: &str) -> Option<RevocationCacheEntry> {
        self.inner.get(token_hash).await
    }

    /// `remaining_lifetime` caps the TTL actually used: the cache must never
    /// assert "not revoked" past the point the token itself expires. `moka`
    /// has no per-entry TTL override at insert time, so a cap shorter than
    /// the cache's own default is enforced with a delayed eviction task.
    pub async fn put(
        &self,
        token_hash: String,
        entry: RevocationCacheEntry,
        remaining_lifetime: std::time::Duration,
    ) {
        self.inner.insert(token_hash.clone(), entry).await;

        if remaining_lifetime < self.default_ttl {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                tokio::time::sleep(remaining_lifetime).await;
                inner.invalidate(&token_hash).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cache_key_never_contains_the_secret() {
        let key = cache_key("alice", "hunter2");
        assert!(!key.contains("hunter2"));
        assert!(!key.contains("alice"));
    }

    #[test]
    fn cache_key_matches_scenario_a() {
        // Scenario A: `base64(sha256("alice:pw"))`.
        let expected = {
            let mut hasher = Sha256::new();
            hasher.update(b"alice:pw");
            STANDARD.encode(hasher.finalize())
        };
        assert_eq!(cache_key("alice", "pw"), expected);
    }

    #[tokio::test]
    async fn auth_cache_round_trips_entries() {
        let cache = AuthCache::new(10, Duration::from_secs(60));
        let key = cache_key("alice", "pw");
        cache
            .put(
                key.clone(),
                AuthCacheEntry { user_id: "42".into(), username: "alice".into(), role: "USER".into(), authenticated: true },
            )
            .await;
        let entry = cache.get(&key).await.unwrap();
        assert!(entry.authenticated);
        assert_eq!(entry.user_id, "42");
    }

    #[tokio::test]
    async fn invalidate_user_clears_all_their_entries() {
        let cache = AuthCache::new(10, Duration::from_secs(60));
        let key = cache_key("alice", "pw1");
        cache
            .put(key.clone(), AuthCacheEntry { user_id: "42".into(), username: "alice".into(), role: "USER".into(), authenticated: true })
            .await;
        cache.invalidate_user("alice").await;
        assert!(cache.get(&key).await.is_none());
    }
}
