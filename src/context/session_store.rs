//! The session store of §4.3 step 4: keyed by request id, short TTL,
//! holding the last Principal seen for that session.

use std::time::Duration;

use crate::domain::principal::Principal;

pub struct SessionStore {
    inner: moka::future::Cache<String, Principal>,
}

impl SessionStore {
    pub fn new(max_size: u64, ttl: Duration) -> Self {
        Self {
            inner: moka::future::Cache::builder().max_capacity(max_size).time_to_live(ttl).build(),
        }
    }

    pub async fn get(&self, request_id: &str) -> Option<Principal> {
        self.inner.get(request_id).await
    }

    pub async fn put(&self, request_id: impl Into<String>, principal: Principal) {
        self.inner.insert(request_id.into(), principal).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_principal_by_request_id() {
        let store = SessionStore::new(10, Duration::from_secs(60));
        store.put("req-1", Principal::new("1", "alice", "USER")).await;
        let found = store.get("req-1").await.unwrap();
        assert_eq!(found.username, "alice");
    }

    #[tokio::test]
    async fn unknown_request_id_returns_none() {
        let store = SessionStore::new(10, Duration::from_secs(60));
        assert!(store.get("missing").await.is_none());
    }
}
