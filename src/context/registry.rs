//! Principal recovery (§4.3): five-step fallback chain used whenever a
//! handler finds no principal already attached to the current context.
//!
//! The first two steps of the spec's recovery order — "the underlying
//! protocol request object" and "the protocol's own thread-context holder"
//! — collapse into one step here: axum carries per-request state in the
//! request's `http::Extensions` map rather than a separate framework
//! thread-local, so that map stands in for both. Steps 3-5 are genuinely
//! distinct and are implemented as written.

use std::sync::Arc;
use std::sync::RwLock;

use axum::http::Extensions;
use tokio::task_local;

use crate::context::session_store::SessionStore;
use crate::domain::principal::Principal;

task_local! {
    /// Step 3: the task-local Context for in-flight work on this request.
    static CURRENT_PRINCIPAL: std::cell::RefCell<Option<Principal>>;
}

/// Runs `f` with an empty task-local principal slot scoped to the future,
/// mirroring the teacher's per-request task scoping style.
pub async fn scope<F, R>(f: F) -> R
where
    F: std::future::Future<Output = R>,
{
    CURRENT_PRINCIPAL.scope(std::cell::RefCell::new(None), f).await
}

pub fn set_current(principal: Principal) {
    let _ = CURRENT_PRINCIPAL.try_with(|slot| {
        *slot.borrow_mut() = Some(principal);
    });
}

pub fn current() -> Option<Principal> {
    CURRENT_PRINCIPAL.try_with(|slot| slot.borrow().clone()).unwrap_or(None)
}

/// Step 5: last-resort fallback slot, one per process. Recovering from it
/// still requires the slot to have been populated by an earlier successful
/// authentication (§4.3 invariant) — it is never seeded any other way.
#[derive(Default)]
pub struct MostRecentPrincipal {
    slot: RwLock<Option<Principal>>,
}

impl MostRecentPrincipal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, principal: Principal) {
        *self.slot.write().expect("most-recent-principal lock poisoned") = Some(principal);
    }

    pub fn get(&self) -> Option<Principal> {
        self.slot.read().expect("most-recent-principal lock poisoned").clone()
    }
}

/// Ties together the session store and the most-recent-principal slot to
/// implement the full §4.3 recovery order. Extensions and the task-local
/// context are checked by the caller before reaching for this, since they
/// don't need shared state.
pub struct ContextRegistry {
    sessions: SessionStore,
    most_recent: Arc<MostRecentPrincipal>,
}

impl ContextRegistry {
    pub fn new(sessions: SessionStore) -> Self {
        Self { sessions, most_recent: Arc::new(MostRecentPrincipal::new()) }
    }

    /// Recovers a Principal for `request_id`, trying (in order): the
    /// request's extensions map, the task-local context, the session
    /// store, then the most-recent-principal slot. Re-attaches the result
    /// to the task-local context and the extensions map on success, so a
    /// later call on the same request short-circuits at step 1.
    pub async fn recover(&self, request_id: &str, extensions: &mut Extensions) -> Option<Principal> {
        if let Some(principal) = extensions.get::<Principal>().cloned() {
            return Some(principal);
        }

        if let Some(principal) = current() {
            self.reattach(extensions, principal.clone());
            return Some(principal);
        }

        if let Some(principal) = self.sessions.get(request_id).await {
            self.reattach(extensions, principal.clone());
            return Some(principal);
        }

        if let Some(principal) = self.most_recent.get() {
            self.reattach(extensions, principal.clone());
            return Some(principal);
        }

        None
    }

    /// Records a freshly authenticated Principal across all recovery
    /// layers — called once, right after the Authentication Resolver
    /// succeeds.
    pub async fn record(&self, request_id: &str, principal: Principal) {
        set_current(principal.clone());
        self.sessions.put(request_id, principal.clone()).await;
        self.most_recent.set(principal);
    }

    fn reattach(&self, extensions: &mut Extensions, principal: Principal) {
        set_current(principal.clone());
        extensions.insert(principal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry() -> ContextRegistry {
        ContextRegistry::new(SessionStore::new(10, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn recovers_from_session_store_when_context_is_empty() {
        let registry = registry();
        registry.record("req-1", Principal::new("1", "alice", "USER")).await;

        let mut extensions = Extensions::new();
        scope(async {
            let recovered = registry.recover("req-1", &mut extensions).await;
            assert_eq!(recovered.unwrap().username, "alice");
        })
        .await;
    }

    #[tokio::test]
    async fn falls_back_to_most_recent_principal_for_unknown_request_id() {
        let registry = registry();
        registry.record("req-1", Principal::new("1", "alice", "USER")).await;

        let mut extensions = Extensions::new();
        scope(async {
            let recovered = registry.recover("req-unrelated", &mut extensions).await;
            assert_eq!(recovered.unwrap().username, "alice");
        })
        .await;
    }

    #[tokio::test]
    async fn returns_none_when_nothing_was_ever_recorded() {
        let registry = registry();
        let mut extensions = Extensions::new();
        scope(async {
            assert!(registry.recover("req-1", &mut extensions).await.is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn extensions_short_circuit_once_populated() {
        let registry = registry();
        let mut extensions = Extensions::new();
        extensions.insert(Principal::new("2", "bob", "ADMIN"));

        scope(async {
            let recovered = registry.recover("req-anything", &mut extensions).await;
            assert_eq!(recovered.unwrap().username, "bob");
        })
        .await;
    }
}
