//! Per-user path tree storage (§4.4). One `PathNode` root per user,
//! guarded by an `RwLock` so concurrent readers can walk it while a single
//! writer mutates it during `registerPath`/`removePath`/`updatePath`.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::domain::path_node::PathNode;

#[derive(Default)]
pub struct TreeCache {
    trees: DashMap<u64, Arc<RwLock<PathNode>>>,
}

impl TreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree_for(&self, user_id: u64) -> Arc<RwLock<PathNode>> {
        self.trees.entry(user_id).or_insert_with(|| Arc::new(RwLock::new(PathNode::root(user_id)))).clone()
    }

    pub fn clear_user(&self, user_id: u64) {
        self.trees.remove(&user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tree_for_creates_an_empty_root_on_first_access() {
        let cache = TreeCache::new();
        let tree = cache.tree_for(7);
        let guard = tree.read().await;
        assert_eq!(guard.file_id, 0);
        assert!(guard.children.is_empty());
    }

    #[tokio::test]
    async fn tree_for_returns_the_same_tree_on_repeat_access() {
        let cache = TreeCache::new();
        {
            let tree = cache.tree_for(7);
            let mut guard = tree.write().await;
            guard.insert_child(PathNode::child(1, "a", "a", 0, false, 7));
        }
        let tree = cache.tree_for(7);
        assert_eq!(tree.read().await.children.len(), 1);
    }

    #[test]
    fn clear_user_drops_the_tree() {
        let cache = TreeCache::new();
        cache.tree_for(7);
        cache.clear_user(7);
        assert!(cache.trees.is_empty());
    }
}
