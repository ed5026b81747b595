//! The Path Mapping Engine (§4.4): translates between the WebDAV namespace
//! and the backend's flat id space, with the four caches the spec names —
//! path→mapping, id→mapping, directory-listing, and the per-user tree.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::common::config::PathMapConfig;
use crate::domain::path_mapping::PathMapping;
use crate::domain::path_node::PathNode;
use crate::pathmap::disambiguate::disambiguate_listing;
use crate::pathmap::normalize::{normalize, segments};
use crate::pathmap::tree::TreeCache;
use crate::rpc::{BackendRpcClient, RpcCallMeta};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathMapError {
    #[error("path not found")]
    NotFound,
    #[error("ascent depth limit exceeded")]
    DepthLimitExceeded,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub backend_file_id: u64,
    pub original_name: String,
    pub webdav_name: String,
    pub is_directory: bool,
}

pub struct PathMappingEngine {
    backend: Arc<dyn BackendRpcClient>,
    tree: TreeCache,
    path_to_id: moka::future::Cache<String, PathMapping>,
    id_to_path: moka::future::Cache<String, PathMapping>,
    dir_listings: moka::future::Cache<String, Vec<DirEntry>>,
    dav_prefix: String,
    ascend_depth_limit: u32,
}

impl PathMappingEngine {
    pub fn new(backend: Arc<dyn BackendRpcClient>, config: &PathMapConfig) -> Self {
        let cache_size = config.path_cache_size;
        Self {
            backend,
            tree: TreeCache::new(),
            path_to_id: moka::future::Cache::builder().max_capacity(cache_size).build(),
            id_to_path: moka::future::Cache::builder().max_capacity(cache_size).build(),
            dir_listings: moka::future::Cache::builder().max_capacity(cache_size).build(),
            dav_prefix: config.dav_prefix.clone(),
            ascend_depth_limit: config.ascend_depth_limit,
        }
    }

    /// §4.4 path-to-id resolution, steps 1-4. `user_id` is the authenticated
    /// user's backend id, supplied by the caller from the Request Context
    /// rather than parsed out of the path — every cache and tree lookup
    /// below is scoped by this argument, so a path can never resolve into
    /// another user's tree regardless of what it contains. This is
    /// stronger than the "reject if the segment doesn't match" check the
    /// string-based `/<user-id>/<rest>` internal-path model would need.
    pub async fn resolve_path_to_id(&self, user_id: u64, webdav_path: &str) -> Result<u64, PathMapError> {
        let normalized = normalize(webdav_path).map_err(|_| PathMapError::NotFound)?;
        let rest = self.strip_dav_prefix(&normalized);
        let cache_key = format!("{user_id}:{rest}");

        if let Some(mut mapping) = self.path_to_id.get(&cache_key).await {
            mapping.touch();
            let id = mapping.backend_file_id;
            self.path_to_id.insert(cache_key, mapping).await;
            return Ok(id);
        }

        let tree = self.tree.tree_for(user_id);
        let guard = tree.read().await;
        let segs = segments(&rest);
        let node = if segs.is_empty() { Some(&*guard) } else { guard.walk(&segs) };
        let node = node.ok_or(PathMapError::NotFound)?;

        let mapping = PathMapping {
            full_path: rest.clone(),
            backend_file_id: node.file_id,
            user_id,
            original_name: node.original_name.clone(),
            webdav_name: node.webdav_name.clone(),
            parent_id: node.parent_id,
            is_directory: node.is_directory,
            created_at: Utc::now(),
            last_access: Utc::now(),
        };
        self.populate_both_caches(user_id, mapping.clone()).await;
        Ok(mapping.backend_file_id)
    }

    fn strip_dav_prefix(&self, normalized: &str) -> String {
        normalized.strip_prefix(&self.dav_prefix).unwrap_or(normalized).to_string()
    }

    /// §4.4 id-to-path resolution: cache hit, or ascend via `parent-id`
    /// through the backend, bounded by the configured depth limit.
    pub async fn resolve_id_to_path(&self, user_id: u64, file_id: u64) -> Result<String, PathMapError> {
        let cache_key = format!("{user_id}:{file_id}");
        if let Some(mapping) = self.id_to_path.get(&cache_key).await {
            return Ok(format!("{}/{}", self.dav_prefix, mapping.full_path.trim_start_matches('/')));
        }

        let mut segments = Vec::new();
        let mut current_id = file_id;
        let meta = RpcCallMeta { user_id: Some(user_id.to_string()), ..Default::default() };

        for depth in 0..self.ascend_depth_limit {
            if current_id == 0 {
                break;
            }
            let result = self
                .backend
                .get_file_metadata(&current_id.to_string(), &meta)
                .await
                .map_err(|_| PathMapError::NotFound)?;
            let metadata = result.metadata.ok_or(PathMapError::NotFound)?;
            segments.push(metadata.name.clone());
            match metadata.parent_id {
                Some(parent_id) => current_id = parent_id,
                None => break,
            }
            if depth + 1 == self.ascend_depth_limit {
                return Err(PathMapError::DepthLimitExceeded);
            }
        }

        segments.reverse();
        let full_path = format!("/{}", segments.join("/"));
        Ok(format!("{}{}", self.dav_prefix, full_path))
    }

    /// §4.4 "duplicate-name disambiguation" + directory listing cache.
    /// `raw_names` is the backend's listing order; `ids`/`original_names`
    /// line up by index.
    pub async fn list_directory(
        &self,
        user_id: u64,
        parent_id: u64,
        entries: Vec<(u64, String, bool)>,
    ) -> Vec<DirEntry> {
        let cache_key = format!("{user_id}:{parent_id}");
        if let Some(cached) = self.dir_listings.get(&cache_key).await {
            return cached;
        }

        let names: Vec<String> = entries.iter().map(|(_, name, _)| name.clone()).collect();
        let disambiguated = disambiguate_listing(&names);

        let result: Vec<DirEntry> = entries
            .into_iter()
            .zip(disambiguated)
            .map(|((id, original_name, is_directory), webdav_name)| DirEntry {
                backend_file_id: id,
                original_name,
                webdav_name,
                is_directory,
            })
            .collect();

        self.dir_listings.insert(cache_key, result.clone()).await;
        result
    }

    async fn populate_both_caches(&self, user_id: u64, mapping: PathMapping) {
        let path_key = format!("{}:{}", user_id, mapping.full_path);
        let id_key = format!("{}:{}", user_id, mapping.backend_file_id);
        self.path_to_id.insert(path_key, mapping.clone()).await;
        self.id_to_path.insert(id_key, mapping).await;
    }

    /// `registerPath` (§4.4 Mutation): inserts a node into the user's tree
    /// and both the path/id caches.
    pub async fn register_path(&self, user_id: u64, parent_path_segments: &[&str], node: PathNode) {
        let tree = self.tree.tree_for(user_id);
        let mut guard = tree.write().await;
        let parent = if parent_path_segments.is_empty() {
            Some(&mut *guard)
        } else {
            guard.walk_mut(parent_path_segments)
        };
        if let Some(parent) = parent {
            parent.insert_child(node.clone());
        }
        drop(guard);

        let full_path = format!("/{}/{}", parent_path_segments.join("/"), node.webdav_name)
            .replace("//", "/");
        let mapping = PathMapping {
            full_path,
            backend_file_id: node.file_id,
            user_id,
            original_name: node.original_name,
            webdav_name: node.webdav_name,
            parent_id: node.parent_id,
            is_directory: node.is_directory,
            created_at: Utc::now(),
            last_access: Utc::now(),
        };
        self.populate_both_caches(user_id, mapping).await;
    }

    /// `removePath`.
    pub async fn remove_path(&self, user_id: u64, parent_path_segments: &[&str], webdav_name: &str) {
        let tree = self.tree.tree_for(user_id);
        let mut guard = tree.write().await;
        let parent = if parent_path_segments.is_empty() {
            Some(&mut *guard)
        } else {
            guard.walk_mut(parent_path_segments)
        };
        if let Some(parent) = parent {
            parent.remove_child(webdav_name);
        }
        drop(guard);

        let full_path = format!("/{}/{}", parent_path_segments.join("/"), webdav_name).replace("//", "/");
        let path_key = format!("{}:{}", user_id, full_path);
        self.path_to_id.invalidate(&path_key).await;
    }

    /// `updatePath(old, new, id)`: remove-then-put, preserving `created-at`.
    /// The tree write lock held across both halves keeps readers from
    /// observing an intermediate state where neither name resolves.
    pub async fn update_path(
        &self,
        user_id: u64,
        old_parent_segments: &[&str],
        old_name: &str,
        new_parent_segments: &[&str],
        node: PathNode,
    ) {
        let tree = self.tree.tree_for(user_id);
        let mut guard = tree.write().await;

        let created_at = {
            let old_key = format!("{}:{}", user_id, format!("/{}/{}", old_parent_segments.join("/"), old_name).replace("//", "/"));
            self.path_to_id.get(&old_key).await.map(|m| m.created_at)
        };

        if let Some(parent) = if old_parent_segments.is_empty() { Some(&mut *guard) } else { guard.walk_mut(old_parent_segments) } {
            parent.remove_child(old_name);
        }
        if let Some(parent) = if new_parent_segments.is_empty() { Some(&mut *guard) } else { guard.walk_mut(new_parent_segments) } {
            parent.insert_child(node.clone());
        }
        drop(guard);

        let old_full_path = format!("/{}/{}", old_parent_segments.join("/"), old_name).replace("//", "/");
        self.path_to_id.invalidate(&format!("{}:{}", user_id, old_full_path)).await;

        let new_full_path = format!("/{}/{}", new_parent_segments.join("/"), node.webdav_name).replace("//", "/");
        let mapping = PathMapping {
            full_path: new_full_path,
            backend_file_id: node.file_id,
            user_id,
            original_name: node.original_name,
            webdav_name: node.webdav_name,
            parent_id: node.parent_id,
            is_directory: node.is_directory,
            created_at: created_at.unwrap_or_else(Utc::now),
            last_access: Utc::now(),
        };
        self.populate_both_caches(user_id, mapping).await;
    }

    /// Current path→id cache size, for admin introspection.
    pub fn path_to_id_entry_count(&self) -> u64 {
        self.path_to_id.entry_count()
    }

    /// Evicts every entry for `user_id` across all four caches (§4.4
    /// Mutation, last paragraph): the tree, both id/path caches, and the
    /// directory listing cache.
    pub async fn clear_user_cache(&self, user_id: u64) {
        self.tree.clear_user(user_id);
        let prefix = format!("{user_id}:");
        self.path_to_id.invalidate_entries_if(move |k, _| k.starts_with(&prefix)).ok();
        let prefix = format!("{user_id}:");
        self.id_to_path.invalidate_entries_if(move |k, _| k.starts_with(&prefix)).ok();
        let prefix = format!("{user_id}:");
        self.dir_listings.invalidate_entries_if(move |k, _| k.starts_with(&prefix)).ok();
    }
}
