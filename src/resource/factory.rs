//! The Resource Factory (§4.5): maps `(host, request-path)` to a WebDAV
//! resource. Resources are a tagged variant (§9 "Dynamic dispatch on
//! resources") rather than a trait-object hierarchy — handlers match on
//! `Resource` directly.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::file_metadata::FileMetadata;
use crate::domain::principal::Principal;
use crate::pathmap::PathMappingEngine;
use crate::rpc::{BackendRpcClient, RpcCallMeta};

#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    /// No principal recoverable: the framework should issue a 401 with the
    /// configured realm.
    AnonymousChallenge,
    /// `/dav` or `/dav/`: synthetic root, display name = username, no
    /// backend round-trip needed.
    UserRoot { display_name: String },
    Folder { metadata: FileMetadata },
    File { metadata: FileMetadata },
}

/// Process-wide `internal-path → metadata` cache (§4.5 "Per-request
/// metadata cache"). Keyed by `<user-id>:<path>`; invalidated by the
/// mutating-verb handlers via `invalidate`.
pub struct MetadataCache {
    inner: moka::future::Cache<String, FileMetadata>,
}

impl MetadataCache {
    pub fn new(max_size: u64, ttl: Duration) -> Self {
        Self { inner: moka::future::Cache::builder().max_capacity(max_size).time_to_live(ttl).build() }
    }

    pub async fn invalidate(&self, user_id: u64, path: &str) {
        self.inner.invalidate(&format!("{user_id}:{path}")).await;
    }
}

pub struct ResourceFactory {
    backend: Arc<dyn BackendRpcClient>,
    path_map: Arc<PathMappingEngine>,
    metadata_cache: MetadataCache,
    dav_prefix: String,
}

impl ResourceFactory {
    pub fn new(
        backend: Arc<dyn BackendRpcClient>,
        path_map: Arc<PathMappingEngine>,
        metadata_cache: MetadataCache,
        dav_prefix: impl Into<String>,
    ) -> Self {
        Self { backend, path_map, metadata_cache, dav_prefix: dav_prefix.into() }
    }

    /// §4.5's decision table. `principal` is `None` when no principal could
    /// be recovered for the request (§4.3); `host` is accepted to satisfy
    /// the spec's contract shape but unused — this gateway is single-tenant
    /// per backend and doesn't branch on virtual host.
    pub async fn get_resource(&self, _host: &str, request_path: &str, principal: Option<&Principal>) -> Option<Resource> {
        let Some(principal) = principal else {
            return Some(Resource::AnonymousChallenge);
        };

        let trimmed = request_path.trim_end_matches('/');
        if trimmed.is_empty() || trimmed == self.dav_prefix {
            return Some(Resource::UserRoot { display_name: principal.username.clone() });
        }

        let user_id: u64 = principal.user_id.parse().ok()?;
        let cache_key = format!("{user_id}:{request_path}");
        if let Some(metadata) = self.metadata_cache.inner.get(&cache_key).await {
            return Some(Self::resource_for(metadata));
        }

        let file_id = self.path_map.resolve_path_to_id(user_id, request_path).await.ok()?;
        let meta = RpcCallMeta { user_id: Some(user_id.to_string()), ..Default::default() };
        let result = self.backend.get_file_metadata(&file_id.to_string(), &meta).await.ok()?;
        let backend_metadata = result.metadata?;

        let metadata = FileMetadata {
            backend_file_id: backend_metadata.id,
            display_name: backend_metadata.name,
            parent_id: backend_metadata.parent_id,
            is_directory: backend_metadata.is_directory,
            size: backend_metadata.size,
            content_type: backend_metadata.content_type,
            created_at: backend_metadata.created_at,
            modified_at: backend_metadata.modified_at,
        };
        self.metadata_cache.inner.insert(cache_key, metadata.clone()).await;
        Some(Self::resource_for(metadata))
    }

    fn resource_for(metadata: FileMetadata) -> Resource {
        if metadata.is_directory {
            Resource::Folder { metadata }
        } else {
            Resource::File { metadata }
        }
    }

    /// Invalidates the metadata cache entry touched by a mutating verb
    /// (PUT/DELETE/MOVE/COPY/PROPPATCH, §4.5).
    pub async fn invalidate(&self, user_id: u64, path: &str) {
        self.metadata_cache.invalidate(user_id, path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::PathMapConfig;
    use crate::rpc::client::BackendFileMetadata;
    use crate::rpc::mock::MockBackendRpcClient;
    use crate::rpc::FileMetadataResult;

    fn factory() -> (ResourceFactory, Arc<MockBackendRpcClient>) {
        let backend = Arc::new(MockBackendRpcClient::new());
        let config = PathMapConfig { dav_prefix: "/dav".to_string(), ascend_depth_limit: 10, path_cache_size: 100 };
        let path_map = Arc::new(PathMappingEngine::new(backend.clone(), &config));
        let cache = MetadataCache::new(100, Duration::from_secs(60));
        let factory = ResourceFactory::new(backend.clone(), path_map, cache, "/dav");
        (factory, backend)
    }

    #[tokio::test]
    async fn no_principal_yields_anonymous_challenge() {
        let (factory, _backend) = factory();
        let resource = factory.get_resource("host", "/dav/file.txt", None).await;
        assert_eq!(resource, Some(Resource::AnonymousChallenge));
    }

    #[tokio::test]
    async fn dav_root_is_synthetic_user_root() {
        let (factory, _backend) = factory();
        let principal = Principal::new("1", "alice", "USER");
        let resource = factory.get_resource("host", "/dav", Some(&principal)).await;
        assert_eq!(resource, Some(Resource::UserRoot { display_name: "alice".to_string() }));

        let resource = factory.get_resource("host", "/dav/", Some(&principal)).await;
        assert_eq!(resource, Some(Resource::UserRoot { display_name: "alice".to_string() }));
    }

    #[tokio::test]
    async fn unresolvable_path_is_none() {
        let (factory, _backend) = factory();
        let principal = Principal::new("1", "alice", "USER");
        let resource = factory.get_resource("host", "/dav/missing.txt", Some(&principal)).await;
        assert_eq!(resource, None);
    }

    #[tokio::test]
    async fn resolved_file_id_yields_file_resource() {
        let (factory, backend) = factory();
        let principal = Principal::new("1", "alice", "USER");

        factory
            .path_map
            .register_path(1, &[], crate::domain::path_node::PathNode::child(5, "a.txt", "a.txt", 0, false, 1))
            .await;

        let now = chrono::Utc::now();
        backend.metadata.insert(
            "5".to_string(),
            FileMetadataResult {
                exists: true,
                metadata: Some(BackendFileMetadata {
                    id: 5,
                    name: "a.txt".to_string(),
                    parent_id: Some(0),
                    is_directory: false,
                    size: 42,
                    content_type: "text/plain".to_string(),
                    created_at: now,
                    modified_at: now,
                }),
            },
        );

        let resource = factory.get_resource("host", "/dav/a.txt", Some(&principal)).await;
        match resource {
            Some(Resource::File { metadata }) => assert_eq!(metadata.size, 42),
            other => panic!("expected File resource, got {other:?}"),
        }
    }
}
