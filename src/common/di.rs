//! Dependency wiring (`AppState`), assembled once in `main.rs` and shared
//! behind an `Arc` across the WebDAV and admin routers — mirrors the
//! teacher's `State<Arc<AppState>>` convention (see
//! `interfaces/api/handlers/webdav_handler.rs`).

use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthenticationResolver;
use crate::common::config::AppConfig;
use crate::context::{ContextRegistry, SessionStore};
use crate::pathmap::PathMappingEngine;
use crate::resource::{MetadataCache, ResourceFactory};
use crate::rpc::{BackendRpcClient, HttpBackendRpcClient};
use crate::security::audit::SecurityAudit;
use crate::security::ip_tables::IpTables;
use crate::security::rate_limiter::RateLimiter;
use crate::security::SecurityGate;

pub struct AppState {
    pub config: AppConfig,
    pub security_gate: SecurityGate,
    pub auth_resolver: AuthenticationResolver,
    pub context_registry: ContextRegistry,
    pub path_map: Arc<PathMappingEngine>,
    pub resource_factory: ResourceFactory,
    pub backend: Arc<dyn BackendRpcClient>,
    pub ip_tables: Arc<IpTables>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Arc<Self> {
        let backend: Arc<dyn BackendRpcClient> = Arc::new(HttpBackendRpcClient::new(
            config.backend_base_url.clone(),
            config.server.request_deadline(),
            config.upload.chunk_size,
        ));
        Self::build_with_backend(config, backend)
    }

    /// Same wiring as `build`, but with the backend client injected —
    /// lets integration tests swap in `MockBackendRpcClient` without
    /// opening a real RPC connection.
    pub fn build_with_backend(config: AppConfig, backend: Arc<dyn BackendRpcClient>) -> Arc<Self> {
        Self::assemble(config, backend)
    }

    fn assemble(config: AppConfig, backend: Arc<dyn BackendRpcClient>) -> Arc<Self> {
        let ip_tables = Arc::new(IpTables::new(
            config.ip_access.whitelist_enabled,
            &config.ip_access.whitelist,
            &config.ip_access.blacklist,
        ));

        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.ip_requests_per_minute,
            config.rate_limit.user_requests_per_minute,
            config.rate_limit.global_requests_per_second,
            config.rate_limit.cache_size,
        ));

        let audit = SecurityAudit::spawn(
            config.audit.worker_count,
            config.audit.queue_capacity,
            config.audit.mask_pii,
            ip_tables.clone(),
            config.audit.auto_blacklist_threshold,
            Duration::from_secs(config.audit.auto_blacklist_window_secs),
        );

        let security_gate = SecurityGate::new(ip_tables.clone(), rate_limiter, audit);

        let auth_resolver = AuthenticationResolver::new(
            backend.clone(),
            &config.auth_cache,
            &config.revocation_cache,
            config.jwt.clone(),
        );

        let context_registry = ContextRegistry::new(SessionStore::new(
            config.rate_limit.cache_size,
            Duration::from_secs(300),
        ));

        let path_map = Arc::new(PathMappingEngine::new(backend.clone(), &config.path_map));

        let metadata_cache = MetadataCache::new(config.path_map.path_cache_size, Duration::from_secs(60));
        let resource_factory = ResourceFactory::new(
            backend.clone(),
            path_map.clone(),
            metadata_cache,
            config.path_map.dav_prefix.clone(),
        );

        Arc::new(Self {
            config,
            security_gate,
            auth_resolver,
            context_registry,
            path_map,
            resource_factory,
            backend,
            ip_tables,
        })
    }
}
