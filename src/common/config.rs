//! Runtime configuration, assembled from environment variables the way the
//! teacher's `AppConfig` is: one struct per concern, a `from_env` constructor,
//! and `Duration`-returning helpers at the call sites that need them.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::security::ip_tables::DEFAULT_TEST_JWT_SECRET;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Bounds for a single TTL+size cache (Auth Cache, Revocation Cache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size: u64,
    pub expire_minutes: u64,
}

impl CacheConfig {
    pub fn expire(&self) -> Duration {
        Duration::from_secs(self.expire_minutes * 60)
    }
}

/// §6 rate-limit knobs.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub ip_requests_per_minute: u32,
    pub user_requests_per_minute: u32,
    pub global_requests_per_second: u32,
    pub cache_size: u64,
}

/// §6 IP allow/deny configuration.
#[derive(Debug, Clone)]
pub struct IpAccessConfig {
    pub whitelist_enabled: bool,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

/// §6 JWT validation knobs.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
}

/// §6 upload streaming knobs.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub chunk_size: usize,
    pub timeout_seconds: u64,
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// §4.4 path mapping knobs.
#[derive(Debug, Clone)]
pub struct PathMapConfig {
    pub dav_prefix: String,
    pub ascend_depth_limit: u32,
    pub path_cache_size: u64,
}

/// §4.6 audit worker pool knobs.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub mask_pii: bool,
    pub auto_blacklist_threshold: u32,
    pub auto_blacklist_window_secs: u64,
}

/// §5 server/RPC-deadline knobs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub admin_bind_addr: SocketAddr,
    pub request_deadline_secs: u64,
}

impl ServerConfig {
    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub auth_cache: CacheConfig,
    pub revocation_cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub ip_access: IpAccessConfig,
    pub jwt: JwtConfig,
    pub upload: UploadConfig,
    pub path_map: PathMapConfig,
    pub audit: AuditConfig,
    pub server: ServerConfig,
    pub backend_base_url: String,
}

impl AppConfig {
    /// Loads configuration from the process environment, falling back to
    /// defaults suitable for local development. Called once at startup
    /// after `dotenvy::dotenv()` has had a chance to populate the process
    /// environment from a local `.env` file.
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = env_or("DAVGATE_JWT_SECRET", DEFAULT_TEST_JWT_SECRET);
        if jwt_secret == DEFAULT_TEST_JWT_SECRET && env_or("DAVGATE_ENV", "development") == "production" {
            anyhow::bail!(
                "refusing to start in production with the default JWT_TEST_ALGORITHM secret; set DAVGATE_JWT_SECRET"
            );
        }

        Ok(Self {
            auth_cache: CacheConfig {
                max_size: env_parse("DAVGATE_AUTH_CACHE_MAX_SIZE", 10_000),
                expire_minutes: env_parse("DAVGATE_AUTH_CACHE_EXPIRE_MINUTES", 15),
            },
            revocation_cache: CacheConfig {
                max_size: env_parse("DAVGATE_REVOCATION_CACHE_MAX_SIZE", 10_000),
                expire_minutes: env_parse("DAVGATE_REVOCATION_CACHE_EXPIRE_MINUTES", 5),
            },
            rate_limit: RateLimitConfig {
                ip_requests_per_minute: env_parse("DAVGATE_RATE_LIMIT_IP_PER_MINUTE", 300),
                user_requests_per_minute: env_parse("DAVGATE_RATE_LIMIT_USER_PER_MINUTE", 600),
                global_requests_per_second: env_parse("DAVGATE_RATE_LIMIT_GLOBAL_PER_SECOND", 2_000),
                cache_size: env_parse("DAVGATE_RATE_LIMIT_CACHE_SIZE", 50_000),
            },
            ip_access: IpAccessConfig {
                whitelist_enabled: env_parse("DAVGATE_IP_WHITELIST_ENABLED", false),
                whitelist: env_list("DAVGATE_IP_WHITELIST"),
                blacklist: env_list("DAVGATE_IP_BLACKLIST"),
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                issuer: env_or("DAVGATE_JWT_ISSUER", "dav-gateway"),
            },
            upload: UploadConfig {
                chunk_size: env_parse("DAVGATE_UPLOAD_CHUNK_SIZE", 1024 * 1024),
                timeout_seconds: env_parse("DAVGATE_UPLOAD_TIMEOUT_SECONDS", 300),
            },
            path_map: PathMapConfig {
                dav_prefix: env_or("DAVGATE_DAV_PREFIX", "/dav"),
                ascend_depth_limit: env_parse("DAVGATE_PATH_ASCEND_DEPTH_LIMIT", 100),
                path_cache_size: env_parse("DAVGATE_PATH_CACHE_SIZE", 10_000),
            },
            audit: AuditConfig {
                worker_count: env_parse("DAVGATE_AUDIT_WORKERS", 2),
                queue_capacity: env_parse("DAVGATE_AUDIT_QUEUE_CAPACITY", 4_096),
                mask_pii: env_parse("DAVGATE_AUDIT_MASK_PII", true),
                auto_blacklist_threshold: env_parse("DAVGATE_AUTO_BLACKLIST_THRESHOLD", 10),
                auto_blacklist_window_secs: env_parse("DAVGATE_AUTO_BLACKLIST_WINDOW_SECS", 300),
            },
            server: ServerConfig {
                bind_addr: env_or("DAVGATE_BIND_ADDR", "0.0.0.0:8080").parse()?,
                admin_bind_addr: env_or("DAVGATE_ADMIN_BIND_ADDR", "127.0.0.1:8081").parse()?,
                request_deadline_secs: env_parse("DAVGATE_REQUEST_DEADLINE_SECS", 30),
            },
            backend_base_url: env_or("DAVGATE_BACKEND_BASE_URL", "http://127.0.0.1:9090"),
        })
    }

    /// A configuration suitable for tests: small caches, short TTLs, no
    /// environment dependency.
    pub fn for_tests() -> Self {
        Self {
            auth_cache: CacheConfig { max_size: 100, expire_minutes: 5 },
            revocation_cache: CacheConfig { max_size: 100, expire_minutes: 5 },
            rate_limit: RateLimitConfig {
                ip_requests_per_minute: 5,
                user_requests_per_minute: 5,
                global_requests_per_second: 100,
                cache_size: 100,
            },
            ip_access: IpAccessConfig {
                whitelist_enabled: false,
                whitelist: vec![],
                blacklist: vec![],
            },
            jwt: JwtConfig {
                secret: "test-secret-not-for-production".to_string(),
                issuer: "dav-gateway-tests".to_string(),
            },
            upload: UploadConfig { chunk_size: 1024 * 1024, timeout_seconds: 30 },
            path_map: PathMapConfig {
                dav_prefix: "/dav".to_string(),
                ascend_depth_limit: 100,
                path_cache_size: 1_000,
            },
            audit: AuditConfig {
                worker_count: 1,
                queue_capacity: 64,
                mask_pii: true,
                auto_blacklist_threshold: 3,
                auto_blacklist_window_secs: 60,
            },
            server: ServerConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                admin_bind_addr: "127.0.0.1:0".parse().unwrap(),
                request_deadline_secs: 5,
            },
            backend_base_url: "http://127.0.0.1:0".to_string(),
        }
    }
}
