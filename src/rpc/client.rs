//! The sole outbound dependency: the backend file-management RPC peer.
//!
//! spec.md treats the wire format as opaque; this module treats it as
//! JSON-over-HTTP, with the out-of-band metadata of §6 (`client-ip`,
//! `user-agent`, `request-id`, `user-id`) carried as request headers rather
//! than folded into the JSON body, so the backend can log/attribute a call
//! without parsing it.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend rejected credentials")]
    Unauthenticated,
    #[error("backend denied permission")]
    PermissionDenied,
    #[error("backend returned malformed response: {0}")]
    Malformed(String),
    #[error("internal error calling backend: {0}")]
    Internal(String),
}

/// Out-of-band call metadata, attached to every RPC as headers (§2, §6).
#[derive(Debug, Clone, Default)]
pub struct RpcCallMeta {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateResult {
    pub success: bool,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub jwt: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationResult {
    pub success: bool,
    pub revoked: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadataResult {
    pub exists: bool,
    pub metadata: Option<BackendFileMetadata>,
}

/// Wire shape of `FileMetadata` as reported by the backend; translated into
/// `domain::file_metadata::FileMetadata` by the Path Mapping Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendFileMetadata {
    pub id: u64,
    pub name: String,
    pub parent_id: Option<u64>,
    pub is_directory: bool,
    pub size: u64,
    pub content_type: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub modified_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessFileRequest {
    pub operation: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessFileResponse {
    pub payload: serde_json::Value,
}

pub type ByteStream = std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, RpcError>> + Send>>;

/// Port the core depends on; `HttpBackendRpcClient` is the production
/// adapter, `mock::MockBackendRpcClient` stands in for tests.
#[async_trait]
pub trait BackendRpcClient: Send + Sync {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        meta: &RpcCallMeta,
    ) -> Result<AuthenticateResult, RpcError>;

    async fn check_jwt_revocation(
        &self,
        token: &str,
        token_id: Option<&str>,
        user_id: Option<&str>,
        meta: &RpcCallMeta,
    ) -> Result<RevocationResult, RpcError>;

    async fn get_file_metadata(
        &self,
        path_or_id: &str,
        meta: &RpcCallMeta,
    ) -> Result<FileMetadataResult, RpcError>;

    async fn process_file(
        &self,
        request: ProcessFileRequest,
        meta: &RpcCallMeta,
    ) -> Result<ProcessFileResponse, RpcError>;

    async fn upload_file(
        &self,
        path: &str,
        stream: ByteStream,
        meta: &RpcCallMeta,
    ) -> Result<(), RpcError>;

    async fn download_file(&self, path: &str, meta: &RpcCallMeta) -> Result<ByteStream, RpcError>;
}

/// `reqwest`-backed production adapter. Every call is wrapped in a
/// `tokio::time::timeout` at `deadline` (§5: default 30s, configurable); a
/// timeout or transport failure always maps to `RpcError::Unavailable` so
/// the error layer can turn it into `UPSTREAM_UNAVAILABLE` without
/// retrying (§7, §4.1).
pub struct HttpBackendRpcClient {
    http: reqwest::Client,
    base_url: String,
    deadline: Duration,
    chunk_size: usize,
}

impl HttpBackendRpcClient {
    pub fn new(base_url: impl Into<String>, deadline: Duration, chunk_size: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            deadline,
            chunk_size,
        }
    }

    fn apply_meta(&self, builder: reqwest::RequestBuilder, meta: &RpcCallMeta) -> reqwest::RequestBuilder {
        let mut builder = builder;
        if let Some(ip) = &meta.client_ip {
            builder = builder.header("X-Meta-Client-Ip", ip);
        }
        if let Some(ua) = &meta.user_agent {
            builder = builder.header("X-Meta-User-Agent", ua);
        }
        if let Some(rid) = &meta.request_id {
            builder = builder.header("X-Meta-Request-Id", rid);
        }
        if let Some(uid) = &meta.user_id {
            builder = builder.header("X-Meta-User-Id", uid);
        }
        builder
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: impl Serialize,
        meta: &RpcCallMeta,
    ) -> Result<T, RpcError> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.apply_meta(self.http.post(&url).json(&body), meta);

        let response = tokio::time::timeout(self.deadline, request.send())
            .await
            .map_err(|_| RpcError::Unavailable(format!("timed out calling {}", path)))?
            .map_err(|e| RpcError::Unavailable(e.to_string()))?;

        match response.status() {
            s if s.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| RpcError::Malformed(e.to_string())),
            reqwest::StatusCode::UNAUTHORIZED => Err(RpcError::Unauthenticated),
            reqwest::StatusCode::FORBIDDEN => Err(RpcError::PermissionDenied),
            s if s.is_server_error() => Err(RpcError::Unavailable(format!("backend {} returned {}", path, s))),
            s => Err(RpcError::Internal(format!("backend {} returned {}", path, s))),
        }
    }
}

#[async_trait]
impl BackendRpcClient for HttpBackendRpcClient {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        meta: &RpcCallMeta,
    ) -> Result<AuthenticateResult, RpcError> {
        #[derive(Serialize)]
        struct Body<'a> {
            username: &'a str,
            password: &'a str,
        }
        self.call("/rpc/authenticate", Body { username, password }, meta).await
    }

    async fn check_jwt_revocation(
        &self,
        token: &str,
        token_id: Option<&str>,
        user_id: Option<&str>,
        meta: &RpcCallMeta,
    ) -> Result<RevocationResult, RpcError> {
        #[derive(Serialize)]
        struct Body<'a> {
            token: &'a str,
            token_id: Option<&'a str>,
            user_id: Option<&'a str>,
        }
        self.call(
            "/rpc/check_jwt_revocation",
            Body { token, token_id, user_id },
            meta,
        )
        .await
    }

    async fn get_file_metadata(
        &self,
        path_or_id: &str,
        meta: &RpcCallMeta,
    ) -> Result<FileMetadataResult, RpcError> {
        #[derive(Serialize)]
        struct Body<'a> {
            path_or_id: &'a str,
        }
        self.call("/rpc/get_file_metadata", Body { path_or_id }, meta).await
    }

    async fn process_file(
        &self,
        request: ProcessFileRequest,
        meta: &RpcCallMeta,
    ) -> Result<ProcessFileResponse, RpcError> {
        self.call("/rpc/process_file", request, meta).await
    }

    async fn upload_file(&self, path: &str, stream: ByteStream, meta: &RpcCallMeta) -> Result<(), RpcError> {
        use futures::TryStreamExt;
        use tokio_util::io::{ReaderStream, StreamReader};

        let url = format!("{}/rpc/upload_file", self.base_url);
        // Re-chunk the caller's stream to `upload.chunk-size` regardless of
        // how it was originally framed (§E): go through an `AsyncRead` and
        // back out as fixed-capacity frames.
        let reader = StreamReader::new(stream.map_err(std::io::Error::other));
        let chunked = ReaderStream::with_capacity(reader, self.chunk_size);
        let body = reqwest::Body::wrap_stream(chunked);
        let request = self
            .apply_meta(self.http.put(&url).header("X-Meta-Path", path), meta)
            .body(body);

        let response = tokio::time::timeout(self.deadline, request.send())
            .await
            .map_err(|_| RpcError::Unavailable("timed out uploading".to_string()))?
            .map_err(|e| RpcError::Unavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RpcError::Unavailable(format!("upload failed with {}", response.status())))
        }
    }

    async fn download_file(&self, path: &str, meta: &RpcCallMeta) -> Result<ByteStream, RpcError> {
        use futures::TryStreamExt;
        use tokio_util::io::{ReaderStream, StreamReader};

        let url = format!("{}/rpc/download_file", self.base_url);
        let request = self.apply_meta(self.http.get(&url).header("X-Meta-Path", path), meta);

        let response = tokio::time::timeout(self.deadline, request.send())
            .await
            .map_err(|_| RpcError::Unavailable("timed out starting download".to_string()))?
            .map_err(|e| RpcError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RpcError::Unavailable(format!("download failed with {}", response.status())));
        }

        // Same re-chunking as `upload_file`, so the response body reaching
        // the WebDAV client is framed at `upload.chunk-size` too.
        let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        let stream = ReaderStream::with_capacity(reader, self.chunk_size).map_err(|e| RpcError::Unavailable(e.to_string()));
        Ok(Box::pin(stream))
    }
}
