//! In-memory stand-in for `BackendRpcClient`, used by tests across the
//! `security`, `auth` and `pathmap` modules. Hand-rolled rather than
//! built on `mockall`: the crate's dependency set stays lean (see
//! DESIGN.md) and the programmable-response shape below is closer to what
//! the test scenarios in spec.md §8 actually need.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::client::{
    AuthenticateResult, BackendRpcClient, ByteStream, FileMetadataResult, ProcessFileRequest,
    ProcessFileResponse, RevocationResult, RpcCallMeta, RpcError,
};

#[derive(Default)]
pub struct MockBackendRpcClient {
    pub users: DashMap<String, (String, String, String)>, // username -> (password, user_id, role)
    pub revoked_tokens: DashMap<String, bool>,
    pub metadata: DashMap<String, FileMetadataResult>,
    pub revocation_calls: AtomicUsize,
    pub authenticate_calls: AtomicUsize,
}

impl MockBackendRpcClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, username: &str, password: &str, user_id: &str, role: &str) -> Self {
        self.users
            .insert(username.to_string(), (password.to_string(), user_id.to_string(), role.to_string()));
        self
    }

    pub fn revoke(&self, token: &str) {
        self.revoked_tokens.insert(token.to_string(), true);
    }
}

#[async_trait]
impl BackendRpcClient for MockBackendRpcClient {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        _meta: &RpcCallMeta,
    ) -> Result<AuthenticateResult, RpcError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        match self.users.get(username) {
            Some(entry) if entry.0 == password => Ok(AuthenticateResult {
                success: true,
                user_id: Some(entry.1.clone()),
                role: Some(entry.2.clone()),
                jwt: None,
                error: None,
            }),
            _ => Ok(AuthenticateResult {
                success: false,
                user_id: None,
                role: None,
                jwt: None,
                error: Some("invalid credentials".to_string()),
            }),
        }
    }

    async fn check_jwt_revocation(
        &self,
        token: &str,
        _token_id: Option<&str>,
        _user_id: Option<&str>,
        _meta: &RpcCallMeta,
    ) -> Result<RevocationResult, RpcError> {
        self.revocation_calls.fetch_add(1, Ordering::SeqCst);
        let revoked = self.revoked_tokens.get(token).map(|v| *v).unwrap_or(false);
        Ok(RevocationResult {
            success: true,
            revoked,
            message: if revoked { "revoked".to_string() } else { "valid".to_string() },
        })
    }

    async fn get_file_metadata(
        &self,
        path_or_id: &str,
        _meta: &RpcCallMeta,
    ) -> Result<FileMetadataResult, RpcError> {
        Ok(self
            .metadata
            .get(path_or_id)
            .map(|m| m.clone())
            .unwrap_or(FileMetadataResult { exists: false, metadata: None }))
    }

    async fn process_file(
        &self,
        request: ProcessFileRequest,
        _meta: &RpcCallMeta,
    ) -> Result<ProcessFileResponse, RpcError> {
        Ok(ProcessFileResponse { payload: request.payload })
    }

    async fn upload_file(&self, _path: &str, _stream: ByteStream, _meta: &RpcCallMeta) -> Result<(), RpcError> {
        Ok(())
    }

    async fn download_file(&self, _path: &str, _meta: &RpcCallMeta) -> Result<ByteStream, RpcError> {
        use futures::stream;
        Ok(Box::pin(stream::empty()))
    }
}
