pub mod client;
pub mod mock;

pub use client::{
    AuthenticateResult, BackendRpcClient, ByteStream, FileMetadataResult, HttpBackendRpcClient, ProcessFileRequest,
    ProcessFileResponse, RevocationResult, RpcCallMeta, RpcError,
};
