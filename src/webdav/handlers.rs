//! WebDAV method handlers. A thin facade over the Security Gate,
//! Authentication Resolver, Path Mapping Engine and Resource Factory:
//! spec.md's Non-goals exclude a full WebDAV verb state machine, so only
//! the operations needed to exercise the resource-factory contract end to
//! end are implemented (§4.5, §8).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter};
use axum::Router;
use futures::TryStreamExt;

use crate::common::di::AppState;
use crate::common::errors::DomainError;
use crate::domain::request_context::RequestContext;
use crate::resource::Resource;
use crate::rpc::{ProcessFileRequest, RpcCallMeta};
use crate::security::gate::GateAction;
use crate::security::headers::{SECURITY_REASON_HEADER, WEBDAV_REALM};
use crate::security::ip_tables::client_ip_from_headers;
use crate::webdav::auth_extract::extract_basic_credentials;
use crate::webdav::propfind::{render_multistatus, PropfindEntry};

/// Builds the `MethodFilter` for a non-standard WebDAV verb (`PROPFIND`,
/// `MKCOL`, ...) that `axum`'s typed `Method` constants don't cover.
fn webdav_method(name: &'static str) -> MethodFilter {
    MethodFilter::try_from(Method::from_bytes(name.as_bytes()).expect("valid method token"))
        .expect("method filter supports arbitrary tokens")
}

pub fn webdav_routes() -> Router<Arc<AppState>> {
    let resource_methods = on(webdav_method("PROPFIND"), handle_propfind)
        .get(handle_get)
        .put(handle_put)
        .delete(handle_delete)
        .on(MethodFilter::OPTIONS, handle_options);

    Router::new()
        .route("/dav", resource_methods.clone())
        .route("/dav/*path", resource_methods)
}

/// Extracted request-scoped auth outcome: either a resolved resource to act
/// on, or a response to return immediately (gate rejection, anonymous
/// challenge).
enum Authorized {
    Resource { context: RequestContext, resource: Option<Resource> },
    Early(Response),
}

async fn authorize(state: &Arc<AppState>, headers: &HeaderMap, remote_addr: SocketAddr, method: &str, path: &str) -> Authorized {
    // Honors the reverse-proxy header chain (§6) rather than trusting the
    // raw TCP peer address, so IP whitelist/blacklist/rate-limit decisions
    // are correct behind a CDN or load balancer.
    let client_ip = client_ip_from_headers(headers, remote_addr);
    let request_id = uuid::Uuid::new_v4().to_string();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let mut context = RequestContext::new(request_id.clone(), client_ip, user_agent);

    let decision = state.security_gate.check(&context, path, method).await;
    if !decision.allowed() {
        let status = match decision.action {
            GateAction::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::FORBIDDEN,
        };
        let mut response = status.into_response();
        if let Ok(value) = header::HeaderValue::from_str(decision.reason_code()) {
            response.headers_mut().insert(SECURITY_REASON_HEADER, value);
        }
        return Authorized::Early(response);
    }

    // The gateway has no stable per-session token from the WebDAV
    // framework to key the session store on, so the client IP stands in
    // for "this session" (§4.3 recovery steps 3-5 still apply; just the
    // key is coarser than a real framework session id).
    let session_key = client_ip.to_string();
    let mut extensions = axum::http::Extensions::new();

    if let Some((username, secret)) = extract_basic_credentials(headers) {
        let meta = RpcCallMeta {
            client_ip: Some(client_ip.to_string()),
            user_agent: Some(context.user_agent.clone()),
            request_id: Some(request_id.clone()),
            user_id: None,
        };
        match state.auth_resolver.resolve(&username, &secret, &meta).await {
            Ok(principal) => {
                state.context_registry.record(&session_key, principal.clone()).await;
                context.principal = Some(principal);
            }
            Err(_) => {
                context.principal = None;
            }
        }
    } else if let Some(principal) = state.context_registry.recover(&session_key, &mut extensions).await {
        context.principal = Some(principal);
    }

    if context.principal.is_none() {
        let mut response = StatusCode::UNAUTHORIZED.into_response();
        if let Ok(value) = header::HeaderValue::from_str(&format!("Basic realm=\"{WEBDAV_REALM}\"")) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        return Authorized::Early(response);
    }

    let resource = state.resource_factory.get_resource("localhost", path, context.principal.as_ref()).await;
    Authorized::Resource { context, resource }
}

fn not_found() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

async fn handle_options() -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header("DAV", "1, 2")
        .header(header::ALLOW, "OPTIONS, GET, HEAD, PUT, DELETE, PROPFIND, MKCOL, MOVE, COPY")
        .body(Body::empty())
        .unwrap()
}

async fn handle_propfind(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let request_path = uri.path().to_string();
    match authorize(&state, &headers, addr, "PROPFIND", &request_path).await {
        Authorized::Early(response) => response,
        Authorized::Resource { resource, .. } => match resource {
            None => not_found(),
            Some(Resource::AnonymousChallenge) => StatusCode::UNAUTHORIZED.into_response(),
            Some(Resource::UserRoot { display_name }) => {
                let entry = PropfindEntry {
                    href: request_path,
                    display_name,
                    is_directory: true,
                    size: 0,
                    content_type: String::new(),
                    modified_at: chrono::Utc::now(),
                };
                multistatus_response(&[entry])
            }
            Some(Resource::Folder { metadata }) | Some(Resource::File { metadata }) => {
                let entry = PropfindEntry::from_metadata(request_path, &metadata);
                multistatus_response(&[entry])
            }
        },
    }
}

fn multistatus_response(entries: &[PropfindEntry]) -> Response {
    let body = render_multistatus(entries);
    Response::builder()
        .status(StatusCode::from_u16(207).expect("207 is a valid status code"))
        .header(header::CONTENT_TYPE, "application/xml; charset=utf-8")
        .body(Body::from(body))
        .unwrap()
}

async fn handle_get(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, DomainError> {
    let request_path = uri.path().to_string();
    match authorize(&state, &headers, addr, "GET", &request_path).await {
        Authorized::Early(response) => Ok(response),
        Authorized::Resource { resource, .. } => match resource {
            None => Ok(not_found()),
            Some(Resource::AnonymousChallenge) => Ok(StatusCode::UNAUTHORIZED.into_response()),
            Some(Resource::UserRoot { .. }) | Some(Resource::Folder { .. }) => {
                Err(DomainError::bad_request("cannot GET a collection"))
            }
            Some(Resource::File { metadata }) => {
                let meta = RpcCallMeta::default();
                let stream = state
                    .backend
                    .download_file(&metadata.backend_file_id.to_string(), &meta)
                    .await
                    .map_err(|e| DomainError::upstream_unavailable(e.to_string()))?;
                let body = Body::from_stream(stream.map_err(std::io::Error::other));
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, metadata.content_type.clone())
                    .header(header::CONTENT_LENGTH, metadata.size)
                    .body(body)
                    .unwrap())
            }
        },
    }
}

async fn handle_put(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    uri: Uri,
    body: Body,
) -> Result<Response, DomainError> {
    let request_path = uri.path().to_string();
    match authorize(&state, &headers, addr, "PUT", &request_path).await {
        Authorized::Early(response) => Ok(response),
        Authorized::Resource { context, .. } => {
            let Some(principal) = context.principal else {
                return Ok(StatusCode::UNAUTHORIZED.into_response());
            };
            let meta = RpcCallMeta { user_id: Some(principal.user_id.clone()), ..Default::default() };
            let stream = Box::pin(body.into_data_stream().map_err(|e| crate::rpc::RpcError::Internal(e.to_string())));
            state
                .backend
                .upload_file(&request_path, stream, &meta)
                .await
                .map_err(|e| DomainError::upstream_unavailable(e.to_string()))?;

            let user_id: u64 = principal.user_id.parse().unwrap_or_default();
            state.resource_factory.invalidate(user_id, &request_path).await;
            Ok(StatusCode::CREATED.into_response())
        }
    }
}

async fn handle_delete(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, DomainError> {
    let request_path = uri.path().to_string();
    match authorize(&state, &headers, addr, "DELETE", &request_path).await {
        Authorized::Early(response) => Ok(response),
        Authorized::Resource { context, resource, .. } => {
            let Some(principal) = context.principal else {
                return Ok(StatusCode::UNAUTHORIZED.into_response());
            };
            let Some(resource) = resource else {
                return Ok(not_found());
            };
            let backend_file_id = match resource {
                Resource::File { metadata } | Resource::Folder { metadata } => metadata.backend_file_id,
                _ => return Err(DomainError::bad_request("cannot DELETE this resource")),
            };

            let meta = RpcCallMeta { user_id: Some(principal.user_id.clone()), ..Default::default() };
            let request = ProcessFileRequest {
                operation: "delete".to_string(),
                payload: serde_json::json!({ "file_id": backend_file_id }),
            };
            state
                .backend
                .process_file(request, &meta)
                .await
                .map_err(|e| DomainError::upstream_unavailable(e.to_string()))?;

            let user_id: u64 = principal.user_id.parse().unwrap_or_default();
            state.resource_factory.invalidate(user_id, &request_path).await;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

