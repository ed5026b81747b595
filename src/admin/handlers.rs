//! Read-only admin introspection surface (SPEC_FULL.md §F). Mounted on a
//! separate router/bind address from the WebDAV surface; every route
//! requires a bearer token validated with the same primitive as the main
//! auth path (§4.2), not a separate admin auth system.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::auth::token::{self, SecretKind};
use crate::common::di::AppState;

pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/health", get(health))
        .route("/admin/cache-stats", get(cache_stats))
        .route("/admin/ip-tables", get(ip_tables))
        .route("/admin/ip-tables/reload", post(reload_ip_tables))
}

fn require_admin_token(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let unauthorized = || StatusCode::UNAUTHORIZED.into_response();

    let header_value = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()).ok_or_else(unauthorized)?;
    let bearer = header_value.strip_prefix("Bearer ").ok_or_else(unauthorized)?;

    if token::classify(bearer) != SecretKind::BearerToken {
        return Err(unauthorized());
    }

    let claims = token::validate_claims(bearer, &state.config.jwt.secret, &state.config.jwt.issuer)
        .map_err(|_| unauthorized())?;

    if claims.role.as_deref() != Some("ADMIN") {
        return Err(StatusCode::FORBIDDEN.into_response());
    }

    Ok(())
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

#[derive(Serialize)]
struct CacheStatsBody {
    path_to_id_entries: u64,
    whitelist_entries: usize,
    blacklist_entries: usize,
}

async fn cache_stats(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(response) = require_admin_token(&state, &headers) {
        return response;
    }

    let (whitelist_entries, blacklist_entries) = state.ip_tables.counts();
    Json(CacheStatsBody {
        path_to_id_entries: state.path_map.path_to_id_entry_count(),
        whitelist_entries,
        blacklist_entries,
    })
    .into_response()
}

#[derive(Serialize)]
struct IpTablesBody {
    whitelist_enabled: bool,
    whitelist: Vec<String>,
    blacklist: Vec<String>,
}

async fn ip_tables(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(response) = require_admin_token(&state, &headers) {
        return response;
    }

    Json(IpTablesBody {
        whitelist_enabled: state.config.ip_access.whitelist_enabled,
        whitelist: state.config.ip_access.whitelist.clone(),
        blacklist: state.config.ip_access.blacklist.clone(),
    })
    .into_response()
}

/// Re-reads `IpAccessConfig` from the environment and swaps the
/// copy-on-write table (SPEC_FULL.md §F).
async fn reload_ip_tables(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(response) = require_admin_token(&state, &headers) {
        return response;
    }

    let fresh_config = match crate::common::config::AppConfig::from_env() {
        Ok(config) => config.ip_access,
        Err(e) => {
            tracing::warn!(error = %e, "failed to reload ip-access config");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    state.ip_tables.reload(fresh_config.whitelist_enabled, &fresh_config.whitelist, &fresh_config.blacklist);

    StatusCode::NO_CONTENT.into_response()
}
