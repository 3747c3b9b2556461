//! Admin API routes
//!
//! - Groups: CRUD over the group directory
//! - IPs: CRUD over pool rows, plus bulk allocation

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use guacpool_common::{
    AddressFilter, AllocationRequest, Database, Error, NewAddress,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiJson, ApiPath, ApiQuery, ApiResult};

// ============================================================================
// State
// ============================================================================

/// Shared handler state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig) -> Self {
        Self { db, config }
    }
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateGroupRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateGroupRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListAddressesQuery {
    group: Option<String>,
    available: Option<bool>,
}

// ============================================================================
// Router
// ============================================================================

/// Routes that sit behind the admin-token middleware
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Groups
        .route("/api/groups", get(list_groups_handler).post(create_group_handler))
        .route(
            "/api/groups/:name",
            get(get_group_handler)
                .put(update_group_handler)
                .delete(delete_group_handler),
        )
        // Address pool
        .route("/api/ips", get(list_ips_handler).post(create_ip_handler))
        .route("/api/ips/bulk", post(bulk_create_ips_handler))
        .route(
            "/api/ips/:id",
            get(get_ip_handler)
                .put(update_ip_handler)
                .delete(delete_ip_handler),
        )
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.db.ping() {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "service": "guacpool-web",
                "version": guacpool_common::VERSION,
            })),
        ),
        Err(e) => {
            tracing::error!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "error",
                    "service": "guacpool-web",
                    "version": guacpool_common::VERSION,
                })),
            )
        }
    }
}

pub async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "Not found"})))
}

async fn list_groups_handler(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let groups = state.db.list_groups()?;
    Ok(Json(serde_json::json!({ "groups": groups })))
}

async fn create_group_handler(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(req), _): ApiJson<CreateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let group = state.db.create_group(&req.name, req.description.as_deref())?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn get_group_handler(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(name), _): ApiPath<String>,
) -> ApiResult<impl IntoResponse> {
    let group = state
        .db
        .get_group(&name)?
        .ok_or_else(|| Error::not_found("group", &name))?;
    Ok(Json(group))
}

async fn update_group_handler(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(name), _): ApiPath<String>,
    WithRejection(Json(req), _): ApiJson<UpdateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let group = state
        .db
        .update_group(&name, req.name.as_deref(), req.description.as_deref())?;
    Ok(Json(group))
}

async fn delete_group_handler(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(name), _): ApiPath<String>,
) -> ApiResult<impl IntoResponse> {
    state.db.delete_group(&name)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_ips_handler(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(query), _): ApiQuery<ListAddressesQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = AddressFilter {
        group: query.group.filter(|g| !g.trim().is_empty()),
        available_for_user: query.available,
    };
    let addresses = state.db.list_addresses(&filter)?;
    Ok(Json(serde_json::json!({ "addresses": addresses })))
}

async fn create_ip_handler(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(req), _): ApiJson<NewAddress>,
) -> ApiResult<impl IntoResponse> {
    ensure_groups_exist(&state.db, [req.group.as_str()])?;
    let row = state.db.create_address(&req)?;
    Ok((StatusCode::CREATED, Json(row)))
}

async fn bulk_create_ips_handler(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(req), _): ApiJson<AllocationRequest>,
) -> ApiResult<impl IntoResponse> {
    ensure_groups_exist(&state.db, req.allocations.iter().map(|a| a.group.as_str()))?;

    let rows = state.db.allocate(&req)?;
    info!("Bulk created {} address(es)", rows.len());

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "count": rows.len(),
            "addresses": rows,
        })),
    ))
}

async fn get_ip_handler(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): ApiPath<i64>,
) -> ApiResult<impl IntoResponse> {
    let row = state
        .db
        .get_address(id)?
        .ok_or_else(|| Error::not_found("address", id))?;
    Ok(Json(row))
}

async fn update_ip_handler(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): ApiPath<i64>,
    WithRejection(Json(req), _): ApiJson<NewAddress>,
) -> ApiResult<impl IntoResponse> {
    ensure_groups_exist(&state.db, [req.group.as_str()])?;
    let row = state.db.update_address(id, &req)?;
    Ok(Json(row))
}

async fn delete_ip_handler(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(id), _): ApiPath<i64>,
) -> ApiResult<impl IntoResponse> {
    if !state.db.delete_address(id)? {
        return Err(ApiError(Error::not_found("address", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Check every referenced group against the group directory
fn ensure_groups_exist<'a>(
    db: &Database,
    groups: impl IntoIterator<Item = &'a str>,
) -> Result<(), Error> {
    let unique: BTreeSet<&str> = groups.into_iter().collect();
    let mut unknown = Vec::new();
    for group in unique {
        if !db.group_exists(group)? {
            unknown.push(group);
        }
    }

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(format!("unknown group(s): {}", unknown.join(", "))))
    }
}
