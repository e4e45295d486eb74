//! Admin surface (§6): tenant CRUD outside the `/fhir` prefix.
//!
//! Every mutation here invalidates the tenant cache (`TenantResolver::
//! invalidate`) so a subsequently resolved request never sees a stale
//! enabled/disabled flag or a deleted tenant's internal id.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use octofhir_api::{ApiError, ApiResponse};

use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub code: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TenantResponse {
    pub external_id: Uuid,
    pub internal_id: String,
    pub code: String,
    pub display_name: String,
    pub enabled: bool,
}

impl From<octofhir_core::Tenant> for TenantResponse {
    fn from(t: octofhir_core::Tenant) -> Self {
        Self {
            external_id: t.external_id,
            internal_id: t.internal_id,
            code: t.code,
            display_name: t.display_name,
            enabled: t.enabled,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetLoggingLevelRequest {
    pub level: String,
}

#[derive(Debug, Serialize)]
pub struct SetLoggingLevelResponse {
    pub previous_level: String,
    pub level: String,
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/tenants", get(list_tenants).post(create_tenant))
        .route(
            "/api/admin/tenants/{external_id}/enable",
            post(enable_tenant),
        )
        .route(
            "/api/admin/tenants/{external_id}/disable",
            post(disable_tenant),
        )
        .route(
            "/api/admin/tenants/{external_id}",
            axum::routing::delete(delete_tenant),
        )
        .route("/api/admin/resources", get(list_resources))
        .route("/api/admin/logging/level", post(set_logging_level))
}

async fn list_tenants(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let tenants: Vec<TenantResponse> = state
        .tenant_directory
        .list()
        .await
        .into_iter()
        .map(TenantResponse::from)
        .collect();
    ApiResponse::ok(tenants)
}

async fn create_tenant(
    State(state): State<AppState>,
    Json(req): Json<CreateTenantRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    if req.code.trim().is_empty() {
        return Err(ApiError::bad_request("tenant code must not be empty"));
    }
    let display_name = req.display_name.unwrap_or_else(|| req.code.clone());
    let tenant = state.tenant_directory.create(req.code, display_name).await;
    Ok(ApiResponse::new(
        TenantResponse::from(tenant),
        axum::http::StatusCode::CREATED,
    ))
}

async fn enable_tenant(
    State(state): State<AppState>,
    Path(external_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let tenant = state
        .tenant_directory
        .set_enabled(external_id, true)
        .await
        .map_err(core_error_to_api)?;
    state.tenant_resolver.invalidate(&external_id);
    Ok(ApiResponse::ok(TenantResponse::from(tenant)))
}

async fn disable_tenant(
    State(state): State<AppState>,
    Path(external_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let tenant = state
        .tenant_directory
        .set_enabled(external_id, false)
        .await
        .map_err(core_error_to_api)?;
    state.tenant_resolver.invalidate(&external_id);
    Ok(ApiResponse::ok(TenantResponse::from(tenant)))
}

async fn delete_tenant(
    State(state): State<AppState>,
    Path(external_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .tenant_directory
        .delete(external_id)
        .await
        .map_err(core_error_to_api)?;
    state.tenant_resolver.invalidate(&external_id);
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// `GET /api/admin/resources` (§11): a read-only snapshot of every entry
/// currently loaded into the atomically-swapped Resource Registry, for
/// operational visibility into what the table holds right now.
async fn list_resources(
    State(state): State<AppState>,
) -> impl axum::response::IntoResponse {
    let configs: Vec<octofhir_config::ResourceConfig> = state
        .registry
        .resource_types()
        .into_iter()
        .filter_map(|rt| state.registry.get(&rt))
        .collect();
    ApiResponse::ok(configs)
}

/// `POST /api/admin/logging/level` (§11, §10.1): swaps the live
/// `tracing_subscriber::EnvFilter` through the reload handle set up by
/// `init_tracing`, reporting the level that was in effect before the
/// change.
async fn set_logging_level(
    Json(req): Json<SetLoggingLevelRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    if req.level.trim().is_empty() {
        return Err(ApiError::bad_request("level must not be empty"));
    }
    let previous_level = crate::observability::current_logging_level();
    crate::observability::apply_logging_level(&req.level);
    Ok(ApiResponse::ok(SetLoggingLevelResponse {
        previous_level,
        level: req.level,
    }))
}

/// Admin endpoints sit outside the pipeline's single error-conversion point
/// (§7 only binds `/fhir`), so they carry their own small `CoreError` ->
/// `ApiError` mapping instead of reusing the pipeline's OperationOutcome path.
fn core_error_to_api(err: octofhir_core::CoreError) -> ApiError {
    use octofhir_core::error::ErrorKind;
    match err.kind() {
        ErrorKind::NotFound => ApiError::not_found(err.to_string()),
        ErrorKind::BadRequest | ErrorKind::Invalid => ApiError::bad_request(err.to_string()),
        _ => ApiError::internal(err.to_string()),
    }
}
