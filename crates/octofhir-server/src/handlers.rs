//! HTTP surface: the unauthenticated health/root endpoints, and the single
//! `/fhir/{*rest}` catch-all that implements the request pipeline (C9).
//!
//! The `{type}`/`{id}`/`{version}` path segments are hand-parsed rather than
//! expressed as axum route parameters: `/fhir/Patient/123` and
//! `/fhir/r5/Patient/123` are both two- and four-segment paths once the
//! optional version prefix is accounted for, and axum's router cannot
//! register two overlapping dynamic patterns unambiguously. `VersionResolver`
//! (C3) does this parsing the same way regardless of how the path reached it.

use std::collections::HashMap;
use std::str::FromStr;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use octofhir_api::{ApiError, ApiResponse, Bundle};
use octofhir_core::error::ErrorKind;
use octofhir_core::plugin::{
    AmbientContext, OperationType, PluginContext, RequestDescriptor, ambient,
};
use octofhir_core::{CoreError, FhirVersion, ResourceType, Result as CoreResult};

use crate::resource_service::{ReadOutcome, WriteOutcome};
use crate::server::AppState;

#[derive(serde::Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn root() -> impl IntoResponse {
    axum::Json(json!({
        "service": "octofhir-server",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn healthz() -> impl IntoResponse {
    axum::Json(HealthResponse { status: "ok" })
}

pub async fn readyz() -> impl IntoResponse {
    axum::Json(HealthResponse { status: "ready" })
}

pub async fn metadata(State(state): State<AppState>) -> impl IntoResponse {
    let resource_types = state.registry.resource_types();
    let mut builder = octofhir_api::CapabilityStatementBuilder::new_json_r4b()
        .fhir_version(state.config.fhir.version.clone());
    for resource_type in resource_types {
        let Some(config) = state.registry.get(&resource_type) else {
            continue;
        };
        if !config.enabled {
            continue;
        }
        builder = builder.add_resource(resource_type, &enabled_interaction_codes(&config), Vec::new());
    }
    let default_version = state.version_resolver.resolve("").version;
    let mut response = axum::Json(builder.build()).into_response();
    if let Ok(value) = axum::http::HeaderValue::from_str(&default_version.to_string()) {
        response
            .headers_mut()
            .insert(axum::http::HeaderName::from_static("x-fhir-version"), value);
    }
    response
}

fn enabled_interaction_codes(config: &octofhir_config::ResourceConfig) -> Vec<&'static str> {
    use octofhir_config::Interaction::*;
    [
        (Read, "read"),
        (Vread, "vread-instance"),
        (Create, "create"),
        (Update, "update"),
        (Patch, "patch"),
        (Delete, "delete"),
        (Search, "search-type"),
        (History, "history-instance"),
    ]
    .into_iter()
    .filter(|(interaction, _)| config.interactions.allows(*interaction))
    .map(|(_, code)| code)
    .collect()
}

/// Everything the path parser extracted before dispatch: which FHIR
/// version applies, the resource type, and — depending on how many
/// segments followed it — an id and/or a specific version id.
enum ParsedPath {
    /// `/fhir[/r5]` or `/fhir[/r5]/` — nothing left to resolve.
    Root,
    /// `/fhir[/r5]/_history` — whole-system history.
    SystemHistory,
    /// `/fhir[/r5]/{type}` — collection-level: CREATE (POST) or SEARCH (GET).
    Collection { resource_type: String },
    /// `/fhir[/r5]/{type}/_search` — collection-level SEARCH with
    /// body-encoded parameters (POST).
    TypeSearch { resource_type: String },
    /// `/fhir[/r5]/{type}/_history` — type-level history.
    TypeHistory { resource_type: String },
    /// `/fhir[/r5]/{type}/{id}` — instance-level: READ/UPDATE/PATCH/DELETE.
    Instance { resource_type: String, id: String },
    /// `/fhir[/r5]/{type}/{id}/_history` — instance-level history.
    InstanceHistory { resource_type: String, id: String },
    /// `/fhir[/r5]/{type}/{id}/_history/{vid}` — VREAD.
    Vread {
        resource_type: String,
        id: String,
        version_id: String,
    },
    /// `/fhir[/r5]/{type}[/{id}]/${op}` — extended operation (POST).
    Operation {
        resource_type: String,
        id: Option<String>,
        operation_code: String,
    },
}

fn parse_path(remaining: &str) -> Result<ParsedPath, ApiError> {
    let segments: Vec<&str> = remaining.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [] => Ok(ParsedPath::Root),
        ["_history"] => Ok(ParsedPath::SystemHistory),
        [resource_type] => Ok(ParsedPath::Collection {
            resource_type: resource_type.to_string(),
        }),
        [resource_type, "_search"] => Ok(ParsedPath::TypeSearch {
            resource_type: resource_type.to_string(),
        }),
        [resource_type, "_history"] => Ok(ParsedPath::TypeHistory {
            resource_type: resource_type.to_string(),
        }),
        [resource_type, op] if op.starts_with('$') => Ok(ParsedPath::Operation {
            resource_type: resource_type.to_string(),
            id: None,
            operation_code: op.trim_start_matches('$').to_string(),
        }),
        [resource_type, id] => Ok(ParsedPath::Instance {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        }),
        [resource_type, id, "_history"] => Ok(ParsedPath::InstanceHistory {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        }),
        [resource_type, id, op] if op.starts_with('$') => Ok(ParsedPath::Operation {
            resource_type: resource_type.to_string(),
            id: Some(id.to_string()),
            operation_code: op.trim_start_matches('$').to_string(),
        }),
        [resource_type, id, "_history", version_id] => Ok(ParsedPath::Vread {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            version_id: version_id.to_string(),
        }),
        _ => Err(ApiError::not_found(format!("no route for '{remaining}'"))),
    }
}

fn parse_query(uri: &axum::http::Uri) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(query) = uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.entry(key.into_owned()).or_default().push(value.into_owned());
        }
    }
    params
}

/// Single entry point for every `/fhir/{*rest}` request. Implements the
/// pipeline from version resolution through to the HTTP response.
pub async fn fhir_dispatch(
    State(state): State<AppState>,
    method: Method,
    Path(rest): Path<String>,
    uri: axum::http::Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Resolved purely from the path, independent of anything that can fail
    // downstream, so every response — success or error — carries it (§4.1).
    let fhir_version = state.version_resolver.resolve(&rest).version;
    let mut response = match dispatch(&state, method, &rest, &uri, &headers, body).await {
        Ok(response) => response,
        Err(api_err) => api_err.into_response(),
    };
    if let Ok(value) = axum::http::HeaderValue::from_str(&fhir_version.to_string()) {
        response
            .headers_mut()
            .insert(axum::http::HeaderName::from_static("x-fhir-version"), value);
    }
    response
}

async fn dispatch(
    state: &AppState,
    method: Method,
    rest: &str,
    uri: &axum::http::Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let resolved_version = state.version_resolver.resolve(rest);
    let parsed = parse_path(&resolved_version.remaining_path)?;

    let tenant_header = headers
        .get(state.tenant_resolver.header_name())
        .and_then(|v| v.to_str().ok());
    let tenant_id = state
        .tenant_resolver
        .resolve(tenant_header)
        .await
        .map_err(core_error_to_api)?;

    let if_match = headers
        .get(axum::http::header::IF_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let base_url = state.config.base_url();

    match parsed {
        ParsedPath::Root => Err(ApiError::not_found("no resource type in path")),
        ParsedPath::SystemHistory => {
            let query = parse_query(uri);
            let (offset, count) = paging(&query);
            let resource_types = state.registry.resource_types();
            handle_history_system(state, &tenant_id, resolved_version.version, &resource_types, offset, count, &base_url)
                .await
        }
        ParsedPath::Collection { resource_type } => match method {
            Method::POST => {
                let body = parse_body(&body)?;
                handle_create(state, &tenant_id, resolved_version.version, &resource_type, body).await
            }
            Method::GET => {
                let query = parse_query(uri);
                handle_search(
                    state,
                    &tenant_id,
                    resolved_version.version,
                    &resource_type,
                    &query,
                    &base_url,
                )
                .await
            }
            _ => Err(ApiError::not_implemented(format!(
                "{method} not supported on the resource collection"
            ))),
        },
        ParsedPath::TypeSearch { resource_type } => match method {
            Method::POST => {
                let query = parse_form_body(&body);
                handle_search(
                    state,
                    &tenant_id,
                    resolved_version.version,
                    &resource_type,
                    &query,
                    &base_url,
                )
                .await
            }
            _ => Err(ApiError::not_implemented(format!(
                "{method} not supported on the _search endpoint"
            ))),
        },
        ParsedPath::Operation {
            resource_type,
            id,
            operation_code,
        } => match method {
            Method::POST => {
                let body = if body.is_empty() { None } else { Some(parse_body(&body)?) };
                handle_operation(
                    state,
                    &tenant_id,
                    resolved_version.version,
                    &resource_type,
                    id.as_deref(),
                    &operation_code,
                    body,
                )
                .await
            }
            _ => Err(ApiError::not_implemented(format!(
                "{method} not supported on an extended operation"
            ))),
        },
        ParsedPath::TypeHistory { resource_type } => {
            let query = parse_query(uri);
            let (offset, count) = paging(&query);
            handle_history_type(
                state,
                &tenant_id,
                resolved_version.version,
                &resource_type,
                offset,
                count,
                &base_url,
            )
            .await
        }
        ParsedPath::Instance { resource_type, id } => match method {
            Method::GET => {
                handle_read(state, &tenant_id, resolved_version.version, &resource_type, &id).await
            }
            Method::PUT => {
                let body = parse_body(&body)?;
                handle_update(
                    state,
                    &tenant_id,
                    resolved_version.version,
                    &resource_type,
                    &id,
                    body,
                    if_match.as_deref(),
                )
                .await
            }
            Method::PATCH => {
                handle_patch(
                    state,
                    &tenant_id,
                    resolved_version.version,
                    &resource_type,
                    &id,
                    &body,
                    if_match.as_deref(),
                )
                .await
            }
            Method::DELETE => {
                handle_delete(state, &tenant_id, resolved_version.version, &resource_type, &id).await
            }
            _ => Err(ApiError::not_implemented(format!(
                "{method} not supported on a resource instance"
            ))),
        },
        ParsedPath::InstanceHistory { resource_type, id } => {
            let query = parse_query(uri);
            let (offset, count) = paging(&query);
            handle_history_instance(
                state,
                &tenant_id,
                resolved_version.version,
                &resource_type,
                &id,
                offset,
                count,
                &base_url,
            )
            .await
        }
        ParsedPath::Vread {
            resource_type,
            id,
            version_id,
        } => {
            handle_vread(
                state,
                &tenant_id,
                resolved_version.version,
                &resource_type,
                &id,
                &version_id,
            )
            .await
        }
    }
}

fn paging(query: &HashMap<String, Vec<String>>) -> (usize, usize) {
    let offset = query
        .get("_offset")
        .and_then(|v| v.first())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let count = query
        .get("_count")
        .and_then(|v| v.first())
        .and_then(|v| v.parse().ok())
        .unwrap_or(20usize)
        .min(1000);
    (offset, count)
}

fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body must not be empty"));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
}

/// Parses a `POST .../_search` body as `application/x-www-form-urlencoded`
/// search parameters, the same shape `parse_query` extracts from a query
/// string (§6).
fn parse_form_body(body: &Bytes) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(body.as_ref()) {
        params.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    params
}

/// Maps a `CoreError` (the Resource Service and Tenant Resolver's only
/// error type) to the HTTP-facing `ApiError`, by way of `ErrorKind` — the
/// single source of HTTP-status mapping (§7).
fn core_error_to_api(err: CoreError) -> ApiError {
    let message = err.to_string();
    match err.kind() {
        ErrorKind::Invalid => ApiError::unprocessable_entity(message, None),
        ErrorKind::NotFound => ApiError::not_found(message),
        ErrorKind::Gone => ApiError::gone(message),
        ErrorKind::Conflict => ApiError::conflict(message),
        ErrorKind::VersionConflict => ApiError::precondition_failed(message),
        ErrorKind::NotSupported => ApiError::not_implemented(message),
        ErrorKind::Unauthorized => ApiError::unauthorized(message),
        ErrorKind::Forbidden => ApiError::forbidden(message),
        ErrorKind::BadRequest => ApiError::bad_request(message),
        ErrorKind::Internal => ApiError::internal(message),
    }
}

fn resource_type_descriptor(resource_type: &str) -> Result<ResourceType, ApiError> {
    ResourceType::from_str(resource_type)
        .map_err(|_| ApiError::bad_request(format!("'{resource_type}' is not a valid resource type name")))
}

fn read_response(outcome: ReadOutcome) -> Response {
    ApiResponse::ok(outcome.resource)
        .with_etag_weak(outcome.version_id)
        .with_last_modified_raw(outcome.last_modified)
        .into_response()
}

fn write_response(outcome: WriteOutcome, resource_type: &str, id: &str, base_url: &str) -> Response {
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let location = axum::http::HeaderValue::from_str(&format!(
        "{base_url}/fhir/{resource_type}/{id}/_history/{}",
        outcome.version_id
    ))
    .ok();
    let mut response = ApiResponse::new(outcome.resource, status)
        .with_etag_weak(outcome.version_id)
        .with_last_modified_raw(outcome.last_modified);
    if let Some(location) = location {
        response = response.with_header(axum::http::header::LOCATION, location);
    }
    response.into_response()
}

/// Runs `op` with the Plugin Orchestrator's BEFORE and AFTER/ON_ERROR phases
/// wrapped around it, inside the ambient tenant/request-id scope the rest of
/// the pipeline (and any async plugin it schedules) observes (§4.3, §4.6).
///
/// `op` receives the possibly-BEFORE-modified input resource so a plugin
/// that mutates the payload is honored by the Resource Service call itself,
/// not just observed afterward.
async fn run_with_plugins<T, Op, Fut>(
    state: &AppState,
    descriptor: RequestDescriptor,
    mut ctx: PluginContext,
    op: Op,
) -> Result<T, ApiError>
where
    Op: FnOnce(Option<Value>) -> Fut,
    Fut: std::future::Future<Output = CoreResult<T>>,
{
    let ambient_ctx = AmbientContext {
        tenant_id: ctx.tenant_id.clone(),
        request_id: ctx.request_id,
    };
    let orchestrator = state.orchestrator.clone();

    ambient::scope(ambient_ctx, async move {
        let before = orchestrator.dispatch_before(&descriptor, &mut ctx).await;
        let input_resource = match before {
            octofhir_core::plugin::BeforePhaseResult::Proceed { resource } => resource,
            octofhir_core::plugin::BeforePhaseResult::Aborted { status, outcome } => {
                return Err(aborted_error(status, outcome));
            }
            octofhir_core::plugin::BeforePhaseResult::Failed { plugin_name, message } => {
                let err = CoreError::internal(format!("plugin '{plugin_name}' failed: {message}"));
                orchestrator.dispatch_on_error(&descriptor, &ctx, &err).await;
                return Err(core_error_to_api(err));
            }
        };
        ctx.input_resource = input_resource.clone();

        match op(input_resource).await {
            Ok(value) => {
                if let Err((plugin_name, err)) = orchestrator.dispatch_after(&descriptor, &ctx).await {
                    // A failed AFTER plugin never unwinds an already-successful
                    // write; it is logged and handed to ON_ERROR for visibility
                    // only (§4.3).
                    tracing::warn!(plugin = %plugin_name, error = %err, "AFTER plugin failed");
                    let core_err = CoreError::internal(err.to_string());
                    orchestrator.dispatch_on_error(&descriptor, &ctx, &core_err).await;
                }
                Ok(value)
            }
            Err(err) => {
                orchestrator.dispatch_on_error(&descriptor, &ctx, &err).await;
                Err(core_error_to_api(err))
            }
        }
    })
    .await
}

fn aborted_error(status: u16, outcome: Value) -> ApiError {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::FORBIDDEN);
    match status {
        StatusCode::BAD_REQUEST => ApiError::bad_request(outcome.to_string()),
        StatusCode::UNAUTHORIZED => ApiError::unauthorized(outcome.to_string()),
        StatusCode::NOT_FOUND => ApiError::not_found(outcome.to_string()),
        StatusCode::CONFLICT => ApiError::conflict(outcome.to_string()),
        _ => ApiError::forbidden(outcome.to_string()),
    }
}

async fn handle_create(
    state: &AppState,
    tenant_id: &str,
    version: FhirVersion,
    resource_type: &str,
    body: Value,
) -> Result<Response, ApiError> {
    let resource_type_owned = resource_type.to_string();
    let rt = resource_type_descriptor(resource_type)?;
    let descriptor = RequestDescriptor {
        resource_type: rt.clone(),
        operation_type: OperationType::Create,
        operation_code: None,
        fhir_version: version,
    };
    let mut ctx = PluginContext::new(OperationType::Create, version, rt, tenant_id);
    ctx.input_resource = Some(body.clone());
    let service = state.resource_service.clone();
    let base_url = state.config.base_url();

    let outcome = run_with_plugins(state, descriptor, ctx, move |input| {
        let service = service.clone();
        let resource_type = resource_type_owned.clone();
        async move {
            service
                .create(tenant_id, version, &resource_type, input.unwrap_or(body))
                .await
        }
    })
    .await?;

    let id = outcome
        .resource
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(write_response(outcome, resource_type, &id, &base_url))
}

async fn handle_read(
    state: &AppState,
    tenant_id: &str,
    version: FhirVersion,
    resource_type: &str,
    id: &str,
) -> Result<Response, ApiError> {
    let resource_type_owned = resource_type.to_string();
    let id_owned = id.to_string();
    let rt = resource_type_descriptor(resource_type)?;
    let descriptor = RequestDescriptor {
        resource_type: rt.clone(),
        operation_type: OperationType::Read,
        operation_code: None,
        fhir_version: version,
    };
    let mut ctx = PluginContext::new(OperationType::Read, version, rt, tenant_id);
    ctx.resource_id = Some(id.to_string());
    let service = state.resource_service.clone();
    let tenant_owned = tenant_id.to_string();

    let outcome = run_with_plugins(state, descriptor, ctx, move |_input| {
        let service = service.clone();
        let resource_type = resource_type_owned.clone();
        let id = id_owned.clone();
        let tenant_id = tenant_owned.clone();
        async move { service.read(&tenant_id, version, &resource_type, &id).await }
    })
    .await?;

    Ok(read_response(outcome))
}

async fn handle_vread(
    state: &AppState,
    tenant_id: &str,
    version: FhirVersion,
    resource_type: &str,
    id: &str,
    version_id: &str,
) -> Result<Response, ApiError> {
    let resource_type_owned = resource_type.to_string();
    let id_owned = id.to_string();
    let version_id_owned = version_id.to_string();
    let rt = resource_type_descriptor(resource_type)?;
    let descriptor = RequestDescriptor {
        resource_type: rt.clone(),
        operation_type: OperationType::Vread,
        operation_code: None,
        fhir_version: version,
    };
    let mut ctx = PluginContext::new(OperationType::Vread, version, rt, tenant_id);
    ctx.resource_id = Some(id.to_string());
    let service = state.resource_service.clone();
    let tenant_owned = tenant_id.to_string();

    let outcome = run_with_plugins(state, descriptor, ctx, move |_input| {
        let service = service.clone();
        let resource_type = resource_type_owned.clone();
        let id = id_owned.clone();
        let version_id = version_id_owned.clone();
        let tenant_id = tenant_owned.clone();
        async move {
            service
                .vread(&tenant_id, version, &resource_type, &id, &version_id)
                .await
        }
    })
    .await?;

    Ok(read_response(outcome))
}

async fn handle_update(
    state: &AppState,
    tenant_id: &str,
    version: FhirVersion,
    resource_type: &str,
    id: &str,
    body: Value,
    if_match: Option<&str>,
) -> Result<Response, ApiError> {
    let resource_type_owned = resource_type.to_string();
    let id_owned = id.to_string();
    let rt = resource_type_descriptor(resource_type)?;
    let descriptor = RequestDescriptor {
        resource_type: rt.clone(),
        operation_type: OperationType::Update,
        operation_code: None,
        fhir_version: version,
    };
    let mut ctx = PluginContext::new(OperationType::Update, version, rt, tenant_id);
    ctx.input_resource = Some(body.clone());
    ctx.resource_id = Some(id.to_string());
    let service = state.resource_service.clone();
    let if_match_owned = if_match.map(str::to_string);
    let tenant_owned = tenant_id.to_string();
    let base_url = state.config.base_url();

    let outcome = run_with_plugins(state, descriptor, ctx, move |input| {
        let service = service.clone();
        let resource_type = resource_type_owned.clone();
        let id = id_owned.clone();
        let tenant_id = tenant_owned.clone();
        let if_match = if_match_owned.clone();
        async move {
            service
                .update(
                    &tenant_id,
                    version,
                    &resource_type,
                    &id,
                    input.unwrap_or(body),
                    if_match.as_deref(),
                )
                .await
        }
    })
    .await?;

    Ok(write_response(outcome, resource_type, id, &base_url))
}

async fn handle_patch(
    state: &AppState,
    tenant_id: &str,
    version: FhirVersion,
    resource_type: &str,
    id: &str,
    patch_bytes: &Bytes,
    if_match: Option<&str>,
) -> Result<Response, ApiError> {
    if patch_bytes.is_empty() {
        return Err(ApiError::bad_request("PATCH body must not be empty"));
    }
    let outcome = state
        .resource_service
        .patch(tenant_id, version, resource_type, id, patch_bytes, if_match)
        .await
        .map_err(core_error_to_api)?;
    let base_url = state.config.base_url();
    Ok(write_response(outcome, resource_type, id, &base_url))
}

async fn handle_delete(
    state: &AppState,
    tenant_id: &str,
    version: FhirVersion,
    resource_type: &str,
    id: &str,
) -> Result<Response, ApiError> {
    let resource_type_owned = resource_type.to_string();
    let id_owned = id.to_string();
    let rt = resource_type_descriptor(resource_type)?;
    let descriptor = RequestDescriptor {
        resource_type: rt.clone(),
        operation_type: OperationType::Delete,
        operation_code: None,
        fhir_version: version,
    };
    let mut ctx = PluginContext::new(OperationType::Delete, version, rt, tenant_id);
    ctx.resource_id = Some(id.to_string());
    let service = state.resource_service.clone();
    let tenant_owned = tenant_id.to_string();

    let outcome = run_with_plugins(state, descriptor, ctx, move |_input| {
        let service = service.clone();
        let resource_type = resource_type_owned.clone();
        let id = id_owned.clone();
        let tenant_id = tenant_owned.clone();
        async move { service.delete(&tenant_id, version, &resource_type, &id).await }
    })
    .await?;

    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Ok(etag) = axum::http::HeaderValue::from_str(&format!("W/\"{}\"", outcome.version_id)) {
        response.headers_mut().insert(axum::http::header::ETAG, etag);
    }
    Ok(response)
}

async fn handle_search(
    state: &AppState,
    tenant_id: &str,
    version: FhirVersion,
    resource_type: &str,
    query: &HashMap<String, Vec<String>>,
    base_url: &str,
) -> Result<Response, ApiError> {
    let resource_type_owned = resource_type.to_string();
    let rt = resource_type_descriptor(resource_type)?;
    let descriptor = RequestDescriptor {
        resource_type: rt.clone(),
        operation_type: OperationType::Search,
        operation_code: None,
        fhir_version: version,
    };
    let ctx = PluginContext::new(OperationType::Search, version, rt, tenant_id);
    let service = state.resource_service.clone();
    let tenant_owned = tenant_id.to_string();
    let query_owned = query.clone();
    let base_url_owned = base_url.to_string();

    let bundle: Bundle = run_with_plugins(state, descriptor, ctx, move |_input| {
        let service = service.clone();
        let resource_type = resource_type_owned.clone();
        let tenant_id = tenant_owned.clone();
        let query = query_owned.clone();
        let base_url = base_url_owned.clone();
        async move {
            service
                .search(&tenant_id, version, &resource_type, &query, &base_url)
                .await
        }
    })
    .await?;

    Ok(ApiResponse::ok(bundle).into_response())
}

/// Whole-system history has no single resource type to key the plugin
/// descriptor on; `"Resource"`, the FHIR base type, stands in as the
/// sentinel so a wildcard-registered plugin (`resource_type: None`) still
/// matches regardless (§4.3, §6).
async fn handle_history_system(
    state: &AppState,
    tenant_id: &str,
    version: FhirVersion,
    resource_types: &[String],
    offset: usize,
    count: usize,
    base_url: &str,
) -> Result<Response, ApiError> {
    let rt = resource_type_descriptor("Resource")?;
    let descriptor = RequestDescriptor {
        resource_type: rt.clone(),
        operation_type: OperationType::History,
        operation_code: None,
        fhir_version: version,
    };
    let ctx = PluginContext::new(OperationType::History, version, rt, tenant_id);
    let service = state.resource_service.clone();
    let tenant_owned = tenant_id.to_string();
    let resource_types_owned = resource_types.to_vec();
    let base_url_owned = base_url.to_string();

    let bundle: Bundle = run_with_plugins(state, descriptor, ctx, move |_input| {
        let service = service.clone();
        let tenant_id = tenant_owned.clone();
        let resource_types = resource_types_owned.clone();
        let base_url = base_url_owned.clone();
        async move {
            service
                .history_system(&tenant_id, &resource_types, offset, count, &base_url)
                .await
        }
    })
    .await?;

    Ok(ApiResponse::ok(bundle).into_response())
}

async fn handle_history_type(
    state: &AppState,
    tenant_id: &str,
    version: FhirVersion,
    resource_type: &str,
    offset: usize,
    count: usize,
    base_url: &str,
) -> Result<Response, ApiError> {
    let resource_type_owned = resource_type.to_string();
    let rt = resource_type_descriptor(resource_type)?;
    let descriptor = RequestDescriptor {
        resource_type: rt.clone(),
        operation_type: OperationType::History,
        operation_code: None,
        fhir_version: version,
    };
    let ctx = PluginContext::new(OperationType::History, version, rt, tenant_id);
    let service = state.resource_service.clone();
    let tenant_owned = tenant_id.to_string();
    let base_url_owned = base_url.to_string();

    let bundle: Bundle = run_with_plugins(state, descriptor, ctx, move |_input| {
        let service = service.clone();
        let resource_type = resource_type_owned.clone();
        let tenant_id = tenant_owned.clone();
        let base_url = base_url_owned.clone();
        async move {
            service
                .history_type(&tenant_id, version, &resource_type, offset, count, &base_url)
                .await
        }
    })
    .await?;

    Ok(ApiResponse::ok(bundle).into_response())
}

async fn handle_history_instance(
    state: &AppState,
    tenant_id: &str,
    version: FhirVersion,
    resource_type: &str,
    id: &str,
    offset: usize,
    count: usize,
    base_url: &str,
) -> Result<Response, ApiError> {
    let resource_type_owned = resource_type.to_string();
    let id_owned = id.to_string();
    let rt = resource_type_descriptor(resource_type)?;
    let descriptor = RequestDescriptor {
        resource_type: rt.clone(),
        operation_type: OperationType::History,
        operation_code: None,
        fhir_version: version,
    };
    let mut ctx = PluginContext::new(OperationType::History, version, rt, tenant_id);
    ctx.resource_id = Some(id.to_string());
    let service = state.resource_service.clone();
    let tenant_owned = tenant_id.to_string();
    let base_url_owned = base_url.to_string();

    let bundle: Bundle = run_with_plugins(state, descriptor, ctx, move |_input| {
        let service = service.clone();
        let resource_type = resource_type_owned.clone();
        let id = id_owned.clone();
        let tenant_id = tenant_owned.clone();
        let base_url = base_url_owned.clone();
        async move {
            service
                .history_instance(&tenant_id, version, &resource_type, &id, offset, count, &base_url)
                .await
        }
    })
    .await?;

    Ok(ApiResponse::ok(bundle).into_response())
}

/// Extended operations (`$validate`, `$everything`, ...) have no built-in
/// core behavior — conformance/operation execution is out of scope (§1) —
/// so the core callback always reports `NotSupported`. A BEFORE plugin
/// registered for the matching `operation_code` can still fully handle the
/// request via the orchestrator's abort mechanism (§4.3).
async fn handle_operation(
    state: &AppState,
    tenant_id: &str,
    version: FhirVersion,
    resource_type: &str,
    id: Option<&str>,
    operation_code: &str,
    body: Option<Value>,
) -> Result<Response, ApiError> {
    let resource_type_owned = resource_type.to_string();
    let operation_code_owned = operation_code.to_string();
    let rt = resource_type_descriptor(resource_type)?;
    let descriptor = RequestDescriptor {
        resource_type: rt.clone(),
        operation_type: OperationType::Operation,
        operation_code: Some(operation_code.to_string()),
        fhir_version: version,
    };
    let mut ctx = PluginContext::new(OperationType::Operation, version, rt, tenant_id);
    ctx.resource_id = id.map(str::to_string);
    ctx.input_resource = body;

    let value: Value = run_with_plugins(state, descriptor, ctx, move |_input| {
        let resource_type = resource_type_owned.clone();
        let operation_code = operation_code_owned.clone();
        async move { Err(CoreError::not_supported(resource_type, format!("${operation_code}"))) }
    })
    .await?;

    Ok(ApiResponse::ok(value).into_response())
}
