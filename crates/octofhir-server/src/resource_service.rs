//! Resource Service: the eight FHIR REST interactions (CREATE, READ, VREAD,
//! UPDATE, PATCH, DELETE, SEARCH, HISTORY) implemented against
//! [`octofhir_storage::StorageRouter`] and the Resource Registry.
//!
//! This is the single place that turns a storage row into REST semantics:
//! version sequencing, optimistic concurrency, tombstone visibility, and
//! search-parameter filtering all live here. HTTP concerns (headers, status
//! codes, request parsing) stay in `handlers.rs`; this module only ever
//! talks `CoreError`.

use std::collections::HashMap;
use std::sync::Arc;

use octofhir_api::{
    Bundle, HistoryBundleEntry, HistoryBundleMethod, RawJson, bundle_from_history,
    bundle_from_search, bundle_from_system_history,
};
use octofhir_config::{Interaction, ResourceConfig, ResourceRegistry};
use octofhir_core::validation::ProfileValidator;
use octofhir_core::{CoreError, FhirVersion, Result, generate_id};
use octofhir_storage::{
    HistoryMethod, HistoryParams, SchemaDispatcher, SearchParams, StorageError, StorageRouter,
    StoredResource,
};
use serde_json::Value;
use tracing::debug;

const DEFAULT_SEARCH_COUNT: usize = 20;
const MAX_SEARCH_COUNT: usize = 1000;

/// Outcome of a READ/VREAD: just enough for the handler to build headers.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub resource: Value,
    pub version_id: String,
    pub last_modified: String,
}

/// Outcome of a CREATE/UPDATE/PATCH/DELETE.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub resource: Value,
    pub version_id: String,
    pub last_modified: String,
    /// True when this write produced the resource's very first version
    /// (a plain CREATE, or an UPDATE that behaved as update-as-create).
    pub created: bool,
}

impl ReadOutcome {
    fn from_stored(row: StoredResource) -> Self {
        Self {
            last_modified: format_rfc3339(&row.last_updated),
            version_id: row.version_id,
            resource: row.resource,
        }
    }
}

impl WriteOutcome {
    fn from_stored(row: StoredResource, created: bool) -> Self {
        Self {
            last_modified: format_rfc3339(&row.last_updated),
            version_id: row.version_id,
            resource: row.resource,
            created,
        }
    }
}

fn format_rfc3339(at: &time::OffsetDateTime) -> String {
    at.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| at.to_string())
}

/// Strips a (possibly weak) ETag/If-Match value down to the bare version id:
/// `W/"3"` or `"3"` both become `3`.
fn strip_weak_etag(value: &str) -> &str {
    value.trim().strip_prefix("W/").unwrap_or(value.trim()).trim_matches('"')
}

/// Implements CREATE/READ/VREAD/UPDATE/PATCH/DELETE/SEARCH/HISTORY against
/// whichever `StorageRouter` the Resource Registry's schema placement routes
/// a resource type to.
pub struct ResourceService {
    registry: Arc<ResourceRegistry>,
    dispatcher: Arc<SchemaDispatcher>,
    validator: Arc<dyn ProfileValidator>,
}

impl ResourceService {
    pub fn new(
        registry: Arc<ResourceRegistry>,
        dispatcher: Arc<SchemaDispatcher>,
        validator: Arc<dyn ProfileValidator>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            validator,
        }
    }

    fn config_for(&self, resource_type: &str, fhir_version: FhirVersion) -> Result<ResourceConfig> {
        let config = self
            .registry
            .get(resource_type)
            .ok_or_else(|| CoreError::invalid_resource_type(resource_type))?;
        if !config.enabled {
            return Err(CoreError::not_supported(resource_type, "any"));
        }
        if !config.versions.supports(fhir_version) {
            return Err(CoreError::version_not_supported(format!(
                "{resource_type} does not support FHIR {fhir_version}"
            )));
        }
        Ok(config)
    }

    fn check_interaction(&self, config: &ResourceConfig, interaction: Interaction) -> Result<()> {
        if !config.interactions.allows(interaction) {
            return Err(CoreError::not_supported(
                config.resource_type.clone(),
                format!("{interaction:?}").to_lowercase(),
            ));
        }
        Ok(())
    }

    fn resolve_storage(&self, config: &ResourceConfig) -> Result<Arc<dyn StorageRouter>> {
        self.dispatcher
            .resolve(&config.schema)
            .map_err(|e| CoreError::internal(e.to_string()))
    }

    async fn validate_profiles(
        &self,
        config: &ResourceConfig,
        resource: &Value,
        fhir_version: FhirVersion,
    ) -> Result<()> {
        for profile in &config.profiles {
            if !profile.required {
                continue;
            }
            let issues = self.validator.validate(resource, fhir_version, &profile.url).await;
            let messages: Vec<String> = issues
                .into_iter()
                .filter(|i| i.is_error())
                .map(|i| i.diagnostics)
                .collect();
            if !messages.is_empty() {
                return Err(CoreError::invalid_resource(messages.join("; ")));
            }
        }
        Ok(())
    }

    fn stamp(resource_type: &str, id: &str, mut body: Value) -> Value {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("resourceType".to_string(), Value::String(resource_type.to_string()));
            obj.insert("id".to_string(), Value::String(id.to_string()));
        }
        body
    }

    /// Sets `meta.versionId`/`meta.lastUpdated` on the body, preserving any
    /// other `meta` fields already present (§4.4: "Sets resource.meta.versionId
    /// = 1, meta.lastUpdated = now"). `last_updated` is the RFC3339 rendering
    /// of the exact instant the caller is about to persist as the row's own
    /// `last_updated`, so the stored content and the row agree byte-for-byte.
    fn stamp_meta(mut body: Value, version_id: &str, last_updated: &str) -> Value {
        if let Some(obj) = body.as_object_mut() {
            let meta = obj
                .entry("meta")
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Some(meta_obj) = meta.as_object_mut() {
                meta_obj.insert("versionId".to_string(), Value::String(version_id.to_string()));
                meta_obj.insert("lastUpdated".to_string(), Value::String(last_updated.to_string()));
            }
        }
        body
    }

    fn map_storage_err(resource_type: &str, id: &str, err: StorageError) -> CoreError {
        match err {
            StorageError::NotFound { .. } => CoreError::resource_not_found(resource_type, id),
            StorageError::VersionConflict { .. } => CoreError::version_conflict(resource_type, id),
            StorageError::AlreadyExists { .. } => CoreError::resource_conflict(resource_type, id),
            StorageError::InvalidResource { message } => CoreError::invalid_resource(message),
            StorageError::TransactionError { message }
            | StorageError::ConnectionError { message }
            | StorageError::Internal { message } => CoreError::internal(message),
        }
    }

    pub async fn create(
        &self,
        tenant_id: &str,
        fhir_version: FhirVersion,
        resource_type: &str,
        body: Value,
    ) -> Result<WriteOutcome> {
        let config = self.config_for(resource_type, fhir_version)?;
        self.check_interaction(&config, Interaction::Create)?;

        let id = body
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(generate_id);
        let body = Self::stamp(resource_type, &id, body);
        let now = time::OffsetDateTime::now_utc();
        let body = Self::stamp_meta(body, "1", &format_rfc3339(&now));
        self.validate_profiles(&config, &body, fhir_version).await?;

        let storage = self.resolve_storage(&config)?;
        let stored = StoredResource {
            tenant_id: tenant_id.to_string(),
            id: id.clone(),
            version_id: "1".to_string(),
            resource_type: resource_type.to_string(),
            resource: body,
            last_updated: now,
            created_at: now,
            is_current: true,
            is_deleted: false,
        };
        let saved = storage
            .save(stored)
            .await
            .map_err(|e| Self::map_storage_err(resource_type, &id, e))?;
        Ok(WriteOutcome::from_stored(saved, true))
    }

    pub async fn read(
        &self,
        tenant_id: &str,
        fhir_version: FhirVersion,
        resource_type: &str,
        id: &str,
    ) -> Result<ReadOutcome> {
        let config = self.config_for(resource_type, fhir_version)?;
        self.check_interaction(&config, Interaction::Read)?;
        let storage = self.resolve_storage(&config)?;

        match storage
            .find_current(tenant_id, resource_type, id)
            .await
            .map_err(|e| Self::map_storage_err(resource_type, id, e))?
        {
            None => Err(CoreError::resource_not_found(resource_type, id)),
            Some(row) if row.is_deleted => Err(CoreError::resource_deleted(resource_type, id)),
            Some(row) => Ok(ReadOutcome::from_stored(row)),
        }
    }

    pub async fn vread(
        &self,
        tenant_id: &str,
        fhir_version: FhirVersion,
        resource_type: &str,
        id: &str,
        version_id: &str,
    ) -> Result<ReadOutcome> {
        let config = self.config_for(resource_type, fhir_version)?;
        self.check_interaction(&config, Interaction::Vread)?;
        let storage = self.resolve_storage(&config)?;

        // A specific version is addressed directly: a tombstone is a real
        // version and is returned here even though READ would hide it
        // behind a 410.
        match storage
            .find_version(tenant_id, resource_type, id, version_id)
            .await
            .map_err(|e| Self::map_storage_err(resource_type, id, e))?
        {
            None => Err(CoreError::resource_not_found(resource_type, id)),
            Some(row) => Ok(ReadOutcome::from_stored(row)),
        }
    }

    pub async fn update(
        &self,
        tenant_id: &str,
        fhir_version: FhirVersion,
        resource_type: &str,
        id: &str,
        body: Value,
        if_match: Option<&str>,
    ) -> Result<WriteOutcome> {
        let config = self.config_for(resource_type, fhir_version)?;
        self.check_interaction(&config, Interaction::Update)?;
        let body = Self::stamp(resource_type, id, body);
        self.validate_profiles(&config, &body, fhir_version).await?;

        let storage = self.resolve_storage(&config)?;
        let current = storage
            .find_current(tenant_id, resource_type, id)
            .await
            .map_err(|e| Self::map_storage_err(resource_type, id, e))?;

        match current {
            None => {
                self.check_interaction(&config, Interaction::Create)?;
                let now = time::OffsetDateTime::now_utc();
                let body = Self::stamp_meta(body, "1", &format_rfc3339(&now));
                let stored = StoredResource {
                    tenant_id: tenant_id.to_string(),
                    id: id.to_string(),
                    version_id: "1".to_string(),
                    resource_type: resource_type.to_string(),
                    resource: body,
                    last_updated: now,
                    created_at: now,
                    is_current: true,
                    is_deleted: false,
                };
                let saved = storage
                    .save(stored)
                    .await
                    .map_err(|e| Self::map_storage_err(resource_type, id, e))?;
                Ok(WriteOutcome::from_stored(saved, true))
            }
            Some(row) => {
                // If-Match is enforced strictly: any mismatch is a 412,
                // never silently accepted (no leniency flag).
                if let Some(expected) = if_match {
                    let expected = strip_weak_etag(expected);
                    if expected != row.version_id {
                        return Err(CoreError::version_conflict(resource_type, id));
                    }
                }

                let max = storage
                    .max_version_id(tenant_id, resource_type, id)
                    .await
                    .map_err(|e| Self::map_storage_err(resource_type, id, e))?
                    .unwrap_or(0);
                let next_version = (max + 1).to_string();
                let now = time::OffsetDateTime::now_utc();
                let body = Self::stamp_meta(body, &next_version, &format_rfc3339(&now));
                let new_row = StoredResource {
                    tenant_id: row.tenant_id.clone(),
                    id: row.id.clone(),
                    version_id: next_version,
                    resource_type: row.resource_type.clone(),
                    resource: body,
                    last_updated: now,
                    created_at: row.created_at,
                    is_current: true,
                    is_deleted: false,
                };

                storage
                    .mark_all_versions_not_current(tenant_id, resource_type, id)
                    .await
                    .map_err(|e| Self::map_storage_err(resource_type, id, e))?;
                let saved = storage
                    .save(new_row)
                    .await
                    .map_err(|e| Self::map_storage_err(resource_type, id, e))?;
                Ok(WriteOutcome::from_stored(saved, false))
            }
        }
    }

    pub async fn patch(
        &self,
        tenant_id: &str,
        fhir_version: FhirVersion,
        resource_type: &str,
        id: &str,
        patch_bytes: &[u8],
        if_match: Option<&str>,
    ) -> Result<WriteOutcome> {
        let config = self.config_for(resource_type, fhir_version)?;
        self.check_interaction(&config, Interaction::Patch)?;
        let storage = self.resolve_storage(&config)?;

        let current = storage
            .find_current(tenant_id, resource_type, id)
            .await
            .map_err(|e| Self::map_storage_err(resource_type, id, e))?
            .ok_or_else(|| CoreError::resource_not_found(resource_type, id))?;
        if current.is_deleted {
            return Err(CoreError::resource_deleted(resource_type, id));
        }
        if let Some(expected) = if_match {
            let expected = strip_weak_etag(expected);
            if expected != current.version_id {
                return Err(CoreError::version_conflict(resource_type, id));
            }
        }

        let patched = crate::patch::apply_json_patch(&current.resource, patch_bytes)
            .map_err(|e| CoreError::invalid_resource(e.to_string()))?;
        let patched = Self::stamp(resource_type, id, patched);
        self.validate_profiles(&config, &patched, fhir_version).await?;

        let max = storage
            .max_version_id(tenant_id, resource_type, id)
            .await
            .map_err(|e| Self::map_storage_err(resource_type, id, e))?
            .unwrap_or(0);
        let next_version = (max + 1).to_string();
        let now = time::OffsetDateTime::now_utc();
        let patched = Self::stamp_meta(patched, &next_version, &format_rfc3339(&now));
        let new_row = StoredResource {
            tenant_id: current.tenant_id.clone(),
            id: current.id.clone(),
            version_id: next_version,
            resource_type: current.resource_type.clone(),
            resource: patched,
            last_updated: now,
            created_at: current.created_at,
            is_current: true,
            is_deleted: false,
        };

        storage
            .mark_all_versions_not_current(tenant_id, resource_type, id)
            .await
            .map_err(|e| Self::map_storage_err(resource_type, id, e))?;
        let saved = storage
            .save(new_row)
            .await
            .map_err(|e| Self::map_storage_err(resource_type, id, e))?;
        Ok(WriteOutcome::from_stored(saved, false))
    }

    pub async fn delete(
        &self,
        tenant_id: &str,
        fhir_version: FhirVersion,
        resource_type: &str,
        id: &str,
    ) -> Result<WriteOutcome> {
        let config = self.config_for(resource_type, fhir_version)?;
        self.check_interaction(&config, Interaction::Delete)?;
        let storage = self.resolve_storage(&config)?;

        let current = storage
            .find_current(tenant_id, resource_type, id)
            .await
            .map_err(|e| Self::map_storage_err(resource_type, id, e))?;

        match current {
            None => Err(CoreError::resource_not_found(resource_type, id)),
            // Deleting an already-deleted resource is a no-op success: the
            // existing tombstone is returned, no new version is written.
            Some(row) if row.is_deleted => Ok(WriteOutcome::from_stored(row, false)),
            Some(row) => {
                let max = storage
                    .max_version_id(tenant_id, resource_type, id)
                    .await
                    .map_err(|e| Self::map_storage_err(resource_type, id, e))?
                    .unwrap_or(0);
                let next_version = (max + 1).to_string();
                let tombstone = row.new_tombstone(next_version);

                storage
                    .mark_all_versions_not_current(tenant_id, resource_type, id)
                    .await
                    .map_err(|e| Self::map_storage_err(resource_type, id, e))?;
                storage
                    .soft_delete(tenant_id, resource_type, id, tombstone.clone())
                    .await
                    .map_err(|e| Self::map_storage_err(resource_type, id, e))?;
                Ok(WriteOutcome::from_stored(tombstone, false))
            }
        }
    }

    /// SEARCH, with the search-parameter allow/denylist applied: any
    /// supplied parameter the resource's policy rejects is logged at debug
    /// level (naming resource type, tenant, and parameter) and dropped —
    /// the response proceeds as though it had never been supplied.
    pub async fn search(
        &self,
        tenant_id: &str,
        fhir_version: FhirVersion,
        resource_type: &str,
        query: &HashMap<String, Vec<String>>,
        base_url: &str,
    ) -> Result<Bundle> {
        let config = self.config_for(resource_type, fhir_version)?;
        self.check_interaction(&config, Interaction::Search)?;
        let storage = self.resolve_storage(&config)?;

        let count = query
            .get("_count")
            .and_then(|v| v.first())
            .and_then(|v| v.parse::<usize>().ok())
            .map(|c| c.min(MAX_SEARCH_COUNT))
            .unwrap_or(DEFAULT_SEARCH_COUNT);
        let offset = query
            .get("_offset")
            .and_then(|v| v.first())
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut params = SearchParams::new()
            .with_count(count as u32)
            .with_offset(offset as u32)
            .with_total(octofhir_storage::TotalMode::Accurate);
        for (key, values) in query {
            if key.starts_with('_') {
                continue;
            }
            let policy = config.search_param_policy.as_ref();
            let permitted = policy.map(|policy| policy.permits(key)).unwrap_or(true);
            if !permitted {
                if policy.is_some_and(|p| p.fail_closed) {
                    return Err(CoreError::bad_request(format!(
                        "search parameter '{key}' is not permitted for {resource_type}"
                    )));
                }
                debug!(
                    resource_type = %resource_type,
                    tenant_id = %tenant_id,
                    param = %key,
                    "dropping search parameter not permitted by policy"
                );
                continue;
            }
            for value in values {
                params = params.with_param(key.clone(), value.clone());
            }
        }

        let result = storage
            .search(tenant_id, resource_type, &params)
            .await
            .map_err(|e| Self::map_storage_err(resource_type, "", e))?;
        let total = result.total.map(|t| t as usize).unwrap_or(result.entries.len());
        let resources: Vec<Value> = result.entries.into_iter().map(|r| r.resource).collect();

        Ok(bundle_from_search(total, resources, base_url, resource_type, offset, count, None))
    }

    pub async fn history_instance(
        &self,
        tenant_id: &str,
        fhir_version: FhirVersion,
        resource_type: &str,
        id: &str,
        offset: usize,
        count: usize,
        base_url: &str,
    ) -> Result<Bundle> {
        let config = self.config_for(resource_type, fhir_version)?;
        self.check_interaction(&config, Interaction::History)?;
        let storage = self.resolve_storage(&config)?;

        let params = HistoryParams::new().count(count as u32).offset(offset as u32);
        let result = storage
            .find_all_versions_desc(tenant_id, resource_type, Some(id), &params)
            .await
            .map_err(|e| Self::map_storage_err(resource_type, id, e))?;

        let entries = result.entries.into_iter().map(Self::history_bundle_entry).collect();
        let total = result.total;
        Ok(bundle_from_history(entries, base_url, resource_type, Some(id), offset, count, total))
    }

    pub async fn history_type(
        &self,
        tenant_id: &str,
        fhir_version: FhirVersion,
        resource_type: &str,
        offset: usize,
        count: usize,
        base_url: &str,
    ) -> Result<Bundle> {
        let config = self.config_for(resource_type, fhir_version)?;
        self.check_interaction(&config, Interaction::History)?;
        let storage = self.resolve_storage(&config)?;

        let params = HistoryParams::new().count(count as u32).offset(offset as u32);
        let result = storage
            .find_all_versions_desc(tenant_id, resource_type, None, &params)
            .await
            .map_err(|e| Self::map_storage_err(resource_type, "", e))?;

        let entries = result.entries.into_iter().map(Self::history_bundle_entry).collect();
        let total = result.total;
        Ok(bundle_from_history(entries, base_url, resource_type, None, offset, count, total))
    }

    pub async fn history_system(
        &self,
        tenant_id: &str,
        resource_types: &[String],
        offset: usize,
        count: usize,
        base_url: &str,
    ) -> Result<Bundle> {
        let mut all = Vec::new();
        let params = HistoryParams::new().count(count as u32).offset(offset as u32);
        for resource_type in resource_types {
            let Some(config) = self.registry.get(resource_type) else {
                continue;
            };
            if !config.enabled || !config.interactions.allows(Interaction::History) {
                continue;
            }
            let storage = self.resolve_storage(&config)?;
            let result = storage
                .find_all_versions_desc(tenant_id, resource_type, None, &params)
                .await
                .map_err(|e| Self::map_storage_err(resource_type, "", e))?;
            all.extend(result.entries.into_iter().map(Self::history_bundle_entry));
        }

        let total = Some(all.len() as u32);
        Ok(bundle_from_system_history(all, base_url, offset, count, total))
    }

    fn history_bundle_entry(entry: octofhir_storage::HistoryEntry) -> HistoryBundleEntry {
        let method = match entry.method {
            HistoryMethod::Create => HistoryBundleMethod::Create,
            HistoryMethod::Update => HistoryBundleMethod::Update,
            HistoryMethod::Delete => HistoryBundleMethod::Delete,
        };
        HistoryBundleEntry {
            id: entry.resource.id.clone(),
            resource_type: entry.resource.resource_type.clone(),
            version_id: entry.resource.version_id.clone(),
            last_modified: format_rfc3339(&entry.resource.last_updated),
            resource: RawJson::from(entry.resource.resource),
            method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_config::{ResourceConfig, SchemaPlacement};
    use octofhir_core::NoopProfileValidator;
    use serde_json::json;

    fn registry_with(resource_type: &str) -> Arc<ResourceRegistry> {
        let config = ResourceConfig {
            resource_type: resource_type.to_string(),
            enabled: true,
            versions: octofhir_config::VersionSupport {
                versions: vec![FhirVersion::R5, FhirVersion::R4B],
                default: FhirVersion::R5,
            },
            schema: SchemaPlacement::Shared {
                schema: "public".to_string(),
            },
            interactions: Default::default(),
            search_param_policy: None,
            profiles: Vec::new(),
        };
        Arc::new(ResourceRegistry::new(vec![config]).unwrap())
    }

    fn service(resource_type: &str) -> ResourceService {
        let registry = registry_with(resource_type);
        let storage = octofhir_db_memory::create_storage();
        let dispatcher = Arc::new(SchemaDispatcher::new(storage));
        ResourceService::new(registry, dispatcher, Arc::new(NoopProfileValidator))
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let service = service("Patient");
        let created = service
            .create("default", FhirVersion::R5, "Patient", json!({"name": [{"family": "Doe"}]}))
            .await
            .unwrap();
        assert_eq!(created.version_id, "1");
        assert!(created.created);

        let id = created.resource["id"].as_str().unwrap().to_string();
        let read = service.read("default", FhirVersion::R5, "Patient", &id).await.unwrap();
        assert_eq!(read.version_id, "1");
        assert_eq!(read.resource["name"][0]["family"], "Doe");
    }

    #[tokio::test]
    async fn read_after_delete_is_410() {
        let service = service("Patient");
        let created = service.create("default", FhirVersion::R5, "Patient", json!({})).await.unwrap();
        let id = created.resource["id"].as_str().unwrap().to_string();

        service.delete("default", FhirVersion::R5, "Patient", &id).await.unwrap();
        let err = service.read("default", FhirVersion::R5, "Patient", &id).await.unwrap_err();
        assert_eq!(err.kind(), octofhir_core::error::ErrorKind::Gone);
    }

    #[tokio::test]
    async fn vread_of_tombstone_is_not_410() {
        let service = service("Patient");
        let created = service.create("default", FhirVersion::R5, "Patient", json!({})).await.unwrap();
        let id = created.resource["id"].as_str().unwrap().to_string();

        let deleted = service.delete("default", FhirVersion::R5, "Patient", &id).await.unwrap();
        let vread = service
            .vread("default", FhirVersion::R5, "Patient", &id, &deleted.version_id)
            .await
            .unwrap();
        assert_eq!(vread.version_id, deleted.version_id);
    }

    #[tokio::test]
    async fn update_with_stale_if_match_is_conflict() {
        let service = service("Patient");
        let created = service.create("default", FhirVersion::R5, "Patient", json!({})).await.unwrap();
        let id = created.resource["id"].as_str().unwrap().to_string();

        let err = service
            .update(
                "default",
                FhirVersion::R5,
                "Patient",
                &id,
                json!({"active": true}),
                Some("W/\"99\""),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), octofhir_core::error::ErrorKind::VersionConflict);
    }

    #[tokio::test]
    async fn delete_twice_is_idempotent() {
        let service = service("Patient");
        let created = service.create("default", FhirVersion::R5, "Patient", json!({})).await.unwrap();
        let id = created.resource["id"].as_str().unwrap().to_string();

        let first = service.delete("default", FhirVersion::R5, "Patient", &id).await.unwrap();
        let second = service.delete("default", FhirVersion::R5, "Patient", &id).await.unwrap();
        assert_eq!(first.version_id, second.version_id);
    }
}
