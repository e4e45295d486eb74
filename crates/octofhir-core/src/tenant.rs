//! Tenant resolution (C2): maps the external tenant GUID carried on a
//! request to the internal tenant id used as the partition key in every
//! resource row, through an invalidatable cache (§4.2).

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// The well-known GUID that always maps to the `default` tenant, seeded at
/// initialization (§3 "Tenant Record" invariants).
pub const DEFAULT_TENANT_GUID: &str = "00000000-0000-0000-0000-000000000000";
pub const DEFAULT_TENANT_ID: &str = "default";

/// A tenant record (§3). `settings` is intentionally left to callers — the
/// resolver only needs enough to decide routability.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub external_id: Uuid,
    pub internal_id: String,
    pub code: String,
    pub display_name: String,
    pub enabled: bool,
}

impl Tenant {
    pub fn default_tenant() -> Self {
        Self {
            external_id: Uuid::parse_str(DEFAULT_TENANT_GUID).expect("valid literal GUID"),
            internal_id: DEFAULT_TENANT_ID.to_string(),
            code: "default".to_string(),
            display_name: "Default Tenant".to_string(),
            enabled: true,
        }
    }
}

/// A source of tenant truth the resolver consults on a cache miss.
/// Intentionally synchronous-agnostic (async) so it can be backed by a
/// database, a config file, or — in tests — an in-memory map.
#[async_trait::async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_by_external_id(&self, external_id: Uuid) -> Result<Option<Tenant>>;
}

/// GUID → internal-id cache (§4.2, §5). Holds only resolved, *enabled*
/// tenants: disabled or not-found lookups are never cached, so a tenant that
/// gets disabled after being cached is still evicted by the admin surface's
/// explicit `invalidate`, not merely left to go stale.
#[derive(Default)]
pub struct TenantCache {
    entries: DashMap<Uuid, String>,
}

impl TenantCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, external_id: &Uuid) -> Option<String> {
        self.entries.get(external_id).map(|v| v.clone())
    }

    /// Inserts a resolved mapping. A race between two inserters for the same
    /// key is harmless: both write the same value (§5).
    pub fn insert(&self, external_id: Uuid, internal_id: String) {
        self.entries.insert(external_id, internal_id);
    }

    pub fn invalidate(&self, external_id: &Uuid) {
        self.entries.remove(external_id);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves the tenant header into an internal tenant id (§4.2). When
/// multi-tenancy is disabled, every request is silently routed to
/// `default_tenant_id` without consulting the header or the directory at
/// all — this is a deployment-wide switch, not a per-request one.
pub struct TenantResolver<D: TenantDirectory> {
    directory: D,
    cache: TenantCache,
    multi_tenancy_enabled: bool,
    header_name: String,
    default_tenant_id: String,
}

impl<D: TenantDirectory> TenantResolver<D> {
    pub fn new(directory: D, multi_tenancy_enabled: bool, header_name: impl Into<String>) -> Self {
        Self {
            directory,
            cache: TenantCache::new(),
            multi_tenancy_enabled,
            header_name: header_name.into(),
            default_tenant_id: DEFAULT_TENANT_ID.to_string(),
        }
    }

    pub fn with_default_tenant_id(mut self, id: impl Into<String>) -> Self {
        self.default_tenant_id = id.into();
        self
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    pub fn cache(&self) -> &TenantCache {
        &self.cache
    }

    /// Resolves `header_value` (the raw value of the configured tenant
    /// header, if the client sent one) to an internal tenant id.
    pub async fn resolve(&self, header_value: Option<&str>) -> Result<String> {
        if !self.multi_tenancy_enabled {
            return Ok(self.default_tenant_id.clone());
        }

        let raw = header_value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CoreError::missing_tenant_header(self.header_name.clone()))?;

        let external_id = Uuid::parse_str(raw).map_err(|_| {
            CoreError::invalid_tenant_format(self.header_name.clone(), raw.to_string())
        })?;

        if let Some(internal_id) = self.cache.get(&external_id) {
            return Ok(internal_id);
        }

        let tenant = self
            .directory
            .find_by_external_id(external_id)
            .await?
            .ok_or_else(|| CoreError::tenant_not_found(external_id.to_string()))?;

        if !tenant.enabled {
            return Err(CoreError::tenant_disabled(external_id.to_string()));
        }

        self.cache.insert(external_id, tenant.internal_id.clone());
        Ok(tenant.internal_id)
    }

    /// Called by the admin surface on every tenant mutation (enable,
    /// disable, delete, update) so the cache never serves a stale mapping
    /// without a TTL to eventually correct it (§4.2).
    pub fn invalidate(&self, external_id: &Uuid) {
        self.cache.invalidate(external_id);
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
