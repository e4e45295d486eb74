//! In-memory `TenantDirectory` (§6) backing the admin tenant CRUD surface.
//!
//! The core crate only pins down the read side (`TenantDirectory::
//! find_by_external_id`) that `TenantResolver` calls through. Everything a
//! concrete directory needs beyond that — listing, creating, enabling and
//! disabling, deleting — lives here, alongside the one instance this gateway
//! ships: a process-local map seeded with the well-known default tenant.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use octofhir_core::{CoreError, DEFAULT_TENANT_GUID, Result, Tenant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// A `TenantDirectory` held entirely in process memory. Good enough to
/// demonstrate tenant resolution, caching and admin invalidation end to end
/// without a real tenant store behind it.
#[derive(Clone, Default)]
pub struct InMemoryTenantDirectory {
    tenants: Arc<RwLock<HashMap<Uuid, Tenant>>>,
}

impl InMemoryTenantDirectory {
    /// Builds a directory pre-seeded with the default tenant (§6: the
    /// gateway always has at least one resolvable tenant even before any
    /// admin call has been made).
    pub fn with_default_tenant() -> Self {
        let default = Tenant::default_tenant();
        let mut map = HashMap::new();
        map.insert(default.external_id, default);
        Self {
            tenants: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn list(&self) -> Vec<Tenant> {
        let mut tenants: Vec<Tenant> = self.tenants.read().await.values().cloned().collect();
        tenants.sort_by(|a, b| a.code.cmp(&b.code));
        tenants
    }

    pub async fn get(&self, external_id: Uuid) -> Option<Tenant> {
        self.tenants.read().await.get(&external_id).cloned()
    }

    /// Creates a tenant with a fresh external id and internal id. The
    /// internal id is derived from `code` rather than the external GUID so
    /// storage keys and dedicated schema names stay human-readable.
    pub async fn create(&self, code: String, display_name: String) -> Tenant {
        let external_id = Uuid::new_v4();
        let tenant = Tenant {
            external_id,
            internal_id: code.clone(),
            code,
            display_name,
            enabled: true,
        };
        self.tenants
            .write()
            .await
            .insert(external_id, tenant.clone());
        tenant
    }

    pub async fn set_enabled(&self, external_id: Uuid, enabled: bool) -> Result<Tenant> {
        let mut tenants = self.tenants.write().await;
        let tenant = tenants
            .get_mut(&external_id)
            .ok_or_else(|| CoreError::tenant_not_found(external_id.to_string()))?;
        tenant.enabled = enabled;
        Ok(tenant.clone())
    }

    pub async fn delete(&self, external_id: Uuid) -> Result<()> {
        if external_id.to_string() == DEFAULT_TENANT_GUID {
            return Err(CoreError::bad_request(
                "the default tenant cannot be deleted",
            ));
        }
        let mut tenants = self.tenants.write().await;
        tenants
            .remove(&external_id)
            .map(|_| ())
            .ok_or_else(|| CoreError::tenant_not_found(external_id.to_string()))
    }
}

#[async_trait]
impl octofhir_core::TenantDirectory for InMemoryTenantDirectory {
    async fn find_by_external_id(&self, external_id: Uuid) -> Result<Option<Tenant>> {
        Ok(self.tenants.read().await.get(&external_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeds_default_tenant() {
        let dir = InMemoryTenantDirectory::with_default_tenant();
        let tenants = dir.list().await;
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].internal_id, octofhir_core::DEFAULT_TENANT_ID);
    }

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let dir = InMemoryTenantDirectory::with_default_tenant();
        let tenant = dir.create("acme".into(), "Acme Corp".into()).await;
        let found = dir.get(tenant.external_id).await.expect("tenant exists");
        assert_eq!(found.internal_id, "acme");
        assert!(found.enabled);
    }

    #[tokio::test]
    async fn set_enabled_toggles_flag() {
        let dir = InMemoryTenantDirectory::with_default_tenant();
        let tenant = dir.create("acme".into(), "Acme Corp".into()).await;
        let disabled = dir.set_enabled(tenant.external_id, false).await.unwrap();
        assert!(!disabled.enabled);
    }

    #[tokio::test]
    async fn delete_removes_tenant() {
        let dir = InMemoryTenantDirectory::with_default_tenant();
        let tenant = dir.create("acme".into(), "Acme Corp".into()).await;
        dir.delete(tenant.external_id).await.unwrap();
        assert!(dir.get(tenant.external_id).await.is_none());
    }

    #[tokio::test]
    async fn default_tenant_cannot_be_deleted() {
        let dir = InMemoryTenantDirectory::with_default_tenant();
        let default_id: Uuid = DEFAULT_TENANT_GUID.parse().unwrap();
        let err = dir.delete(default_id).await.unwrap_err();
        assert_eq!(err.kind(), octofhir_core::error::ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn unknown_tenant_errors_on_delete_and_enable() {
        let dir = InMemoryTenantDirectory::with_default_tenant();
        let bogus = Uuid::new_v4();
        assert!(dir.delete(bogus).await.is_err());
        assert!(dir.set_enabled(bogus, true).await.is_err());
    }
}
