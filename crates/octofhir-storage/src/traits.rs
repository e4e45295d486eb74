//! The Storage Router contract (C6, §4.5): a tenant- and version-aware
//! interface over a resource type's physical rows, dispatched to either a
//! shared or a dedicated schema depending on the Resource Registry's
//! [`SchemaPlacement`](octofhir_config::SchemaPlacement) for that type.
//!
//! Every operation here is already scoped to a tenant — the router never
//! makes a cross-tenant decision on its own behalf.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::types::{HistoryParams, HistoryResult, SearchParams, SearchResult, StoredResource};

/// Storage backend contract for a single resource type's rows (§3, §5).
/// Implementations must be thread-safe (`Send + Sync`) and must never
/// return a torn view of the gapless version sequence for a given
/// `(tenant_id, resource_type, id)`.
#[async_trait]
pub trait StorageRouter: Send + Sync {
    /// Persists `resource` as a new version row. Callers (C7) have already
    /// decided the version number and `is_current`/`is_deleted` flags —
    /// the router's only job is to make the write durable.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if a row with the same
    /// `(tenant_id, resource_type, id, version_id)` already exists.
    async fn save(&self, resource: StoredResource) -> Result<StoredResource, StorageError>;

    /// Reads the current (non-tombstone-aware) version of a resource.
    /// Returns the row even if it is a tombstone (`is_deleted = true`) so
    /// callers can distinguish "never existed" from "deleted" (§4.6).
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn find_current(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<StoredResource>, StorageError>;

    /// Reads a specific version of a resource, current or historical.
    async fn find_version(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: &str,
        version_id: &str,
    ) -> Result<Option<StoredResource>, StorageError>;

    /// Returns every version of a resource, most recent first (§4.6
    /// history ordering).
    async fn find_all_versions_desc(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: Option<&str>,
        params: &HistoryParams,
    ) -> Result<HistoryResult, StorageError>;

    /// Whether any version row exists for `(tenant_id, resource_type, id)`,
    /// used by CREATE to reject a client-supplied id that collides with an
    /// existing (possibly deleted) resource.
    async fn exists(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: &str,
    ) -> Result<bool, StorageError>;

    /// The highest version id currently on record, used to compute the
    /// next version number without a read-modify-write race (§5).
    async fn max_version_id(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<u64>, StorageError>;

    /// Clears `is_current` on every existing version row for this
    /// resource before the new current version is written, preserving the
    /// "exactly one current row" invariant without a window where two
    /// rows are simultaneously current (§5).
    async fn mark_all_versions_not_current(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: &str,
    ) -> Result<(), StorageError>;

    /// Writes a tombstone version and marks it current, soft-deleting the
    /// resource while preserving its history (§4.6).
    async fn soft_delete(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: &str,
        tombstone: StoredResource,
    ) -> Result<(), StorageError>;

    /// Searches current, non-deleted resources of a given type for a
    /// tenant.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidResource` for unsupported search
    /// parameters; returns an error for infrastructure issues.
    async fn search(
        &self,
        tenant_id: &str,
        resource_type: &str,
        params: &SearchParams,
    ) -> Result<SearchResult, StorageError>;

    /// Begins a transaction scoped to a single tenant.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TransactionError` if transactions are not
    /// supported or cannot be started.
    async fn begin_transaction(&self, tenant_id: &str)
    -> Result<Box<dyn Transaction>, StorageError>;

    /// Returns whether this storage backend supports transactions.
    fn supports_transactions(&self) -> bool;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// A transaction for performing atomic operations within one tenant.
///
/// Operations within a transaction are isolated from other operations
/// until the transaction is committed. If an error occurs or `rollback` is
/// called, all operations are undone.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commits all operations in this transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TransactionError` if the commit fails.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Rolls back all operations in this transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TransactionError` if the rollback fails.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;

    /// Persists a version row within this transaction. See
    /// [`StorageRouter::save`] for details.
    async fn save(&mut self, resource: StoredResource) -> Result<StoredResource, StorageError>;

    /// Reads a resource within this transaction, seeing uncommitted writes
    /// made earlier in the same transaction.
    async fn find_current(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<StoredResource>, StorageError>;
}

/// Extension trait for storage with capability queries.
pub trait StorageCapabilities {
    /// Returns whether this storage supports version reads (`vread`).
    fn supports_vread(&self) -> bool {
        true
    }

    /// Returns whether this storage supports history queries.
    fn supports_history(&self) -> bool {
        true
    }

    /// Returns the supported search parameters for a resource type.
    ///
    /// Returns `None` if the resource type is not supported or if all
    /// standard FHIR search parameters are supported.
    fn supported_search_params(&self, _resource_type: &str) -> Option<Vec<String>> {
        None
    }
}

/// Dispatches a resource type to a storage implementation based on its
/// [`SchemaPlacement`](octofhir_config::SchemaPlacement) — the "shared vs
/// dedicated" half of C6. A shared-schema resource type is served by
/// `shared`; a dedicated-schema type is served by whichever
/// `StorageRouter` is registered under that schema name.
pub struct SchemaDispatcher {
    shared: std::sync::Arc<dyn StorageRouter>,
    dedicated: std::collections::HashMap<String, std::sync::Arc<dyn StorageRouter>>,
}

impl SchemaDispatcher {
    pub fn new(shared: std::sync::Arc<dyn StorageRouter>) -> Self {
        Self {
            shared,
            dedicated: std::collections::HashMap::new(),
        }
    }

    /// Registers a dedicated-schema backend. `schema_name` must already
    /// have been validated by the Resource Registry (§9 design note).
    pub fn register_dedicated(
        &mut self,
        schema_name: impl Into<String>,
        router: std::sync::Arc<dyn StorageRouter>,
    ) {
        self.dedicated.insert(schema_name.into(), router);
    }

    /// Resolves the router to use for a resource type configured with
    /// `placement`.
    pub fn resolve(
        &self,
        placement: &octofhir_config::SchemaPlacement,
    ) -> Result<std::sync::Arc<dyn StorageRouter>, StorageError> {
        match placement {
            octofhir_config::SchemaPlacement::Shared { .. } => Ok(self.shared.clone()),
            octofhir_config::SchemaPlacement::Dedicated { schema } => self
                .dedicated
                .get(schema)
                .cloned()
                .ok_or_else(|| StorageError::InvalidResource {
                    message: format!("no storage backend registered for dedicated schema '{schema}'"),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test that StorageRouter is object-safe
    fn _assert_storage_router_object_safe(_: &dyn StorageRouter) {}

    // Compile-time test that Transaction is object-safe
    fn _assert_transaction_object_safe(_: &dyn Transaction) {}

    // Compile-time test that StorageCapabilities is object-safe
    fn _assert_capabilities_object_safe(_: &dyn StorageCapabilities) {}
}
