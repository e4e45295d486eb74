//! Tenant-scoped in-memory implementation of [`StorageRouter`].
//!
//! Mirrors the shape of a real backend closely enough to exercise the
//! Storage Router contract end to end: every row carries its own place in
//! a gapless `(tenant, type, id)` version sequence, history is kept
//! separately from the "current" index, and multi-step writes go through a
//! buffering [`Transaction`] so a caller sees its own writes before commit
//! but nothing is visible to anyone else until then.
//!
//! Concurrency: the current-row index is a lock-free `papaya::HashMap` for
//! fast reads on the hot path; history (append-only, read less often) is
//! guarded by a `tokio::sync::RwLock` over a plain `HashMap`, following the
//! same split the teacher used between its main map and its history map.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use tokio::sync::RwLock;

use octofhir_storage::{
    HistoryEntry, HistoryMethod, HistoryParams, HistoryResult, SearchParams, SearchResult,
    SortParam, StorageError, StorageRouter, StoredResource, Transaction,
};

/// `tenant_id\u{1}resource_type\u{1}id`, collision-free against resource
/// type/id values that happen to contain `/`.
fn resource_key(tenant_id: &str, resource_type: &str, id: &str) -> String {
    format!("{tenant_id}\u{1}{resource_type}\u{1}{id}")
}

/// `tenant_id\u{1}resource_type\u{1}`, a prefix matching every id of that
/// type for that tenant.
fn type_prefix(tenant_id: &str, resource_type: &str) -> String {
    format!("{tenant_id}\u{1}{resource_type}\u{1}")
}

/// Lock-free, tenant-scoped in-memory [`StorageRouter`].
///
/// One instance backs one schema placement (shared or dedicated); the
/// `SchemaDispatcher` in front of it is what makes tenant-to-schema
/// routing possible, not this type itself.
#[derive(Debug)]
pub struct InMemoryStorage {
    /// Current (latest) version per resource key.
    current: Arc<PapayaHashMap<String, StoredResource>>,
    /// Full version history per resource key, oldest first.
    history: Arc<RwLock<HashMap<String, Vec<StoredResource>>>>,
    version_counter: AtomicU64,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: Arc::new(PapayaHashMap::new()),
            history: Arc::new(RwLock::new(HashMap::new())),
            version_counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_version_id(&self) -> String {
        self.version_counter.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Writes `resource` as the new current version and appends it to
    /// history. Does not itself clear an older current flag; callers that
    /// need gapless sequencing call [`StorageRouter::mark_all_versions_not_current`]
    /// first, mirroring the router contract's two separate calls so a
    /// transaction can interleave them with other writes.
    async fn write_version(&self, resource: StoredResource) -> StoredResource {
        let key = resource_key(&resource.tenant_id, &resource.resource_type, &resource.id);
        {
            let mut history = self.history.write().await;
            history.entry(key.clone()).or_default().push(resource.clone());
        }
        self.current.pin().insert(key, resource.clone());
        resource
    }

    fn filter_matches(resource: &serde_json::Value, params: &SearchParams) -> bool {
        params.parameters.iter().all(|(field, values)| {
            let actual = resource.get(field).and_then(|v| v.as_str());
            match actual {
                Some(actual) => values.iter().any(|v| v == actual),
                None => false,
            }
        })
    }

    fn sort_entries(entries: &mut [StoredResource], sort: &[SortParam]) {
        entries.sort_by(|a, b| {
            for s in sort {
                let av = a.resource.get(&s.field).map(|v| v.to_string()).unwrap_or_default();
                let bv = b.resource.get(&s.field).map(|v| v.to_string()).unwrap_or_default();
                let ord = if s.descending { bv.cmp(&av) } else { av.cmp(&bv) };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
    }
}

#[async_trait]
impl StorageRouter for InMemoryStorage {
    async fn save(&self, resource: StoredResource) -> Result<StoredResource, StorageError> {
        Ok(self.write_version(resource).await)
    }

    async fn find_current(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<StoredResource>, StorageError> {
        let key = resource_key(tenant_id, resource_type, id);
        Ok(self.current.pin().get(&key).cloned())
    }

    async fn find_version(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: &str,
        version_id: &str,
    ) -> Result<Option<StoredResource>, StorageError> {
        let key = resource_key(tenant_id, resource_type, id);
        let history = self.history.read().await;
        Ok(history
            .get(&key)
            .and_then(|versions| versions.iter().rev().find(|v| v.version_id == version_id))
            .cloned())
    }

    async fn find_all_versions_desc(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: Option<&str>,
        params: &HistoryParams,
    ) -> Result<HistoryResult, StorageError> {
        let history = self.history.read().await;
        let mut entries: Vec<StoredResource> = match id {
            Some(id) => history
                .get(&resource_key(tenant_id, resource_type, id))
                .cloned()
                .unwrap_or_default(),
            None => {
                let prefix = type_prefix(tenant_id, resource_type);
                history
                    .iter()
                    .filter(|(k, _)| k.starts_with(&prefix))
                    .flat_map(|(_, versions)| versions.iter().cloned())
                    .collect()
            }
        };
        drop(history);

        entries.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));

        if let Some(since) = params.since {
            entries.retain(|e| e.last_updated > since);
        }
        if let Some(at) = params.at {
            entries.retain(|e| e.last_updated <= at);
        }

        let total = Some(entries.len() as u32);

        let offset = params.offset.unwrap_or(0) as usize;
        let mut entries = if offset < entries.len() {
            entries.split_off(offset)
        } else {
            Vec::new()
        };
        if let Some(count) = params.count {
            entries.truncate(count as usize);
        }

        let history_entries = entries
            .into_iter()
            .map(|resource| {
                let method = if resource.is_deleted {
                    HistoryMethod::Delete
                } else if resource.version_id == "1" {
                    HistoryMethod::Create
                } else {
                    HistoryMethod::Update
                };
                HistoryEntry::new(resource, method)
            })
            .collect();

        Ok(HistoryResult {
            entries: history_entries,
            total,
        })
    }

    async fn exists(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: &str,
    ) -> Result<bool, StorageError> {
        let key = resource_key(tenant_id, resource_type, id);
        Ok(self
            .current
            .pin()
            .get(&key)
            .is_some_and(|r| !r.is_deleted))
    }

    async fn max_version_id(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<u64>, StorageError> {
        let key = resource_key(tenant_id, resource_type, id);
        let history = self.history.read().await;
        Ok(history.get(&key).and_then(|versions| {
            versions.iter().filter_map(|v| v.version_id.parse::<u64>().ok()).max()
        }))
    }

    async fn mark_all_versions_not_current(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: &str,
    ) -> Result<(), StorageError> {
        let key = resource_key(tenant_id, resource_type, id);
        let mut history = self.history.write().await;
        if let Some(versions) = history.get_mut(&key) {
            for v in versions.iter_mut() {
                v.is_current = false;
            }
        }
        // Clear the current-index entry too: if the caller never follows up
        // with a save, no stale "current" row should remain visible to readers.
        self.current.pin().remove(&key);
        Ok(())
    }

    async fn soft_delete(
        &self,
        tenant_id: &str,
        resource_type: &str,
        id: &str,
        tombstone: StoredResource,
    ) -> Result<(), StorageError> {
        self.mark_all_versions_not_current(tenant_id, resource_type, id).await?;
        self.write_version(tombstone).await;
        Ok(())
    }

    async fn search(
        &self,
        tenant_id: &str,
        resource_type: &str,
        params: &SearchParams,
    ) -> Result<SearchResult, StorageError> {
        let prefix = type_prefix(tenant_id, resource_type);
        let guard = self.current.pin();
        let mut matched: Vec<StoredResource> = guard
            .iter()
            .filter(|(k, r)| k.starts_with(&prefix) && !r.is_deleted)
            .filter(|(_, r)| Self::filter_matches(&r.resource, params))
            .map(|(_, r)| r.clone())
            .collect();
        drop(guard);

        if let Some(sort) = &params.sort {
            Self::sort_entries(&mut matched, sort);
        } else {
            matched.sort_by(|a, b| a.id.cmp(&b.id));
        }

        let total = params.total.map(|_| matched.len() as u32);

        let offset = params.offset.unwrap_or(0) as usize;
        let mut page = if offset < matched.len() {
            matched.split_off(offset)
        } else {
            Vec::new()
        };
        let has_more = params.count.is_some_and(|count| page.len() > count as usize);
        if let Some(count) = params.count {
            page.truncate(count as usize);
        }

        Ok(SearchResult {
            entries: page,
            total,
            has_more,
        })
    }

    async fn begin_transaction(
        &self,
        tenant_id: &str,
    ) -> Result<Box<dyn Transaction>, StorageError> {
        Ok(Box::new(InMemoryTransaction {
            storage: SharedState {
                current: self.current.clone(),
                history: self.history.clone(),
            },
            tenant_id: tenant_id.to_string(),
            pending: HashMap::new(),
            cleared: Vec::new(),
        }))
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

/// The handles an `InMemoryTransaction` needs back into its parent store,
/// cloned cheaply since both fields are already `Arc`-backed.
#[derive(Clone)]
struct SharedState {
    current: Arc<PapayaHashMap<String, StoredResource>>,
    history: Arc<RwLock<HashMap<String, Vec<StoredResource>>>>,
}

/// Buffers writes until commit so a transaction's own reads see its own
/// writes but nothing escapes to other readers before `commit()` runs.
/// Not isolated against concurrent transactions on the same key — the
/// in-memory backend has no conflict detector, it only exists to give C7 a
/// single call boundary to commit/rollback against.
struct InMemoryTransaction {
    storage: SharedState,
    tenant_id: String,
    pending: HashMap<String, StoredResource>,
    cleared: Vec<String>,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let mut history = self.storage.history.write().await;
        for key in &self.cleared {
            if let Some(versions) = history.get_mut(key) {
                for v in versions.iter_mut() {
                    v.is_current = false;
                }
            }
            self.storage.current.pin().remove(key);
        }
        for (key, resource) in self.pending {
            history.entry(key.clone()).or_default().push(resource.clone());
            self.storage.current.pin().insert(key, resource);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }

    async fn save(&mut self, resource: StoredResource) -> Result<StoredResource, StorageError> {
        let key = resource_key(&resource.tenant_id, &resource.resource_type, &resource.id);
        self.pending.insert(key, resource.clone());
        Ok(resource)
    }

    async fn find_current(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<StoredResource>, StorageError> {
        let key = resource_key(&self.tenant_id, resource_type, id);
        if let Some(resource) = self.pending.get(&key) {
            return Ok(Some(resource.clone()));
        }
        if self.cleared.contains(&key) {
            return Ok(None);
        }
        Ok(self.storage.current.pin().get(&key).cloned())
    }
}

impl InMemoryTransaction {
    /// Marks a resource's current version as superseded for the duration
    /// of this transaction, mirroring
    /// [`StorageRouter::mark_all_versions_not_current`] without touching
    /// the store until commit.
    #[allow(dead_code)]
    fn mark_not_current(&mut self, resource_type: &str, id: &str) {
        self.cleared.push(resource_key(&self.tenant_id, resource_type, id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient(tenant: &str, id: &str, version: &str) -> StoredResource {
        StoredResource::new(
            tenant,
            id,
            version,
            "Patient",
            json!({"resourceType": "Patient", "id": id, "active": true}),
        )
    }

    #[tokio::test]
    async fn save_then_find_current_round_trips() {
        let storage = InMemoryStorage::new();
        storage.save(patient("default", "p1", "1")).await.unwrap();

        let found = storage
            .find_current("default", "Patient", "p1")
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().version_id, "1");
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let storage = InMemoryStorage::new();
        storage.save(patient("tenant-a", "p1", "1")).await.unwrap();

        let found = storage
            .find_current("tenant-b", "Patient", "p1")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn update_supersedes_previous_version() {
        let storage = InMemoryStorage::new();
        let v1 = patient("default", "p1", "1");
        storage.save(v1.clone()).await.unwrap();

        storage
            .mark_all_versions_not_current("default", "Patient", "p1")
            .await
            .unwrap();
        let v2 = v1.new_version("2", json!({"resourceType": "Patient", "id": "p1", "active": false}));
        storage.save(v2).await.unwrap();

        let current = storage
            .find_current("default", "Patient", "p1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.version_id, "2");

        let old = storage
            .find_version("default", "Patient", "p1", "1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(old.version_id, "1");
        assert!(!old.is_current);
    }

    #[tokio::test]
    async fn soft_delete_writes_tombstone_as_current() {
        let storage = InMemoryStorage::new();
        let v1 = patient("default", "p1", "1");
        storage.save(v1.clone()).await.unwrap();

        let tombstone = v1.new_tombstone("2");
        storage
            .soft_delete("default", "Patient", "p1", tombstone)
            .await
            .unwrap();

        let current = storage
            .find_current("default", "Patient", "p1")
            .await
            .unwrap()
            .unwrap();
        assert!(current.is_deleted);
        assert_eq!(current.version_id, "2");
        assert!(!storage.exists("default", "Patient", "p1").await.unwrap());
    }

    #[tokio::test]
    async fn max_version_id_tracks_history() {
        let storage = InMemoryStorage::new();
        storage.save(patient("default", "p1", "1")).await.unwrap();
        storage
            .mark_all_versions_not_current("default", "Patient", "p1")
            .await
            .unwrap();
        storage.save(patient("default", "p1", "2")).await.unwrap();

        assert_eq!(
            storage.max_version_id("default", "Patient", "p1").await.unwrap(),
            Some(2)
        );
    }

    #[tokio::test]
    async fn search_filters_by_field_and_paginates() {
        let storage = InMemoryStorage::new();
        for i in 0..5 {
            storage
                .save(patient("default", &format!("p{i}"), "1"))
                .await
                .unwrap();
        }

        let params = SearchParams::new().with_count(2).with_offset(1);
        let result = storage.search("default", "Patient", &params).await.unwrap();
        assert_eq!(result.entries.len(), 2);
        assert!(result.has_more);
    }

    #[tokio::test]
    async fn deleted_resources_are_excluded_from_search() {
        let storage = InMemoryStorage::new();
        let v1 = patient("default", "p1", "1");
        storage.save(v1.clone()).await.unwrap();
        storage
            .soft_delete("default", "Patient", "p1", v1.new_tombstone("2"))
            .await
            .unwrap();

        let result = storage
            .search("default", "Patient", &SearchParams::new())
            .await
            .unwrap();
        assert!(result.entries.is_empty());
    }

    #[tokio::test]
    async fn transaction_sees_own_writes_before_commit() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin_transaction("default").await.unwrap();
        tx.save(patient("default", "p1", "1")).await.unwrap();

        let seen = tx.find_current("Patient", "p1").await.unwrap();
        assert!(seen.is_some());

        assert!(
            storage
                .find_current("default", "Patient", "p1")
                .await
                .unwrap()
                .is_none()
        );

        tx.commit().await.unwrap();
        assert!(
            storage
                .find_current("default", "Patient", "p1")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn rolled_back_transaction_writes_nothing() {
        let storage = InMemoryStorage::new();
        let mut tx = storage.begin_transaction("default").await.unwrap();
        tx.save(patient("default", "p1", "1")).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(
            storage
                .find_current("default", "Patient", "p1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn history_desc_orders_newest_first_and_respects_offset() {
        let storage = InMemoryStorage::new();
        storage.save(patient("default", "p1", "1")).await.unwrap();
        storage
            .mark_all_versions_not_current("default", "Patient", "p1")
            .await
            .unwrap();
        storage.save(patient("default", "p1", "2")).await.unwrap();

        let result = storage
            .find_all_versions_desc("default", "Patient", Some("p1"), &HistoryParams::new())
            .await
            .unwrap();
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.entries[0].resource.version_id, "2");
        assert_eq!(result.total, Some(2));
    }
}
