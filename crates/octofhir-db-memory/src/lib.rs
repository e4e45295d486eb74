//! In-memory [`StorageRouter`](octofhir_storage::StorageRouter) backend.
//!
//! A single `InMemoryStorage` is tenant-scoped internally (every key carries
//! the owning tenant's internal id) but is itself just one backend instance;
//! the shared-vs-dedicated routing across tenants is
//! [`octofhir_storage::SchemaDispatcher`]'s job, composed in front of one or
//! more `InMemoryStorage` instances.
//!
//! # Example
//!
//! ```ignore
//! use octofhir_db_memory::InMemoryStorage;
//! use octofhir_storage::{StorageRouter, StoredResource};
//!
//! let storage = InMemoryStorage::new();
//! let patient = serde_json::json!({"resourceType": "Patient", "id": "1"});
//! storage.save(StoredResource::new("default", "1", "1", "Patient", patient)).await?;
//! ```

pub mod storage;

pub use storage::InMemoryStorage;

/// Creates a new in-memory `StorageRouter` instance, boxed for use wherever a
/// `Arc<dyn StorageRouter>` is expected (e.g. as the shared-schema backend
/// given to [`octofhir_storage::SchemaDispatcher::new`]).
pub fn create_storage() -> std::sync::Arc<dyn octofhir_storage::StorageRouter> {
    std::sync::Arc::new(InMemoryStorage::new())
}
