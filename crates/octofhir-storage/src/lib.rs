//! # octofhir-storage
//!
//! Storage abstraction layer for the OctoFHIR server.
//!
//! This crate defines the traits and types that all storage backends must
//! implement. It does not contain any implementations — those are
//! provided by separate crates (see `octofhir-db-memory`).
//!
//! ## Overview
//!
//! The main trait is [`StorageRouter`], the tenant- and version-aware
//! contract for a resource type's physical rows (C6):
//! - Versioned writes (`save`, `mark_all_versions_not_current`)
//! - Reads (`find_current`, `find_version`, `find_all_versions_desc`)
//! - Soft-delete (`soft_delete`)
//! - Search
//! - Transactions
//!
//! [`SchemaDispatcher`] resolves which `StorageRouter` backs a resource
//! type based on its Resource Registry schema placement (shared vs.
//! dedicated).

mod error;
mod traits;
mod types;

// Re-export everything from submodules
pub use error::{ErrorCategory, StorageError};
pub use traits::{SchemaDispatcher, StorageCapabilities, StorageRouter, Transaction};
pub use types::{
    HistoryEntry, HistoryMethod, HistoryParams, HistoryResult, SearchParams, SearchResult,
    SortParam, StoredResource, TotalMode,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a boxed storage trait object.
pub type DynStorage = std::sync::Arc<dyn StorageRouter>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use octofhir_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::{SchemaDispatcher, StorageCapabilities, StorageRouter, Transaction};
    pub use crate::types::{
        HistoryEntry, HistoryMethod, HistoryParams, HistoryResult, SearchParams, SearchResult,
        SortParam, StoredResource, TotalMode,
    };
    pub use crate::{DynStorage, StorageResult};
}
