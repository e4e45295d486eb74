//! Startup bootstrap: idempotent seeding performed once before the server
//! starts accepting requests.
//!
//! The teacher's bootstrap seeded admin users and conformance resources
//! against a Postgres-backed auth store; this gateway has no built-in authn
//! (§1 Non-goal), so the only thing left to seed is the default tenant, and
//! the directory already seeds it on construction — this module exists to
//! keep that seeding point explicit and loggable, and as the place a future
//! bootstrap step (e.g. pre-loading a resources.yaml snapshot) would hook in.

use std::sync::Arc;

use octofhir_config::ResourceRegistry;
use tracing::info;

use crate::tenant_directory::InMemoryTenantDirectory;

/// Summary of what bootstrap did, logged once at startup.
#[derive(Debug, Default)]
pub struct BootstrapStats {
    pub tenants_seeded: usize,
    pub resource_types_loaded: usize,
}

/// Builds the default tenant directory and reports what the resource
/// registry already loaded, so a single log line at startup answers "is
/// this a fresh environment or did I load existing configuration".
pub async fn bootstrap(registry: &Arc<ResourceRegistry>) -> (InMemoryTenantDirectory, BootstrapStats) {
    let directory = InMemoryTenantDirectory::with_default_tenant();
    let stats = BootstrapStats {
        tenants_seeded: directory.list().await.len(),
        resource_types_loaded: registry.len(),
    };
    info!(
        tenants_seeded = stats.tenants_seeded,
        resource_types_loaded = stats.resource_types_loaded,
        "bootstrap complete"
    );
    (directory, stats)
}
