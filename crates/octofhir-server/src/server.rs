//! Application assembly (C9 composition root): wires the Resource Registry
//! (C1), Tenant Resolver (C2), Version Resolver (C3), Storage Router (C6),
//! Resource Service (C7) and Plugin Orchestrator (C8) into a single
//! `AppState` shared by every axum handler, and builds the router.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::routing::{any, get};
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use octofhir_config::{ResourceRegistry, SchemaPlacement};
use octofhir_core::plugin::{OrchestratorConfig, PluginOrchestrator, PluginRegistry};
use octofhir_core::validation::{NoopProfileValidator, ProfileValidator};
use octofhir_core::version::VersionResolver;
use octofhir_core::{FhirVersion, TenantResolver};
use octofhir_storage::SchemaDispatcher;

use crate::config::AppConfig;
use crate::resource_service::ResourceService;
use crate::tenant_directory::InMemoryTenantDirectory;
use crate::{admin, handlers, middleware as app_middleware};

/// Everything an axum handler needs to serve a FHIR request, shared via
/// `axum::extract::State`. Every field here is either immutable for the
/// process lifetime (the registry, the orchestrator's registry) or
/// internally synchronized (the tenant cache, the storage backends) — no
/// handler ever takes a lock across an `.await` boundary on this struct
/// itself.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ResourceRegistry>,
    pub version_resolver: Arc<VersionResolver>,
    pub tenant_resolver: Arc<TenantResolver<InMemoryTenantDirectory>>,
    pub tenant_directory: InMemoryTenantDirectory,
    pub resource_service: Arc<ResourceService>,
    pub orchestrator: Arc<PluginOrchestrator>,
}

/// Builds the Resource Registry, Storage Router, Resource Service, Tenant
/// Resolver and Plugin Orchestrator from `config`, returning the fully
/// assembled `AppState`. Split out from `ServerBuilder::build` so tests can
/// construct an `AppState` without binding a socket.
pub async fn build_app_state(config: AppConfig) -> AppState {
    let registry = Arc::new(load_registry(&config));

    let shared_storage = octofhir_db_memory::create_storage();
    let mut dispatcher = SchemaDispatcher::new(shared_storage);
    for resource_type in registry.resource_types() {
        let Some(resource_config) = registry.get(&resource_type) else {
            continue;
        };
        if let SchemaPlacement::Dedicated { schema } = &resource_config.schema {
            if dispatcher.resolve(&resource_config.schema).is_err() {
                dispatcher.register_dedicated(schema.clone(), octofhir_db_memory::create_storage());
            }
        }
    }
    let dispatcher = Arc::new(dispatcher);

    let validator: Arc<dyn ProfileValidator> = Arc::new(NoopProfileValidator);
    let resource_service = Arc::new(ResourceService::new(
        registry.clone(),
        dispatcher.clone(),
        validator,
    ));

    let (tenant_directory, _stats) = crate::bootstrap::bootstrap(&registry).await;
    let tenant_resolver = Arc::new(
        TenantResolver::new(
            tenant_directory.clone(),
            config.tenancy.multi_tenancy_enabled,
            config.tenancy.tenant_header_name.clone(),
        )
        .with_default_tenant_id(config.tenancy.default_tenant_id.clone()),
    );

    let default_version = config
        .fhir
        .version
        .parse::<FhirVersion>()
        .unwrap_or(FhirVersion::R5);
    let version_resolver = Arc::new(VersionResolver::new(default_version));

    let plugin_registry = Arc::new(PluginRegistry::new());
    let orchestrator = Arc::new(PluginOrchestrator::new(plugin_registry, OrchestratorConfig::default()));

    AppState {
        config: Arc::new(config),
        registry,
        version_resolver,
        tenant_resolver,
        tenant_directory,
        resource_service,
        orchestrator,
    }
}

/// Loads the Resource Registry (C1) from `config.registry.path`, falling
/// back to a small built-in set of common resource types when the file is
/// absent — this keeps `ServerBuilder::new().build()` usable without any
/// on-disk configuration, matching the teacher's "works with zero config"
/// bootstrap convention.
fn load_registry(config: &AppConfig) -> ResourceRegistry {
    let path = std::path::Path::new(&config.registry.path);
    if path.exists() {
        match ResourceRegistry::load_from_yaml_file(path) {
            Ok(registry) => return registry,
            Err(err) => {
                tracing::warn!(
                    path = %config.registry.path,
                    error = %err,
                    "failed to load resource registry from file; falling back to built-in defaults"
                );
            }
        }
    }
    ResourceRegistry::new(default_resource_configs()).expect("built-in resource configs are valid")
}

fn default_resource_configs() -> Vec<octofhir_config::ResourceConfig> {
    let versions = octofhir_config::VersionSupport {
        versions: vec![FhirVersion::R5, FhirVersion::R4B],
        default: FhirVersion::R5,
    };
    [
        "Patient",
        "Observation",
        "Encounter",
        "Condition",
        "Practitioner",
        "Organization",
        "CarePlan",
        "Bundle",
    ]
    .into_iter()
    .map(|resource_type| octofhir_config::ResourceConfig {
        resource_type: resource_type.to_string(),
        enabled: true,
        versions: versions.clone(),
        schema: SchemaPlacement::Shared {
            schema: "fhir".to_string(),
        },
        interactions: Default::default(),
        search_param_policy: None,
        profiles: Vec::new(),
    })
    .collect()
}

/// Assembles the axum `Router`: the `/fhir` surface (C9's single catch-all
/// dispatch handler, since version/resource-type/id extraction is
/// hand-parsed per §4.1 rather than expressed as overlapping route
/// patterns), the admin surface (§6), and the unauthenticated health/
/// metadata endpoints.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/fhir/metadata", get(handlers::metadata))
        .route("/fhir/{*rest}", any(handlers::fhir_dispatch))
        .merge(admin::admin_routes())
        .layer(axum::middleware::from_fn(app_middleware::request_id))
        .layer(axum::middleware::from_fn(app_middleware::content_negotiation))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Thin builder over [`build_app_state`]/[`build_app`] plus the bind/serve
/// loop, mirroring the teacher's `ServerBuilder` ergonomics (`new().build()`
/// works with no configuration at all).
pub struct ServerBuilder {
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn build(self) -> OctofhirServer {
        let addr = self.config.addr();
        let state = build_app_state(self.config).await;
        OctofhirServer {
            addr,
            app: build_app(state),
        }
    }
}

pub struct OctofhirServer {
    addr: std::net::SocketAddr,
    app: Router,
}

impl OctofhirServer {
    pub async fn run(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "octofhir server listening");
        axum::serve(listener, self.app).await
    }
}

#[allow(dead_code)]
fn _assert_send_sync_state(_: &AppState) {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<HashMap<String, String>>();
}
