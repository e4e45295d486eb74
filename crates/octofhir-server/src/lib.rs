//! OctoFHIR gateway server: assembles the Resource Registry (C1), Tenant
//! Resolver (C2), Version Resolver (C3), Storage Router (C6), Resource
//! Service (C7) and Plugin Orchestrator (C8) from `octofhir-core`,
//! `octofhir-config` and `octofhir-storage` into the per-request control
//! flow (C9) described in `SPEC_FULL.md` §4.6.

pub mod admin;
pub mod bootstrap;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod patch;
pub mod resource_service;
pub mod server;
pub mod tenant_directory;

pub use admin::admin_routes;
pub use observability::{apply_logging_level, current_logging_level, init_tracing, shutdown_tracing};
pub use resource_service::ResourceService;
pub use server::{AppState, ServerBuilder, build_app, build_app_state};
