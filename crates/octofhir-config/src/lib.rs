//! Resource Registry (C1): the atomically-swappable index of per-resource
//! configuration that every other component consults — whether a resource
//! type is enabled, which FHIR versions it supports, where its rows are
//! stored, which interactions and search parameters it exposes, and which
//! profiles it requires (§3, §4.5, §9).
//!
//! The registry is loaded once from a declarative YAML document at
//! startup and reloaded only as a whole — there is no field-level mutation
//! at runtime.

pub mod registry;

pub use registry::{
    Interaction, InteractionSet, ProfileRequirement, RegistryDocument, ResourceConfig,
    ResourceRegistry, SchemaPlacement, SearchParamMode, SearchParamPolicy, VersionSupport,
    validate_schema_name,
};
