//! The Resource Registry (C1, spec §3 "Resource Configuration" / §9
//! "Global configuration singletons"): an in-memory, atomically-swappable
//! index of per-resource-type configuration, loaded once from a
//! declarative YAML document and never mutated in place. A reload replaces
//! the entire table via [`arc_swap::ArcSwap`] so a reader never observes a
//! half-updated configuration.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use octofhir_core::{CoreError, FhirVersion, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `[A-Za-z_][A-Za-z0-9_]*` — the safelist pattern a dedicated schema name
/// must satisfy before it is ever interpolated into a storage identifier
/// (§4.5, §9 design note on dynamic schema names).
fn schema_name_pattern() -> Regex {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern is valid")
}

pub fn validate_schema_name(name: &str) -> Result<()> {
    if schema_name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(CoreError::configuration(format!(
            "schema name '{name}' does not match [A-Za-z_][A-Za-z0-9_]*"
        )))
    }
}

/// The eight interactions a resource type may expose (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interaction {
    Read,
    Vread,
    Create,
    Update,
    Patch,
    Delete,
    Search,
    History,
}

fn default_true() -> bool {
    true
}

/// The interaction bitmap. Every interaction defaults to enabled so a
/// config that omits the field entirely behaves like a fully-open resource
/// — callers that want to lock a resource down list exactly what to
/// disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionSet {
    #[serde(default = "default_true")]
    pub read: bool,
    #[serde(default = "default_true")]
    pub vread: bool,
    #[serde(default = "default_true")]
    pub create: bool,
    #[serde(default = "default_true")]
    pub update: bool,
    #[serde(default = "default_true")]
    pub patch: bool,
    #[serde(default = "default_true")]
    pub delete: bool,
    #[serde(default = "default_true")]
    pub search: bool,
    #[serde(default = "default_true")]
    pub history: bool,
}

impl Default for InteractionSet {
    fn default() -> Self {
        Self::all_enabled()
    }
}

impl InteractionSet {
    pub fn all_enabled() -> Self {
        Self {
            read: true,
            vread: true,
            create: true,
            update: true,
            patch: true,
            delete: true,
            search: true,
            history: true,
        }
    }

    pub fn allows(&self, interaction: Interaction) -> bool {
        match interaction {
            Interaction::Read => self.read,
            Interaction::Vread => self.vread,
            Interaction::Create => self.create,
            Interaction::Update => self.update,
            Interaction::Patch => self.patch,
            Interaction::Delete => self.delete,
            Interaction::Search => self.search,
            Interaction::History => self.history,
        }
    }
}

/// Allowlist or denylist enforcement mode for search parameters (§3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchParamMode {
    Allowlist,
    Denylist,
}

/// Per-resource search-parameter policy. `common` applies across every
/// resource type (e.g. `_text`, `_content`); `resource_specific` augments
/// it for this resource type alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParamPolicy {
    pub mode: SearchParamMode,
    #[serde(default)]
    pub common: Vec<String>,
    #[serde(default)]
    pub resource_specific: Vec<String>,
    /// When `true`, a disallowed parameter fails the SEARCH with
    /// `BadRequest` (§4.4, §7) instead of being dropped. Defaults to
    /// `false` (log-and-drop, per the resolved Open Question in §9).
    #[serde(default)]
    pub fail_closed: bool,
}

impl SearchParamPolicy {
    /// Whether `param` is permitted under this policy, ignoring the
    /// leniency question (fail-closed vs. drop-silently) — that is the
    /// search-param *validator*'s call (C5), not the registry's.
    pub fn permits(&self, param: &str) -> bool {
        let listed = self.common.iter().any(|p| p == param)
            || self.resource_specific.iter().any(|p| p == param);
        match self.mode {
            SearchParamMode::Allowlist => listed,
            SearchParamMode::Denylist => !listed,
        }
    }
}

/// A required or optional StructureDefinition profile (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRequirement {
    pub url: String,
    #[serde(default)]
    pub required: bool,
}

/// Where a resource type's rows physically live (§4.5, §6 "Persisted state
/// layout"). The schema name is validated against the safelist pattern the
/// instant a configuration is loaded, and again by the storage router
/// immediately before use (§9 design note: validate on load *and* before
/// use).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "placement", rename_all = "snake_case")]
pub enum SchemaPlacement {
    Shared { schema: String },
    Dedicated { schema: String },
}

impl SchemaPlacement {
    pub fn schema_name(&self) -> &str {
        match self {
            SchemaPlacement::Shared { schema } | SchemaPlacement::Dedicated { schema } => schema,
        }
    }

    pub fn is_dedicated(&self) -> bool {
        matches!(self, SchemaPlacement::Dedicated { .. })
    }
}

/// The set of FHIR versions a resource type supports, with exactly one
/// flagged as the default used when a request names no version at all
/// (§3 invariant: "exactly one supported version flagged default").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSupport {
    pub versions: Vec<FhirVersion>,
    pub default: FhirVersion,
}

impl VersionSupport {
    pub fn supports(&self, version: FhirVersion) -> bool {
        self.versions.contains(&version)
    }
}

/// One resource type's complete, effectively-immutable configuration (§3
/// "Resource Configuration"). The full set of these is the Resource
/// Registry's table; configurations are loaded once and atomically
/// replaced wholesale on reload, never patched field-by-field at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub resource_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub versions: VersionSupport,
    pub schema: SchemaPlacement,
    #[serde(default)]
    pub interactions: InteractionSet,
    #[serde(default)]
    pub search_param_policy: Option<SearchParamPolicy>,
    #[serde(default)]
    pub profiles: Vec<ProfileRequirement>,
}

impl ResourceConfig {
    fn validate(&self) -> Result<()> {
        if !self.versions.supports(self.versions.default) {
            return Err(CoreError::configuration(format!(
                "resource '{}': default version {:?} is not in its supported-version list",
                self.resource_type, self.versions.default
            )));
        }
        validate_schema_name(self.schema.schema_name())?;
        Ok(())
    }
}

/// The declarative document the registry is built from (§6 environment /
/// §9 design note: "model as a Configuration value initialized once at
/// startup").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryDocument {
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// The read-only-after-load, atomically-swappable index of resource
/// configuration (§3, §5, §9). Every [`ResourceConfig`] it hands out is a
/// clone of a snapshot — callers never see a table mid-swap.
pub struct ResourceRegistry {
    table: ArcSwap<HashMap<String, ResourceConfig>>,
}

impl ResourceRegistry {
    pub fn new(configs: Vec<ResourceConfig>) -> Result<Self> {
        let table = build_table(configs)?;
        Ok(Self {
            table: ArcSwap::from_pointee(table),
        })
    }

    pub fn empty() -> Self {
        Self {
            table: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let doc: RegistryDocument = serde_yaml::from_str(yaml)
            .map_err(|e| CoreError::configuration(format!("invalid registry YAML: {e}")))?;
        Self::new(doc.resources)
    }

    pub fn load_from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CoreError::configuration(format!(
                "failed to read registry file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Looks up a resource type's configuration from the current snapshot.
    pub fn get(&self, resource_type: &str) -> Option<ResourceConfig> {
        self.table.load().get(resource_type).cloned()
    }

    pub fn contains(&self, resource_type: &str) -> bool {
        self.table.load().contains_key(resource_type)
    }

    /// Atomically replaces the whole table (§3 invariant: "configurations
    /// are atomically replaced — never partially updated at runtime").
    pub fn reload(&self, configs: Vec<ResourceConfig>) -> Result<()> {
        let table = build_table(configs)?;
        self.table.store(Arc::new(table));
        Ok(())
    }

    pub fn resource_types(&self) -> Vec<String> {
        self.table.load().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_table(configs: Vec<ResourceConfig>) -> Result<HashMap<String, ResourceConfig>> {
    let mut table = HashMap::with_capacity(configs.len());
    for config in configs {
        config.validate()?;
        table.insert(config.resource_type.clone(), config);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient_config() -> ResourceConfig {
        ResourceConfig {
            resource_type: "Patient".to_string(),
            enabled: true,
            versions: VersionSupport {
                versions: vec![FhirVersion::R5, FhirVersion::R4B],
                default: FhirVersion::R5,
            },
            schema: SchemaPlacement::Shared {
                schema: "fhir".to_string(),
            },
            interactions: InteractionSet::all_enabled(),
            search_param_policy: None,
            profiles: vec![],
        }
    }

    #[test]
    fn registry_looks_up_by_resource_type() {
        let registry = ResourceRegistry::new(vec![patient_config()]).unwrap();
        assert!(registry.contains("Patient"));
        assert!(!registry.contains("Observation"));
        assert_eq!(registry.get("Patient").unwrap().resource_type, "Patient");
    }

    #[test]
    fn invalid_default_version_is_rejected() {
        let mut config = patient_config();
        config.versions.default = FhirVersion::R4B;
        config.versions.versions = vec![FhirVersion::R5];
        let err = ResourceRegistry::new(vec![config]).unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn invalid_schema_name_is_rejected() {
        let mut config = patient_config();
        config.schema = SchemaPlacement::Dedicated {
            schema: "bad-name; DROP TABLE".to_string(),
        };
        assert!(ResourceRegistry::new(vec![config]).is_err());
    }

    #[test]
    fn reload_swaps_the_whole_table_atomically() {
        let registry = ResourceRegistry::new(vec![patient_config()]).unwrap();
        assert!(registry.contains("Patient"));

        let mut obs = patient_config();
        obs.resource_type = "Observation".to_string();
        registry.reload(vec![obs]).unwrap();

        assert!(!registry.contains("Patient"));
        assert!(registry.contains("Observation"));
    }

    #[test]
    fn reload_with_invalid_config_leaves_previous_table_intact() {
        let registry = ResourceRegistry::new(vec![patient_config()]).unwrap();
        let mut bad = patient_config();
        bad.resource_type = "Broken".to_string();
        bad.schema = SchemaPlacement::Dedicated {
            schema: "; evil".to_string(),
        };
        assert!(registry.reload(vec![bad]).is_err());
        // Original table untouched.
        assert!(registry.contains("Patient"));
        assert!(!registry.contains("Broken"));
    }

    #[test]
    fn search_param_policy_allowlist_and_denylist() {
        let allow = SearchParamPolicy {
            mode: SearchParamMode::Allowlist,
            common: vec!["status".to_string()],
            resource_specific: vec![],
            fail_closed: false,
        };
        assert!(allow.permits("status"));
        assert!(!allow.permits("_text"));

        let deny = SearchParamPolicy {
            mode: SearchParamMode::Denylist,
            common: vec!["_text".to_string(), "_content".to_string()],
            resource_specific: vec!["_filter".to_string()],
            fail_closed: false,
        };
        assert!(!deny.permits("_text"));
        assert!(!deny.permits("_filter"));
        assert!(deny.permits("status"));
    }

    #[test]
    fn parses_from_yaml() {
        let yaml = r#"
resources:
  - resource_type: Patient
    versions:
      versions: [r5, r4b]
      default: r5
    schema:
      placement: shared
      schema: fhir
  - resource_type: CarePlan
    versions:
      versions: [r5]
      default: r5
    schema:
      placement: dedicated
      schema: careplan
    search_param_policy:
      mode: denylist
      common: [_text, _content, _filter]
"#;
        let registry = ResourceRegistry::from_yaml_str(yaml).unwrap();
        assert!(registry.contains("Patient"));
        let careplan = registry.get("CarePlan").unwrap();
        assert!(careplan.schema.is_dedicated());
        assert_eq!(careplan.schema.schema_name(), "careplan");
        assert!(!careplan.search_param_policy.as_ref().unwrap().permits("_text"));
    }

    #[test]
    fn schema_name_validation() {
        assert!(validate_schema_name("careplan").is_ok());
        assert!(validate_schema_name("_private_2").is_ok());
        assert!(validate_schema_name("2invalid").is_err());
        assert!(validate_schema_name("bad-name").is_err());
        assert!(validate_schema_name("bad; DROP TABLE").is_err());
    }
}
