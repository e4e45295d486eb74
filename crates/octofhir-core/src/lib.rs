pub mod error;
pub mod fhir;
pub mod id;
pub mod plugin;
pub mod resource;
pub mod tenant;
pub mod time;
pub mod validation;
pub mod version;

pub use error::{CoreError, Result};
pub use fhir::{FhirVersion, ResourceType};
pub use id::{IdError, generate_id, validate_id};
pub use resource::{ResourceEnvelope, ResourceMeta, ResourceStatus};
pub use tenant::{Tenant, TenantCache, TenantDirectory, TenantResolver, DEFAULT_TENANT_GUID, DEFAULT_TENANT_ID};
pub use time::{FhirDateTime, now_utc};
pub use validation::{Issue, IssueSeverity, NoopProfileValidator, ProfileValidator};
pub use version::{ResolvedVersion, VersionResolver};
