//! Version resolution (C3): recognizes the optional, case-insensitive
//! `/r5/` or `/r4b/` path segment and extracts the resource type/id that
//! follow it (§4.1).

use crate::fhir::FhirVersion;

/// The outcome of parsing a request path: which FHIR version applies,
/// whether the client named it explicitly (vs. the default), and whatever
/// path remained after the version segment was consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: FhirVersion,
    pub explicit: bool,
    pub remaining_path: String,
}

/// Resource type and id extracted from the path remaining after the
/// version segment, when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResourcePath {
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
}

pub struct VersionResolver {
    default_version: FhirVersion,
}

impl Default for VersionResolver {
    fn default() -> Self {
        Self::new(FhirVersion::R5)
    }
}

impl VersionResolver {
    pub fn new(default_version: FhirVersion) -> Self {
        Self { default_version }
    }

    /// Parses `path` (the portion of the request path after the `/fhir`
    /// prefix has already been stripped by the router). An absent version
    /// segment resolves to the configured default (§4.1).
    pub fn resolve(&self, path: &str) -> ResolvedVersion {
        let trimmed = path.trim_start_matches('/');
        let mut segments = trimmed.splitn(2, '/');
        let first = segments.next().unwrap_or("");
        let rest = segments.next().unwrap_or("");

        match FhirVersion::from_path_segment(first) {
            Some(version) => ResolvedVersion {
                version,
                explicit: true,
                remaining_path: rest.to_string(),
            },
            None => ResolvedVersion {
                version: self.default_version,
                explicit: false,
                remaining_path: trimmed.to_string(),
            },
        }
    }

    /// Extracts `{resourceType}` and `{resourceId}` from the path left over
    /// after version resolution. Neither segment is validated here — that
    /// is the Resource Registry's (resource type) and storage layer's
    /// (id format) job.
    pub fn resolve_resource_path(&self, remaining_path: &str) -> ResolvedResourcePath {
        let trimmed = remaining_path.trim_start_matches('/').trim_end_matches('/');
        if trimmed.is_empty() {
            return ResolvedResourcePath {
                resource_type: None,
                resource_id: None,
            };
        }
        let mut segments = trimmed.splitn(2, '/');
        let resource_type = segments.next().filter(|s| !s.is_empty()).map(str::to_string);
        let resource_id = segments
            .next()
            .and_then(|rest| rest.split('/').next())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        ResolvedResourcePath {
            resource_type,
            resource_id,
        }
    }
}
