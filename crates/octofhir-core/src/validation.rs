//! The Profile Validator seam (C4, §1 "deliberately out of scope" /
//! §4.4): the resource service calls through this trait to validate a
//! parsed resource against its required StructureDefinitions, but never
//! sees a concrete terminology/StructureDefinition implementation. Real
//! profile validation (terminology expansion, StructureDefinition
//! loading) is an external collaborator's job — this crate only pins down
//! the contract it is called through.

use async_trait::async_trait;
use serde_json::Value;

use crate::fhir::FhirVersion;

/// Severity of a single validation issue, mirroring the FHIR
/// `OperationOutcome.issue.severity` vocabulary closely enough to map
/// directly onto it at the response boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

/// One problem found while validating a resource against a profile.
#[derive(Debug, Clone)]
pub struct Issue {
    pub severity: IssueSeverity,
    /// A short machine code, e.g. `structure`, `required`, `code-invalid`.
    pub code: String,
    pub diagnostics: String,
    /// FHIRPath-style expression locating the offending element, if known.
    pub expression: Option<String>,
}

impl Issue {
    pub fn error(code: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            code: code.into(),
            diagnostics: diagnostics.into(),
            expression: None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, IssueSeverity::Fatal | IssueSeverity::Error)
    }
}

/// `ProfileValidator.validate(resource, version, profileUrl) → Issues[]`
/// (§6). The resource service (C7) runs this for every required profile
/// before CREATE/UPDATE when profile validation is enabled; this crate
/// never implements it — only a no-op default used by tests and by
/// deployments that run with profile validation disabled.
#[async_trait]
pub trait ProfileValidator: Send + Sync {
    async fn validate(&self, resource: &Value, version: FhirVersion, profile_url: &str) -> Vec<Issue>;
}

/// A validator that finds nothing wrong with anything — used when
/// `PROFILE_VALIDATOR_ENABLED=false` (§6) or in tests that don't exercise
/// profile validation.
pub struct NoopProfileValidator;

#[async_trait]
impl ProfileValidator for NoopProfileValidator {
    async fn validate(&self, _resource: &Value, _version: FhirVersion, _profile_url: &str) -> Vec<Issue> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn noop_validator_finds_nothing() {
        let validator = NoopProfileValidator;
        let issues = validator
            .validate(&json!({"resourceType": "Patient"}), FhirVersion::R5, "http://example.org/Patient")
            .await;
        assert!(issues.is_empty());
    }

    #[test]
    fn issue_severity_classifies_errors() {
        let err = Issue::error("required", "Patient.name is required");
        assert!(err.is_error());
        let info = Issue {
            severity: IssueSeverity::Information,
            code: "info".into(),
            diagnostics: "fyi".into(),
            expression: None,
        };
        assert!(!info.is_error());
    }
}
