use crate::fhir::{FhirVersion, ResourceType};
use serde::{Deserialize, Serialize};

/// The operation a request represents, used both to match plugin
/// descriptors and to label the plugin context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Create,
    Read,
    Vread,
    Update,
    Patch,
    Delete,
    Search,
    History,
    Operation,
}

/// The concrete four-tuple describing an in-flight request, used to match
/// against registered [`OperationDescriptor`]s.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub resource_type: ResourceType,
    pub operation_type: OperationType,
    /// Extended-operation code (e.g. `$validate`), only meaningful when
    /// `operation_type == Operation`.
    pub operation_code: Option<String>,
    pub fhir_version: FhirVersion,
}

/// A plugin's subscription to a family of operations. Any field left `None`
/// acts as a wildcard. Specificity is for diagnostics only — it never
/// affects dispatch ordering, which is priority-based (§4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub resource_type: Option<ResourceType>,
    pub operation_type: Option<OperationType>,
    pub operation_code: Option<String>,
    pub fhir_version: Option<FhirVersion>,
}

impl OperationDescriptor {
    pub fn matches(&self, request: &RequestDescriptor) -> bool {
        if let Some(rt) = &self.resource_type {
            if rt != &request.resource_type {
                return false;
            }
        }
        if let Some(op) = self.operation_type {
            if op != request.operation_type {
                return false;
            }
        }
        if request.operation_type == OperationType::Operation {
            if let Some(code) = &self.operation_code {
                if Some(code) != request.operation_code.as_ref() {
                    return false;
                }
            }
        }
        if let Some(v) = self.fhir_version {
            if v != request.fhir_version {
                return false;
            }
        }
        true
    }

    /// `4*nonNull(type) + 2*nonNull(opType) + 2*nonNull(opCode) + 1*nonNull(version)`.
    /// Diagnostics only (§3) — never used to order dispatch.
    pub fn specificity(&self) -> u32 {
        let mut score = 0;
        if self.resource_type.is_some() {
            score += 4;
        }
        if self.operation_type.is_some() {
            score += 2;
        }
        if self.operation_code.is_some() {
            score += 2;
        }
        if self.fhir_version.is_some() {
            score += 1;
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn req(rt: &str, op: OperationType) -> RequestDescriptor {
        RequestDescriptor {
            resource_type: ResourceType::from_str(rt).unwrap(),
            operation_type: op,
            operation_code: None,
            fhir_version: FhirVersion::R5,
        }
    }

    #[test]
    fn wildcard_descriptor_matches_everything() {
        let d = OperationDescriptor::default();
        assert!(d.matches(&req("Patient", OperationType::Create)));
        assert!(d.matches(&req("Observation", OperationType::Delete)));
    }

    #[test]
    fn resource_type_filters() {
        let d = OperationDescriptor {
            resource_type: Some(ResourceType::from_str("Patient").unwrap()),
            ..Default::default()
        };
        assert!(d.matches(&req("Patient", OperationType::Create)));
        assert!(!d.matches(&req("Observation", OperationType::Create)));
    }

    #[test]
    fn operation_code_only_checked_for_extended_operations() {
        let d = OperationDescriptor {
            operation_code: Some("validate".to_string()),
            ..Default::default()
        };
        // Non-operation requests never carry a code, so the descriptor's
        // code filter is not applied outside OperationType::Operation.
        assert!(d.matches(&req("Patient", OperationType::Create)));

        let mut op_req = req("Patient", OperationType::Operation);
        op_req.operation_code = Some("validate".to_string());
        assert!(d.matches(&op_req));

        op_req.operation_code = Some("everything".to_string());
        assert!(!d.matches(&op_req));
    }

    #[test]
    fn specificity_scoring() {
        let empty = OperationDescriptor::default();
        assert_eq!(empty.specificity(), 0);

        let full = OperationDescriptor {
            resource_type: Some(ResourceType::from_str("Patient").unwrap()),
            operation_type: Some(OperationType::Create),
            operation_code: Some("x".to_string()),
            fhir_version: Some(FhirVersion::R5),
        };
        assert_eq!(full.specificity(), 4 + 2 + 2 + 1);
    }
}
