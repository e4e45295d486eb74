use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// FHIR version supported by this gateway. The default, absent an explicit
/// path segment, is R5 (see the version resolver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FhirVersion {
    R4B,
    R5,
}

/// Serializes to the canonical dotted form (`4.3.0` / `5.0.0`, the
/// `X-FHIR-Version` wire value) but deserializes leniently through
/// [`FromStr`], so a config file or registry YAML may write `r5`, `R4B`, or
/// the dotted form interchangeably.
impl Serialize for FhirVersion {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FhirVersion {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FhirVersion {
    /// Lowercase path-segment form, e.g. `r5`, `r4b`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            FhirVersion::R4B => "r4b",
            FhirVersion::R5 => "r5",
        }
    }

    /// Parses a case-insensitive path segment (`r5`, `R4B`, ...), distinct
    /// from `FromStr` which also accepts the dotted semver form used on the
    /// wire (`X-FHIR-Version` header, config files).
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment.to_ascii_lowercase().as_str() {
            "r5" => Some(FhirVersion::R5),
            "r4b" => Some(FhirVersion::R4B),
            _ => None,
        }
    }
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FhirVersion::R4B => write!(f, "4.3.0"),
            FhirVersion::R5 => write!(f, "5.0.0"),
        }
    }
}

impl FromStr for FhirVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "4.3.0" | "R4B" | "r4b" => Ok(FhirVersion::R4B),
            "5.0.0" | "R5" | "r5" => Ok(FhirVersion::R5),
            _ => Err(CoreError::version_not_supported(format!(
                "Unknown FHIR version: {s}"
            ))),
        }
    }
}

impl Default for FhirVersion {
    fn default() -> Self {
        FhirVersion::R5
    }
}

/// A FHIR resource type name (`Patient`, `Observation`, a tenant-defined
/// custom type, ...). Resource parsing itself is delegated to the external
/// conformance engine (out of scope here); this gateway only ever needs the
/// discriminator string, so it is kept as a validated newtype rather than a
/// closed enum of every resource the spec happens to know about.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(String);

impl ResourceType {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_valid_resource_type_name(s) {
            Ok(ResourceType(s.to_string()))
        } else {
            Err(CoreError::invalid_resource_type(s.to_string()))
        }
    }
}

impl TryFrom<String> for ResourceType {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if is_valid_resource_type_name(&s) {
            Ok(ResourceType(s))
        } else {
            Err(CoreError::invalid_resource_type(s))
        }
    }
}

impl AsRef<str> for ResourceType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate if a string is a valid FHIR resource type name: must start with
/// an uppercase letter and contain only ASCII letters.
pub fn is_valid_resource_type_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .next()
            .map(|c| c.is_ascii_uppercase())
            .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fhir_version_display() {
        assert_eq!(FhirVersion::R4B.to_string(), "4.3.0");
        assert_eq!(FhirVersion::R5.to_string(), "5.0.0");
    }

    #[test]
    fn test_fhir_version_from_str() {
        assert_eq!(FhirVersion::from_str("4.3.0").unwrap(), FhirVersion::R4B);
        assert_eq!(FhirVersion::from_str("R4B").unwrap(), FhirVersion::R4B);
        assert_eq!(FhirVersion::from_str("5.0.0").unwrap(), FhirVersion::R5);
        assert_eq!(FhirVersion::from_str("R5").unwrap(), FhirVersion::R5);

        assert!(FhirVersion::from_str("invalid").is_err());
        assert!(FhirVersion::from_str("4.0.0").is_err());
    }

    #[test]
    fn test_fhir_version_default_is_r5() {
        assert_eq!(FhirVersion::default(), FhirVersion::R5);
    }

    #[test]
    fn test_fhir_version_path_segment_roundtrip() {
        for v in [FhirVersion::R4B, FhirVersion::R5] {
            let seg = v.path_segment();
            assert_eq!(FhirVersion::from_path_segment(seg), Some(v));
            assert_eq!(
                FhirVersion::from_path_segment(&seg.to_ascii_uppercase()),
                Some(v)
            );
        }
        assert_eq!(FhirVersion::from_path_segment("r4"), None);
    }

    #[test]
    fn test_fhir_version_serialization() {
        assert_eq!(serde_json::to_string(&FhirVersion::R4B).unwrap(), "\"4.3.0\"");
        assert_eq!(serde_json::to_string(&FhirVersion::R5).unwrap(), "\"5.0.0\"");
    }

    #[test]
    fn test_resource_type_from_str() {
        assert_eq!(
            ResourceType::from_str("Patient").unwrap().as_str(),
            "Patient"
        );
        assert_eq!(
            ResourceType::from_str("CustomResource").unwrap().as_str(),
            "CustomResource"
        );

        assert!(ResourceType::from_str("invalidResource").is_err());
        assert!(ResourceType::from_str("Invalid123").is_err());
        assert!(ResourceType::from_str("").is_err());
    }

    #[test]
    fn test_resource_type_display() {
        assert_eq!(
            ResourceType::from_str("Patient").unwrap().to_string(),
            "Patient"
        );
    }

    #[test]
    fn test_resource_type_serialization() {
        let rt = ResourceType::from_str("Patient").unwrap();
        assert_eq!(serde_json::to_string(&rt).unwrap(), "\"Patient\"");
        let rt: ResourceType = serde_json::from_str("\"Observation\"").unwrap();
        assert_eq!(rt.as_str(), "Observation");
    }

    #[test]
    fn test_resource_type_deserialization_rejects_invalid() {
        let result: Result<ResourceType, _> = serde_json::from_str("\"not-valid\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_is_valid_resource_type_name() {
        assert!(is_valid_resource_type_name("Patient"));
        assert!(is_valid_resource_type_name("CustomResource"));
        assert!(is_valid_resource_type_name("A"));

        assert!(!is_valid_resource_type_name("patient"));
        assert!(!is_valid_resource_type_name("123Patient"));
        assert!(!is_valid_resource_type_name("Patient123"));
        assert!(!is_valid_resource_type_name("Patient-Type"));
        assert!(!is_valid_resource_type_name(""));
    }

    #[test]
    fn test_resource_type_ordering_and_hashing() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(ResourceType::from_str("Patient").unwrap(), "patient data");
        map.insert(ResourceType::from_str("Observation").unwrap(), "obs data");

        assert_eq!(
            map.get(&ResourceType::from_str("Patient").unwrap()),
            Some(&"patient data")
        );
        assert!(ResourceType::from_str("Condition").unwrap() > ResourceType::from_str("Bundle").unwrap());
    }

    #[test]
    fn test_resource_type_roundtrip() {
        for name in ["Patient", "Organization", "CapabilityStatement", "CarePlan"] {
            let rt = ResourceType::from_str(name).unwrap();
            let back = ResourceType::from_str(&rt.to_string()).unwrap();
            assert_eq!(rt, back);
        }
    }
}
