use crate::{FhirDateTime, ResourceType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResourceStatus {
    #[default]
    Active,
    Inactive,
    Draft,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    #[serde(rename = "lastUpdated")]
    pub last_updated: FhirDateTime,
    #[serde(rename = "versionId", skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub profile: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub security: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tag: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ResourceMeta {
    pub fn new() -> Self {
        Self {
            last_updated: crate::time::now_utc(),
            version_id: None,
            profile: Vec::new(),
            security: Vec::new(),
            tag: Vec::new(),
            source: None,
        }
    }

    pub fn with_version_id(mut self, version_id: String) -> Self {
        self.version_id = Some(version_id);
        self
    }

    pub fn with_profile(mut self, profile: Vec<String>) -> Self {
        self.profile = profile;
        self
    }

    pub fn update_timestamp(&mut self) {
        self.last_updated = crate::time::now_utc();
    }
}

impl Default for ResourceMeta {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEnvelope {
    pub id: String,
    #[serde(rename = "resourceType")]
    pub resource_type: ResourceType,
    pub status: ResourceStatus,
    pub meta: ResourceMeta,
    #[serde(flatten)]
    pub data: HashMap<String, Value>,
}

impl ResourceEnvelope {
    pub fn new(id: String, resource_type: ResourceType) -> Self {
        Self {
            id,
            resource_type,
            status: ResourceStatus::default(),
            meta: ResourceMeta::new(),
            data: HashMap::new(),
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_meta(mut self, meta: ResourceMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_data(mut self, data: HashMap<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn add_field(&mut self, key: String, value: Value) {
        self.data.insert(key, value);
    }

    pub fn get_field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn remove_field(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn update_meta(&mut self) {
        self.meta.update_timestamp();
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, ResourceStatus::Active)
    }
}
