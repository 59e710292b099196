// ABOUTME: Resource specifications handed to the orchestrator and deployed results.
// ABOUTME: Free-form attributes ride along in a JSON map next to the typed fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A resource requested by the upstream parsing layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(rename = "type", default)]
    pub resource_type: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<String>,

    /// Everything else (location, sku, address_space, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl ResourceSpec {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// String attribute lookup; non-string values are ignored.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        self.attributes
            .insert(key.to_string(), Value::String(value.into()));
    }
}

/// Outcome status of a provisioned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Deployed,
    DryRun,
}

/// A resource the backend reported as deployed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedResource {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: ResourceStatus,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl DeployedResource {
    pub fn deployed(spec: &ResourceSpec, id: impl Into<String>) -> Self {
        Self {
            name: spec.name.clone(),
            resource_type: spec.resource_type.clone(),
            id: Some(id.into()),
            status: ResourceStatus::Deployed,
            attributes: spec.attributes.clone(),
        }
    }

    /// Placeholder recorded instead of calling the backend.
    pub fn dry_run(spec: &ResourceSpec) -> Self {
        Self {
            name: spec.name.clone(),
            resource_type: spec.resource_type.clone(),
            id: None,
            status: ResourceStatus::DryRun,
            attributes: spec.attributes.clone(),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.status == ResourceStatus::DryRun
    }
}
