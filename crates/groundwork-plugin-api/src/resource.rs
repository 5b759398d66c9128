//! Resource Monitor wire payloads.
//!
//! These are the shapes a language runtime sends to and receives from the
//! monitor service. The engine-internal resource record lives with the
//! monitor implementation, not here.

use serde::{Deserialize, Serialize};

use groundwork_foundation::{PropertyMap, Urn};

/// A resource registration from the language runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRegistration {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Urn>,
    /// True for provider-managed resources; false for components.
    #[serde(default)]
    pub custom: bool,
    /// Input property bag.
    #[serde(default)]
    pub object: PropertyMap,
    #[serde(default)]
    pub protect: bool,
    /// URNs this resource depends on. Declarative data only; ordering is the
    /// program's responsibility.
    #[serde(default)]
    pub dependencies: Vec<Urn>,
}

/// The monitor's answer to a registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResourceResult {
    pub urn: Urn,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The materialized output property bag.
    #[serde(default)]
    pub object: PropertyMap,
    #[serde(default)]
    pub stable: bool,
    #[serde(default)]
    pub stable_keys: Vec<String>,
}

/// Parameters of a `monitor/readResource` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceParams {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Urn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<PropertyMap>,
}

/// The monitor's answer to a read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    pub urn: Urn,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// Parameters of a `monitor/registerResourceOutputs` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResourceOutputsParams {
    pub urn: Urn,
    #[serde(default)]
    pub outputs: PropertyMap,
}
