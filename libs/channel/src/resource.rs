//! Resource locator construction and decomposition.
//!
//! Locators are `/`-joined component lists. Queries to the metadata
//! authority use the full form
//! `node/<nodeID>/<namespace>/<resourceType>[/<resourceID>][/<appName>][/<domain>]`;
//! workload lifecycle messages use the short form `<namespace>/<instance>`.
//! Absent components are omitted entirely, never left as empty segments.

use crate::ChannelError;

/// Separator between locator components.
pub const SEP: char = '/';

/// Leading component that scopes a locator to one node.
pub const NODE_PREFIX: &str = "node";

/// Remote object types the metadata authority serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    /// Plain key-value configuration bundle.
    ConfigMap,
    /// Key-value bundle with base64-encoded values.
    Secret,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::ConfigMap => "configmap",
            ResourceType::Secret => "secret",
        }
    }
}

impl std::str::FromStr for ResourceType {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "configmap" => Ok(ResourceType::ConfigMap),
            "secret" => Ok(ResourceType::Secret),
            other => Err(ChannelError::InvalidResource(format!(
                "unknown resource type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build a query locator from its components.
///
/// `namespace` and `resource_type` are required; every other component
/// is appended in the fixed order `nodeID, namespace, resourceType,
/// resourceID, appName, domain` when present.
pub fn build_resource(
    node_id: Option<&str>,
    namespace: &str,
    resource_type: ResourceType,
    resource_id: Option<&str>,
    app_name: Option<&str>,
    domain: Option<&str>,
) -> Result<String, ChannelError> {
    if namespace.is_empty() {
        return Err(ChannelError::InvalidResource(
            "namespace is required".to_string(),
        ));
    }

    let mut parts: Vec<&str> = Vec::with_capacity(7);
    if let Some(node_id) = node_id.filter(|s| !s.is_empty()) {
        parts.push(NODE_PREFIX);
        parts.push(node_id);
    }
    parts.push(namespace);
    parts.push(resource_type.as_str());
    for component in [resource_id, app_name, domain] {
        if let Some(component) = component.filter(|s| !s.is_empty()) {
            parts.push(component);
        }
    }

    Ok(parts.join(&SEP.to_string()))
}

/// Decompose a locator into its components.
pub fn split_resource(resource: &str) -> Vec<&str> {
    resource.split(SEP).filter(|s| !s.is_empty()).collect()
}
