//! Config store client.
//!
//! Synchronous queries to the remote metadata authority over the
//! message channel. A query builds the resource locator from its
//! components, sends a `query` message to the metastore module, and
//! blocks up to a fixed timeout for the correlated response. The
//! response content is a JSON array of raw object strings, each of
//! which parses into a config or secret object.

use std::time::Duration;

use edgerun_channel::resource::{build_resource, ResourceType};
use edgerun_channel::{modules, BusHandle, Message, Operation};
use tracing::debug;

use crate::error::AgentError;
use crate::model::{ConfigObject, SecretObject};

/// Default bound on a remote query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the remote metadata authority.
#[derive(Clone)]
pub struct ConfigStoreClient {
    bus: BusHandle,
    node_id: String,
    namespace: String,
    timeout: Duration,
}

impl ConfigStoreClient {
    pub fn new(bus: BusHandle, node_id: String, namespace: String, timeout: Duration) -> Self {
        Self {
            bus,
            node_id,
            namespace,
            timeout,
        }
    }

    /// Query raw objects of `resource_type` named by `app_name` and/or
    /// scoped to `domain`. Never hangs: a missing response surfaces as
    /// a timeout error.
    pub async fn query(
        &self,
        resource_type: ResourceType,
        app_name: Option<&str>,
        domain: Option<&str>,
    ) -> Result<Vec<String>, AgentError> {
        let resource = build_resource(
            Some(&self.node_id),
            &self.namespace,
            resource_type,
            None,
            app_name,
            domain,
        )
        .map_err(AgentError::RemoteQuery)?;

        debug!(%resource, "querying metadata authority");
        let request = Message::new(modules::AGENT, resource, Operation::Query);
        let response = self
            .bus
            .request(modules::METASTORE, request, self.timeout)
            .await?;

        let raw: Vec<String> = serde_json::from_value(response.content)?;
        Ok(raw)
    }

    /// Fetch configuration objects for an application.
    pub async fn config_objects(
        &self,
        app_name: Option<&str>,
        domain: Option<&str>,
    ) -> Result<Vec<ConfigObject>, AgentError> {
        let raw = self.query(ResourceType::ConfigMap, app_name, domain).await?;
        raw.iter()
            .map(|s| serde_json::from_str(s).map_err(AgentError::from))
            .collect()
    }

    /// Fetch secret objects for an application.
    pub async fn secret_objects(
        &self,
        app_name: Option<&str>,
        domain: Option<&str>,
    ) -> Result<Vec<SecretObject>, AgentError> {
        let raw = self.query(ResourceType::Secret, app_name, domain).await?;
        raw.iter()
            .map(|s| serde_json::from_str(s).map_err(AgentError::from))
            .collect()
    }
}
