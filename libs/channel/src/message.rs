//! The message envelope exchanged over the channel.

use serde::{Deserialize, Serialize};

use crate::ChannelError;

/// Lifecycle and query operations carried by a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A workload was created upstream.
    Insert,
    /// A workload was changed upstream.
    Update,
    /// A workload was removed upstream.
    Delete,
    /// A synchronous read of a remote object.
    Query,
    /// The answer to a query, correlated via `parent_id`.
    Response,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Query => "query",
            Operation::Response => "response",
        };
        write!(f, "{s}")
    }
}

/// One message on the channel.
///
/// `resource` is a `/`-joined locator (see [`crate::resource`]);
/// `content` is an opaque JSON payload whose shape depends on the
/// operation and delivery mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id.
    pub id: String,

    /// Id of the request this message answers; empty for fresh messages.
    #[serde(default)]
    pub parent_id: String,

    /// Name of the sending module.
    pub source: String,

    /// Resource locator.
    pub resource: String,

    /// Operation to apply to the resource.
    pub operation: Operation,

    /// Payload.
    #[serde(default)]
    pub content: serde_json::Value,
}

impl Message {
    /// Create a fresh message with a generated id and empty content.
    pub fn new(source: impl Into<String>, resource: impl Into<String>, operation: Operation) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: String::new(),
            source: source.into(),
            resource: resource.into(),
            operation,
            content: serde_json::Value::Null,
        }
    }

    /// Attach a serializable payload.
    pub fn with_content<T: Serialize>(mut self, content: &T) -> Result<Self, ChannelError> {
        self.content = serde_json::to_value(content)?;
        Ok(self)
    }

    /// Build the response to this message. The response keeps the
    /// resource of the request and records the request id as parent.
    pub fn response(&self, source: impl Into<String>, content: serde_json::Value) -> Message {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: self.id.clone(),
            source: source.into(),
            resource: self.resource.clone(),
            operation: Operation::Response,
            content,
        }
    }
}
