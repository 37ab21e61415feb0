//! # edgerun-channel
//!
//! The message channel contract between the edge agent and the remote
//! control plane, plus an in-process bus implementation of it.
//!
//! The transport that actually carries messages off the node is an
//! external collaborator. This crate pins down what it must deliver:
//!
//! - A [`Message`] envelope carrying an operation, a `/`-joined resource
//!   locator, and a JSON content payload.
//! - Resource locator construction and decomposition ([`resource`]).
//! - A delivery seam: modules register on a [`MessageBus`] and receive
//!   messages through an [`Inbox`]; a [`BusHandle`] supports both
//!   fire-and-forget sends and a synchronous request/response pattern
//!   with a bounded timeout.
//!
//! Delivery may duplicate messages; consumers are expected to
//! deduplicate. Delivery order is preserved per sender/target pair.

mod bus;
mod message;
pub mod resource;

pub use bus::{BusHandle, Inbox, MessageBus};
pub use message::{Message, Operation};

use std::time::Duration;

use thiserror::Error;

/// Well-known module names on the bus.
pub mod modules {
    /// The reconciliation agent.
    pub const AGENT: &str = "agent";

    /// The remote metadata authority (config/secret store).
    pub const METASTORE: &str = "metastore";
}

/// Channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No module is registered under the target name.
    #[error("unknown target module: {0}")]
    UnknownTarget(String),

    /// The target's inbox has been dropped.
    #[error("channel closed for target: {0}")]
    Closed(String),

    /// A synchronous request was not answered in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A resource locator was malformed or missing required components.
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// Content could not be serialized into the envelope.
    #[error("content serialization failed: {0}")]
    Content(#[from] serde_json::Error),
}
