//! edgerun Agent Library
//!
//! The agent runs on each edge node and keeps locally running native
//! applications consistent with workload descriptors pushed from the
//! control plane over the message channel. It converges three things
//! per application: the on-disk config file, the process state, and
//! what local applications can read back over the query endpoint.
//!
//! ## Architecture
//!
//! ```text
//! Dispatcher                 (drains lifecycle messages, one task each)
//! ├── Deduplicator           (suppresses repeated deliveries)
//! └── ConfigReconciler       (config file diff + process restart)
//!     ├── ConfigStoreClient  (queries the remote metadata authority)
//!     └── ProcessBackend     (direct spawn/signal, or supervisor socket)
//! QueryServer                (GET /config for local applications)
//! ```
//!
//! ## Modules
//!
//! - `dispatcher`: lifecycle message receive loop
//! - `dedup`: duplicate-delivery suppression
//! - `reconciler`: config/process convergence
//! - `process`: process backends and the process table
//! - `store`: config store client over the message channel
//! - `server`: local config query endpoint

pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod files;
pub mod model;
pub mod process;
pub mod reconciler;
pub mod server;
pub mod store;

// Internal modules exposed for integration tests
pub mod config;

// Re-export commonly used types
pub use dedup::Deduplicator;
pub use dispatcher::Dispatcher;
pub use error::AgentError;
pub use model::{AppCommand, WorkloadDescriptor};
pub use process::{DirectBackend, ProcessBackend, SupervisorBackend};
pub use reconciler::ConfigReconciler;
pub use store::ConfigStoreClient;
