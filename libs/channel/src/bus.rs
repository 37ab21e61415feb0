//! In-process message bus.
//!
//! Modules register under a name and drain their [`Inbox`]; a cloneable
//! [`BusHandle`] sends messages to other modules. A synchronous
//! request/response pattern is layered on top: [`BusHandle::request`]
//! parks a oneshot reply slot keyed by the request id, and any message
//! sent with a matching `parent_id` resolves it instead of being routed
//! to an inbox.
//!
//! A production deployment bridges one side of this bus to the real
//! transport; tests drive it directly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::{ChannelError, Message};

const INBOX_CAPACITY: usize = 64;

#[derive(Default)]
struct BusInner {
    routes: Mutex<HashMap<String, mpsc::Sender<Message>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Message>>>,
}

/// The bus itself; create once, register every module on it.
#[derive(Default)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module, returning its send handle and inbox.
    ///
    /// Registering the same name twice replaces the previous route; the
    /// old inbox stops receiving.
    pub fn register(&self, module: &str) -> (BusHandle, Inbox) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let mut routes = self.inner.routes.lock().unwrap_or_else(|e| e.into_inner());
        if routes.insert(module.to_string(), tx).is_some() {
            warn!(module, "module re-registered on bus, replacing route");
        }
        drop(routes);

        (
            BusHandle {
                inner: Arc::clone(&self.inner),
                module: module.to_string(),
            },
            Inbox { rx },
        )
    }
}

/// Receiving side of a module registration.
pub struct Inbox {
    rx: mpsc::Receiver<Message>,
}

impl Inbox {
    /// Receive the next message; `None` once every handle is dropped.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

/// Sending side of a module registration.
#[derive(Clone)]
pub struct BusHandle {
    inner: Arc<BusInner>,
    module: String,
}

impl BusHandle {
    /// Name this handle was registered under.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Send a message to `target`.
    ///
    /// A message whose `parent_id` matches an outstanding request is
    /// delivered to the requester instead of the target's inbox.
    pub async fn send(&self, target: &str, msg: Message) -> Result<(), ChannelError> {
        if !msg.parent_id.is_empty() {
            let slot = {
                let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
                pending.remove(&msg.parent_id)
            };
            if let Some(slot) = slot {
                // Requester may have timed out and dropped the receiver.
                let _ = slot.send(msg);
                return Ok(());
            }
        }

        let tx = {
            let routes = self.inner.routes.lock().unwrap_or_else(|e| e.into_inner());
            routes
                .get(target)
                .cloned()
                .ok_or_else(|| ChannelError::UnknownTarget(target.to_string()))?
        };
        tx.send(msg)
            .await
            .map_err(|_| ChannelError::Closed(target.to_string()))
    }

    /// Send `msg` to `target` and wait up to `timeout` for a response
    /// correlated by `parent_id`.
    pub async fn request(
        &self,
        target: &str,
        msg: Message,
        timeout: Duration,
    ) -> Result<Message, ChannelError> {
        let id = msg.id.clone();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.insert(id.clone(), tx);
        }

        if let Err(e) = self.send(target, msg).await {
            let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ChannelError::Closed(target.to_string())),
            Err(_) => {
                let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
                pending.remove(&id);
                Err(ChannelError::Timeout(timeout))
            }
        }
    }
}
