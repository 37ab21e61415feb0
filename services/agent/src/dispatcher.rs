//! Message dispatcher.
//!
//! Drains the agent's inbox strictly sequentially and hands each
//! lifecycle message to an independent task, so unrelated applications
//! reconcile in parallel. Malformed messages are logged and dropped:
//! the transport is fire-and-forget and the control plane re-sends
//! state, so no error travels back.
//!
//! On shutdown the receive loop exits on its next iteration and
//! in-flight tasks are drained for a bounded grace period, then
//! abandoned.

use std::sync::Arc;
use std::time::Duration;

use edgerun_channel::{resource::split_resource, Inbox, Message, Operation};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dedup::Deduplicator;
use crate::error::AgentError;
use crate::model::{AppCommand, OperationKey, WorkloadDescriptor};
use crate::process;
use crate::reconciler::ConfigReconciler;

/// Segments expected in a lifecycle resource: `namespace/instance`.
const LIFECYCLE_RESOURCE_ARITY: usize = 2;

/// Message payload: a workload descriptor, or a raw command argv in the
/// legacy delivery mode.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessagePayload {
    Raw(Vec<String>),
    Descriptor(WorkloadDescriptor),
}

/// A parsed, normalized lifecycle command.
#[derive(Debug)]
struct LifecycleCommand {
    operation: Operation,
    key: OperationKey,
    token: Option<String>,
    command: AppCommand,
}

/// Receives lifecycle messages and routes them through the
/// deduplicator to the reconciler.
pub struct Dispatcher {
    inbox: Inbox,
    dedup: Arc<Deduplicator>,
    reconciler: Arc<ConfigReconciler>,
    drain_grace: Duration,
}

impl Dispatcher {
    pub fn new(
        inbox: Inbox,
        dedup: Arc<Deduplicator>,
        reconciler: Arc<ConfigReconciler>,
        drain_grace: Duration,
    ) -> Self {
        Self {
            inbox,
            dedup,
            reconciler,
            drain_grace,
        }
    }

    /// Run the receive loop until shutdown or channel close.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("starting message dispatcher");
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("dispatcher shutting down");
                        break;
                    }
                }
                maybe = self.inbox.recv() => {
                    match maybe {
                        Some(msg) => {
                            debug!(operation = %msg.operation, resource = %msg.resource, "message received");
                            let dedup = Arc::clone(&self.dedup);
                            let reconciler = Arc::clone(&self.reconciler);
                            tasks.spawn(async move {
                                handle_message(msg, dedup, reconciler).await;
                            });
                        }
                        None => {
                            warn!("message channel closed, dispatcher exiting");
                            break;
                        }
                    }
                }
            }
        }

        drain(&mut tasks, self.drain_grace).await;
    }
}

/// Wait up to `grace` for in-flight tasks, then abandon the rest.
async fn drain(tasks: &mut JoinSet<()>, grace: Duration) {
    if tasks.is_empty() {
        return;
    }
    info!(in_flight = tasks.len(), "draining in-flight reconciliation tasks");
    let deadline = tokio::time::Instant::now() + grace;
    loop {
        tokio::select! {
            joined = tasks.join_next() => {
                if joined.is_none() {
                    break;
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!(abandoned = tasks.len(), "drain grace elapsed, abandoning tasks");
                break;
            }
        }
    }
}

/// Handle one message end to end. Errors are logged, never returned.
async fn handle_message(msg: Message, dedup: Arc<Deduplicator>, reconciler: Arc<ConfigReconciler>) {
    let cmd = match parse_message(&msg) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!(resource = %msg.resource, error = %e, "dropping malformed message");
            return;
        }
    };

    match cmd.operation {
        Operation::Insert | Operation::Update => {
            if !dedup.should_run(&cmd.key, cmd.token.as_deref()) {
                debug!(key = %cmd.key, "operation suppressed");
                return;
            }
            match reconciler.reconcile_update(&cmd.command).await {
                Ok(()) => {
                    dedup.finish(&cmd.key);
                    info!(key = %cmd.key, "reconciliation complete");
                }
                Err(e) => {
                    // Clear so a re-delivery is not incorrectly suppressed.
                    dedup.clear(&cmd.key);
                    warn!(key = %cmd.key, error = %e, "reconciliation failed");
                }
            }
        }
        Operation::Delete => {
            // Deletion must never be suppressed.
            dedup.clear(&cmd.key);
            if let Err(e) = reconciler.reconcile_delete(&cmd.command).await {
                warn!(key = %cmd.key, error = %e, "delete failed");
            } else {
                info!(key = %cmd.key, "instance deleted");
            }
        }
        op => {
            warn!(operation = %op, "unexpected operation on lifecycle channel");
        }
    }
}

/// Validate and normalize one message.
fn parse_message(msg: &Message) -> Result<LifecycleCommand, AgentError> {
    if !matches!(
        msg.operation,
        Operation::Insert | Operation::Update | Operation::Delete
    ) {
        return Err(AgentError::InvalidParameter(format!(
            "unsupported operation: {}",
            msg.operation
        )));
    }

    let segments = split_resource(&msg.resource);
    if segments.len() != LIFECYCLE_RESOURCE_ARITY {
        return Err(AgentError::InvalidParameter(format!(
            "resource must have {} segments, got {}: {}",
            LIFECYCLE_RESOURCE_ARITY,
            segments.len(),
            msg.resource
        )));
    }
    let (namespace, instance) = (segments[0], segments[1]);

    let payload: MessagePayload = serde_json::from_value(msg.content.clone())?;
    let (key, token, command) = match payload {
        MessagePayload::Descriptor(desc) => {
            let key = OperationKey::workload(namespace, instance, &desc.app_name);
            let command = AppCommand::from_descriptor(&desc);
            (key, desc.version, command)
        }
        MessagePayload::Raw(argv) => {
            let command = AppCommand::from_argv(&argv, process::is_executable)
                .ok_or_else(|| {
                    AgentError::InvalidParameter("no executable found in raw command".to_string())
                })?;
            // No stable token in the legacy mode; the sentinel path
            // applies.
            (OperationKey::command(&command), None, command)
        }
    };

    Ok(LifecycleCommand {
        operation: msg.operation,
        key,
        token,
        command,
    })
}
