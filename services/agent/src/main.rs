//! edgerun Agent
//!
//! Runs on each edge node and keeps locally running native applications
//! consistent with workload descriptors pushed from the control plane.
//!
//! ## Architecture
//!
//! - **Dispatcher**: drains lifecycle messages, one task per message
//! - **Reconciler**: converges config file and process per application
//! - **Process Backend**: direct spawn/signal, or an external supervisor
//! - **Query Server**: local HTTP endpoint for applications to read
//!   their own configuration

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use edgerun_agent::config::{BackendKind, Config};
use edgerun_agent::process::SystemProcessTable;
use edgerun_agent::{
    ConfigReconciler, ConfigStoreClient, Deduplicator, DirectBackend, Dispatcher, ProcessBackend,
    SupervisorBackend,
};
use edgerun_channel::{modules, MessageBus};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting edgerun agent");
    info!(
        node_id = %config.node_id,
        namespace = %config.namespace,
        conf_dir = %config.conf_dir.display(),
        listen_addr = %config.listen_addr,
        backend = ?config.backend,
        "Configuration loaded"
    );

    // The message bus is the seam the external transport plugs into: it
    // registers the metastore endpoint and feeds the agent inbox.
    let bus = MessageBus::new();
    let (agent_handle, inbox) = bus.register(modules::AGENT);

    // Select the process backend
    let backend: Arc<dyn ProcessBackend> = match config.backend {
        BackendKind::Direct => {
            Arc::new(DirectBackend::new(Arc::new(SystemProcessTable::new())))
        }
        BackendKind::Supervisor => {
            let supervisor = SupervisorBackend::new(&config.supervisor_socket);
            if !supervisor.socket_exists() {
                anyhow::bail!(
                    "supervisor socket {} does not exist",
                    config.supervisor_socket.display()
                );
            }
            Arc::new(supervisor)
        }
    };

    let store = ConfigStoreClient::new(
        agent_handle,
        config.node_id.clone(),
        config.namespace.clone(),
        config.query_timeout(),
    );
    let dedup = Arc::new(Deduplicator::new(config.dedup_cooldown()));
    let reconciler = Arc::new(ConfigReconciler::new(
        store.clone(),
        backend,
        config.conf_dir.clone(),
    ));

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start the message dispatcher
    let dispatcher = Dispatcher::new(inbox, dedup, reconciler, config.drain_grace());
    let dispatcher_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            dispatcher.run(shutdown_rx).await;
        }
    });

    // Start the config query server
    let router = edgerun_agent::server::router(store);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "config query server listening");
    let server_handle = tokio::spawn({
        let mut shutdown_rx = shutdown_rx.clone();
        async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.changed().await;
                })
                .await
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Query server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Query server error"),
                Err(e) => error!(error = %e, "Query server task panicked"),
            }
        }
    }

    // Signal shutdown to all workers; the dispatcher drains in-flight
    // reconciliation tasks within its grace period.
    let _ = shutdown_tx.send(true);
    if let Err(e) = dispatcher_handle.await {
        error!(error = %e, "Dispatcher task panicked");
    }

    info!("Agent shutdown complete");
    Ok(())
}
