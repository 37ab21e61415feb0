//! Configuration for the agent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

/// Process backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Spawn and signal processes directly.
    Direct,
    /// Delegate to an external supervisor daemon.
    Supervisor,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "direct" => Ok(BackendKind::Direct),
            "supervisor" => Ok(BackendKind::Supervisor),
            other => anyhow::bail!("unknown backend kind: {other}"),
        }
    }
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Stable identifier of this node.
    pub node_id: String,

    /// Namespace this agent reconciles.
    pub namespace: String,

    /// Directory holding application config files and the node id.
    pub conf_dir: PathBuf,

    /// Listen address of the config query server.
    pub listen_addr: String,

    /// Which process backend runs the applications.
    pub backend: BackendKind,

    /// Control socket of the external supervisor.
    pub supervisor_socket: PathBuf,

    /// Cooldown after a tokenless operation completes, in seconds.
    pub dedup_cooldown_secs: u64,

    /// Bound on a remote metadata query, in seconds.
    pub query_timeout_secs: u64,

    /// Grace period for draining in-flight work on shutdown, in seconds.
    pub drain_grace_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let namespace =
            std::env::var("EDGERUN_NAMESPACE").unwrap_or_else(|_| "default".to_string());

        let conf_dir = PathBuf::from(
            std::env::var("EDGERUN_CONF_DIR").unwrap_or_else(|_| "/etc/edgerun".to_string()),
        );

        // Node ID can be provided or auto-generated and persisted.
        let node_id = match std::env::var("EDGERUN_NODE_ID") {
            Ok(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => load_or_generate_node_id(&conf_dir)?,
        };

        let listen_addr = std::env::var("EDGERUN_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8640".to_string());

        let backend = std::env::var("EDGERUN_BACKEND")
            .unwrap_or_else(|_| "direct".to_string())
            .parse()?;

        let supervisor_socket = PathBuf::from(
            std::env::var("EDGERUN_SUPERVISOR_SOCKET")
                .unwrap_or_else(|_| "/run/edgerun/supervisor.sock".to_string()),
        );

        let dedup_cooldown_secs = std::env::var("EDGERUN_DEDUP_COOLDOWN")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let query_timeout_secs = std::env::var("EDGERUN_QUERY_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let drain_grace_secs = std::env::var("EDGERUN_DRAIN_GRACE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let log_level = std::env::var("EDGERUN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            node_id,
            namespace,
            conf_dir,
            listen_addr,
            backend,
            supervisor_socket,
            dedup_cooldown_secs,
            query_timeout_secs,
            drain_grace_secs,
            log_level,
        })
    }

    pub fn dedup_cooldown(&self) -> Duration {
        Duration::from_secs(self.dedup_cooldown_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_secs)
    }
}

/// Read the persisted node id, generating and storing a fresh one on
/// first start.
pub fn load_or_generate_node_id(conf_dir: &Path) -> Result<String> {
    let path = conf_dir.join("node.id");
    match std::fs::read_to_string(&path) {
        Ok(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        _ => {
            std::fs::create_dir_all(conf_dir)
                .with_context(|| format!("creating {}", conf_dir.display()))?;
            let id = uuid::Uuid::new_v4().to_string();
            std::fs::write(&path, &id)
                .with_context(|| format!("persisting node id to {}", path.display()))?;
            info!(node_id = %id, path = %path.display(), "generated node identity");
            Ok(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn node_id_is_generated_once_and_stable() {
        let dir = TempDir::new().unwrap();
        let first = load_or_generate_node_id(dir.path()).unwrap();
        let second = load_or_generate_node_id(dir.path()).unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn existing_node_id_is_trimmed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("node.id"), "node-1\n").unwrap();
        assert_eq!(load_or_generate_node_id(dir.path()).unwrap(), "node-1");
    }

    #[test]
    fn backend_kind_parses() {
        assert_eq!("direct".parse::<BackendKind>().unwrap(), BackendKind::Direct);
        assert_eq!(
            "supervisor".parse::<BackendKind>().unwrap(),
            BackendKind::Supervisor
        );
        assert!("systemd".parse::<BackendKind>().is_err());
    }
}
