//! Process control backends.
//!
//! One capability interface, two interchangeable strategies:
//!
//! - [`DirectBackend`]: spawn the executable directly and signal it to
//!   stop, locating it in the process table by executable path.
//! - [`SupervisorBackend`]: delegate to an external process-supervisor
//!   daemon over a local control socket, with named-program semantics.
//!
//! The reconciler is written against [`ProcessBackend`] and stays
//! oblivious to which strategy is active.

mod direct;
mod supervisor;
mod table;

pub use direct::DirectBackend;
pub use supervisor::SupervisorBackend;
pub use table::{ProcessTable, StaticProcessTable, StopSignal, SystemProcessTable};

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::AgentError;
use crate::model::AppCommand;

/// A running process located for the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub exe: PathBuf,
}

/// Start/stop/find of a native app process.
#[async_trait]
pub trait ProcessBackend: Send + Sync {
    /// Launch the command. The direct strategy waits for the process's
    /// own execution to finish; long-running daemons must self-daemonize
    /// or use the supervisor strategy.
    async fn start(&self, cmd: &AppCommand) -> Result<(), AgentError>;

    /// Stop the process the command refers to, escalating from graceful
    /// termination to a forceful kill. `ProcessNotFound` when nothing
    /// matches.
    async fn stop(&self, cmd: &AppCommand) -> Result<(), AgentError>;

    /// Locate the running process for the command, if any.
    async fn find(&self, cmd: &AppCommand) -> Result<Option<ProcessHandle>, AgentError>;

    /// Ask the backend to pick up changed configuration. The direct
    /// strategy has nothing to reload; restart covers it.
    async fn reload(&self) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Validate that `path` is an absolute, resolvable executable.
pub fn ensure_executable(path: &Path) -> Result<(), AgentError> {
    if !path.is_absolute() {
        return Err(AgentError::Spawn(format!(
            "executable path must be absolute: {}",
            path.display()
        )));
    }
    if !is_executable(path) {
        return Err(AgentError::Spawn(format!(
            "cannot resolve executable: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Whether `path` names an existing file with an execute bit set.
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.is_absolute()
        && std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
}
