//! Process table access behind a trait so unit tests can supply a fake
//! table instead of touching the real OS.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::trace;

use crate::error::AgentError;

/// Signals the stop escalation sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Graceful termination request (SIGTERM).
    Term,
    /// Forceful kill (SIGKILL).
    Kill,
}

/// Read/signal access to the table of running processes.
pub trait ProcessTable: Send + Sync {
    /// Pid of the process whose executable path equals `exe`, if any.
    fn find_by_exe(&self, exe: &Path) -> Option<u32>;

    /// Whether `pid` names a live process.
    fn is_running(&self, pid: u32) -> bool;

    /// Deliver `signal` to `pid`.
    fn signal(&self, pid: u32, signal: StopSignal) -> Result<(), AgentError>;
}

/// The real process table, scanned via sysinfo and signalled via kill(2).
#[derive(Default)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessTable for SystemProcessTable {
    fn find_by_exe(&self, exe: &Path) -> Option<u32> {
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet),
        );
        sys.processes().iter().find_map(|(pid, process)| {
            if process.exe() == Some(exe) {
                Some(pid.as_u32())
            } else {
                None
            }
        })
    }

    fn is_running(&self, pid: u32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // Signal 0 probes existence without delivering anything.
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    fn signal(&self, pid: u32, signal: StopSignal) -> Result<(), AgentError> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let sig = match signal {
            StopSignal::Term => Signal::SIGTERM,
            StopSignal::Kill => Signal::SIGKILL,
        };
        trace!(pid, ?signal, "sending signal");
        kill(Pid::from_raw(pid as i32), sig)
            .map_err(|e| AgentError::Signal(format!("kill({pid}, {sig}): {e}")))
    }
}

/// In-memory process table for tests and development.
///
/// Entries are `(pid, exe)`; delivered signals are recorded. A `Term`
/// is honored only for pids not marked as ignoring it, `Kill` always
/// removes the entry.
pub struct StaticProcessTable {
    inner: Mutex<StaticInner>,
}

#[derive(Default)]
struct StaticInner {
    processes: HashMap<u32, PathBuf>,
    ignore_term: bool,
    signals: Vec<(u32, StopSignal)>,
}

impl StaticProcessTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StaticInner::default()),
        }
    }

    /// A table whose processes ignore graceful termination.
    pub fn ignoring_term() -> Self {
        let table = Self::new();
        table.inner.lock().unwrap_or_else(|e| e.into_inner()).ignore_term = true;
        table
    }

    pub fn insert(&self, pid: u32, exe: impl Into<PathBuf>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.processes.insert(pid, exe.into());
    }

    /// Signals delivered so far, in order.
    pub fn delivered_signals(&self) -> Vec<(u32, StopSignal)> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).signals.clone()
    }
}

impl Default for StaticProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for StaticProcessTable {
    fn find_by_exe(&self, exe: &Path) -> Option<u32> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .processes
            .iter()
            .find_map(|(pid, p)| if p == exe { Some(*pid) } else { None })
    }

    fn is_running(&self, pid: u32) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.processes.contains_key(&pid)
    }

    fn signal(&self, pid: u32, signal: StopSignal) -> Result<(), AgentError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.signals.push((pid, signal));
        match signal {
            StopSignal::Term if inner.ignore_term => {}
            _ => {
                inner.processes.remove(&pid);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_table_find_and_signal() {
        let table = StaticProcessTable::new();
        table.insert(42, "/usr/bin/svc-a");

        assert_eq!(table.find_by_exe(Path::new("/usr/bin/svc-a")), Some(42));
        assert_eq!(table.find_by_exe(Path::new("/usr/bin/other")), None);
        assert!(table.is_running(42));

        table.signal(42, StopSignal::Term).unwrap();
        assert!(!table.is_running(42));
        assert_eq!(table.delivered_signals(), vec![(42, StopSignal::Term)]);
    }

    #[test]
    fn ignoring_table_survives_term() {
        let table = StaticProcessTable::ignoring_term();
        table.insert(7, "/usr/bin/stubborn");

        table.signal(7, StopSignal::Term).unwrap();
        assert!(table.is_running(7));
        table.signal(7, StopSignal::Kill).unwrap();
        assert!(!table.is_running(7));
    }

    #[test]
    fn system_table_reports_self() {
        let table = SystemProcessTable::new();
        assert!(table.is_running(std::process::id()));
    }
}
