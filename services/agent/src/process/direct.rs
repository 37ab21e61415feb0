//! Direct spawn-and-signal process backend.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::AgentError;
use crate::model::AppCommand;
use crate::process::{ensure_executable, ProcessBackend, ProcessHandle, ProcessTable, StopSignal};

/// Graceful-termination attempts before the forceful kill.
const STOP_RETRIES: u32 = 3;

/// Aliveness polls per termination attempt.
const POLLS_PER_RETRY: u32 = 15;

/// Direct strategy: spawn the executable, signal it to stop, locate it
/// by scanning the process table.
pub struct DirectBackend {
    table: Arc<dyn ProcessTable>,
    poll_tick: Duration,
}

impl DirectBackend {
    /// Production backend over the real process table, polling at one
    /// second per tick.
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self::with_poll_tick(table, Duration::from_secs(1))
    }

    /// Backend with a custom poll tick; tests use millisecond ticks.
    pub fn with_poll_tick(table: Arc<dyn ProcessTable>, poll_tick: Duration) -> Self {
        Self { table, poll_tick }
    }
}

#[async_trait]
impl ProcessBackend for DirectBackend {
    async fn start(&self, cmd: &AppCommand) -> Result<(), AgentError> {
        ensure_executable(&cmd.path)?;

        // Parent environment is inherited; descriptor envs are appended
        // on top so they win on conflicting names.
        let output = Command::new(&cmd.path)
            .args(&cmd.args)
            .envs(cmd.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AgentError::Spawn(format!("{}: {e}", cmd.path.display())))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        info!(
            path = %cmd.path.display(),
            args = ?cmd.args,
            status = %output.status,
            stdout = %stdout,
            stderr = %stderr,
            "process run finished"
        );

        if !output.status.success() {
            return Err(AgentError::Spawn(format!(
                "{} exited with {}",
                cmd.path.display(),
                output.status
            )));
        }
        Ok(())
    }

    async fn stop(&self, cmd: &AppCommand) -> Result<(), AgentError> {
        let pid = self
            .table
            .find_by_exe(&cmd.path)
            .ok_or_else(|| AgentError::ProcessNotFound(cmd.path.display().to_string()))?;

        let mut running = self.table.is_running(pid);
        let mut retry = 0;
        'escalation: while running && retry < STOP_RETRIES {
            self.table.signal(pid, StopSignal::Term)?;
            for _ in 0..POLLS_PER_RETRY {
                if !self.table.is_running(pid) {
                    running = false;
                    break 'escalation;
                }
                tokio::time::sleep(self.poll_tick).await;
            }
            retry += 1;
        }

        if running {
            warn!(pid, path = %cmd.path.display(), "process ignored termination, killing");
            self.table.signal(pid, StopSignal::Kill)?;
        }

        info!(pid, path = %cmd.path.display(), "process stopped");
        Ok(())
    }

    async fn find(&self, cmd: &AppCommand) -> Result<Option<ProcessHandle>, AgentError> {
        Ok(self.table.find_by_exe(&cmd.path).map(|pid| ProcessHandle {
            pid,
            exe: cmd.path.clone(),
        }))
    }
}
