//! External process-supervisor backend.
//!
//! Delegates start/stop/status to a managed supervisor daemon addressed
//! over a local unix control socket, with named-program semantics: the
//! supervisor tracks units by program name, not by scanning the process
//! table. After a configuration diff the reconciler asks the supervisor
//! to reload before restarting the program.

use std::path::Path;

use async_trait::async_trait;
use hyper::{body::Buf, Body, Client, Method, Request, StatusCode};
use hyperlocal::{UnixClientExt, UnixConnector, Uri};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AgentError;
use crate::model::AppCommand;
use crate::process::{ProcessBackend, ProcessHandle};

/// Program definition sent to the supervisor on start.
#[derive(Debug, Serialize)]
struct ProgramSpec<'a> {
    path: &'a str,
    args: &'a [String],
    envs: Vec<(&'a str, &'a str)>,
}

/// Program status returned by the supervisor.
#[derive(Debug, Deserialize)]
struct ProgramStatus {
    running: bool,
    #[serde(default)]
    pid: Option<u32>,
}

/// Backend delegating to an external supervisor daemon.
pub struct SupervisorBackend {
    socket_path: String,
    client: Client<UnixConnector>,
}

impl SupervisorBackend {
    /// Create a client for the supervisor's control socket.
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_string_lossy().into_owned(),
            client: Client::unix(),
        }
    }

    /// Whether the control socket exists; checked at agent startup.
    pub fn socket_exists(&self) -> bool {
        Path::new(&self.socket_path).exists()
    }

    async fn put<T: Serialize>(&self, path: &str, body: &T) -> Result<(), AgentError> {
        let body_bytes = serde_json::to_vec(body)?;
        let uri = Uri::new(&self.socket_path, path);
        debug!(path, "PUT request to supervisor");

        let request = Request::builder()
            .method(Method::PUT)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body_bytes))
            .map_err(|e| AgentError::Format(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| AgentError::Signal(format!("supervisor socket: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = read_error_body(response).await;
        if status == StatusCode::NOT_FOUND {
            Err(AgentError::ProcessNotFound(message))
        } else {
            Err(AgentError::Signal(format!("supervisor: {status}: {message}")))
        }
    }

    async fn get_status(&self, name: &str) -> Result<Option<ProgramStatus>, AgentError> {
        let uri = Uri::new(&self.socket_path, &format!("/programs/{name}"));
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("Accept", "application/json")
            .body(Body::empty())
            .map_err(|e| AgentError::Format(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| AgentError::Signal(format!("supervisor socket: {e}")))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = hyper::body::aggregate(response.into_body())
            .await
            .map_err(|e| AgentError::Signal(format!("supervisor socket: {e}")))?;
        if status.is_success() {
            Ok(Some(serde_json::from_reader(body.reader())?))
        } else {
            let message = String::from_utf8_lossy(body.chunk()).to_string();
            Err(AgentError::Signal(format!("supervisor: {status}: {message}")))
        }
    }
}

async fn read_error_body(response: hyper::Response<Body>) -> String {
    match hyper::body::aggregate(response.into_body()).await {
        Ok(body) => String::from_utf8_lossy(body.chunk()).to_string(),
        Err(_) => String::new(),
    }
}

#[async_trait]
impl ProcessBackend for SupervisorBackend {
    async fn start(&self, cmd: &AppCommand) -> Result<(), AgentError> {
        let path = cmd.path.to_string_lossy();
        let spec = ProgramSpec {
            path: &path,
            args: &cmd.args,
            envs: cmd
                .envs
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
        };
        self.put(&format!("/programs/{}/start", cmd.name), &spec).await?;
        info!(program = %cmd.name, "supervisor started program");
        Ok(())
    }

    async fn stop(&self, cmd: &AppCommand) -> Result<(), AgentError> {
        self.put(&format!("/programs/{}/stop", cmd.name), &serde_json::json!({}))
            .await?;
        info!(program = %cmd.name, "supervisor stopped program");
        Ok(())
    }

    async fn find(&self, cmd: &AppCommand) -> Result<Option<ProcessHandle>, AgentError> {
        let status = self.get_status(&cmd.name).await?;
        Ok(status.and_then(|s| {
            if s.running {
                Some(ProcessHandle {
                    pid: s.pid.unwrap_or(0),
                    exe: cmd.path.clone(),
                })
            } else {
                None
            }
        }))
    }

    async fn reload(&self) -> Result<(), AgentError> {
        self.put("/reload", &serde_json::json!({})).await?;
        info!("supervisor reloaded configuration");
        Ok(())
    }
}
