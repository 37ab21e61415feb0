//! Config reconciler.
//!
//! Converges the local on-disk configuration and the running process of
//! one application to the remote-declared intent. The decision table:
//!
//! | remote | local | equal | action                                        |
//! |--------|-------|-------|-----------------------------------------------|
//! | no     | no    |   -   | error: no configuration available             |
//! | no     | yes   |   -   | keep local file, (re)start                    |
//! | yes    | no    |   -   | write file from remote, start                 |
//! | yes    | yes   |  yes  | no write, (re)start                           |
//! | yes    | yes   |  no   | backup, write, backend reload, (re)start      |
//!
//! Equality is a sha256 content-hash comparison; empty equals empty.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::AgentError;
use crate::files;
use crate::model::AppCommand;
use crate::process::ProcessBackend;
use crate::store::ConfigStoreClient;

/// Reconciles one application's config file and process state.
pub struct ConfigReconciler {
    store: ConfigStoreClient,
    backend: Arc<dyn ProcessBackend>,
    conf_dir: PathBuf,
}

impl ConfigReconciler {
    pub fn new(store: ConfigStoreClient, backend: Arc<dyn ProcessBackend>, conf_dir: PathBuf) -> Self {
        Self {
            store,
            backend,
            conf_dir,
        }
    }

    /// Converge config and process for an insert/update of `cmd`.
    pub async fn reconcile_update(&self, cmd: &AppCommand) -> Result<(), AgentError> {
        let app_name = &cmd.name;
        let remote = self.fetch_remote(app_name).await?;
        let conf_path = files::conf_path(&self.conf_dir, app_name);
        let local_exists = files::exists(&conf_path)?;

        match (remote, local_exists) {
            (None, false) => {
                return Err(AgentError::InvalidParameter(format!(
                    "no configuration available for {app_name}"
                )));
            }
            (None, true) => {
                debug!(app = %app_name, "no remote configuration, keeping local file");
            }
            (Some(content), false) => {
                info!(app = %app_name, path = %conf_path.display(), "creating configuration file");
                files::write(&conf_path, &content)?;
            }
            (Some(content), true) => {
                let local = files::read(&conf_path)?;
                if files::content_eq(&local, &content) {
                    debug!(app = %app_name, "configuration unchanged");
                } else {
                    let backup = files::backup(&conf_path)?;
                    info!(
                        app = %app_name,
                        backup = %backup.display(),
                        "configuration diverged, replacing"
                    );
                    files::write(&conf_path, &content)?;
                    self.backend.reload().await?;
                }
            }
        }

        self.restart(cmd).await
    }

    /// Handle a delete: stop the process if it is running. The config
    /// file is left behind for inspection; the control plane owns the
    /// intent and will recreate it on a future insert.
    pub async fn reconcile_delete(&self, cmd: &AppCommand) -> Result<(), AgentError> {
        if self.backend.find(cmd).await?.is_some() {
            self.backend.stop(cmd).await?;
        }
        Ok(())
    }

    /// Stop the target if it is already running, then start it.
    async fn restart(&self, cmd: &AppCommand) -> Result<(), AgentError> {
        if self.backend.find(cmd).await?.is_some() {
            self.backend.stop(cmd).await?;
        }
        self.backend.start(cmd).await
    }

    /// Latest remote configuration content for `app_name`, rendered to
    /// file form. Absence of a remote object is a valid operating mode
    /// (local-only configuration), not an error.
    async fn fetch_remote(&self, app_name: &str) -> Result<Option<String>, AgentError> {
        let objects = self.store.config_objects(Some(app_name), None).await?;
        Ok(objects.first().map(|o| o.render()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessHandle;
    use async_trait::async_trait;
    use edgerun_channel::{modules, MessageBus};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Backend that records calls and pretends the process is running
    /// once started.
    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
        running: Mutex<bool>,
    }

    impl RecordingBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn set_running(&self, running: bool) {
            *self.running.lock().unwrap() = running;
        }
    }

    #[async_trait]
    impl ProcessBackend for RecordingBackend {
        async fn start(&self, _cmd: &AppCommand) -> Result<(), AgentError> {
            self.calls.lock().unwrap().push("start".to_string());
            *self.running.lock().unwrap() = true;
            Ok(())
        }

        async fn stop(&self, _cmd: &AppCommand) -> Result<(), AgentError> {
            self.calls.lock().unwrap().push("stop".to_string());
            *self.running.lock().unwrap() = false;
            Ok(())
        }

        async fn find(&self, cmd: &AppCommand) -> Result<Option<ProcessHandle>, AgentError> {
            if *self.running.lock().unwrap() {
                Ok(Some(ProcessHandle {
                    pid: 1,
                    exe: cmd.path.clone(),
                }))
            } else {
                Ok(None)
            }
        }

        async fn reload(&self) -> Result<(), AgentError> {
            self.calls.lock().unwrap().push("reload".to_string());
            Ok(())
        }
    }

    fn command() -> AppCommand {
        AppCommand {
            name: "svc-a".to_string(),
            path: "/usr/bin/svc-a".into(),
            args: vec![],
            envs: vec![],
        }
    }

    /// Reconciler wired to a metastore stub answering every configmap
    /// query with `objects`.
    fn fixture(
        dir: &TempDir,
        objects: Vec<serde_json::Value>,
    ) -> (ConfigReconciler, Arc<RecordingBackend>) {
        let bus = MessageBus::new();
        let (agent, _inbox) = bus.register(modules::AGENT);
        let (store_handle, mut store_inbox) = bus.register(modules::METASTORE);

        let raw: Vec<String> = objects.iter().map(|o| o.to_string()).collect();
        tokio::spawn(async move {
            while let Some(req) = store_inbox.recv().await {
                let resp = req.response(modules::METASTORE, serde_json::json!(raw.clone()));
                let _ = store_handle.send(modules::AGENT, resp).await;
            }
        });

        let client = ConfigStoreClient::new(
            agent,
            "node-1".to_string(),
            "ns1".to_string(),
            Duration::from_millis(200),
        );
        let backend = Arc::new(RecordingBackend::default());
        let reconciler = ConfigReconciler::new(
            client,
            Arc::clone(&backend) as Arc<dyn ProcessBackend>,
            dir.path().to_path_buf(),
        );
        (reconciler, backend)
    }

    fn remote_object(data: serde_json::Value) -> serde_json::Value {
        serde_json::json!({"metadata": {"name": "svc-a"}, "data": data})
    }

    fn list_conf_files(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn no_remote_no_local_fails() {
        let dir = TempDir::new().unwrap();
        let (reconciler, backend) = fixture(&dir, vec![]);

        let err = reconciler.reconcile_update(&command()).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameter(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn no_remote_keeps_local_and_restarts() {
        let dir = TempDir::new().unwrap();
        let conf = files::conf_path(dir.path(), "svc-a");
        files::write(&conf, "a=1\n").unwrap();
        let (reconciler, backend) = fixture(&dir, vec![]);

        reconciler.reconcile_update(&command()).await.unwrap();
        assert_eq!(files::read(&conf).unwrap(), "a=1\n");
        assert_eq!(backend.calls(), vec!["start"]);
    }

    #[tokio::test]
    async fn remote_creates_missing_local_file() {
        let dir = TempDir::new().unwrap();
        let (reconciler, backend) = fixture(&dir, vec![remote_object(serde_json::json!({"a": "1"}))]);

        reconciler.reconcile_update(&command()).await.unwrap();
        let conf = files::conf_path(dir.path(), "svc-a");
        assert_eq!(files::read(&conf).unwrap(), "a=1\n");
        assert_eq!(backend.calls(), vec!["start"]);
        assert_eq!(list_conf_files(&dir), vec!["svc-a.conf"]);
    }

    #[tokio::test]
    async fn equal_content_short_circuits_writes_but_restarts() {
        let dir = TempDir::new().unwrap();
        let conf = files::conf_path(dir.path(), "svc-a");
        files::write(&conf, "a=1\n").unwrap();
        let before = std::fs::metadata(&conf).unwrap().modified().unwrap();

        let (reconciler, backend) = fixture(&dir, vec![remote_object(serde_json::json!({"a": "1"}))]);
        backend.set_running(true);

        reconciler.reconcile_update(&command()).await.unwrap();

        // No backup, no rewrite.
        assert_eq!(list_conf_files(&dir), vec!["svc-a.conf"]);
        assert_eq!(std::fs::metadata(&conf).unwrap().modified().unwrap(), before);
        // Running target is restarted.
        assert_eq!(backend.calls(), vec!["stop", "start"]);
    }

    #[tokio::test]
    async fn diverged_content_backs_up_writes_and_reloads() {
        let dir = TempDir::new().unwrap();
        let conf = files::conf_path(dir.path(), "svc-a");
        files::write(&conf, "a=old\n").unwrap();

        let (reconciler, backend) = fixture(&dir, vec![remote_object(serde_json::json!({"a": "new"}))]);
        reconciler.reconcile_update(&command()).await.unwrap();

        let names = list_conf_files(&dir);
        assert_eq!(names.len(), 2, "expected config plus one backup: {names:?}");
        assert!(names.contains(&"svc-a.conf".to_string()));
        let backup = names.iter().find(|n| *n != "svc-a.conf").unwrap();
        let suffix = backup.rsplit('.').next().unwrap();
        assert!(suffix.parse::<u64>().is_ok(), "backup suffix not numeric: {backup}");

        assert_eq!(files::read(&conf).unwrap(), "a=new\n");
        assert_eq!(backend.calls(), vec!["reload", "start"]);
    }

    #[tokio::test]
    async fn delete_stops_running_process_only() {
        let dir = TempDir::new().unwrap();
        let (reconciler, backend) = fixture(&dir, vec![]);

        // Not running: nothing to do.
        reconciler.reconcile_delete(&command()).await.unwrap();
        assert!(backend.calls().is_empty());

        backend.set_running(true);
        reconciler.reconcile_delete(&command()).await.unwrap();
        assert_eq!(backend.calls(), vec!["stop"]);
    }
}
