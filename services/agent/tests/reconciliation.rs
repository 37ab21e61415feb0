//! End-to-end lifecycle flow: control-plane messages through the
//! dispatcher, deduplicator, and reconciler down to a process backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use edgerun_agent::files;
use edgerun_agent::model::AppCommand;
use edgerun_agent::process::ProcessHandle;
use edgerun_agent::{
    AgentError, ConfigReconciler, ConfigStoreClient, Deduplicator, Dispatcher, ProcessBackend,
};
use edgerun_channel::{modules, Message, MessageBus, Operation};
use tempfile::TempDir;
use tokio::sync::watch;

/// Backend that records lifecycle calls.
#[derive(Default)]
struct RecordingBackend {
    calls: Mutex<Vec<String>>,
    running: Mutex<bool>,
}

impl RecordingBackend {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
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
}

struct Harness {
    hub: edgerun_channel::BusHandle,
    backend: Arc<RecordingBackend>,
    conf_dir: TempDir,
    shutdown_tx: watch::Sender<bool>,
    dispatcher: tokio::task::JoinHandle<()>,
}

/// Full agent wiring against a metastore stub that answers every query
/// with one configmap object for `svc-a`.
fn harness() -> Harness {
    let bus = MessageBus::new();
    let (agent_handle, inbox) = bus.register(modules::AGENT);
    let (store_handle, mut store_inbox) = bus.register(modules::METASTORE);
    let (hub, _hub_inbox) = bus.register("hub");

    tokio::spawn(async move {
        while let Some(req) = store_inbox.recv().await {
            let raw = vec![r#"{"metadata":{"name":"svc-a"},"data":{"k":"v"}}"#.to_string()];
            let resp = req.response(modules::METASTORE, serde_json::json!(raw));
            let _ = store_handle.send(modules::AGENT, resp).await;
        }
    });

    let conf_dir = TempDir::new().unwrap();
    let store = ConfigStoreClient::new(
        agent_handle,
        "node-1".to_string(),
        "ns1".to_string(),
        Duration::from_millis(500),
    );
    let backend = Arc::new(RecordingBackend::default());
    let reconciler = Arc::new(ConfigReconciler::new(
        store,
        Arc::clone(&backend) as Arc<dyn ProcessBackend>,
        conf_dir.path().to_path_buf(),
    ));
    let dedup = Arc::new(Deduplicator::new(Duration::from_secs(5)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = Dispatcher::new(inbox, dedup, reconciler, Duration::from_secs(1));
    let dispatcher = tokio::spawn(async move {
        dispatcher.run(shutdown_rx).await;
    });

    Harness {
        hub,
        backend,
        conf_dir,
        shutdown_tx,
        dispatcher,
    }
}

fn insert_message(version: &str) -> Message {
    Message::new("hub", "ns1/pod1", Operation::Insert)
        .with_content(&serde_json::json!({
            "namespace": "ns1",
            "instance": "pod1",
            "app_name": "svc-a",
            "exec_path": "/usr/bin/svc-a",
            "version": version
        }))
        .unwrap()
}

fn delete_message() -> Message {
    Message::new("hub", "ns1/pod1", Operation::Delete)
        .with_content(&serde_json::json!({
            "namespace": "ns1",
            "instance": "pod1",
            "app_name": "svc-a",
            "exec_path": "/usr/bin/svc-a"
        }))
        .unwrap()
}

/// Poll until `check` holds or the deadline passes.
async fn wait_for<F: Fn() -> bool>(check: F) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within deadline");
}

#[tokio::test]
async fn insert_starts_once_and_writes_config() {
    let h = harness();

    h.hub.send(modules::AGENT, insert_message("v1")).await.unwrap();
    wait_for(|| h.backend.calls() == vec!["start"]).await;

    let conf = files::conf_path(h.conf_dir.path(), "svc-a");
    assert_eq!(files::read(&conf).unwrap(), "k=v\n");

    let _ = h.shutdown_tx.send(true);
    h.dispatcher.await.unwrap();
}

#[tokio::test]
async fn duplicate_insert_is_suppressed() {
    let h = harness();

    h.hub.send(modules::AGENT, insert_message("v1")).await.unwrap();
    wait_for(|| h.backend.calls() == vec!["start"]).await;

    // Same version token again: no second start.
    h.hub.send(modules::AGENT, insert_message("v1")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.backend.calls(), vec!["start"]);

    let _ = h.shutdown_tx.send(true);
    h.dispatcher.await.unwrap();
}

#[tokio::test]
async fn version_bump_reconciles_again() {
    let h = harness();

    h.hub.send(modules::AGENT, insert_message("v1")).await.unwrap();
    wait_for(|| h.backend.calls() == vec!["start"]).await;

    h.hub.send(modules::AGENT, insert_message("v2")).await.unwrap();
    // Process is running now, so the second pass restarts it.
    wait_for(|| h.backend.calls() == vec!["start", "stop", "start"]).await;

    let _ = h.shutdown_tx.send(true);
    h.dispatcher.await.unwrap();
}

#[tokio::test]
async fn delete_stops_the_running_process() {
    let h = harness();

    h.hub.send(modules::AGENT, insert_message("v1")).await.unwrap();
    wait_for(|| h.backend.calls() == vec!["start"]).await;

    h.hub.send(modules::AGENT, delete_message()).await.unwrap();
    wait_for(|| h.backend.calls() == vec!["start", "stop"]).await;

    // Config file survives deletion for inspection.
    let conf = files::conf_path(h.conf_dir.path(), "svc-a");
    assert!(files::exists(&conf).unwrap());

    let _ = h.shutdown_tx.send(true);
    h.dispatcher.await.unwrap();
}
