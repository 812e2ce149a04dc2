//! End-to-end orchestrator runs with a real provisioning process
//!
//! The provisioning tool is `sh`, so these only run on unix.
#![cfg(unix)]

mod common;

use common::{free_port, is_listening, ListenerLauncher};
use nuage_local::orchestrator::{ExternalTool, Orchestrator, OrchestratorError};
use nuage_local::{DatabaseLauncher, DynamoDbOptions, SimulatorError, SimulatorHandle};
use std::sync::atomic::Ordering;

fn options(port: u16) -> DynamoDbOptions {
    DynamoDbOptions {
        db_path: std::env::temp_dir().join("nuage-unused"),
        in_memory: true,
        port,
    }
}

fn sh(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

#[tokio::test]
async fn test_tool_sees_local_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("env.txt");
    let port = free_port();

    let launcher = ListenerLauncher::default();
    let terminations = launcher.terminations.clone();
    let mut orchestrator = Orchestrator::new(launcher, ExternalTool::new("sh"), options(port));

    let script = format!(
        "echo \"$NUAGE_LOCAL_AWS $NUAGE_DYNAMO_ENDPOINT\" > {}",
        out.display()
    );
    let code = orchestrator.run(&sh(&script)).await.unwrap();

    assert_eq!(code, 0);
    assert_eq!(
        std::fs::read_to_string(&out).unwrap().trim(),
        format!("true http://localhost:{}", port)
    );
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
    assert!(!is_listening(port));
}

#[tokio::test]
async fn test_nonzero_exit_code_is_returned() {
    let port = free_port();
    let launcher = ListenerLauncher::default();
    let terminations = launcher.terminations.clone();
    let mut orchestrator = Orchestrator::new(launcher, ExternalTool::new("sh"), options(port));

    assert_eq!(orchestrator.run(&sh("exit 3")).await.unwrap(), 3);
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
    assert!(!is_listening(port));
}

#[tokio::test]
async fn test_missing_tool_cleans_up() {
    let port = free_port();
    let launcher = ListenerLauncher::default();
    let terminations = launcher.terminations.clone();
    let mut orchestrator = Orchestrator::new(
        launcher,
        ExternalTool::new("nuage-missing-provisioner"),
        options(port),
    );

    let err = orchestrator.run(&[]).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Spawn(_)));
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
    assert!(!is_listening(port));
}

#[tokio::test]
async fn test_occupied_port_never_runs_tool() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let blocker = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = blocker.local_addr().unwrap().port();

    let launcher = ListenerLauncher::default();
    let launches = launcher.launches.clone();
    let mut orchestrator = Orchestrator::new(launcher, ExternalTool::new("sh"), options(port));

    let err = orchestrator
        .run(&sh(&format!("touch {}", marker.display())))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Startup(SimulatorError::PortInUse(p, _)) if p == port
    ));
    assert_eq!(launches.load(Ordering::SeqCst), 0);
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_double_terminate_is_noop() {
    let port = free_port();
    let launcher = ListenerLauncher::default();
    let mut handle = launcher.launch(options(port)).await.unwrap();

    handle.terminate().await.unwrap();
    handle.terminate().await.unwrap();
    assert_eq!(launcher.terminations(), 1);
}
