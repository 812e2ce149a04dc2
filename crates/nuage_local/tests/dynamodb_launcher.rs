//! DynamoDB launcher lifecycle against a stand-in server process

mod common;

use common::{free_port, is_listening};
use nuage_local::simulator::{DynamoDbCommand, DynamoDbSimulator};
use nuage_local::{DatabaseLauncher, DynamoDbOptions, SimulatorError, SimulatorHandle};
use std::time::Duration;

fn stand_in() -> DynamoDbSimulator {
    DynamoDbSimulator::new(DynamoDbCommand {
        program: env!("CARGO_BIN_EXE_fake-dynamodb").to_string(),
        args: Vec::new(),
    })
    .with_startup_timeout(Duration::from_secs(10))
    .with_shutdown_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn test_start_then_terminate_releases_port() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join(".dynamodb");
    let port = free_port();

    let mut handle = stand_in()
        .start(DynamoDbOptions {
            db_path: db_path.clone(),
            in_memory: false,
            port,
        })
        .await
        .unwrap();

    assert!(is_listening(port));
    assert!(handle.pid().is_some());
    assert_eq!(handle.endpoint(), format!("http://localhost:{}", port));

    let received = std::fs::read_to_string(db_path.join("args.txt")).unwrap();
    let received: Vec<&str> = received.lines().collect();
    assert_eq!(
        received,
        vec![
            "-port",
            port.to_string().as_str(),
            "-dbPath",
            db_path.to_str().unwrap(),
            "-sharedDb",
        ]
    );

    handle.terminate().await.unwrap();
    assert!(handle.is_terminated());
    assert!(!is_listening(port));

    handle.terminate().await.unwrap();
    assert!(!is_listening(port));
}

#[tokio::test]
async fn test_launch_in_memory_skips_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join(".dynamodb");
    let port = free_port();

    let mut handle = stand_in()
        .launch(DynamoDbOptions {
            db_path: db_path.clone(),
            in_memory: true,
            port,
        })
        .await
        .unwrap();

    assert!(is_listening(port));
    assert!(!db_path.exists());

    handle.terminate().await.unwrap();
    assert!(!is_listening(port));
}

#[tokio::test]
async fn test_second_launch_on_same_port_fails() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port();
    let options = DynamoDbOptions {
        db_path: dir.path().join(".dynamodb"),
        in_memory: true,
        port,
    };

    let simulator = stand_in();
    let mut first = simulator.launch(options.clone()).await.unwrap();

    let second = simulator.launch(options).await;
    assert!(matches!(second, Err(SimulatorError::PortInUse(p, _)) if p == port));

    first.terminate().await.unwrap();
    assert!(!is_listening(port));
}
