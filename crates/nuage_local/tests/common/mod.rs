//! Test helpers for nuage-local integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use nuage_local::{DatabaseLauncher, DynamoDbOptions, LocalConfig, SimulatorError, SimulatorHandle};
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Schema of the notes app
pub const NOTE_SCHEMA: &str = r#"
type Note @model @auth(rules: [{ allow: owner }]) {
  id: ID!
  note: String!
}
"#;

/// Ask the OS for a free port
pub fn free_port() -> u16 {
    TcpListener::bind(("127.0.0.1", 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Whether something accepts connections on `port`
pub fn is_listening(port: u16) -> bool {
    std::net::TcpStream::connect(("127.0.0.1", port)).is_ok()
}

/// Lay out an Amplify project under `root` and return a config pointing at it
pub fn note_project(root: &Path, schema: &str) -> LocalConfig {
    let config = LocalConfig {
        project_root: root.to_path_buf(),
        dynamo_port: free_port(),
        appsync_port: free_port(),
        ..Default::default()
    };

    let schema_path = config.schema_path();
    std::fs::create_dir_all(schema_path.parent().unwrap()).unwrap();
    std::fs::write(&schema_path, schema).unwrap();
    config
}

/// Stand-in database simulator that holds a real listener on the port
#[derive(Default)]
pub struct ListenerLauncher {
    pub launches: Arc<AtomicUsize>,
    pub terminations: Arc<AtomicUsize>,
}

impl ListenerLauncher {
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

pub struct ListenerHandle {
    opts: DynamoDbOptions,
    listener: Option<TcpListener>,
    terminations: Arc<AtomicUsize>,
}

#[async_trait]
impl SimulatorHandle for ListenerHandle {
    fn opts(&self) -> &DynamoDbOptions {
        &self.opts
    }

    async fn terminate(&mut self) -> Result<(), SimulatorError> {
        if self.listener.take().is_some() {
            self.terminations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseLauncher for ListenerLauncher {
    type Handle = ListenerHandle;

    async fn launch(&self, options: DynamoDbOptions) -> Result<ListenerHandle, SimulatorError> {
        let listener = TcpListener::bind(("127.0.0.1", options.port))
            .map_err(|e| SimulatorError::PortInUse(options.port, e))?;
        self.launches.fetch_add(1, Ordering::SeqCst);

        Ok(ListenerHandle {
            opts: options,
            listener: Some(listener),
            terminations: self.terminations.clone(),
        })
    }
}
