//! Local database simulator
//!
//! [`DatabaseLauncher`] starts a simulator and hands back a [`SimulatorHandle`].
//! The handle is owned by whoever started it and must be terminated on every
//! exit path; `terminate` is idempotent so cleanup code can call it freely.

mod dynamodb;

pub use dynamodb::*;

use async_trait::async_trait;
use std::path::PathBuf;

/// Options a database simulator is started with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamoDbOptions {
    /// Directory used for on-disk persistence when `in_memory` is false
    pub db_path: PathBuf,
    /// Skip disk persistence entirely
    pub in_memory: bool,
    /// TCP port the simulator listens on
    pub port: u16,
}

impl DynamoDbOptions {
    /// Endpoint URL clients use to reach the simulator
    pub fn endpoint(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

/// A running simulator
#[async_trait]
pub trait SimulatorHandle: Send {
    /// Options the simulator was started with
    fn opts(&self) -> &DynamoDbOptions;

    /// Endpoint URL derived from the bound port
    fn endpoint(&self) -> String {
        self.opts().endpoint()
    }

    /// Stop the simulator. A second call is a no-op.
    async fn terminate(&mut self) -> Result<(), SimulatorError>;
}

/// Starts database simulators
#[async_trait]
pub trait DatabaseLauncher: Send + Sync {
    type Handle: SimulatorHandle;

    /// Start a simulator and return once it accepts connections
    async fn launch(&self, options: DynamoDbOptions) -> Result<Self::Handle, SimulatorError>;
}

/// Errors raised while starting or stopping a simulator
#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    #[error("Port {0} is already in use")]
    PortInUse(u16, #[source] std::io::Error),

    #[error("Cannot use database directory '{path}': {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start simulator: {0}")]
    Spawn(#[source] crate::runtime::ProcessError),

    #[error("Simulator exited during startup with code {0:?}")]
    ExitedDuringStartup(Option<i32>),

    #[error("Simulator did not accept connections on port {port} within {secs}s")]
    StartupTimeout { port: u16, secs: u64 },

    #[error("Failed to terminate simulator: {0}")]
    Terminate(#[source] crate::runtime::ProcessError),
}

impl SimulatorError {
    /// Whether this error happened while starting (as opposed to cleanup)
    pub fn is_startup_failure(&self) -> bool {
        !matches!(self, SimulatorError::Terminate(_))
    }
}
