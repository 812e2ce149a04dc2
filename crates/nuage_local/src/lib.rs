//! Nuage local development environment
//!
//! Runs the AWS pieces of the notes app on a developer machine.
//!
//! # Overview
//!
//! - [`simulator`]: DynamoDB Local as a managed child process
//! - [`appsync`]: GraphQL schema transformation and an HTTP AppSync simulator
//!   backed by the local tables
//! - [`orchestrator`]: runs `pulumi` with the local DynamoDB endpoint in its
//!   environment, cleaning up the simulator on every path
//! - [`exports`]: the `aws-exports.js` file the React app reads
//!
//! # Example Config File
//!
//! ```yaml
//! api_name: notespulumi
//! region: eu-west-1
//! stack: local
//! dynamo_port: 62226
//! appsync_port: 62225
//! db_dir: .dynamodb
//! ```

pub mod appsync;
pub mod cli;
pub mod config;
pub mod exports;
pub mod orchestrator;
pub mod runtime;
pub mod simulator;

pub use cli::LocalArgs;
pub use config::{ConfigError, LocalConfig};
pub use orchestrator::{Orchestrator, OrchestratorError, OrchestratorState, ProvisioningTool};
pub use runtime::{ManagedProcess, OutputMode, ProcessConfig, ProcessError, ProcessStatus};
pub use simulator::{
    DatabaseLauncher, DynamoDbHandle, DynamoDbOptions, DynamoDbSimulator, SimulatorError,
    SimulatorHandle,
};
