//! Runs the provisioning tool against a local database simulator
//!
//! The orchestrator moves through `Starting -> Running -> Terminating -> Done`.
//! The simulator is terminated on every path that got past `Starting`,
//! including a provisioning tool that could not be spawned.

use crate::runtime::{ManagedProcess, OutputMode, ProcessConfig, ProcessError};
use crate::simulator::{DatabaseLauncher, DynamoDbOptions, SimulatorError, SimulatorHandle};
use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;

/// Set to `true` in the provisioning tool's environment
pub const LOCAL_AWS_ENV: &str = "NUAGE_LOCAL_AWS";
/// Database simulator endpoint passed to the provisioning tool
pub const DYNAMO_ENDPOINT_ENV: &str = "NUAGE_DYNAMO_ENDPOINT";

/// Exit code reported when the tool was killed by a signal
const SIGNALED_EXIT_CODE: i32 = 1;

/// Orchestrator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Starting,
    Running,
    Terminating,
    Done,
}

/// An external tool run to completion with extra environment
#[async_trait]
pub trait ProvisioningTool: Send + Sync {
    fn name(&self) -> &str;

    /// Run the tool and return its exit code
    async fn run(&self, args: &[String], env: &[(String, String)]) -> Result<i32, ProcessError>;
}

/// A provisioning tool found on `PATH`, sharing the parent's terminal
#[derive(Debug, Clone)]
pub struct ExternalTool {
    executable: String,
    working_dir: Option<PathBuf>,
}

impl ExternalTool {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl ProvisioningTool for ExternalTool {
    fn name(&self) -> &str {
        &self.executable
    }

    async fn run(&self, args: &[String], env: &[(String, String)]) -> Result<i32, ProcessError> {
        let mut config = ProcessConfig::new(&self.executable, &self.executable)
            .args(args.iter().cloned())
            .output(OutputMode::Inherit);
        for (key, value) in env {
            config = config.env(key, value);
        }
        config.working_dir = self.working_dir.clone();

        let mut process = ManagedProcess::new(config);
        process.start()?;

        match process.wait().await? {
            Some(code) => Ok(code),
            None => {
                log::warn!(
                    "[{}] Terminated by a signal, reporting exit code {}",
                    self.executable,
                    SIGNALED_EXIT_CODE
                );
                Ok(SIGNALED_EXIT_CODE)
            }
        }
    }
}

/// Environment added on top of the parent's for the provisioning tool
pub fn local_env(endpoint: &str) -> Vec<(String, String)> {
    vec![
        (LOCAL_AWS_ENV.to_string(), "true".to_string()),
        (DYNAMO_ENDPOINT_ENV.to_string(), endpoint.to_string()),
    ]
}

/// Run `f` with the simulator's options, then terminate the simulator
///
/// Termination errors are logged and never replace `f`'s result.
pub async fn with_simulator<H, F, Fut, T>(mut handle: H, f: F) -> T
where
    H: SimulatorHandle,
    F: FnOnce(DynamoDbOptions) -> Fut,
    Fut: Future<Output = T>,
{
    let output = f(handle.opts().clone()).await;
    terminate_logged(&mut handle).await;
    output
}

async fn terminate_logged<H: SimulatorHandle>(handle: &mut H) {
    if let Err(e) = handle.terminate().await {
        log::error!("Cleanup failed: {}", e);
    }
}

/// Starts the database simulator, runs the tool, cleans up
pub struct Orchestrator<L, P> {
    launcher: L,
    tool: P,
    options: DynamoDbOptions,
    state: OrchestratorState,
}

impl<L, P> Orchestrator<L, P>
where
    L: DatabaseLauncher,
    P: ProvisioningTool,
{
    pub fn new(launcher: L, tool: P, options: DynamoDbOptions) -> Self {
        Self {
            launcher,
            tool,
            options,
            state: OrchestratorState::Starting,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Run the tool with `args` and return its exit code
    pub async fn run(&mut self, args: &[String]) -> Result<i32, OrchestratorError> {
        self.set_state(OrchestratorState::Starting);
        let mut handle = match self.launcher.launch(self.options.clone()).await {
            Ok(handle) => handle,
            Err(e) => {
                self.set_state(OrchestratorState::Done);
                return Err(OrchestratorError::Startup(e));
            }
        };

        let endpoint = handle.endpoint();
        log::info!("Local DynamoDB running at {}", endpoint);

        self.set_state(OrchestratorState::Running);
        let outcome = self.tool.run(args, &local_env(&endpoint)).await;

        self.set_state(OrchestratorState::Terminating);
        terminate_logged(&mut handle).await;

        self.set_state(OrchestratorState::Done);
        match outcome {
            Ok(code) => {
                log::info!("{} exited with code {}", self.tool.name(), code);
                Ok(code)
            }
            Err(e) => Err(OrchestratorError::Spawn(e)),
        }
    }

    fn set_state(&mut self, state: OrchestratorState) {
        log::debug!("Orchestrator: {:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

/// Orchestrator errors
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Database simulator failed to start: {0}")]
    Startup(#[source] SimulatorError),

    #[error("Provisioning tool failed: {0}")]
    Spawn(#[source] ProcessError),
}
