//! DynamoDB Local launcher
//!
//! Runs the DynamoDB Local Java program as a managed child process and waits
//! until its port accepts TCP connections.

use super::{DatabaseLauncher, DynamoDbOptions, SimulatorError, SimulatorHandle};
use crate::runtime::{ManagedProcess, OutputMode, ProcessConfig, ProcessStatus};
use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Interval between readiness probes
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Program and leading arguments used to run DynamoDB Local
///
/// The simulator options (`-port`, `-dbPath`/`-inMemory`) are appended by
/// [`DynamoDbCommand::process_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamoDbCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl DynamoDbCommand {
    /// `java -Djava.library.path=<dir>/DynamoDBLocal_lib -jar <dir>/DynamoDBLocal.jar`
    pub fn java(java: &str, install_dir: impl AsRef<Path>) -> Self {
        let dir = install_dir.as_ref();
        Self {
            program: java.to_string(),
            args: vec![
                format!(
                    "-Djava.library.path={}",
                    dir.join("DynamoDBLocal_lib").display()
                ),
                "-jar".to_string(),
                dir.join("DynamoDBLocal.jar").display().to_string(),
            ],
        }
    }

    /// Full process configuration for the given options
    pub fn process_config(&self, options: &DynamoDbOptions) -> ProcessConfig {
        let mut args = self.args.clone();
        args.push("-port".to_string());
        args.push(options.port.to_string());
        if options.in_memory {
            args.push("-inMemory".to_string());
        } else {
            args.push("-dbPath".to_string());
            args.push(options.db_path.display().to_string());
        }
        args.push("-sharedDb".to_string());

        ProcessConfig::new("dynamodb", &self.program)
            .args(args)
            .output(OutputMode::Log)
    }
}

/// Launcher for DynamoDB Local
#[derive(Debug, Clone)]
pub struct DynamoDbSimulator {
    command: DynamoDbCommand,
    startup_timeout: Duration,
    shutdown_timeout: Duration,
}

impl DynamoDbSimulator {
    pub fn new(command: DynamoDbCommand) -> Self {
        Self {
            command,
            startup_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Start the simulator and wait until it accepts connections
    pub async fn start(&self, options: DynamoDbOptions) -> Result<DynamoDbHandle, SimulatorError> {
        log::info!("Running Dynamo simulator with options: {:?}", options);

        ensure_port_free(options.port)?;

        if !options.in_memory {
            tokio::fs::create_dir_all(&options.db_path)
                .await
                .map_err(|source| SimulatorError::DataDir {
                    path: options.db_path.clone(),
                    source,
                })?;
        }

        let mut process = ManagedProcess::new(self.command.process_config(&options));
        process.start().map_err(SimulatorError::Spawn)?;

        if let Err(e) = self.wait_ready(&mut process, options.port).await {
            if let Err(stop_err) = process.stop(self.shutdown_timeout).await {
                log::error!("[dynamodb] Failed to stop after startup error: {}", stop_err);
            }
            return Err(e);
        }

        log::info!("Running DynamoDB simulator on {}", options.endpoint());

        Ok(DynamoDbHandle {
            opts: options,
            process,
            shutdown_timeout: self.shutdown_timeout,
            terminated: false,
        })
    }

    async fn wait_ready(
        &self,
        process: &mut ManagedProcess,
        port: u16,
    ) -> Result<(), SimulatorError> {
        let started = Instant::now();

        loop {
            if let ProcessStatus::Stopped(code) = process.check_status() {
                return Err(SimulatorError::ExitedDuringStartup(code));
            }

            if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                return Ok(());
            }

            if started.elapsed() >= self.startup_timeout {
                return Err(SimulatorError::StartupTimeout {
                    port,
                    secs: self.startup_timeout.as_secs(),
                });
            }

            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl DatabaseLauncher for DynamoDbSimulator {
    type Handle = DynamoDbHandle;

    async fn launch(&self, options: DynamoDbOptions) -> Result<DynamoDbHandle, SimulatorError> {
        self.start(options).await
    }
}

/// Fail fast when something else already listens on `port`
fn ensure_port_free(port: u16) -> Result<(), SimulatorError> {
    std::net::TcpListener::bind(("127.0.0.1", port))
        .map(drop)
        .map_err(|e| SimulatorError::PortInUse(port, e))
}

/// Handle to a running DynamoDB Local process
///
/// Dropping the handle without calling [`SimulatorHandle::terminate`] still
/// kills the child process.
pub struct DynamoDbHandle {
    opts: DynamoDbOptions,
    process: ManagedProcess,
    shutdown_timeout: Duration,
    terminated: bool,
}

impl DynamoDbHandle {
    pub fn pid(&self) -> Option<u32> {
        self.process.pid
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

#[async_trait]
impl SimulatorHandle for DynamoDbHandle {
    fn opts(&self) -> &DynamoDbOptions {
        &self.opts
    }

    async fn terminate(&mut self) -> Result<(), SimulatorError> {
        if self.terminated {
            log::debug!("[dynamodb] Already terminated");
            return Ok(());
        }
        self.terminated = true;

        self.process
            .stop(self.shutdown_timeout)
            .await
            .map_err(SimulatorError::Terminate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options(port: u16, db_path: PathBuf) -> DynamoDbOptions {
        DynamoDbOptions {
            db_path,
            in_memory: false,
            port,
        }
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn test_process_config_disk() {
        let cmd = DynamoDbCommand::java("java", "/opt/ddb");
        let config = cmd.process_config(&options(62226, PathBuf::from("/work/.dynamodb")));

        assert_eq!(config.executable, "java");
        assert_eq!(
            config.args,
            vec![
                "-Djava.library.path=/opt/ddb/DynamoDBLocal_lib",
                "-jar",
                "/opt/ddb/DynamoDBLocal.jar",
                "-port",
                "62226",
                "-dbPath",
                "/work/.dynamodb",
                "-sharedDb",
            ]
        );
        assert_eq!(config.output, OutputMode::Log);
    }

    #[test]
    fn test_process_config_in_memory() {
        let cmd = DynamoDbCommand::java("java", "/opt/ddb");
        let opts = DynamoDbOptions {
            in_memory: true,
            ..options(8000, PathBuf::from("/unused"))
        };
        let config = cmd.process_config(&opts);

        assert!(config.args.contains(&"-inMemory".to_string()));
        assert!(!config.args.contains(&"-dbPath".to_string()));
    }

    #[tokio::test]
    async fn test_port_in_use_is_startup_failure() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let dir = tempfile::tempdir().unwrap();

        let simulator = DynamoDbSimulator::new(DynamoDbCommand {
            program: "true".to_string(),
            args: vec![],
        });
        let result = simulator.start(options(port, dir.path().join("db"))).await;

        match result {
            Err(e @ SimulatorError::PortInUse(p, _)) => {
                assert_eq!(p, port);
                assert!(e.is_startup_failure());
            }
            other => panic!("expected PortInUse, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_inaccessible_db_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let simulator = DynamoDbSimulator::new(DynamoDbCommand {
            program: "true".to_string(),
            args: vec![],
        });
        let result = simulator.start(options(free_port(), file.join("db"))).await;

        assert!(matches!(result, Err(SimulatorError::DataDir { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_during_startup() {
        let dir = tempfile::tempdir().unwrap();
        let simulator = DynamoDbSimulator::new(DynamoDbCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "exit 7".to_string()],
        });

        let result = simulator.start(options(free_port(), dir.path().join("db"))).await;
        assert!(matches!(
            result,
            Err(SimulatorError::ExitedDuringStartup(Some(7)))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_startup_timeout_stops_process() {
        let dir = tempfile::tempdir().unwrap();
        let simulator = DynamoDbSimulator::new(DynamoDbCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 30".to_string()],
        })
        .with_startup_timeout(Duration::from_millis(300))
        .with_shutdown_timeout(Duration::from_secs(1));

        let result = simulator.start(options(free_port(), dir.path().join("db"))).await;
        assert!(matches!(result, Err(SimulatorError::StartupTimeout { .. })));
    }

    /// Requires DynamoDB Local under `NUAGE_DYNAMODB_LOCAL_DIR` and `java` in PATH.
    #[tokio::test]
    #[ignore]
    async fn test_start_then_terminate_releases_port() {
        let install_dir = std::env::var("NUAGE_DYNAMODB_LOCAL_DIR")
            .expect("NUAGE_DYNAMODB_LOCAL_DIR must be set");
        let dir = tempfile::tempdir().unwrap();
        let port = free_port();

        let simulator = DynamoDbSimulator::new(DynamoDbCommand::java("java", install_dir));
        let mut handle = simulator
            .start(options(port, dir.path().join(".dynamodb")))
            .await
            .unwrap();

        assert_eq!(handle.opts().port, port);
        assert!(dir.path().join(".dynamodb").is_dir());

        handle.terminate().await.unwrap();
        handle.terminate().await.unwrap();
        assert!(handle.is_terminated());
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }
}
