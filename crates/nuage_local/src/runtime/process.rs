//! Managed process abstraction

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// Process status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Process is running
    Running,
    /// Process is not running; carries the exit code once it has exited
    /// (None if never started or killed by a signal)
    Stopped(Option<i32>),
}

impl ProcessStatus {
    /// Check if process is running
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running)
    }

    /// Check if process has stopped
    pub fn is_stopped(&self) -> bool {
        matches!(self, ProcessStatus::Stopped(_))
    }
}

/// How the child's standard streams are wired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Share the parent's terminal
    #[default]
    Inherit,
    /// Capture stdout/stderr and forward each line to the log
    Log,
}

/// Configuration for spawning a process
#[derive(Debug, Clone, Default)]
pub struct ProcessConfig {
    /// Process name (for logging)
    pub name: String,
    /// Executable path or name looked up in PATH
    pub executable: String,
    /// Command line arguments
    pub args: Vec<String>,
    /// Environment overrides, applied on top of the parent environment
    pub env: HashMap<String, String>,
    /// Working directory
    pub working_dir: Option<PathBuf>,
    /// Standard stream wiring
    pub output: OutputMode,
}

impl ProcessConfig {
    pub fn new(name: impl Into<String>, executable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Command line as a single string, for logging
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.executable.clone()
        } else {
            format!("{} {}", self.executable, self.args.join(" "))
        }
    }
}

/// A managed child process
pub struct ManagedProcess {
    /// Process configuration
    pub config: ProcessConfig,
    /// Current status
    pub status: ProcessStatus,
    /// Process ID (if running)
    pub pid: Option<u32>,
    /// Child process handle
    child: Option<Child>,
}

impl ManagedProcess {
    /// Create a new managed process
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            status: ProcessStatus::Stopped(None),
            pid: None,
            child: None,
        }
    }

    /// Start the process
    pub fn start(&mut self) -> Result<(), ProcessError> {
        if self.status.is_running() {
            return Err(ProcessError::AlreadyRunning(self.config.name.clone()));
        }

        log::info!("[{}] Starting: {}", self.config.name, self.config.command_line());

        let mut cmd = Command::new(&self.config.executable);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .kill_on_drop(true);

        match self.config.output {
            OutputMode::Inherit => {
                cmd.stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
            OutputMode::Log => {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
            }
        }

        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        match cmd.spawn() {
            Ok(mut child) => {
                let pid = child.id().unwrap_or(0);
                self.pid = Some(pid);
                self.status = ProcessStatus::Running;
                log::debug!("[{}] Process started with PID: {}", self.config.name, pid);

                if let Some(stdout) = child.stdout.take() {
                    forward_lines(self.config.name.clone(), stdout, false);
                }
                if let Some(stderr) = child.stderr.take() {
                    forward_lines(self.config.name.clone(), stderr, true);
                }

                self.child = Some(child);
                Ok(())
            }
            Err(e) => {
                log::error!("[{}] Failed to spawn process: {}", self.config.name, e);

                Err(ProcessError::SpawnFailed {
                    name: self.config.name.clone(),
                    source: e,
                })
            }
        }
    }

    /// Suspend until the process exits and return its exit code
    ///
    /// The code is `None` when the process was killed by a signal.
    pub async fn wait(&mut self) -> Result<Option<i32>, ProcessError> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| ProcessError::NotRunning(self.config.name.clone()))?;

        let status = child.wait().await.map_err(|e| ProcessError::Wait {
            name: self.config.name.clone(),
            source: e,
        })?;

        let code = status.code();
        self.mark_exited(code);
        Ok(code)
    }

    /// Stop the process gracefully (SIGTERM, then SIGKILL after timeout)
    ///
    /// Calling this on a process that is not running is a no-op.
    pub async fn stop(&mut self, timeout: Duration) -> Result<(), ProcessError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        log::info!("[{}] Stopping process...", self.config.name);

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let code = status.code();
                log::info!("[{}] Process exited with code: {:?}", self.config.name, code);
                self.mark_exited(code);
                Ok(())
            }
            Ok(Err(e)) => {
                self.mark_exited(None);
                Err(ProcessError::Wait {
                    name: self.config.name.clone(),
                    source: e,
                })
            }
            Err(_) => {
                log::warn!(
                    "[{}] Process did not exit gracefully, forcing kill",
                    self.config.name
                );
                let result = child.kill().await;
                self.mark_exited(None);
                result.map_err(|e| ProcessError::Wait {
                    name: self.config.name.clone(),
                    source: e,
                })
            }
        }
    }

    /// Check if the process is still running
    pub fn check_status(&mut self) -> ProcessStatus {
        if let Some(child) = &mut self.child {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let code = status.code();
                    log::info!("[{}] Process exited with code: {:?}", self.config.name, code);
                    self.mark_exited(code);
                    self.child = None;
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!(
                        "[{}] Error checking process status: {}",
                        self.config.name,
                        e
                    );
                }
            }
        }

        self.status
    }

    fn mark_exited(&mut self, code: Option<i32>) {
        self.status = ProcessStatus::Stopped(code);
        self.pid = None;
    }
}

fn forward_lines<R>(name: String, stream: R, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                log::warn!("[{}] {}", name, line);
            } else {
                log::info!("[{}] {}", name, line);
            }
        }
    });
}

/// Errors that can occur with managed processes
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Process '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Failed to spawn process '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process '{0}' is not running")]
    NotRunning(String),

    #[error("Failed waiting for process '{name}': {source}")]
    Wait {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_returns_exit_code() {
        let config = ProcessConfig::new("exit3", "sh")
            .args(["-c", "exit 3"])
            .output(OutputMode::Log);
        let mut process = ManagedProcess::new(config);

        process.start().unwrap();
        assert!(process.status.is_running());

        let code = process.wait().await.unwrap();
        assert_eq!(code, Some(3));
        assert_eq!(process.status, ProcessStatus::Stopped(Some(3)));
    }

    #[tokio::test]
    async fn test_env_overrides_reach_child() {
        let config = ProcessConfig::new("env", "sh")
            .args(["-c", "test \"$NUAGE_TEST_VALUE\" = expected"])
            .env("NUAGE_TEST_VALUE", "expected")
            .output(OutputMode::Log);
        let mut process = ManagedProcess::new(config);

        process.start().unwrap();
        assert_eq!(process.wait().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let config = ProcessConfig::new("missing", "/nonexistent/nuage-binary");
        let mut process = ManagedProcess::new(config);

        let result = process.start();
        assert!(matches!(result, Err(ProcessError::SpawnFailed { .. })));
        assert_eq!(process.status, ProcessStatus::Stopped(None));
        assert!(process.pid.is_none());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let config = ProcessConfig::new("sleeper", "sleep")
            .args(["30"])
            .output(OutputMode::Log);
        let mut process = ManagedProcess::new(config);

        process.start().unwrap();
        process.stop(Duration::from_secs(2)).await.unwrap();
        assert!(process.status.is_stopped());

        process.stop(Duration::from_secs(2)).await.unwrap();
        assert!(process.status.is_stopped());
    }

    #[tokio::test]
    async fn test_stop_kills_process_ignoring_sigterm() {
        let config = ProcessConfig::new("stubborn", "sh")
            .args(["-c", "trap '' TERM; sleep 30"])
            .output(OutputMode::Log);
        let mut process = ManagedProcess::new(config);

        process.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        process.stop(Duration::from_millis(200)).await.unwrap();
        assert_eq!(process.status, ProcessStatus::Stopped(None));
    }

    #[tokio::test]
    async fn test_wait_without_start() {
        let mut process = ManagedProcess::new(ProcessConfig::new("idle", "true"));
        assert!(matches!(
            process.wait().await,
            Err(ProcessError::NotRunning(_))
        ));
    }

    #[test]
    fn test_command_line() {
        let config = ProcessConfig::new("pulumi", "pulumi").args(["up", "-s", "local"]);
        assert_eq!(config.command_line(), "pulumi up -s local");
    }
}
