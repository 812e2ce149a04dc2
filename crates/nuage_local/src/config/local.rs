//! Local development configuration
//!
//! Every port, path and name used by the simulators and the Pulumi wrapper
//! lives in [`LocalConfig`]. Defaults are only applied at the CLI boundary
//! (see `LocalConfig::default` and `LocalConfig::load`), everything below
//! receives the struct explicitly.

use crate::simulator::{DynamoDbCommand, DynamoDbOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port of the DynamoDB simulator
pub const DEFAULT_DYNAMO_PORT: u16 = 62226;

/// Default port of the AppSync simulator
pub const DEFAULT_APPSYNC_PORT: u16 = 62225;

/// Environment variable overriding the DynamoDB Local install directory
pub const DYNAMODB_LOCAL_DIR_ENV: &str = "NUAGE_DYNAMODB_LOCAL_DIR";

/// Root configuration for local development
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Project root; relative paths are resolved against it
    pub project_root: PathBuf,

    /// Amplify API name (directory under `amplify/backend/api`)
    pub api_name: String,

    /// Region reported to the simulators
    pub region: String,

    /// Pulumi stack name, used as the table name suffix
    pub stack: String,

    /// DynamoDB simulator port
    pub dynamo_port: u16,

    /// AppSync simulator port
    pub appsync_port: u16,

    /// Database directory, relative to the project root
    pub db_dir: PathBuf,

    /// Run DynamoDB without disk persistence
    pub in_memory: bool,

    /// Provisioning tool executable
    pub provisioning_tool: String,

    /// DynamoDB Local install directory (contains `DynamoDBLocal.jar`)
    pub dynamodb_local_dir: Option<PathBuf>,

    /// Java executable used to run DynamoDB Local
    pub java: String,

    /// Seconds to wait for the DynamoDB simulator to accept connections
    pub startup_timeout_secs: u64,

    /// Seconds to wait for a graceful stop before killing a process
    pub shutdown_timeout_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            api_name: "notespulumi".to_string(),
            region: "eu-west-1".to_string(),
            stack: "local".to_string(),
            dynamo_port: DEFAULT_DYNAMO_PORT,
            appsync_port: DEFAULT_APPSYNC_PORT,
            db_dir: PathBuf::from(".dynamodb"),
            in_memory: false,
            provisioning_tool: "pulumi".to_string(),
            dynamodb_local_dir: None,
            java: "java".to_string(),
            startup_timeout_secs: 30,
            shutdown_timeout_secs: 5,
        }
    }
}

impl LocalConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise use the defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dynamo_port == self.appsync_port {
            return Err(ConfigError::Invalid(format!(
                "dynamo_port and appsync_port must differ (both are {})",
                self.dynamo_port
            )));
        }
        if self.api_name.is_empty() {
            return Err(ConfigError::Invalid("api_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Path of the Amplify GraphQL schema
    pub fn schema_path(&self) -> PathBuf {
        self.project_root
            .join("amplify/backend/api")
            .join(&self.api_name)
            .join("schema.graphql")
    }

    /// Absolute database directory
    pub fn db_path(&self) -> PathBuf {
        self.project_root.join(&self.db_dir)
    }

    /// URL of the DynamoDB simulator
    pub fn dynamo_endpoint(&self) -> String {
        format!("http://localhost:{}", self.dynamo_port)
    }

    /// URL of the AppSync simulator's GraphQL endpoint
    pub fn graphql_endpoint(&self) -> String {
        format!("http://localhost:{}/graphql", self.appsync_port)
    }

    /// Prefix shared by all local table names, e.g. `notespulumi_local`
    pub fn table_prefix(&self) -> String {
        format!("{}_{}", self.api_name, self.stack)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Options for the DynamoDB simulator
    pub fn dynamo_options(&self) -> DynamoDbOptions {
        DynamoDbOptions {
            db_path: self.db_path(),
            in_memory: self.in_memory,
            port: self.dynamo_port,
        }
    }

    /// Command used to run DynamoDB Local
    ///
    /// Resolution order for the install directory:
    /// 1. `dynamodb_local_dir` from the config file
    /// 2. `NUAGE_DYNAMODB_LOCAL_DIR` env var
    /// 3. `~/.nuage/dynamodb-local`
    pub fn dynamo_command(&self) -> DynamoDbCommand {
        let install_dir = self
            .dynamodb_local_dir
            .clone()
            .or_else(|| std::env::var_os(DYNAMODB_LOCAL_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".nuage")
                    .join("dynamodb-local")
            });

        DynamoDbCommand::java(&self.java, install_dir)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_local_stack() {
        let config = LocalConfig::default();
        assert_eq!(config.dynamo_port, 62226);
        assert_eq!(config.appsync_port, 62225);
        assert_eq!(config.table_prefix(), "notespulumi_local");
        assert_eq!(config.dynamo_endpoint(), "http://localhost:62226");
        assert_eq!(config.graphql_endpoint(), "http://localhost:62225/graphql");
    }

    #[test]
    fn test_schema_and_db_paths() {
        let config = LocalConfig {
            project_root: PathBuf::from("/work/notes"),
            ..Default::default()
        };
        assert_eq!(
            config.schema_path(),
            PathBuf::from("/work/notes/amplify/backend/api/notespulumi/schema.graphql")
        );
        assert_eq!(config.db_path(), PathBuf::from("/work/notes/.dynamodb"));
    }

    #[test]
    fn test_dynamo_options_share_port_and_path() {
        let config = LocalConfig {
            project_root: PathBuf::from("/work/notes"),
            dynamo_port: 9000,
            ..Default::default()
        };
        let opts = config.dynamo_options();
        assert_eq!(opts.port, 9000);
        assert_eq!(opts.db_path, config.db_path());
        assert!(!opts.in_memory);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
api_name: todos
stack: dev
appsync_port: 4000
"#;
        let config = LocalConfig::parse(yaml).unwrap();
        assert_eq!(config.api_name, "todos");
        assert_eq!(config.table_prefix(), "todos_dev");
        assert_eq!(config.appsync_port, 4000);
        assert_eq!(config.dynamo_port, DEFAULT_DYNAMO_PORT);
    }

    #[test]
    fn test_parse_rejects_equal_ports() {
        let yaml = "dynamo_port: 7000\nappsync_port: 7000\n";
        let result = LocalConfig::parse(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = LocalConfig::parse("dynamo_port: [not a port");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_explicit_dynamodb_local_dir() {
        let config = LocalConfig {
            dynamodb_local_dir: Some(PathBuf::from("/opt/ddb")),
            ..Default::default()
        };
        let cmd = config.dynamo_command();
        assert_eq!(cmd.program, "java");
        assert!(cmd.args.iter().any(|a| a == "/opt/ddb/DynamoDBLocal.jar"));
    }
}
