//! Command-line interface for nuage-local

use argh::FromArgs;
use std::path::PathBuf;

/// Local development environment for the nuage notes app
#[derive(FromArgs, Debug)]
pub struct LocalArgs {
    /// path to a nuage-local.yaml config file (default: built-in defaults)
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand)]
pub enum Command {
    Dynamo(DynamoArgs),
    AppSync(AppSyncArgs),
    Pulumi(PulumiArgs),
    Exports(ExportsArgs),
}

/// Run the DynamoDB simulator until Ctrl+C
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "dynamo")]
pub struct DynamoArgs {
    /// keep data in memory instead of the database directory
    #[argh(switch)]
    pub in_memory: bool,
}

/// Run the AppSync simulator until Ctrl+C
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "appsync")]
pub struct AppSyncArgs {}

/// Run pulumi against the local DynamoDB simulator
///
/// Put `--` before pulumi flags that come first, e.g. `pulumi -- --help`.
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "pulumi")]
pub struct PulumiArgs {
    /// arguments passed to pulumi verbatim
    #[argh(positional, greedy)]
    pub args: Vec<String>,
}

/// Write aws-exports.js pointing at the local AppSync simulator
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "exports")]
pub struct ExportsArgs {
    /// output file (default: src/aws-exports.js under the project root)
    #[argh(option, short = 'o')]
    pub output: Option<PathBuf>,

    /// cognito user pool id
    #[argh(option, default = "String::from(\"local\")")]
    pub user_pool_id: String,

    /// cognito user pool client id
    #[argh(option, default = "String::from(\"local\")")]
    pub client_id: String,
}

impl LocalArgs {
    /// Log filter derived from `--log-level`, falling back to `info`
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.to_lowercase().as_str() {
            "error" => "error",
            "warn" => "warn",
            "info" => "info",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        }
    }
}
