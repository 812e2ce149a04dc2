//! nuage-local CLI
//!
//! Usage:
//!   nuage-local dynamo
//!   nuage-local appsync
//!   nuage-local pulumi up --yes
//!   nuage-local exports -o src/aws-exports.js

use nuage_local::appsync::{run_api_simulator, HttpApiSimulator};
use nuage_local::cli::{Command, DynamoArgs, ExportsArgs, LocalArgs};
use nuage_local::exports::{AwsExports, DEFAULT_EXPORTS_PATH};
use nuage_local::orchestrator::{with_simulator, ExternalTool, Orchestrator};
use nuage_local::simulator::{DynamoDbSimulator, SimulatorHandle};
use nuage_local::LocalConfig;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let args: LocalArgs = argh::from_env();

    let env = env_logger::Env::default().default_filter_or(args.log_filter());
    env_logger::init_from_env(env);

    let config = match LocalConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let code = match args.command {
        Command::Dynamo(dynamo) => run_dynamo(config, dynamo).await,
        Command::AppSync(_) => run_appsync(config).await,
        Command::Pulumi(pulumi) => run_pulumi(config, pulumi.args).await,
        Command::Exports(exports) => run_exports(config, exports),
    };

    std::process::exit(code);
}

/// Shutdown channel fired by Ctrl+C
fn shutdown_channel() -> Result<watch::Receiver<()>, ctrlc::Error> {
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, initiating shutdown...");
        let _ = shutdown_tx.send(());
    })?;
    Ok(shutdown_rx)
}

fn simulator(config: &LocalConfig) -> DynamoDbSimulator {
    DynamoDbSimulator::new(config.dynamo_command())
        .with_startup_timeout(config.startup_timeout())
        .with_shutdown_timeout(config.shutdown_timeout())
}

async fn run_dynamo(mut config: LocalConfig, args: DynamoArgs) -> i32 {
    config.in_memory |= args.in_memory;

    let mut shutdown_rx = match shutdown_channel() {
        Ok(rx) => rx,
        Err(e) => {
            log::error!("Error setting Ctrl+C handler: {}", e);
            return 1;
        }
    };

    let handle = match simulator(&config).start(config.dynamo_options()).await {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("{}", e);
            return 1;
        }
    };
    log::info!(
        "Running DynamoDB simulator at {} (pid {:?})",
        handle.endpoint(),
        handle.pid()
    );

    with_simulator(handle, |_| async move {
        shutdown_rx.changed().await.ok();
    })
    .await;

    log::info!("DynamoDB simulator stopped");
    0
}

async fn run_appsync(config: LocalConfig) -> i32 {
    let shutdown_rx = match shutdown_channel() {
        Ok(rx) => rx,
        Err(e) => {
            log::error!("Error setting Ctrl+C handler: {}", e);
            return 1;
        }
    };

    let mut api = HttpApiSimulator::new(config.appsync_port);
    match run_api_simulator(&config, &mut api, shutdown_rx).await {
        Ok(()) => {
            log::info!("AppSync simulator stopped");
            0
        }
        Err(e) => {
            log::error!("{}", e);
            1
        }
    }
}

async fn run_pulumi(config: LocalConfig, args: Vec<String>) -> i32 {
    // The tool shares our terminal and receives Ctrl+C itself; keep running
    // so the simulator is cleaned up once it exits.
    if let Err(e) = ctrlc::set_handler(|| log::info!("Received Ctrl+C, waiting for tool to exit"))
    {
        log::warn!("Error setting Ctrl+C handler: {}", e);
    }

    let tool =
        ExternalTool::new(&config.provisioning_tool).with_working_dir(&config.project_root);
    let mut orchestrator = Orchestrator::new(simulator(&config), tool, config.dynamo_options());

    match orchestrator.run(&args).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            1
        }
    }
}

fn run_exports(config: LocalConfig, args: ExportsArgs) -> i32 {
    let path = args
        .output
        .unwrap_or_else(|| config.project_root.join(DEFAULT_EXPORTS_PATH));

    match AwsExports::local(&config, &args.user_pool_id, &args.client_id).write_to(&path) {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{}", e);
            1
        }
    }
}
