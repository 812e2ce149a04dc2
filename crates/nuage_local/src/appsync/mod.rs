//! Local AppSync simulator
//!
//! Loading runs in a fixed order:
//! 1. read `amplify/backend/api/<api>/schema.graphql`
//! 2. run the model, connection and auth transformers
//! 3. flatten the resulting template with a [`TemplateProcessor`]
//! 4. point every datasource at the local DynamoDB simulator
//! 5. start the HTTP simulator and initialise it with the result
//!
//! Any failure in steps 1-4 is fatal: nothing is served.

mod datasource;
mod processor;
mod schema;
mod server;
mod transform;

pub use datasource::*;
pub use processor::*;
pub use schema::{
    Directive, EnumType, FieldDef, InputValue, ObjectType, SchemaDocument, SchemaError, TypeKind,
    TypeRef, UnionType, Value,
};
pub use server::*;
pub use transform::*;

use crate::config::LocalConfig;
use std::path::PathBuf;
use tokio::sync::watch;

/// Run the schema through the standard pipeline and rewrite its datasources
pub fn build_simulator_config(
    config: &LocalConfig,
    sdl: &str,
) -> Result<SimulatorConfig, ApiError> {
    let processor = CfnTemplateProcessor::new(&config.api_name, &config.stack, &config.region);
    build_simulator_config_with(config, sdl, &processor)
}

/// Same as [`build_simulator_config`] with a caller-supplied processor
pub fn build_simulator_config_with(
    config: &LocalConfig,
    sdl: &str,
    processor: &dyn TemplateProcessor,
) -> Result<SimulatorConfig, ApiError> {
    let stack = GraphQLTransform::standard(AuthConfig::default()).transform(sdl)?;
    let mut simulator_config = processor.process(&stack)?;

    rewrite_data_sources(
        &mut simulator_config,
        &LocalTarget {
            endpoint: config.dynamo_endpoint(),
            region: config.region.clone(),
            table_prefix: config.table_prefix(),
        },
    );

    Ok(simulator_config)
}

/// Read the API schema from disk and build the simulator configuration
pub fn load_simulator_config(config: &LocalConfig) -> Result<SimulatorConfig, ApiError> {
    let path = config.schema_path();
    log::info!("Loading GraphQL schema: {}", path.display());

    let sdl = std::fs::read_to_string(&path).map_err(|source| ApiError::ReadSchema {
        path: path.clone(),
        source,
    })?;
    build_simulator_config(config, &sdl)
}

/// Load the configuration, serve it until `shutdown` fires, then stop
pub async fn run_api_simulator<S: ApiSimulator>(
    config: &LocalConfig,
    simulator: &mut S,
    mut shutdown: watch::Receiver<()>,
) -> Result<(), ApiError> {
    let simulator_config = load_simulator_config(config)?;

    let addr = simulator.start().await?;
    if let Err(e) = simulator.init(simulator_config).await {
        simulator.stop().await;
        return Err(e);
    }
    log::info!(
        "Running AppSync simulator on http://localhost:{}/graphql",
        addr.port()
    );

    shutdown.changed().await.ok();
    simulator.stop().await;
    Ok(())
}

/// Errors raised by the API simulator launcher
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Failed to read schema '{path}': {source}")]
    ReadSchema {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema transformation failed: {0}")]
    Transform(#[from] TransformError),

    #[error("Template processing failed: {0}")]
    Template(#[from] TemplateError),

    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("API simulator error: {0}")]
    Serve(#[source] std::io::Error),
}

impl ApiError {
    /// Whether the schema could not be turned into a configuration
    pub fn is_transformation_failure(&self) -> bool {
        matches!(
            self,
            ApiError::ReadSchema { .. } | ApiError::Transform(_) | ApiError::Template(_)
        )
    }
}
