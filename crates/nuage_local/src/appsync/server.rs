//! HTTP API simulator
//!
//! Serves the loaded [`SimulatorConfig`] over HTTP:
//!
//! - `GET /health` - liveness and initialisation state
//! - `GET /config` - the datasource/resolver configuration
//! - `GET /schema` - the transformed schema SDL
//! - `POST /graphql` - GraphQL endpoint used by the frontend
//!
//! The simulator is started first and initialised afterwards; until
//! [`ApiSimulator::init`] is called every config-dependent route answers 503.

use super::processor::SimulatorConfig;
use super::ApiError;
use async_graphql_parser::types::{
    DocumentOperations, ExecutableDocument, OperationType, Selection, SelectionSet,
};
use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

/// A GraphQL-serving simulator
#[async_trait]
pub trait ApiSimulator: Send {
    /// Bind the listener and start serving
    async fn start(&mut self) -> Result<SocketAddr, ApiError>;

    /// Load the configuration to serve
    async fn init(&self, config: SimulatorConfig) -> Result<(), ApiError>;

    /// Stop serving and wait for in-flight requests
    async fn stop(&mut self);
}

/// Shared state for HTTP handlers
#[derive(Clone, Default)]
pub struct AppState {
    pub config: Arc<RwLock<Option<SimulatorConfig>>>,
}

/// GraphQL request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: Option<Value>,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub initialized: bool,
}

/// Root operation of a GraphQL request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }
}

impl From<OperationType> for OperationKind {
    fn from(ty: OperationType) -> Self {
        match ty {
            OperationType::Query => OperationKind::Query,
            OperationType::Mutation => OperationKind::Mutation,
            OperationType::Subscription => OperationKind::Subscription,
        }
    }
}

/// Errors raised while reading a GraphQL request document
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{0}")]
    Syntax(String),

    #[error("unknown operation named '{0}'")]
    UnknownOperation(String),

    #[error("operationName is required when the document has several operations")]
    OperationNameRequired,
}

impl QueryError {
    pub fn error_type(&self) -> &'static str {
        match self {
            QueryError::Syntax(_) => "MalformedQuery",
            QueryError::UnknownOperation(_) | QueryError::OperationNameRequired => {
                "BadRequestException"
            }
        }
    }
}

/// Operation kind and top-level field names of the selected operation
///
/// The operation is picked by `operation_name`, or is the only one in the
/// document. Aliases resolve to the underlying field and fragments spread at
/// the top level contribute their own fields.
pub fn root_fields(
    query: &str,
    operation_name: Option<&str>,
) -> Result<(OperationKind, Vec<String>), QueryError> {
    let document =
        async_graphql_parser::parse_query(query).map_err(|e| QueryError::Syntax(e.to_string()))?;

    let operation = match (&document.operations, operation_name) {
        (DocumentOperations::Single(op), _) => op,
        (DocumentOperations::Multiple(ops), Some(name)) => ops
            .iter()
            .find(|(op_name, _)| op_name.as_str() == name)
            .map(|(_, op)| op)
            .ok_or_else(|| QueryError::UnknownOperation(name.to_string()))?,
        (DocumentOperations::Multiple(ops), None) if ops.len() == 1 => ops
            .values()
            .next()
            .ok_or(QueryError::OperationNameRequired)?,
        (DocumentOperations::Multiple(_), None) => return Err(QueryError::OperationNameRequired),
    };

    let mut fields = Vec::new();
    let mut visited = HashSet::new();
    collect_fields(
        &operation.node.selection_set.node,
        &document,
        &mut visited,
        &mut fields,
    );
    Ok((operation.node.ty.into(), fields))
}

fn collect_fields(
    selection_set: &SelectionSet,
    document: &ExecutableDocument,
    visited: &mut HashSet<String>,
    fields: &mut Vec<String>,
) {
    for item in &selection_set.items {
        match &item.node {
            Selection::Field(field) => fields.push(field.node.name.node.to_string()),
            Selection::InlineFragment(inline) => {
                collect_fields(&inline.node.selection_set.node, document, visited, fields)
            }
            Selection::FragmentSpread(spread) => {
                let name = &spread.node.fragment_name.node;
                // Cyclic spreads are invalid; stop at the first repeat
                if !visited.insert(name.to_string()) {
                    continue;
                }
                if let Some(fragment) = document.fragments.get(name) {
                    collect_fields(&fragment.node.selection_set.node, document, visited, fields);
                }
            }
        }
    }
}

fn graphql_error(message: impl Into<String>, error_type: &str, path: Option<&str>) -> Value {
    let mut error = json!({ "message": message.into(), "errorType": error_type });
    if let Some(path) = path {
        error["path"] = json!([path]);
    }
    error
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        initialized: state.config.read().await.is_some(),
    })
}

/// GET /config
async fn get_config(
    State(state): State<AppState>,
) -> Result<Json<SimulatorConfig>, StatusCode> {
    state
        .config
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

/// GET /schema
async fn get_schema(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .config
        .read()
        .await
        .as_ref()
        .map(|c| c.schema.content.clone())
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

/// POST /graphql
async fn graphql(
    State(state): State<AppState>,
    Json(request): Json<GraphQLRequest>,
) -> (StatusCode, Json<Value>) {
    let guard = state.config.read().await;
    let Some(config) = guard.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "errors": [graphql_error("Simulator is not initialized", "ServiceUnavailable", None)]
            })),
        );
    };

    let (kind, fields) = match root_fields(&request.query, request.operation_name.as_deref()) {
        Ok(parsed) => parsed,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "errors": [graphql_error(e.to_string(), e.error_type(), None)] })),
            );
        }
    };

    log::debug!(
        "GraphQL {} {:?}: {}",
        kind.type_name(),
        request.operation_name,
        fields.join(", ")
    );

    let mut data = Map::new();
    let mut errors = Vec::new();

    for field in &fields {
        if field == "__typename" {
            data.insert(field.clone(), json!(kind.type_name()));
            continue;
        }

        match config.resolver(kind.type_name(), field) {
            None => errors.push(graphql_error(
                format!(
                    "Validation error: field '{}' is not defined on type '{}'",
                    field,
                    kind.type_name()
                ),
                "FieldUndefined",
                Some(field.as_str()),
            )),
            Some(resolver) => {
                let target = config
                    .data_source(&resolver.data_source_name)
                    .map(|ds| {
                        format!(
                            "table '{}' at {}",
                            ds.config.table_name,
                            ds.config.endpoint.as_deref().unwrap_or("<no endpoint>")
                        )
                    })
                    .unwrap_or_else(|| format!("datasource '{}'", resolver.data_source_name));
                errors.push(graphql_error(
                    format!(
                        "Resolver {}.{} targets {}; resolver execution is not supported by the local simulator",
                        resolver.type_name, resolver.field_name, target
                    ),
                    "UnsupportedOperation",
                    Some(field.as_str()),
                ));
                data.insert(field.clone(), Value::Null);
            }
        }
    }

    let mut body = json!({ "data": Value::Object(data) });
    if !errors.is_empty() {
        body["errors"] = Value::Array(errors);
    }
    (StatusCode::OK, Json(body))
}

/// Build the router with all simulator routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/config", get(get_config))
        .route("/schema", get(get_schema))
        .route("/graphql", post(graphql))
        .layer(cors)
        .with_state(state)
}

/// Axum-based API simulator
pub struct HttpApiSimulator {
    port: u16,
    state: AppState,
    shutdown_tx: Option<watch::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl HttpApiSimulator {
    /// Simulator listening on `127.0.0.1:<port>`; port 0 picks a free one
    pub fn new(port: u16) -> Self {
        Self {
            port,
            state: AppState::default(),
            shutdown_tx: None,
            task: None,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Wait until the server task ends (after `stop` or a fatal error)
    pub async fn join(&mut self) -> Result<(), ApiError> {
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result.map_err(ApiError::Serve),
                Err(e) => Err(ApiError::Serve(std::io::Error::other(e))),
            },
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ApiSimulator for HttpApiSimulator {
    async fn start(&mut self) -> Result<SocketAddr, ApiError> {
        let bind_addr = format!("127.0.0.1:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| ApiError::Bind {
                port: self.port,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ApiError::Serve)?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        let app = router(self.state.clone());

        self.task = Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.changed().await.ok();
                })
                .await
        }));
        self.shutdown_tx = Some(shutdown_tx);

        log::info!("AppSync simulator listening on http://{}", local_addr);
        Ok(local_addr)
    }

    async fn init(&self, config: SimulatorConfig) -> Result<(), ApiError> {
        log::info!(
            "Loaded API '{}' with {} datasource(s) and {} resolver(s)",
            config.app_sync.name,
            config.data_sources.len(),
            config.resolvers.len()
        );
        *self.state.config.write().await = Some(config);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            if let Err(e) = self.join().await {
                log::error!("AppSync simulator stopped with error: {}", e);
            }
            log::info!("AppSync simulator stopped");
        }
    }
}
