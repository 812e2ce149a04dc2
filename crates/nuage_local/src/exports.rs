//! `aws-exports.js` for the React app

use crate::appsync::AuthMode;
use crate::config::LocalConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Default location of the generated file, relative to the project root
pub const DEFAULT_EXPORTS_PATH: &str = "src/aws-exports.js";

/// Values the frontend reads to reach the backend
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AwsExports {
    pub aws_project_region: String,
    pub aws_cognito_region: String,
    pub aws_user_pools_id: String,
    pub aws_user_pools_web_client_id: String,
    #[serde(rename = "aws_appsync_graphqlEndpoint")]
    pub aws_appsync_graphql_endpoint: String,
    pub aws_appsync_dangerously_connect_to_http_endpoint_for_testing: bool,
    pub aws_appsync_region: String,
    #[serde(rename = "aws_appsync_authenticationType")]
    pub aws_appsync_authentication_type: AuthMode,
}

impl AwsExports {
    /// Exports pointing at the local API simulator
    pub fn local(config: &LocalConfig, user_pool_id: &str, client_id: &str) -> Self {
        Self {
            aws_project_region: config.region.clone(),
            aws_cognito_region: config.region.clone(),
            aws_user_pools_id: user_pool_id.to_string(),
            aws_user_pools_web_client_id: client_id.to_string(),
            aws_appsync_graphql_endpoint: config.graphql_endpoint(),
            aws_appsync_dangerously_connect_to_http_endpoint_for_testing: true,
            aws_appsync_region: config.region.clone(),
            aws_appsync_authentication_type: AuthMode::AmazonCognitoUserPools,
        }
    }

    /// Render as an ES module
    pub fn render(&self) -> Result<String, ExportsError> {
        let body = serde_json::to_string_pretty(self)?;
        Ok(format!(
            "// This file is generated by nuage-local. Do not edit.\n\n\
             const awsmobile = {};\n\n\
             export default awsmobile;\n",
            body
        ))
    }

    /// Render and write to `path`, creating parent directories
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ExportsError> {
        let path = path.as_ref();
        let contents = self.render()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ExportsError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, contents).map_err(|source| ExportsError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        log::info!("Wrote {}", path.display());
        Ok(())
    }
}

/// Errors writing the exports file
#[derive(Debug, thiserror::Error)]
pub enum ExportsError {
    #[error("Failed to serialize exports: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_exports() {
        let exports = AwsExports::local(&LocalConfig::default(), "pool", "client");
        let js = exports.render().unwrap();

        assert!(js.starts_with("// This file is generated"));
        assert!(js.contains("\"aws_appsync_graphqlEndpoint\": \"http://localhost:62225/graphql\""));
        assert!(js.contains("\"aws_appsync_authenticationType\": \"AMAZON_COGNITO_USER_POOLS\""));
        assert!(js.contains("\"aws_appsync_dangerously_connect_to_http_endpoint_for_testing\": true"));
        assert!(js.contains("\"aws_user_pools_id\": \"pool\""));
        assert!(js.trim_end().ends_with("export default awsmobile;"));
    }

    #[test]
    fn test_field_order_is_stable() {
        let js = AwsExports::local(&LocalConfig::default(), "p", "c")
            .render()
            .unwrap();
        let region = js.find("aws_project_region").unwrap();
        let auth = js.find("aws_appsync_authenticationType").unwrap();
        assert!(region < auth);
    }

    #[test]
    fn test_write_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src").join("aws-exports.js");

        AwsExports::local(&LocalConfig::default(), "p", "c")
            .write_to(&path)
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("const awsmobile = {"));
    }
}
