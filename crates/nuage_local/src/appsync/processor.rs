//! Template post-processing
//!
//! Converts the raw resource template of a [`TransformedStack`] into the
//! flat [`SimulatorConfig`] the API simulator is initialised with. The
//! conversion sits behind [`TemplateProcessor`] so callers never depend on
//! the template layout.

use super::transform::{
    AuthMode, TransformedStack, DATA_SOURCE_RESOURCE, GRAPHQL_API_RESOURCE, RESOLVER_RESOURCE,
    TABLE_RESOURCE,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Intrinsic functions may reference each other; bail out on cycles
const MAX_RESOLVE_DEPTH: usize = 16;

/// Simulator-ready API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorConfig {
    pub schema: SchemaContent,
    pub app_sync: AppSyncConfig,
    pub data_sources: Vec<DataSource>,
    pub resolvers: Vec<ResolverConfig>,
}

impl SimulatorConfig {
    /// Resolver attached to `type_name.field_name`
    pub fn resolver(&self, type_name: &str, field_name: &str) -> Option<&ResolverConfig> {
        self.resolvers
            .iter()
            .find(|r| r.type_name == type_name && r.field_name == field_name)
    }

    pub fn data_source(&self, name: &str) -> Option<&DataSource> {
        self.data_sources.iter().find(|d| d.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaContent {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSyncConfig {
    pub name: String,
    pub default_authentication_type: AuthProvider,
    pub additional_authentication_providers: Vec<AuthProvider>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProvider {
    pub authentication_type: AuthMode,
}

/// Datasource descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    /// Generated name, e.g. `NoteTable`
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: DataSourceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConfig {
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverConfig {
    pub type_name: String,
    pub field_name: String,
    pub data_source_name: String,
    pub kind: String,
    pub request_mapping_template: String,
    pub response_mapping_template: String,
    #[serde(default)]
    pub auth_rules: Vec<Value>,
}

/// Turns a transformed stack into a simulator configuration
pub trait TemplateProcessor: Send + Sync {
    fn process(&self, stack: &TransformedStack) -> Result<SimulatorConfig, TemplateError>;
}

/// Resolves CloudFormation intrinsics (`Ref`, `Fn::Sub`, `Fn::GetAtt`,
/// `Fn::Join`) against a fixed parameter set
#[derive(Debug, Clone)]
pub struct CfnTemplateProcessor {
    parameters: HashMap<String, String>,
}

impl CfnTemplateProcessor {
    pub fn new(api_name: &str, stack: &str, region: &str) -> Self {
        let parameters = HashMap::from([
            ("env".to_string(), stack.to_string()),
            ("AppSyncApiName".to_string(), api_name.to_string()),
            ("AppSyncApiId".to_string(), format!("{}-local-api", api_name)),
            ("AWS::Region".to_string(), region.to_string()),
        ]);
        Self { parameters }
    }

    fn resolve(
        &self,
        value: &Value,
        resources: &IndexMap<String, Value>,
        depth: usize,
    ) -> Result<Value, TemplateError> {
        if depth > MAX_RESOLVE_DEPTH {
            return Err(TemplateError::Unresolvable(value.to_string()));
        }

        match value {
            Value::Object(map) if map.len() == 1 => {
                let (key, arg) = map.iter().next().ok_or_else(|| {
                    TemplateError::Unresolvable(value.to_string())
                })?;
                match key.as_str() {
                    "Ref" => self.resolve_ref(arg, resources, depth).map(Value::String),
                    "Fn::Sub" => self.resolve_sub(arg).map(Value::String),
                    "Fn::GetAtt" => self.resolve_get_att(arg, resources, depth).map(Value::String),
                    "Fn::Join" => self.resolve_join(arg, resources, depth).map(Value::String),
                    _ => {
                        let resolved = self.resolve(arg, resources, depth + 1)?;
                        Ok(Value::Object(
                            [(key.clone(), resolved)].into_iter().collect(),
                        ))
                    }
                }
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve(v, resources, depth + 1)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|v| self.resolve(v, resources, depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(
        &self,
        value: &Value,
        resources: &IndexMap<String, Value>,
        depth: usize,
    ) -> Result<String, TemplateError> {
        match self.resolve(value, resources, depth + 1)? {
            Value::String(s) => Ok(s),
            other => Err(TemplateError::Unresolvable(other.to_string())),
        }
    }

    /// Physical name of a resource: table name, data source name or API id
    fn physical_name(
        &self,
        logical_id: &str,
        resources: &IndexMap<String, Value>,
        depth: usize,
    ) -> Result<String, TemplateError> {
        let resource = resources
            .get(logical_id)
            .ok_or_else(|| TemplateError::UnknownReference(logical_id.to_string()))?;
        let properties = &resource["Properties"];

        match resource["Type"].as_str() {
            Some(TABLE_RESOURCE) => self.resolve_string(&properties["TableName"], resources, depth),
            Some(DATA_SOURCE_RESOURCE) => self.resolve_string(&properties["Name"], resources, depth),
            Some(GRAPHQL_API_RESOURCE) => self.parameter("AppSyncApiId"),
            _ => Ok(logical_id.to_string()),
        }
    }

    fn parameter(&self, name: &str) -> Result<String, TemplateError> {
        self.parameters
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::UnknownReference(name.to_string()))
    }

    fn resolve_ref(
        &self,
        arg: &Value,
        resources: &IndexMap<String, Value>,
        depth: usize,
    ) -> Result<String, TemplateError> {
        let name = arg
            .as_str()
            .ok_or_else(|| TemplateError::Unresolvable(arg.to_string()))?;

        if let Some(value) = self.parameters.get(name) {
            return Ok(value.clone());
        }
        self.physical_name(name, resources, depth + 1)
    }

    fn resolve_sub(&self, arg: &Value) -> Result<String, TemplateError> {
        let template = arg
            .as_str()
            .ok_or_else(|| TemplateError::Unresolvable(arg.to_string()))?;

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| TemplateError::Unresolvable(template.to_string()))?;
            out.push_str(&self.parameter(&after[..end])?);
            rest = &after[end + 1..];
        }
        out.push_str(rest);

        Ok(out)
    }

    fn resolve_get_att(
        &self,
        arg: &Value,
        resources: &IndexMap<String, Value>,
        depth: usize,
    ) -> Result<String, TemplateError> {
        let (logical_id, attribute) = match arg.as_array().map(Vec::as_slice) {
            Some([Value::String(id), Value::String(attr)]) => (id.as_str(), attr.as_str()),
            _ => return Err(TemplateError::Unresolvable(arg.to_string())),
        };

        match attribute {
            "Name" | "TableName" => self.physical_name(logical_id, resources, depth + 1),
            "ApiId" => self.parameter("AppSyncApiId"),
            other => Err(TemplateError::UnsupportedAttribute {
                resource: logical_id.to_string(),
                attribute: other.to_string(),
            }),
        }
    }

    fn resolve_join(
        &self,
        arg: &Value,
        resources: &IndexMap<String, Value>,
        depth: usize,
    ) -> Result<String, TemplateError> {
        let (separator, parts) = match arg.as_array().map(Vec::as_slice) {
            Some([Value::String(sep), Value::Array(parts)]) => (sep, parts),
            _ => return Err(TemplateError::Unresolvable(arg.to_string())),
        };

        let parts = parts
            .iter()
            .map(|p| self.resolve_string(p, resources, depth))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(separator))
    }

    fn string_property(
        &self,
        logical_id: &str,
        properties: &Value,
        key: &str,
        resources: &IndexMap<String, Value>,
    ) -> Result<String, TemplateError> {
        let value = properties.get(key).ok_or_else(|| TemplateError::MissingProperty {
            resource: logical_id.to_string(),
            property: key.to_string(),
        })?;
        self.resolve_string(value, resources, 0)
    }
}

impl TemplateProcessor for CfnTemplateProcessor {
    fn process(&self, stack: &TransformedStack) -> Result<SimulatorConfig, TemplateError> {
        let resources = &stack.resources;
        let mut app_sync = None;
        let mut data_sources = Vec::new();
        let mut resolvers = Vec::new();

        for (logical_id, resource) in resources {
            let properties = &resource["Properties"];

            match resource["Type"].as_str() {
                Some(GRAPHQL_API_RESOURCE) => {
                    let resolved = self.resolve(properties, resources, 0)?;
                    let default_authentication_type = AuthProvider {
                        authentication_type: serde_json::from_value(
                            resolved["AuthenticationType"].clone(),
                        )
                        .map_err(|e| TemplateError::InvalidProperty {
                            resource: logical_id.clone(),
                            message: e.to_string(),
                        })?,
                    };
                    let additional_authentication_providers = resolved
                        ["AdditionalAuthenticationProviders"]
                        .as_array()
                        .map(Vec::as_slice)
                        .unwrap_or_default()
                        .iter()
                        .map(|p| {
                            serde_json::from_value(p["AuthenticationType"].clone())
                                .map(|authentication_type| AuthProvider {
                                    authentication_type,
                                })
                                .map_err(|e| TemplateError::InvalidProperty {
                                    resource: logical_id.clone(),
                                    message: e.to_string(),
                                })
                        })
                        .collect::<Result<Vec<_>, _>>()?;

                    app_sync = Some(AppSyncConfig {
                        name: self.string_property(logical_id, properties, "Name", resources)?,
                        default_authentication_type,
                        additional_authentication_providers,
                    });
                }
                Some(DATA_SOURCE_RESOURCE) => {
                    let dynamo = properties.get("DynamoDBConfig").ok_or_else(|| {
                        TemplateError::MissingProperty {
                            resource: logical_id.clone(),
                            property: "DynamoDBConfig".to_string(),
                        }
                    })?;
                    let region = match dynamo.get("AwsRegion") {
                        Some(r) => Some(self.resolve_string(r, resources, 0)?),
                        None => None,
                    };

                    data_sources.push(DataSource {
                        name: self.string_property(logical_id, properties, "Name", resources)?,
                        kind: self.string_property(logical_id, properties, "Type", resources)?,
                        config: DataSourceConfig {
                            table_name: self.string_property(
                                logical_id,
                                dynamo,
                                "TableName",
                                resources,
                            )?,
                            endpoint: None,
                            region,
                        },
                    });
                }
                Some(RESOLVER_RESOURCE) => {
                    let auth_rules = properties
                        .get("AuthRules")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();

                    resolvers.push(ResolverConfig {
                        type_name: self.string_property(logical_id, properties, "TypeName", resources)?,
                        field_name: self.string_property(logical_id, properties, "FieldName", resources)?,
                        data_source_name: self.string_property(
                            logical_id,
                            properties,
                            "DataSourceName",
                            resources,
                        )?,
                        kind: self.string_property(logical_id, properties, "Kind", resources)?,
                        request_mapping_template: self.string_property(
                            logical_id,
                            properties,
                            "RequestMappingTemplate",
                            resources,
                        )?,
                        response_mapping_template: self.string_property(
                            logical_id,
                            properties,
                            "ResponseMappingTemplate",
                            resources,
                        )?,
                        auth_rules,
                    });
                }
                _ => {}
            }
        }

        let app_sync =
            app_sync.ok_or_else(|| TemplateError::MissingResource(GRAPHQL_API_RESOURCE))?;

        Ok(SimulatorConfig {
            schema: SchemaContent {
                content: stack.schema.clone(),
            },
            app_sync,
            data_sources,
            resolvers,
        })
    }
}

/// Errors raised while flattening a template
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template has no {0} resource")]
    MissingResource(&'static str),

    #[error("Resource '{resource}' is missing property '{property}'")]
    MissingProperty { resource: String, property: String },

    #[error("Resource '{resource}' has an invalid property: {message}")]
    InvalidProperty { resource: String, message: String },

    #[error("Unknown reference '{0}'")]
    UnknownReference(String),

    #[error("Attribute '{attribute}' of '{resource}' is not supported")]
    UnsupportedAttribute { resource: String, attribute: String },

    #[error("Cannot resolve {0}")]
    Unresolvable(String),
}
