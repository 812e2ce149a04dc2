//! Schema transformer pipeline
//!
//! A [`GraphQLTransform`] parses an annotated schema and runs an ordered list
//! of [`Transformer`]s over it. Each transformer reads the schema document
//! and the resources produced by the transformers before it, and adds
//! CloudFormation-shaped resources of its own. The result is a
//! [`TransformedStack`]: the deployable SDL plus the raw resource template.

use super::schema::{
    Directive, FieldDef, InputValue, ObjectType, SchemaDocument, SchemaError, TypeKind, TypeRef,
    Value,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const TABLE_RESOURCE: &str = "AWS::DynamoDB::Table";
pub const DATA_SOURCE_RESOURCE: &str = "AWS::AppSync::DataSource";
pub const RESOLVER_RESOURCE: &str = "AWS::AppSync::Resolver";
pub const GRAPHQL_API_RESOURCE: &str = "AWS::AppSync::GraphQLApi";

/// Logical id of the API resource
pub const GRAPHQL_API_ID: &str = "GraphQLAPI";

const RESPONSE_TEMPLATE: &str = "$util.toJson($ctx.result)";

/// AppSync authentication mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    #[serde(rename = "AMAZON_COGNITO_USER_POOLS")]
    AmazonCognitoUserPools,
    #[serde(rename = "API_KEY")]
    ApiKey,
    #[serde(rename = "AWS_IAM")]
    AwsIam,
    #[serde(rename = "OPENID_CONNECT")]
    OpenIdConnect,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::AmazonCognitoUserPools => "AMAZON_COGNITO_USER_POOLS",
            AuthMode::ApiKey => "API_KEY",
            AuthMode::AwsIam => "AWS_IAM",
            AuthMode::OpenIdConnect => "OPENID_CONNECT",
        }
    }

    /// Mode named by an `@auth` rule `provider` argument
    fn from_provider(provider: &str) -> Option<Self> {
        match provider {
            "userPools" => Some(AuthMode::AmazonCognitoUserPools),
            "apiKey" => Some(AuthMode::ApiKey),
            "iam" => Some(AuthMode::AwsIam),
            "oidc" => Some(AuthMode::OpenIdConnect),
            _ => None,
        }
    }
}

/// API-wide authentication configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub default_authentication: AuthMode,
    pub additional_authentication_providers: Vec<AuthMode>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            default_authentication: AuthMode::AmazonCognitoUserPools,
            additional_authentication_providers: Vec::new(),
        }
    }
}

impl AuthConfig {
    fn allows(&self, mode: AuthMode) -> bool {
        self.default_authentication == mode
            || self.additional_authentication_providers.contains(&mode)
    }
}

/// Output of the transformer pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedStack {
    /// Deployable schema SDL with directives removed
    pub schema: String,
    /// Resources keyed by logical id
    pub resources: IndexMap<String, serde_json::Value>,
}

/// State shared by the transformers of one pipeline run
#[derive(Debug, Default)]
pub struct TransformContext {
    pub document: SchemaDocument,
    pub resources: IndexMap<String, serde_json::Value>,
}

impl TransformContext {
    pub fn new(document: SchemaDocument) -> Self {
        Self {
            document,
            resources: IndexMap::new(),
        }
    }

    pub fn add_resource(
        &mut self,
        logical_id: impl Into<String>,
        resource: serde_json::Value,
    ) -> Result<(), TransformError> {
        let logical_id = logical_id.into();
        if self.resources.contains_key(&logical_id) {
            return Err(TransformError::DuplicateResource(logical_id));
        }
        self.resources.insert(logical_id, resource);
        Ok(())
    }
}

/// One stage of the pipeline
pub trait Transformer: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(&self, ctx: &mut TransformContext) -> Result<(), TransformError>;
}

/// Ordered transformer pipeline
pub struct GraphQLTransform {
    transformers: Vec<Box<dyn Transformer>>,
}

impl GraphQLTransform {
    pub fn new(transformers: Vec<Box<dyn Transformer>>) -> Self {
        Self { transformers }
    }

    /// Model, connection and auth transformers, in that order
    pub fn standard(auth: AuthConfig) -> Self {
        Self::new(vec![
            Box::new(ModelTransformer),
            Box::new(ConnectionTransformer),
            Box::new(AuthTransformer::new(auth)),
        ])
    }

    pub fn transform(&self, sdl: &str) -> Result<TransformedStack, TransformError> {
        let document = SchemaDocument::parse(sdl)?;
        let mut ctx = TransformContext::new(document);

        for transformer in &self.transformers {
            log::debug!("Running {} transformer", transformer.name());
            transformer.transform(&mut ctx)?;
        }

        Ok(TransformedStack {
            schema: ctx.document.to_sdl(),
            resources: ctx.resources,
        })
    }
}

/// Logical id of the data source created for a model type
pub fn data_source_id(model: &str) -> String {
    format!("{}DataSource", model)
}

/// Name of the data source created for a model type, e.g. `NoteTable`
pub fn data_source_name(model: &str) -> String {
    format!("{}Table", model)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn strip_non_null(ty: &TypeRef) -> TypeRef {
    match ty {
        TypeRef::NonNull(inner) => (**inner).clone(),
        other => other.clone(),
    }
}

fn request_template(operation: &str, model: &str, index: Option<&str>) -> String {
    match operation {
        "GetItem" | "DeleteItem" => format!(
            "{{\"version\": \"2018-05-29\", \"operation\": \"{}\", \"key\": {{\"id\": $util.dynamodb.toDynamoDBJson($ctx.args.id)}}}}",
            operation
        ),
        "PutItem" | "UpdateItem" => format!(
            "{{\"version\": \"2018-05-29\", \"operation\": \"{}\", \"key\": {{\"id\": $util.dynamodb.toDynamoDBJson($util.defaultIfNullOrBlank($ctx.args.input.id, $util.autoId()))}}, \"attributeValues\": $util.dynamodb.toMapValuesJson($ctx.args.input), \"__typename\": \"{}\"}}",
            operation, model
        ),
        "Query" => format!(
            "{{\"version\": \"2018-05-29\", \"operation\": \"Query\", \"index\": \"{}\", \"query\": {{\"expression\": \"#key = :key\", \"expressionValues\": {{\":key\": $util.dynamodb.toDynamoDBJson($ctx.source.id)}}}}}}",
            index.unwrap_or("byParent")
        ),
        _ => format!(
            "{{\"version\": \"2018-05-29\", \"operation\": \"{}\", \"limit\": $util.defaultIfNull($ctx.args.limit, 100), \"nextToken\": $util.toJson($util.defaultIfNullOrBlank($ctx.args.nextToken, null))}}",
            operation
        ),
    }
}

fn resolver_resource(
    type_name: &str,
    field_name: &str,
    model: &str,
    operation: &str,
    index: Option<&str>,
) -> serde_json::Value {
    json!({
        "Type": RESOLVER_RESOURCE,
        "Properties": {
            "ApiId": { "Fn::GetAtt": [GRAPHQL_API_ID, "ApiId"] },
            "TypeName": type_name,
            "FieldName": field_name,
            "DataSourceName": { "Fn::GetAtt": [data_source_id(model), "Name"] },
            "Kind": "UNIT",
            "RequestMappingTemplate": request_template(operation, model, index),
            "ResponseMappingTemplate": RESPONSE_TEMPLATE,
        },
        "Metadata": { "Model": model, "Operation": operation },
    })
}

/// Turns `@model` types into tables, data sources and CRUD resolvers
pub struct ModelTransformer;

impl ModelTransformer {
    fn is_enabled(directive: &Directive, arg: &str) -> bool {
        !matches!(directive.arg(arg), Some(Value::Null))
    }

    fn is_relation(doc: &SchemaDocument, field: &FieldDef) -> bool {
        field.directive("connection").is_some()
            || doc
                .types
                .get(field.ty.base_name())
                .is_some_and(|t| t.has_directive("model"))
    }

    fn input_types(doc: &SchemaDocument, model: &ObjectType) -> Vec<ObjectType> {
        let name = &model.name;
        let mut create = ObjectType::new(TypeKind::Input, format!("Create{}Input", name));
        let mut update = ObjectType::new(TypeKind::Input, format!("Update{}Input", name));
        let mut delete = ObjectType::new(TypeKind::Input, format!("Delete{}Input", name));

        for field in model.fields.iter().filter(|f| !Self::is_relation(doc, f)) {
            if field.name == "id" {
                create.fields.push(FieldDef::new("id", TypeRef::named("ID")));
                update
                    .fields
                    .push(FieldDef::new("id", TypeRef::non_null(TypeRef::named("ID"))));
                continue;
            }
            create
                .fields
                .push(FieldDef::new(&field.name, field.ty.clone()));
            update
                .fields
                .push(FieldDef::new(&field.name, strip_non_null(&field.ty)));
        }
        delete.fields.push(FieldDef::new("id", TypeRef::named("ID")));

        vec![create, update, delete]
    }
}

impl Transformer for ModelTransformer {
    fn name(&self) -> &'static str {
        "model"
    }

    fn transform(&self, ctx: &mut TransformContext) -> Result<(), TransformError> {
        let models: Vec<(String, Directive)> = ctx
            .document
            .types_with_directive("model")
            .filter_map(|t| t.directive("model").map(|d| (t.name.clone(), d.clone())))
            .collect();

        for (name, directive) in models {
            if let Some(model) = ctx.document.types.get_mut(&name) {
                if model.field("id").is_none() {
                    model
                        .fields
                        .insert(0, FieldDef::new("id", TypeRef::non_null(TypeRef::named("ID"))));
                }
            }

            ctx.add_resource(
                format!("{}Table", name),
                json!({
                    "Type": TABLE_RESOURCE,
                    "Properties": {
                        "TableName": { "Fn::Sub": format!("{}-${{AppSyncApiId}}-${{env}}", name) },
                        "KeySchema": [{ "AttributeName": "id", "KeyType": "HASH" }],
                        "AttributeDefinitions": [{ "AttributeName": "id", "AttributeType": "S" }],
                        "BillingMode": "PAY_PER_REQUEST",
                    },
                }),
            )?;

            ctx.add_resource(
                data_source_id(&name),
                json!({
                    "Type": DATA_SOURCE_RESOURCE,
                    "Properties": {
                        "ApiId": { "Fn::GetAtt": [GRAPHQL_API_ID, "ApiId"] },
                        "Name": data_source_name(&name),
                        "Type": "AMAZON_DYNAMODB",
                        "DynamoDBConfig": {
                            "TableName": { "Ref": format!("{}Table", name) },
                            "AwsRegion": { "Ref": "AWS::Region" },
                        },
                    },
                }),
            )?;

            let mut query = ObjectType::new(TypeKind::Object, "Query");
            let mut mutation = ObjectType::new(TypeKind::Object, "Mutation");

            if Self::is_enabled(&directive, "queries") {
                let get_field = format!("get{}", name);
                let list_field = format!("list{}s", name);
                let connection = format!("Model{}Connection", name);

                let mut get = FieldDef::new(&get_field, TypeRef::named(&name));
                get.arguments.push(InputValue {
                    name: "id".to_string(),
                    ty: TypeRef::non_null(TypeRef::named("ID")),
                    default: None,
                });
                query.fields.push(get);

                let mut list = FieldDef::new(&list_field, TypeRef::named(&connection));
                list.arguments.push(InputValue {
                    name: "limit".to_string(),
                    ty: TypeRef::named("Int"),
                    default: None,
                });
                list.arguments.push(InputValue {
                    name: "nextToken".to_string(),
                    ty: TypeRef::named("String"),
                    default: None,
                });
                query.fields.push(list);

                let mut connection_type = ObjectType::new(TypeKind::Object, &connection);
                connection_type.fields.push(FieldDef::new(
                    "items",
                    TypeRef::List(Box::new(TypeRef::named(&name))),
                ));
                connection_type
                    .fields
                    .push(FieldDef::new("nextToken", TypeRef::named("String")));
                ctx.document.merge_type(connection_type);

                ctx.add_resource(
                    format!("{}Resolver", capitalize(&get_field)),
                    resolver_resource("Query", &get_field, &name, "GetItem", None),
                )?;
                ctx.add_resource(
                    format!("{}Resolver", capitalize(&list_field)),
                    resolver_resource("Query", &list_field, &name, "Scan", None),
                )?;
            }

            if Self::is_enabled(&directive, "mutations") {
                let inputs = match ctx.document.types.get(&name) {
                    Some(model) => Self::input_types(&ctx.document, model),
                    None => Vec::new(),
                };
                for input in inputs {
                    ctx.document.merge_type(input);
                }

                for (verb, operation) in [
                    ("create", "PutItem"),
                    ("update", "UpdateItem"),
                    ("delete", "DeleteItem"),
                ] {
                    let field_name = format!("{}{}", verb, name);
                    let mut field = FieldDef::new(&field_name, TypeRef::named(&name));
                    field.arguments.push(InputValue {
                        name: "input".to_string(),
                        ty: TypeRef::non_null(TypeRef::named(format!(
                            "{}{}Input",
                            capitalize(verb),
                            name
                        ))),
                        default: None,
                    });
                    mutation.fields.push(field);

                    ctx.add_resource(
                        format!("{}Resolver", capitalize(&field_name)),
                        resolver_resource("Mutation", &field_name, &name, operation, None),
                    )?;
                }
            }

            if !query.fields.is_empty() {
                ctx.document.merge_type(query);
            }
            if !mutation.fields.is_empty() {
                ctx.document.merge_type(mutation);
            }
        }

        Ok(())
    }
}

/// Resolves `@connection` fields between model types
pub struct ConnectionTransformer;

impl Transformer for ConnectionTransformer {
    fn name(&self) -> &'static str {
        "connection"
    }

    fn transform(&self, ctx: &mut TransformContext) -> Result<(), TransformError> {
        let mut connections = Vec::new();

        for parent in ctx.document.types_with_directive("model") {
            for field in &parent.fields {
                let Some(directive) = field.directive("connection") else {
                    continue;
                };

                let related = field.ty.base_name().to_string();
                let related_is_model = ctx
                    .document
                    .types
                    .get(&related)
                    .is_some_and(|t| t.has_directive("model"));
                if !related_is_model {
                    return Err(TransformError::InvalidDirective {
                        type_name: parent.name.clone(),
                        directive: "connection".to_string(),
                        message: format!(
                            "field '{}' targets '{}', which is not a @model type",
                            field.name, related
                        ),
                    });
                }

                let index = directive.arg("keyName").and_then(Value::as_str).map(str::to_string);
                connections.push((
                    parent.name.clone(),
                    field.name.clone(),
                    related,
                    field.ty.is_list(),
                    index,
                ));
            }
        }

        for (parent, field_name, related, is_list, index) in connections {
            let operation = if is_list { "Query" } else { "GetItem" };

            if is_list {
                if let Some(field) = ctx
                    .document
                    .types
                    .get_mut(&parent)
                    .and_then(|t| t.fields.iter_mut().find(|f| f.name == field_name))
                {
                    field.ty = TypeRef::named(format!("Model{}Connection", related));
                    field.arguments = vec![
                        InputValue {
                            name: "limit".to_string(),
                            ty: TypeRef::named("Int"),
                            default: None,
                        },
                        InputValue {
                            name: "nextToken".to_string(),
                            ty: TypeRef::named("String"),
                            default: None,
                        },
                    ];
                }
            }

            ctx.add_resource(
                format!("{}{}Resolver", parent, capitalize(&field_name)),
                resolver_resource(&parent, &field_name, &related, operation, index.as_deref()),
            )?;
        }

        Ok(())
    }
}

/// Strategy of an `@auth` rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthStrategy {
    Owner,
    Groups,
    Private,
    Public,
}

impl AuthStrategy {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(AuthStrategy::Owner),
            "groups" => Some(AuthStrategy::Groups),
            "private" => Some(AuthStrategy::Private),
            "public" => Some(AuthStrategy::Public),
            _ => None,
        }
    }

    fn default_provider(&self) -> AuthMode {
        match self {
            AuthStrategy::Public => AuthMode::ApiKey,
            _ => AuthMode::AmazonCognitoUserPools,
        }
    }
}

/// One rule of an `@auth` directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRule {
    pub allow: AuthStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_field: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    pub operations: Vec<String>,
    pub provider: AuthMode,
}

const AUTH_OPERATIONS: [&str; 4] = ["create", "update", "delete", "read"];

/// Applies the API auth configuration and `@auth` rules to every resolver
///
/// Must run after the model and connection transformers: it annotates the
/// resolvers they created.
pub struct AuthTransformer {
    config: AuthConfig,
}

impl AuthTransformer {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    fn parse_rules(&self, model: &ObjectType) -> Result<Vec<AuthRule>, TransformError> {
        let Some(directive) = model.directive("auth") else {
            return Ok(Vec::new());
        };
        let invalid = |message: String| TransformError::InvalidDirective {
            type_name: model.name.clone(),
            directive: "auth".to_string(),
            message,
        };

        let rules = directive
            .arg("rules")
            .and_then(Value::as_list)
            .ok_or_else(|| invalid("missing 'rules' list".to_string()))?;

        let mut parsed = Vec::with_capacity(rules.len());
        for rule in rules {
            let rule = rule
                .as_object()
                .ok_or_else(|| invalid("each rule must be an object".to_string()))?;

            let allow_str = rule
                .get("allow")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("rule is missing 'allow'".to_string()))?;
            let allow = AuthStrategy::parse(allow_str)
                .ok_or_else(|| invalid(format!("unknown strategy '{}'", allow_str)))?;

            let provider = match rule.get("provider").and_then(Value::as_str) {
                Some(p) => AuthMode::from_provider(p)
                    .ok_or_else(|| invalid(format!("unknown provider '{}'", p)))?,
                None => allow.default_provider(),
            };
            if !self.config.allows(provider) {
                return Err(invalid(format!(
                    "rule '{}' uses {} which is not configured for this API",
                    allow_str,
                    provider.as_str()
                )));
            }

            let operations = match rule.get("operations") {
                Some(ops) => {
                    let ops = ops.string_list();
                    if let Some(bad) = ops.iter().find(|o| !AUTH_OPERATIONS.contains(&o.as_str())) {
                        return Err(invalid(format!("unknown operation '{}'", bad)));
                    }
                    ops
                }
                None => AUTH_OPERATIONS.iter().map(|o| o.to_string()).collect(),
            };

            let owner_field = match allow {
                AuthStrategy::Owner => Some(
                    rule.get("ownerField")
                        .and_then(Value::as_str)
                        .unwrap_or("owner")
                        .to_string(),
                ),
                _ => None,
            };

            let groups = rule.get("groups").map(Value::string_list).unwrap_or_default();
            if allow == AuthStrategy::Groups && groups.is_empty() {
                return Err(invalid("'groups' rule needs a non-empty 'groups' list".to_string()));
            }

            parsed.push(AuthRule {
                allow,
                owner_field,
                groups,
                operations,
                provider,
            });
        }

        Ok(parsed)
    }
}

impl Transformer for AuthTransformer {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn transform(&self, ctx: &mut TransformContext) -> Result<(), TransformError> {
        let mut rules_by_model: IndexMap<String, Vec<AuthRule>> = IndexMap::new();

        for model in ctx.document.types_with_directive("model") {
            if !ctx.resources.contains_key(&data_source_id(&model.name)) {
                return Err(TransformError::OutOfOrder {
                    transformer: self.name(),
                    requires: "model",
                });
            }
            rules_by_model.insert(model.name.clone(), self.parse_rules(model)?);
        }

        // Owner rules need a field holding the owner's identity
        for (model, rules) in &rules_by_model {
            for owner_field in rules.iter().filter_map(|r| r.owner_field.as_deref()) {
                if let Some(ty) = ctx.document.types.get_mut(model) {
                    if ty.field(owner_field).is_none() {
                        ty.fields.push(FieldDef::new(owner_field, TypeRef::named("String")));
                    }
                }
            }
        }

        ctx.add_resource(
            GRAPHQL_API_ID,
            json!({
                "Type": GRAPHQL_API_RESOURCE,
                "Properties": {
                    "Name": { "Fn::Sub": "${AppSyncApiName}-${env}" },
                    "AuthenticationType": self.config.default_authentication,
                    "AdditionalAuthenticationProviders": self
                        .config
                        .additional_authentication_providers
                        .iter()
                        .map(|m| json!({ "AuthenticationType": m }))
                        .collect::<Vec<_>>(),
                },
            }),
        )?;

        let default_mode = self.config.default_authentication;
        for resource in ctx.resources.values_mut() {
            if resource["Type"] != RESOLVER_RESOURCE {
                continue;
            }
            let rules = resource["Metadata"]["Model"]
                .as_str()
                .and_then(|m| rules_by_model.get(m))
                .cloned()
                .unwrap_or_default();

            resource["Properties"]["AuthenticationType"] = json!(default_mode);
            resource["Properties"]["AuthRules"] = json!(rules);
        }

        Ok(())
    }
}

/// Errors raised by the transformer pipeline
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Schema parse error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Invalid @{directive} on '{type_name}': {message}")]
    InvalidDirective {
        type_name: String,
        directive: String,
        message: String,
    },

    #[error("Resource '{0}' is generated more than once")]
    DuplicateResource(String),

    #[error("The {transformer} transformer must run after the {requires} transformer")]
    OutOfOrder {
        transformer: &'static str,
        requires: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOG_SCHEMA: &str = r#"
type Blog @model @auth(rules: [{allow: owner}, {allow: groups, groups: ["Admin"], operations: [read]}]) {
  id: ID!
  name: String!
  posts: [Post] @connection(keyName: "byBlog", fields: ["id"])
}

type Post @model(mutations: null) {
  id: ID!
  title: String!
  blogID: ID!
  blog: Blog @connection(fields: ["blogID"])
}
"#;

    fn standard() -> GraphQLTransform {
        GraphQLTransform::standard(AuthConfig::default())
    }

    #[test]
    fn test_model_resources() {
        let stack = standard().transform("type Note @model { note: String! }").unwrap();

        assert_eq!(stack.resources["NoteTable"]["Type"], TABLE_RESOURCE);
        assert_eq!(
            stack.resources["NoteDataSource"]["Properties"]["Name"],
            "NoteTable"
        );
        for id in [
            "GetNoteResolver",
            "ListNotesResolver",
            "CreateNoteResolver",
            "UpdateNoteResolver",
            "DeleteNoteResolver",
        ] {
            assert_eq!(stack.resources[id]["Type"], RESOLVER_RESOURCE, "{}", id);
        }
        assert!(stack.schema.contains("getNote(id: ID!): Note"));
        assert!(stack.schema.contains("createNote(input: CreateNoteInput!): Note"));
        assert!(stack.schema.contains("type ModelNoteConnection {"));
        // id is added when the model does not declare it
        assert!(stack.schema.contains("  id: ID!"));
    }

    #[test]
    fn test_non_model_types_are_ignored() {
        let stack = standard().transform("type Plain { id: ID! }").unwrap();
        let data_sources = stack
            .resources
            .values()
            .filter(|r| r["Type"] == DATA_SOURCE_RESOURCE)
            .count();
        assert_eq!(data_sources, 0);
        assert!(stack.resources.contains_key(GRAPHQL_API_ID));
    }

    #[test]
    fn test_disabled_mutations() {
        let stack = standard().transform(BLOG_SCHEMA).unwrap();
        assert!(stack.resources.contains_key("GetPostResolver"));
        assert!(!stack.resources.contains_key("CreatePostResolver"));
        assert!(stack.resources.contains_key("CreateBlogResolver"));
    }

    #[test]
    fn test_connection_resolvers() {
        let stack = standard().transform(BLOG_SCHEMA).unwrap();

        let posts = &stack.resources["BlogPostsResolver"]["Properties"];
        assert_eq!(posts["TypeName"], "Blog");
        assert_eq!(posts["DataSourceName"]["Fn::GetAtt"][0], "PostDataSource");
        assert!(posts["RequestMappingTemplate"]
            .as_str()
            .unwrap()
            .contains("\"index\": \"byBlog\""));

        let blog = &stack.resources["PostBlogResolver"]["Properties"];
        assert_eq!(blog["DataSourceName"]["Fn::GetAtt"][0], "BlogDataSource");
        assert!(stack
            .schema
            .contains("posts(limit: Int, nextToken: String): ModelPostConnection"));
    }

    #[test]
    fn test_connection_to_non_model_fails() {
        let sdl = "type Blog @model { id: ID! meta: Meta @connection }\ntype Meta { id: ID! }";
        let result = standard().transform(sdl);
        assert!(matches!(
            result,
            Err(TransformError::InvalidDirective { ref directive, .. }) if directive == "connection"
        ));
    }

    #[test]
    fn test_auth_rules_reach_connection_resolvers() {
        let stack = standard().transform(BLOG_SCHEMA).unwrap();

        // The connection resolver reads Post, which has no @auth
        let posts_rules = &stack.resources["BlogPostsResolver"]["Properties"]["AuthRules"];
        assert_eq!(posts_rules.as_array().unwrap().len(), 0);

        let blog_rules = &stack.resources["PostBlogResolver"]["Properties"]["AuthRules"];
        assert_eq!(blog_rules.as_array().unwrap().len(), 2);
        assert_eq!(blog_rules[0]["allow"], "owner");
        assert_eq!(blog_rules[0]["ownerField"], "owner");
        assert_eq!(blog_rules[1]["groups"][0], "Admin");
        assert_eq!(blog_rules[1]["operations"], json!(["read"]));
        assert_eq!(
            stack.resources["GetBlogResolver"]["Properties"]["AuthenticationType"],
            "AMAZON_COGNITO_USER_POOLS"
        );
    }

    #[test]
    fn test_owner_field_added() {
        let stack = standard().transform(BLOG_SCHEMA).unwrap();
        let doc = SchemaDocument::parse(&stack.schema).unwrap();
        assert!(doc.types["Blog"].field("owner").is_some());
        assert!(doc.types["Post"].field("owner").is_none());
    }

    #[test]
    fn test_public_rule_needs_api_key() {
        let sdl = "type Note @model @auth(rules: [{allow: public}]) { id: ID! }";
        assert!(matches!(
            standard().transform(sdl),
            Err(TransformError::InvalidDirective { .. })
        ));

        let with_key = GraphQLTransform::standard(AuthConfig {
            default_authentication: AuthMode::AmazonCognitoUserPools,
            additional_authentication_providers: vec![AuthMode::ApiKey],
        });
        let stack = with_key.transform(sdl).unwrap();
        assert_eq!(
            stack.resources[GRAPHQL_API_ID]["Properties"]["AdditionalAuthenticationProviders"][0]
                ["AuthenticationType"],
            "API_KEY"
        );
    }

    #[test]
    fn test_unknown_strategy() {
        let sdl = "type Note @model @auth(rules: [{allow: everyone}]) { id: ID! }";
        assert!(matches!(
            standard().transform(sdl),
            Err(TransformError::InvalidDirective { .. })
        ));
    }

    #[test]
    fn test_auth_before_model_is_rejected() {
        let pipeline = GraphQLTransform::new(vec![
            Box::new(AuthTransformer::new(AuthConfig::default())),
            Box::new(ModelTransformer),
        ]);
        let result = pipeline.transform("type Note @model { id: ID! }");
        assert!(matches!(result, Err(TransformError::OutOfOrder { .. })));
    }

    #[test]
    fn test_parse_error_is_transform_error() {
        let result = standard().transform("type Note @model {");
        assert!(matches!(result, Err(TransformError::Schema(_))));
    }
}
