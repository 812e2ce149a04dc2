//! GraphQL SDL model
//!
//! Schemas are parsed with `async-graphql-parser` and lowered into the
//! owned, order-preserving model below, which the transformers rewrite.
//! Type extensions are folded into the type they extend.

use async_graphql_parser::types::{
    BaseType, ConstDirective, FieldDefinition, InputValueDefinition, Type,
    TypeDefinition, TypeKind as SdlKind, TypeSystemDefinition,
};
use async_graphql_parser::Positioned;
use async_graphql_value::ConstValue;
use indexmap::IndexMap;
use std::fmt;

/// Constant value used in directive arguments and defaults
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum(String),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// String items of a list value, ignoring non-string entries
    pub fn string_list(&self) -> Vec<String> {
        self.as_list()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Enum(e) => write!(f, "{}", e),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Type reference such as `[Post!]!`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn non_null(inner: TypeRef) -> Self {
        TypeRef::NonNull(Box::new(inner))
    }

    /// Innermost named type
    pub fn base_name(&self) -> &str {
        match self {
            TypeRef::Named(n) => n,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.base_name(),
        }
    }

    pub fn is_list(&self) -> bool {
        match self {
            TypeRef::Named(_) => false,
            TypeRef::List(_) => true,
            TypeRef::NonNull(inner) => inner.is_list(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(n) => write!(f, "{}", n),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

/// Directive application, e.g. `@auth(rules: [{allow: owner}])`
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub args: IndexMap<String, Value>,
}

impl Directive {
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }
}

/// Argument or input field definition
#[derive(Debug, Clone, PartialEq)]
pub struct InputValue {
    pub name: String,
    pub ty: TypeRef,
    pub default: Option<Value>,
}

/// Field definition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub arguments: Vec<InputValue>,
    pub ty: TypeRef,
    pub directives: Vec<Directive>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            ty,
            directives: Vec::new(),
        }
    }

    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }
}

/// Kind of a field-bearing type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Object,
    Input,
    Interface,
}

impl TypeKind {
    fn keyword(&self) -> &'static str {
        match self {
            TypeKind::Object => "type",
            TypeKind::Input => "input",
            TypeKind::Interface => "interface",
        }
    }
}

/// Object, input or interface type
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectType {
    pub kind: TypeKind,
    pub name: String,
    pub implements: Vec<String>,
    pub directives: Vec<Directive>,
    pub fields: Vec<FieldDef>,
}

impl ObjectType {
    pub fn new(kind: TypeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            implements: Vec::new(),
            directives: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }

    pub fn has_directive(&self, name: &str) -> bool {
        self.directive(name).is_some()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Enum type
#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
}

/// Union type
#[derive(Debug, Clone, PartialEq)]
pub struct UnionType {
    pub name: String,
    pub members: Vec<String>,
}

/// Parsed schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDocument {
    /// Object, input and interface types in declaration order
    pub types: IndexMap<String, ObjectType>,
    pub enums: IndexMap<String, EnumType>,
    pub unions: IndexMap<String, UnionType>,
    pub scalars: Vec<String>,
}

impl SchemaDocument {
    /// Parse SDL text
    pub fn parse(source: &str) -> Result<Self, SchemaError> {
        let service = async_graphql_parser::parse_schema(source).map_err(|e| {
            SchemaError::Syntax {
                line: e.positions().next().map(|pos| pos.line).unwrap_or(1),
                message: e.to_string(),
            }
        })?;

        let mut doc = SchemaDocument::default();
        for definition in service.definitions {
            match definition {
                TypeSystemDefinition::Type(ty) => doc.add_definition(ty.node)?,
                TypeSystemDefinition::Schema(_) | TypeSystemDefinition::Directive(_) => {
                    log::debug!("Ignoring schema or directive definition");
                }
            }
        }
        Ok(doc)
    }

    fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
            || self.enums.contains_key(name)
            || self.unions.contains_key(name)
            || self.scalars.iter().any(|s| s == name)
    }

    fn add_definition(&mut self, def: TypeDefinition) -> Result<(), SchemaError> {
        let name = def.name.node.to_string();
        if def.extend {
            return self.extend_definition(name, def);
        }
        if self.contains(&name) {
            return Err(SchemaError::DuplicateType(name));
        }

        let directives = lower_directives(&def.directives);
        match def.kind {
            SdlKind::Scalar => self.scalars.push(name),
            SdlKind::Object(object) => {
                let mut ty = ObjectType::new(TypeKind::Object, name);
                ty.implements = object.implements.iter().map(|i| i.node.to_string()).collect();
                ty.directives = directives;
                ty.fields = object.fields.iter().map(lower_field).collect();
                self.types.insert(ty.name.clone(), ty);
            }
            SdlKind::Interface(interface) => {
                let mut ty = ObjectType::new(TypeKind::Interface, name);
                ty.implements = interface
                    .implements
                    .iter()
                    .map(|i| i.node.to_string())
                    .collect();
                ty.directives = directives;
                ty.fields = interface.fields.iter().map(lower_field).collect();
                self.types.insert(ty.name.clone(), ty);
            }
            SdlKind::InputObject(input) => {
                let mut ty = ObjectType::new(TypeKind::Input, name);
                ty.directives = directives;
                ty.fields = input.fields.iter().map(lower_input_field).collect();
                self.types.insert(ty.name.clone(), ty);
            }
            SdlKind::Enum(e) => {
                let values = e.values.iter().map(|v| v.node.value.node.to_string()).collect();
                self.enums.insert(name.clone(), EnumType { name, values });
            }
            SdlKind::Union(u) => {
                let members = u.members.iter().map(|m| m.node.to_string()).collect();
                self.unions.insert(name.clone(), UnionType { name, members });
            }
        }
        Ok(())
    }

    /// Fold an `extend` definition into the type it extends
    fn extend_definition(&mut self, name: String, def: TypeDefinition) -> Result<(), SchemaError> {
        let directives = lower_directives(&def.directives);
        match def.kind {
            SdlKind::Object(object) => {
                let mut ty = ObjectType::new(TypeKind::Object, name);
                ty.implements = object.implements.iter().map(|i| i.node.to_string()).collect();
                ty.directives = directives;
                ty.fields = object.fields.iter().map(lower_field).collect();
                self.extend_type(ty)
            }
            SdlKind::Interface(interface) => {
                let mut ty = ObjectType::new(TypeKind::Interface, name);
                ty.implements = interface
                    .implements
                    .iter()
                    .map(|i| i.node.to_string())
                    .collect();
                ty.directives = directives;
                ty.fields = interface.fields.iter().map(lower_field).collect();
                self.extend_type(ty)
            }
            SdlKind::InputObject(input) => {
                let mut ty = ObjectType::new(TypeKind::Input, name);
                ty.directives = directives;
                ty.fields = input.fields.iter().map(lower_input_field).collect();
                self.extend_type(ty)
            }
            SdlKind::Enum(e) => {
                let existing = self
                    .enums
                    .get_mut(&name)
                    .ok_or(SchemaError::UnknownExtension(name))?;
                for value in &e.values {
                    let value = value.node.value.node.to_string();
                    if !existing.values.contains(&value) {
                        existing.values.push(value);
                    }
                }
                Ok(())
            }
            SdlKind::Union(u) => {
                let existing = self
                    .unions
                    .get_mut(&name)
                    .ok_or(SchemaError::UnknownExtension(name))?;
                for member in &u.members {
                    let member = member.node.to_string();
                    if !existing.members.contains(&member) {
                        existing.members.push(member);
                    }
                }
                Ok(())
            }
            SdlKind::Scalar if self.scalars.contains(&name) => Ok(()),
            SdlKind::Scalar => Err(SchemaError::UnknownExtension(name)),
        }
    }

    fn extend_type(&mut self, extension: ObjectType) -> Result<(), SchemaError> {
        let existing = match self.types.get_mut(&extension.name) {
            Some(existing) if existing.kind == extension.kind => existing,
            _ => return Err(SchemaError::UnknownExtension(extension.name)),
        };

        for interface in extension.implements {
            if !existing.implements.contains(&interface) {
                existing.implements.push(interface);
            }
        }
        existing.directives.extend(extension.directives);
        for field in extension.fields {
            if existing.field(&field.name).is_some() {
                return Err(SchemaError::DuplicateField {
                    type_name: extension.name,
                    field: field.name,
                });
            }
            existing.fields.push(field);
        }
        Ok(())
    }

    /// Object types carrying `directive`
    pub fn types_with_directive<'a>(
        &'a self,
        directive: &'a str,
    ) -> impl Iterator<Item = &'a ObjectType> + 'a {
        self.types
            .values()
            .filter(move |t| t.kind == TypeKind::Object && t.has_directive(directive))
    }

    /// Add a type or append fields to an existing one
    pub fn merge_type(&mut self, ty: ObjectType) {
        match self.types.get_mut(&ty.name) {
            Some(existing) => {
                for field in ty.fields {
                    if existing.field(&field.name).is_none() {
                        existing.fields.push(field);
                    }
                }
            }
            None => {
                self.types.insert(ty.name.clone(), ty);
            }
        }
    }

    /// Render as SDL with all directives stripped
    pub fn to_sdl(&self) -> String {
        let mut out = String::new();

        for scalar in &self.scalars {
            out.push_str(&format!("scalar {}\n\n", scalar));
        }

        for ty in self.types.values() {
            out.push_str(ty.kind.keyword());
            out.push(' ');
            out.push_str(&ty.name);
            if !ty.implements.is_empty() {
                out.push_str(" implements ");
                out.push_str(&ty.implements.join(" & "));
            }
            out.push_str(" {\n");
            for field in &ty.fields {
                out.push_str("  ");
                out.push_str(&field.name);
                if !field.arguments.is_empty() {
                    let args: Vec<String> = field
                        .arguments
                        .iter()
                        .map(|a| match &a.default {
                            Some(d) => format!("{}: {} = {}", a.name, a.ty, d),
                            None => format!("{}: {}", a.name, a.ty),
                        })
                        .collect();
                    out.push_str(&format!("({})", args.join(", ")));
                }
                out.push_str(&format!(": {}\n", field.ty));
            }
            out.push_str("}\n\n");
        }

        for e in self.enums.values() {
            out.push_str(&format!("enum {} {{\n", e.name));
            for value in &e.values {
                out.push_str(&format!("  {}\n", value));
            }
            out.push_str("}\n\n");
        }

        for u in self.unions.values() {
            out.push_str(&format!("union {} = {}\n\n", u.name, u.members.join(" | ")));
        }

        out.trim_end().to_string() + "\n"
    }
}


fn lower_value(value: &ConstValue) -> Value {
    match value {
        ConstValue::Null => Value::Null,
        ConstValue::Boolean(b) => Value::Bool(*b),
        ConstValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or_default()),
        },
        ConstValue::String(s) => Value::String(s.clone()),
        ConstValue::Enum(e) => Value::Enum(e.to_string()),
        ConstValue::List(items) => Value::List(items.iter().map(lower_value).collect()),
        ConstValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), lower_value(v)))
                .collect(),
        ),
        // Binary values only come from variables, never from SDL
        _ => Value::Null,
    }
}

fn lower_type(ty: &Type) -> TypeRef {
    let base = match &ty.base {
        BaseType::Named(name) => TypeRef::Named(name.to_string()),
        BaseType::List(inner) => TypeRef::List(Box::new(lower_type(inner))),
    };
    if ty.nullable {
        base
    } else {
        TypeRef::non_null(base)
    }
}

fn lower_directives(directives: &[Positioned<ConstDirective>]) -> Vec<Directive> {
    directives
        .iter()
        .map(|d| Directive {
            name: d.node.name.node.to_string(),
            args: d
                .node
                .arguments
                .iter()
                .map(|(name, value)| (name.node.to_string(), lower_value(&value.node)))
                .collect(),
        })
        .collect()
}

fn lower_argument(arg: &Positioned<InputValueDefinition>) -> InputValue {
    InputValue {
        name: arg.node.name.node.to_string(),
        ty: lower_type(&arg.node.ty.node),
        default: arg.node.default_value.as_ref().map(|d| lower_value(&d.node)),
    }
}

fn lower_field(field: &Positioned<FieldDefinition>) -> FieldDef {
    FieldDef {
        name: field.node.name.node.to_string(),
        arguments: field.node.arguments.iter().map(lower_argument).collect(),
        ty: lower_type(&field.node.ty.node),
        directives: lower_directives(&field.node.directives),
    }
}

fn lower_input_field(field: &Positioned<InputValueDefinition>) -> FieldDef {
    FieldDef {
        name: field.node.name.node.to_string(),
        arguments: Vec::new(),
        ty: lower_type(&field.node.ty.node),
        directives: lower_directives(&field.node.directives),
    }
}

/// Errors raised while parsing SDL
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("type '{0}' is defined more than once")]
    DuplicateType(String),

    #[error("field '{field}' is defined more than once on '{type_name}'")]
    DuplicateField { type_name: String, field: String },

    #[error("cannot extend undefined type '{0}'")]
    UnknownExtension(String),
}
