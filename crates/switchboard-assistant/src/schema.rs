//! Declarative tool schemas.
//!
//! A [`ToolSchema`] describes a tool's callable actions independently of any
//! vendor's schema dialect. Schemas are built with explicit builder objects
//! passed by reference into nested closures and validated when the action is
//! registered, not when a call arrives:
//!
//! ```
//! use switchboard_assistant::schema::{ParamKind, ToolSchema};
//!
//! let schema = ToolSchema::builder("weather")
//!     .action("get_current_weather", "Fetch current conditions", |params| {
//!         params
//!             .property("city", ParamKind::String)
//!             .describe("City name")
//!             .required();
//!         params
//!             .property("unit", ParamKind::String)
//!             .one_of(["celsius", "fahrenheit"]);
//!     })
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.functions()[0].name, "weather__get_current_weather");
//! ```

use serde_json::{Map, Value, json};
use thiserror::Error;

use switchboard_llm::ToolFunction;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error raised while defining a tool schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The tool name is empty.
    #[error("tool name must not be empty")]
    EmptyToolName,

    /// An action's method name is empty.
    #[error("method name must not be empty")]
    EmptyMethodName,

    /// Two actions share a method name.
    #[error("duplicate action '{0}'")]
    DuplicateAction(String),

    /// The schema declares no actions.
    #[error("tool '{0}' declares no actions")]
    NoActions(String),

    /// An object node declares no child properties.
    #[error("object parameter '{0}' must declare at least one property")]
    EmptyObject(String),

    /// An array node declares no item schema.
    #[error("array parameter '{0}' must declare an item schema")]
    MissingArrayItem(String),

    /// Two sibling properties share a name.
    #[error("duplicate property '{name}' under '{path}'")]
    DuplicateProperty {
        /// Parent path.
        path: String,
        /// The repeated property name.
        name: String,
    },

    /// An enum constraint on a container node.
    #[error("parameter '{0}' is an object/array and cannot carry enum values")]
    EnumOnContainer(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameter Model
// ─────────────────────────────────────────────────────────────────────────────

/// The closed set of parameter kinds.
///
/// Invalid kinds are unrepresentable; there is nothing to validate at
/// registration beyond structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
}

impl ParamKind {
    /// JSON Schema type label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Object => "object",
            ParamKind::Array => "array",
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
        }
    }

    fn is_container(&self) -> bool {
        matches!(self, ParamKind::Object | ParamKind::Array)
    }
}

/// One node in a parameter tree.
///
/// Named when it is a property of an object; anonymous only as the root of
/// an array's item schema (the builder API does not let callers name one).
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySpec {
    name: Option<String>,
    kind: ParamKind,
    description: Option<String>,
    enum_values: Option<Vec<Value>>,
    required: bool,
    children: Vec<PropertySpec>,
}

impl PropertySpec {
    fn named(name: &str, kind: ParamKind) -> Self {
        Self {
            name: Some(name.to_string()),
            kind,
            description: None,
            enum_values: None,
            required: false,
            children: Vec::new(),
        }
    }

    fn anonymous(kind: ParamKind) -> Self {
        Self {
            name: None,
            kind,
            description: None,
            enum_values: None,
            required: false,
            children: Vec::new(),
        }
    }

    /// Set the description.
    pub fn describe(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the property as required.
    pub fn required(&mut self) -> &mut Self {
        self.required = true;
        self
    }

    /// Constrain the value to an ordered list of allowed values.
    pub fn one_of<V: Into<Value>>(&mut self, values: impl IntoIterator<Item = V>) -> &mut Self {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Property name, absent for an array item root.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Parameter kind.
    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    fn to_json_schema(&self) -> Value {
        let mut node = Map::new();
        node.insert("type".to_string(), json!(self.kind.as_str()));
        if let Some(ref description) = self.description {
            node.insert("description".to_string(), json!(description));
        }
        if let Some(ref values) = self.enum_values {
            node.insert("enum".to_string(), json!(values));
        }
        match self.kind {
            ParamKind::Object => {
                let (properties, required) = object_schema(&self.children);
                node.insert("properties".to_string(), properties);
                if !required.is_empty() {
                    node.insert("required".to_string(), json!(required));
                }
            }
            ParamKind::Array => {
                if let Some(item) = self.children.first() {
                    node.insert("items".to_string(), item.to_json_schema());
                }
            }
            _ => {}
        }
        Value::Object(node)
    }
}

fn object_schema(children: &[PropertySpec]) -> (Value, Vec<String>) {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for child in children {
        let name = child.name().unwrap_or_default().to_string();
        if child.required {
            required.push(name.clone());
        }
        properties.insert(name, child.to_json_schema());
    }
    (Value::Object(properties), required)
}

// ─────────────────────────────────────────────────────────────────────────────
// Builders
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the property set of one object level.
///
/// Passed by reference into the caller's closure; nothing in here rebinds
/// the receiver.
#[derive(Debug, Default)]
pub struct ParamsBuilder {
    properties: Vec<PropertySpec>,
}

impl ParamsBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Add a scalar property and return it for chained configuration.
    pub fn property(&mut self, name: &str, kind: ParamKind) -> &mut PropertySpec {
        self.properties.push(PropertySpec::named(name, kind));
        self.properties
            .last_mut()
            .expect("a property was just pushed")
    }

    /// Add a nested object property whose children are declared in the
    /// closure.
    pub fn object(
        &mut self,
        name: &str,
        build: impl FnOnce(&mut ParamsBuilder),
    ) -> &mut PropertySpec {
        let mut nested = ParamsBuilder::new();
        build(&mut nested);
        let mut spec = PropertySpec::named(name, ParamKind::Object);
        spec.children = nested.properties;
        self.properties.push(spec);
        self.properties
            .last_mut()
            .expect("a property was just pushed")
    }

    /// Add an array property whose item schema is declared in the closure.
    pub fn array(
        &mut self,
        name: &str,
        build: impl FnOnce(&mut ItemBuilder),
    ) -> &mut PropertySpec {
        let mut item = ItemBuilder::default();
        build(&mut item);
        let mut spec = PropertySpec::named(name, ParamKind::Array);
        if let Some(item_spec) = item.item {
            spec.children.push(item_spec);
        }
        self.properties.push(spec);
        self.properties
            .last_mut()
            .expect("a property was just pushed")
    }
}

/// Builds the anonymous item schema of an array.
#[derive(Debug, Default)]
pub struct ItemBuilder {
    item: Option<PropertySpec>,
}

impl ItemBuilder {
    /// Declare a scalar item.
    pub fn item(&mut self, kind: ParamKind) -> &mut PropertySpec {
        self.item = Some(PropertySpec::anonymous(kind));
        self.item.as_mut().expect("item was just set")
    }

    /// Declare an object item whose properties are declared in the closure.
    pub fn object_item(&mut self, build: impl FnOnce(&mut ParamsBuilder)) -> &mut PropertySpec {
        let mut nested = ParamsBuilder::new();
        build(&mut nested);
        let mut spec = PropertySpec::anonymous(ParamKind::Object);
        spec.children = nested.properties;
        self.item = Some(spec);
        self.item.as_mut().expect("item was just set")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Schema
// ─────────────────────────────────────────────────────────────────────────────

/// One callable action on a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolAction {
    method_name: String,
    description: String,
    parameters: Vec<PropertySpec>,
}

impl ToolAction {
    /// The method name.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// The action description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Render the parameter tree as a JSON Schema object.
    pub fn parameters_schema(&self) -> Value {
        let (properties, required) = object_schema(&self.parameters);
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), properties);
        if !required.is_empty() {
            schema.insert("required".to_string(), json!(required));
        }
        Value::Object(schema)
    }
}

/// Immutable, declarative description of a tool's callable actions.
///
/// One instance per tool type; validated when built, never at call time.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    tool_name: String,
    actions: Vec<ToolAction>,
}

impl ToolSchema {
    /// Start building a schema for the given tool name.
    pub fn builder(tool_name: impl Into<String>) -> ToolSchemaBuilder {
        ToolSchemaBuilder {
            tool_name: tool_name.into(),
            actions: Vec::new(),
        }
    }

    /// The tool's registry name.
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// The declared actions.
    pub fn actions(&self) -> &[ToolAction] {
        &self.actions
    }

    /// Whether the schema declares the given method.
    pub fn has_method(&self, method_name: &str) -> bool {
        self.actions.iter().any(|a| a.method_name == method_name)
    }

    /// Render every action as an advertised function,
    /// `"{tool_name}__{method_name}"`.
    pub fn functions(&self) -> Vec<ToolFunction> {
        self.actions
            .iter()
            .map(|action| {
                ToolFunction::new(
                    format!("{}__{}", self.tool_name, action.method_name),
                    action.description.clone(),
                    action.parameters_schema(),
                )
            })
            .collect()
    }
}

/// Builder for [`ToolSchema`].
#[derive(Debug)]
pub struct ToolSchemaBuilder {
    tool_name: String,
    actions: Vec<ToolAction>,
}

impl ToolSchemaBuilder {
    /// Register one action.
    ///
    /// The closure declares the action's parameters on the passed builder.
    /// Structural validation happens here: empty containers, duplicate
    /// property names, and enums on containers are rejected immediately.
    pub fn action(
        mut self,
        method_name: impl Into<String>,
        description: impl Into<String>,
        build: impl FnOnce(&mut ParamsBuilder),
    ) -> Result<Self, SchemaError> {
        let method_name = method_name.into();
        if method_name.is_empty() {
            return Err(SchemaError::EmptyMethodName);
        }
        if self.actions.iter().any(|a| a.method_name == method_name) {
            return Err(SchemaError::DuplicateAction(method_name));
        }

        let mut params = ParamsBuilder::new();
        build(&mut params);
        validate_properties(&params.properties, &method_name)?;

        self.actions.push(ToolAction {
            method_name,
            description: description.into(),
            parameters: params.properties,
        });
        Ok(self)
    }

    /// Finish, validating the schema as a whole.
    pub fn build(self) -> Result<ToolSchema, SchemaError> {
        if self.tool_name.is_empty() {
            return Err(SchemaError::EmptyToolName);
        }
        if self.actions.is_empty() {
            return Err(SchemaError::NoActions(self.tool_name));
        }
        Ok(ToolSchema {
            tool_name: self.tool_name,
            actions: self.actions,
        })
    }
}

fn validate_properties(properties: &[PropertySpec], path: &str) -> Result<(), SchemaError> {
    let mut seen = std::collections::HashSet::new();
    for property in properties {
        let name = property.name().unwrap_or("<item>");
        if let Some(existing) = property.name() {
            if !seen.insert(existing.to_string()) {
                return Err(SchemaError::DuplicateProperty {
                    path: path.to_string(),
                    name: existing.to_string(),
                });
            }
        }
        validate_node(property, &format!("{}.{}", path, name))?;
    }
    Ok(())
}

fn validate_node(property: &PropertySpec, path: &str) -> Result<(), SchemaError> {
    if property.kind.is_container() && property.enum_values.is_some() {
        return Err(SchemaError::EnumOnContainer(path.to_string()));
    }
    match property.kind {
        ParamKind::Object => {
            if property.children.is_empty() {
                return Err(SchemaError::EmptyObject(path.to_string()));
            }
            validate_properties(&property.children, path)
        }
        ParamKind::Array => match property.children.first() {
            None => Err(SchemaError::MissingArrayItem(path.to_string())),
            Some(item) => validate_node(item, &format!("{}[]", path)),
        },
        _ => Ok(()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
