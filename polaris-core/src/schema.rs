//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type, enabling validation of
//! declared attributes before any remote call is made.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Set (list whose ordering carries no meaning)
    Set(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested block with its own attribute schema
    Block(Box<ResourceSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { base, validate, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner) | AttributeType::Set(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(schema), Value::Map(map)) => {
                schema.validate(map).map_err(|errors| TypeError::BlockError {
                    block: schema.resource_type.clone(),
                    errors,
                })
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(schema) => format!("Block({})", schema.resource_type),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedAttribute { name: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("Block '{block}': {}", errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    BlockError { block: String, errors: Vec<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Changing this attribute replaces the resource
    pub force_new: bool,
    /// Set by the provider, never by the configuration
    pub computed: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            force_new: false,
            computed: false,
            default: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Validate declared attributes
    ///
    /// Computed attributes may not be set and unknown attributes are rejected.
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        for (name, value) in attributes {
            match self.attributes.get(name) {
                Some(schema) if schema.computed => {
                    errors.push(TypeError::ComputedAttribute { name: name.clone() });
                }
                Some(schema) => {
                    if let Err(e) = schema.attr_type.validate(value) {
                        errors.push(e);
                    }
                }
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            // HashMap iteration order is arbitrary
            errors.sort_by_key(|e| e.to_string());
            Err(errors)
        }
    }

    /// Names of force-new attributes whose value differs between two
    /// attribute maps, sorted by name
    pub fn force_new_changes(
        &self,
        from: &HashMap<String, Value>,
        to: &HashMap<String, Value>,
    ) -> Vec<String> {
        let mut changed: Vec<String> = self
            .attributes
            .values()
            .filter(|schema| schema.force_new)
            .filter(|schema| from.get(&schema.name) != to.get(&schema.name))
            .map(|schema| schema.name.clone())
            .collect();
        changed.sort();
        changed
    }

    /// Fill in defaults for attributes that were not declared
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default {
                attributes
                    .entry(name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if *n > 0 => Ok(()),
                Value::Int(_) => Err("Value must be positive".to_string()),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// UUID type (e.g., "4f7a38f2-0b2e-4d5e-9c11-2b7f6c1d3e10")
    pub fn uuid() -> AttributeType {
        AttributeType::Custom {
            name: "Uuid".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_uuid(s),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// Non-empty string type
    pub fn non_empty_string() -> AttributeType {
        AttributeType::Custom {
            name: "NonEmptyString".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) if !s.trim().is_empty() => Ok(()),
                Value::String(_) => Err("Value must not be empty".to_string()),
                _ => Err("Expected string".to_string()),
            },
        }
    }
}

/// Validate UUID format
pub fn validate_uuid(s: &str) -> Result<(), String> {
    uuid::Uuid::parse_str(s)
        .map(|_| ())
        .map_err(|e| format!("Invalid UUID '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["a".to_string(), "b".to_string()]);
        assert!(t.validate(&Value::String("a".to_string())).is_ok());
        assert!(t.validate(&Value::String("c".to_string())).is_err());
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
    }

    #[test]
    fn validate_uuid_type() {
        let t = types::uuid();
        assert!(
            t.validate(&Value::from("4f7a38f2-0b2e-4d5e-9c11-2b7f6c1d3e10"))
                .is_ok()
        );
        assert!(t.validate(&Value::from("not-a-uuid")).is_err());
        assert!(t.validate(&Value::Int(1)).is_err());
    }

    #[test]
    fn validate_nested_block() {
        let block = ResourceSchema::new("resource_group")
            .attribute(AttributeSchema::new("name", types::non_empty_string()).required())
            .attribute(AttributeSchema::new("region", AttributeType::String).required());
        let t = AttributeType::Block(Box::new(block));

        let ok = Value::Map(HashMap::from([
            ("name".to_string(), Value::from("rg")),
            ("region".to_string(), Value::from("eastus")),
        ]));
        assert!(t.validate(&ok).is_ok());

        let missing = Value::Map(HashMap::from([("name".to_string(), Value::from("rg"))]));
        let err = t.validate(&missing).unwrap_err();
        assert!(err.to_string().contains("'region' is missing"));
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("resource")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("count", types::positive_int()))
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool));

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("my-resource".to_string()));
        attrs.insert("count".to_string(), Value::Int(5));
        attrs.insert("enabled".to_string(), Value::Bool(true));

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("subscription")
            .attribute(AttributeSchema::new("name", AttributeType::String).required());

        let attrs = HashMap::new();
        let result = schema.validate(&attrs);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_and_computed_attributes_rejected() {
        let schema = ResourceSchema::new("subscription")
            .attribute(AttributeSchema::new("status", AttributeType::String).computed());

        let attrs = HashMap::from([
            ("status".to_string(), Value::from("CONNECTED")),
            ("bogus".to_string(), Value::Bool(true)),
        ]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn force_new_changes_only_reports_force_new() {
        let schema = ResourceSchema::new("subscription")
            .attribute(AttributeSchema::new("native_id", AttributeType::String).force_new())
            .attribute(AttributeSchema::new("name", AttributeType::String));

        let from = HashMap::from([
            ("native_id".to_string(), Value::from("a")),
            ("name".to_string(), Value::from("old")),
        ]);
        let to = HashMap::from([
            ("native_id".to_string(), Value::from("b")),
            ("name".to_string(), Value::from("new")),
        ]);
        assert_eq!(schema.force_new_changes(&from, &to), vec!["native_id"]);
        assert!(schema.force_new_changes(&from, &from).is_empty());
    }

    #[test]
    fn defaults_fill_missing_attributes() {
        let schema = ResourceSchema::new("subscription").attribute(
            AttributeSchema::new("delete_snapshots_on_destroy", AttributeType::Bool)
                .with_default(Value::Bool(false)),
        );
        let mut attrs = HashMap::new();
        schema.apply_defaults(&mut attrs);
        assert_eq!(
            attrs.get("delete_snapshots_on_destroy"),
            Some(&Value::Bool(false))
        );
    }
}
