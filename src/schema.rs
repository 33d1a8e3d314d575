use anyhow::{Result, bail};
use serde_json::Value;
use std::fmt;

use crate::operation::{Location, Parameter};
use crate::spec::{Document, sanitize};

/// The declared type of a parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParamType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Array(Box<ParamType>),
    Object,
}

impl ParamType {
    pub fn array_of(item: ParamType) -> Self {
        ParamType::Array(Box::new(item))
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, ParamType::Array(_) | ParamType::Object)
    }

    fn from_name(name: &str) -> Self {
        match name {
            "integer" => ParamType::Integer,
            "number" => ParamType::Number,
            "boolean" => ParamType::Boolean,
            "object" => ParamType::Object,
            _ => ParamType::String,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::String => f.write_str("string"),
            ParamType::Integer => f.write_str("integer"),
            ParamType::Number => f.write_str("number"),
            ParamType::Boolean => f.write_str("boolean"),
            ParamType::Object => f.write_str("object"),
            ParamType::Array(item) => write!(f, "{item}[]"),
        }
    }
}

/// Everything the engine needs to know about a schema node, with enum,
/// default and example values already rendered as strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    pub ty: ParamType,
    pub enum_values: Vec<String>,
    pub default: Option<String>,
    pub example: Option<String>,
    pub description: String,
    pub deprecated: bool,
}

pub fn resolve_shape(doc: &Document, schema: &Value) -> Result<Shape> {
    let (schema, _) = doc.resolve(schema)?;
    let enum_values = schema
        .get("enum")
        .and_then(Value::as_array)
        .map(|values| values.iter().map(display_value).collect())
        .unwrap_or_default();

    Ok(Shape {
        ty: resolve_type(doc, schema)?,
        enum_values,
        default: schema.get("default").map(display_value),
        example: schema.get("example").map(display_value),
        description: sanitize(str_field(schema, "description")),
        deprecated: bool_field(schema, "deprecated"),
    })
}

/// Flattens the properties of an object schema into body parameters.
///
/// Nested objects become dotted names (`meta.published`). A property is
/// required when its own name is listed in its parent's `required`.
pub fn flatten_properties(doc: &Document, schema: &Value) -> Result<Vec<Parameter>> {
    let mut params = Vec::new();
    let mut stack = Vec::new();
    flatten_into(doc, schema, "", &mut stack, &mut params)?;
    Ok(params)
}

fn flatten_into<'a>(
    doc: &'a Document,
    schema: &'a Value,
    prefix: &str,
    stack: &mut Vec<&'a str>,
    params: &mut Vec<Parameter>,
) -> Result<()> {
    let (schema, reference) = doc.resolve(schema)?;
    if let Some(reference) = reference {
        if stack.contains(&reference) {
            bail!("circular schema reference {reference}");
        }
        stack.push(reference);
    }

    let object = ObjectSchema::collect(doc, schema)?;
    for (name, property) in object.properties {
        let full_name = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };
        let (resolved, _) = doc.resolve(property)?;
        if resolve_type(doc, resolved)? == ParamType::Object {
            if ObjectSchema::collect(doc, resolved)?.properties.is_empty() {
                log::debug!("skipping free-form object property {full_name}");
            } else {
                flatten_into(doc, property, &full_name, stack, params)?;
            }
            continue;
        }

        let shape = resolve_shape(doc, property)?;
        params.push(Parameter {
            location: Location::Body,
            name: full_name,
            description: shape.description,
            ty: shape.ty,
            enum_values: shape.enum_values,
            default: shape.default,
            example: shape.example,
            required: object.required.contains(&name),
            deprecated: shape.deprecated,
        });
    }

    if reference.is_some() {
        stack.pop();
    }
    Ok(())
}

/// Properties and required names of an object schema, `allOf` members merged in order.
struct ObjectSchema<'a> {
    properties: Vec<(&'a str, &'a Value)>,
    required: Vec<&'a str>,
}

impl<'a> ObjectSchema<'a> {
    fn collect(doc: &'a Document, schema: &'a Value) -> Result<Self> {
        let mut object = ObjectSchema {
            properties: Vec::new(),
            required: Vec::new(),
        };
        object.merge(doc, schema, 0)?;
        Ok(object)
    }

    fn merge(&mut self, doc: &'a Document, schema: &'a Value, depth: usize) -> Result<()> {
        if depth > 32 {
            bail!("allOf nesting is too deep");
        }
        let (schema, _) = doc.resolve(schema)?;
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                match self.properties.iter_mut().find(|(n, _)| *n == name.as_str()) {
                    Some(existing) => existing.1 = property,
                    None => self.properties.push((name, property)),
                }
            }
        }
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            self.required.extend(required.iter().filter_map(Value::as_str));
        }
        if let Some(members) = schema.get("allOf").and_then(Value::as_array) {
            for member in members {
                self.merge(doc, member, depth + 1)?;
            }
        }
        Ok(())
    }
}

fn resolve_type(doc: &Document, schema: &Value) -> Result<ParamType> {
    let ty = match declared_type(schema) {
        "array" => {
            let item = match schema.get("items") {
                Some(items) => {
                    let (items, _) = doc.resolve(items)?;
                    item_type(items)
                }
                None => ParamType::String,
            };
            ParamType::array_of(item)
        }
        name => ParamType::from_name(name),
    };
    Ok(ty)
}

// Items of items are not inspected: nested arrays are rejected when cast.
fn item_type(items: &Value) -> ParamType {
    match declared_type(items) {
        "array" => ParamType::array_of(ParamType::String),
        name => ParamType::from_name(name),
    }
}

/// Returns the schema's primitive type name.
///
/// Type unions such as `[string, null]` resolve to their first member.
fn declared_type(schema: &Value) -> &str {
    match schema.get("type") {
        Some(Value::String(name)) => name.as_str(),
        Some(Value::Array(names)) => names.first().and_then(Value::as_str).unwrap_or(""),
        _ if schema.get("properties").is_some() || schema.get("allOf").is_some() => "object",
        _ if schema.get("items").is_some() => "array",
        _ => "",
    }
}

pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn str_field<'a>(node: &'a Value, key: &str) -> &'a str {
    node.get(key).and_then(Value::as_str).unwrap_or("")
}

pub fn bool_field(node: &Value, key: &str) -> bool {
    node.get(key).and_then(Value::as_bool).unwrap_or(false)
}
