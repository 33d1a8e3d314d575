use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::cast::Value;
use crate::error::Error;
use crate::operation::{Operation, ParameterList};
use crate::values::FormValues;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Reports whether the media type is a JSON variant (`application/hal+json`, ...).
pub fn is_json(format: &str) -> bool {
    format.contains("json")
}

pub fn check_format(format: &str) -> Result<(), Error> {
    if is_json(format) || format == FORM_URLENCODED {
        Ok(())
    } else {
        Err(Error::UnsupportedFormat(format.to_string()))
    }
}

/// Encodes the body values in the operation's body format.
pub fn request_body(op: &Operation, values: &FormValues) -> Result<Vec<u8>, Error> {
    if !op.has_body() {
        return Ok(Vec::new());
    }
    check_format(&op.body_format)?;
    if is_json(&op.body_format) {
        let document = json_body(&op.parameters.body, values)?;
        Ok(document.to_string().into_bytes())
    } else {
        Ok(values.encode().into_bytes())
    }
}

/// Casts every value to its declared type and nests dotted keys.
///
/// Keys without a declared parameter are passed through as strings.
pub fn json_body(params: &ParameterList, values: &FormValues) -> Result<JsonValue, Error> {
    let mut root = BTreeMap::new();
    for (key, raw) in values.first_values() {
        let value = match params.by_name(key) {
            Some(param) => param.cast(raw)?,
            None => Value::String(raw.to_string()),
        };
        insert(&mut root, key, value.into())?;
    }
    Ok(Node::Branch(root).into())
}

enum Node {
    Leaf(JsonValue),
    Branch(BTreeMap<String, Node>),
}

impl From<Node> for JsonValue {
    fn from(node: Node) -> Self {
        match node {
            Node::Leaf(value) => value,
            Node::Branch(children) => JsonValue::Object(
                children
                    .into_iter()
                    .map(|(key, child)| (key, child.into()))
                    .collect(),
            ),
        }
    }
}

// Keys arrive sorted, so `meta` is always seen before `meta.published`.
fn insert(root: &mut BTreeMap<String, Node>, key: &str, value: JsonValue) -> Result<(), Error> {
    let (parents, leaf) = match key.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, key),
    };
    let mut branch = root;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        let node = branch
            .entry(segment.to_string())
            .or_insert_with(|| Node::Branch(BTreeMap::new()));
        branch = match node {
            Node::Branch(children) => children,
            Node::Leaf(_) => {
                return Err(Error::NestingConflict {
                    key: key.to_string(),
                    segment: segment.to_string(),
                });
            }
        };
    }
    branch.insert(leaf.to_string(), Node::Leaf(value));
    Ok(())
}
