//! Upgrades Swagger 2.0 documents to the OpenAPI 3 layout the loader reads.

use anyhow::{Result, bail};
use serde_json::{Map, Value, json};

use crate::schema::{bool_field, str_field};
use crate::spec::METHODS;

/// Keys that live on a 2.0 parameter but belong under `schema` in 3.x.
const SCHEMA_KEYS: &[&str] = &[
    "type",
    "format",
    "items",
    "enum",
    "default",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "minLength",
    "maxLength",
    "pattern",
    "minItems",
    "maxItems",
    "uniqueItems",
    "multipleOf",
];

const REF_PREFIXES: &[(&str, &str)] = &[
    ("#/definitions/", "#/components/schemas/"),
    ("#/parameters/", "#/components/parameters/"),
    ("#/responses/", "#/components/responses/"),
];

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

pub fn upgrade(doc: Value) -> Result<Value> {
    let Value::Object(mut v2) = doc else {
        bail!("document is not a mapping");
    };

    let globals = match v2.remove("parameters") {
        Some(Value::Object(params)) => params,
        _ => Map::new(),
    };
    let consumes = string_list(v2.get("consumes"));

    let mut v3 = Map::new();
    v3.insert("openapi".into(), json!("3.0.3"));
    for key in ["info", "tags", "security", "externalDocs"] {
        if let Some(value) = v2.remove(key) {
            v3.insert(key.into(), value);
        }
    }
    if let Some(url) = server_url(&v2) {
        v3.insert("servers".into(), json!([{ "url": url }]));
    }

    let mut components = Map::new();
    if let Some(definitions) = v2.remove("definitions") {
        components.insert("schemas".into(), definitions);
    }
    let parameters: Map<String, Value> = globals
        .iter()
        .filter(|(_, param)| !is_body_param(param))
        .map(|(name, param)| (name.clone(), convert_parameter(param.clone())))
        .collect();
    if !parameters.is_empty() {
        components.insert("parameters".into(), Value::Object(parameters));
    }
    if let Some(responses) = v2.remove("responses") {
        components.insert("responses".into(), responses);
    }
    if let Some(Value::Object(definitions)) = v2.remove("securityDefinitions") {
        let schemes = definitions
            .into_iter()
            .map(|(name, scheme)| (name, convert_security_scheme(scheme)))
            .collect();
        components.insert("securitySchemes".into(), Value::Object(schemes));
    }
    if !components.is_empty() {
        v3.insert("components".into(), Value::Object(components));
    }

    let mut paths = Map::new();
    if let Some(Value::Object(v2_paths)) = v2.remove("paths") {
        for (path, item) in v2_paths {
            paths.insert(path, convert_path_item(item, &globals, &consumes));
        }
    }
    v3.insert("paths".into(), Value::Object(paths));

    let mut v3 = Value::Object(v3);
    rewrite_refs(&mut v3);
    Ok(v3)
}

fn server_url(v2: &Map<String, Value>) -> Option<String> {
    let base_path = v2.get("basePath").and_then(Value::as_str).unwrap_or("");
    match v2.get("host").and_then(Value::as_str) {
        Some(host) => {
            let scheme = v2
                .get("schemes")
                .and_then(|s| s.get(0))
                .and_then(Value::as_str)
                .unwrap_or("https");
            Some(format!("{scheme}://{host}{base_path}"))
        }
        None if !base_path.is_empty() => Some(base_path.to_string()),
        None => None,
    }
}

fn convert_security_scheme(scheme: Value) -> Value {
    match str_field(&scheme, "type") {
        "basic" => json!({ "type": "http", "scheme": "basic" }),
        "apiKey" => scheme,
        _ => json!({ "type": "oauth2" }),
    }
}

fn convert_path_item(item: Value, globals: &Map<String, Value>, consumes: &[String]) -> Value {
    let Value::Object(mut item) = item else {
        return item;
    };
    let (shared, shared_body) = split_parameters(take_array(item.remove("parameters")), globals);
    for method in METHODS {
        if let Some(Value::Object(op)) = item.get_mut(method) {
            convert_operation(op, &shared_body, globals, consumes);
        }
    }
    if !shared.is_empty() {
        item.insert("parameters".into(), Value::Array(shared));
    }
    Value::Object(item)
}

fn convert_operation(
    op: &mut Map<String, Value>,
    shared_body: &[Value],
    globals: &Map<String, Value>,
    inherited_consumes: &[String],
) {
    let consumes = match op.remove("consumes") {
        Some(value) => string_list(Some(&value)),
        None => inherited_consumes.to_vec(),
    };
    op.remove("produces");

    let (params, own_body) = split_parameters(take_array(op.remove("parameters")), globals);
    let mut body_params = shared_body.to_vec();
    for param in own_body {
        let name = str_field(&param, "name").to_string();
        body_params.retain(|p| str_field(p, "name") != name);
        body_params.push(param);
    }
    if !params.is_empty() {
        op.insert("parameters".into(), Value::Array(params));
    }
    if let Some(body) = request_body(&body_params, &consumes) {
        op.insert("requestBody".into(), body);
    }
}

/// Splits parameters into 3.x parameters and inlined body/formData ones.
fn split_parameters(params: Vec<Value>, globals: &Map<String, Value>) -> (Vec<Value>, Vec<Value>) {
    let mut plain = Vec::new();
    let mut body = Vec::new();
    for param in params {
        let global = str_field(&param, "$ref")
            .strip_prefix("#/parameters/")
            .and_then(|name| globals.get(name));
        match global {
            Some(global) if is_body_param(global) => body.push(global.clone()),
            Some(_) => plain.push(param),
            None if is_body_param(&param) => body.push(param),
            None => plain.push(convert_parameter(param)),
        }
    }
    (plain, body)
}

fn is_body_param(param: &Value) -> bool {
    matches!(str_field(param, "in"), "body" | "formData")
}

fn convert_parameter(param: Value) -> Value {
    let Value::Object(mut param) = param else {
        return param;
    };
    if param.contains_key("$ref") {
        return Value::Object(param);
    }
    param.remove("collectionFormat");
    let schema = take_schema_keys(&mut param);
    param.insert("schema".into(), Value::Object(schema));
    Value::Object(param)
}

fn take_schema_keys(param: &mut Map<String, Value>) -> Map<String, Value> {
    let mut schema = Map::new();
    for key in SCHEMA_KEYS {
        if let Some(value) = param.remove(*key) {
            schema.insert((*key).into(), value);
        }
    }
    if schema.get("type").and_then(Value::as_str) == Some("file") {
        schema.insert("type".into(), json!("string"));
        schema.insert("format".into(), json!("binary"));
    }
    schema
}

fn request_body(params: &[Value], consumes: &[String]) -> Option<Value> {
    if let Some(body) = params.iter().find(|p| str_field(p, "in") == "body") {
        let schema = body.get("schema").cloned().unwrap_or_else(|| json!({}));
        let formats = if consumes.is_empty() {
            vec!["application/json".to_string()]
        } else {
            consumes.to_vec()
        };
        let content: Map<String, Value> = formats
            .into_iter()
            .map(|format| (format, json!({ "schema": schema.clone() })))
            .collect();
        let mut request_body = Map::new();
        if let Some(description) = body.get("description") {
            request_body.insert("description".into(), description.clone());
        }
        request_body.insert("content".into(), Value::Object(content));
        request_body.insert("required".into(), json!(bool_field(body, "required")));
        return Some(Value::Object(request_body));
    }

    let mut properties = Map::new();
    let mut required = Vec::new();
    for field in params.iter().filter(|p| str_field(p, "in") == "formData") {
        let Value::Object(mut field) = field.clone() else {
            continue;
        };
        let name = field
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let mut schema = take_schema_keys(&mut field);
        for key in ["description", "deprecated", "example"] {
            if let Some(value) = field.remove(key) {
                schema.insert(key.into(), value);
            }
        }
        if field.get("required").and_then(Value::as_bool) == Some(true) {
            required.push(json!(name));
        }
        properties.insert(name, Value::Object(schema));
    }
    if properties.is_empty() {
        return None;
    }

    let multipart_only = consumes.iter().any(|c| c == MULTIPART)
        && !consumes.iter().any(|c| c == FORM_URLENCODED);
    let format = if multipart_only { MULTIPART } else { FORM_URLENCODED };
    let mut schema = json!({ "type": "object", "properties": properties });
    if !required.is_empty() {
        schema["required"] = Value::Array(required);
    }
    Some(json!({ "content": { format: { "schema": schema } } }))
}

fn rewrite_refs(node: &mut Value) {
    match node {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if key == "$ref" {
                    if let Value::String(reference) = value {
                        rewrite_ref(reference);
                    }
                } else {
                    rewrite_refs(value);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(rewrite_refs),
        _ => {}
    }
}

fn rewrite_ref(reference: &mut String) {
    for (old, new) in REF_PREFIXES {
        if let Some(rest) = reference.strip_prefix(old) {
            *reference = format!("{new}{rest}");
            return;
        }
    }
}

fn take_array(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
