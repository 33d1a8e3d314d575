use anyhow::{Context, Result, anyhow, bail};
use heck::ToKebabCase;
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::auth::AuthType;
use crate::operation::{Location, Operation, Operations, Parameter};
use crate::schema::{Shape, bool_field, display_value, flatten_properties, resolve_shape, str_field};
use crate::swagger;

/// Methods in catalog order.
pub const METHODS: [&str; 8] = [
    "get", "post", "put", "patch", "delete", "head", "options", "trace",
];

/// A loaded API description in the OpenAPI 3 layout.
#[derive(Debug, Clone)]
pub struct Document {
    root: Value,
}

impl Document {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to load {}", path.display()))
    }

    /// Parses a JSON or YAML document.
    pub fn parse(raw: &str) -> Result<Self> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid document")?;
        let root = serde_json::to_value(yaml).context("invalid document")?;
        Self::from_value(root)
    }

    pub fn from_value(root: Value) -> Result<Self> {
        let root = if root.get("swagger").is_some() {
            log::debug!("upgrading swagger 2.0 document");
            swagger::upgrade(root).context("failed to upgrade swagger document")?
        } else {
            root
        };
        if !root.get("paths").is_some_and(Value::is_object) {
            bail!("document has no paths");
        }
        Ok(Document { root })
    }

    /// Follows `$ref` chains to the target node.
    ///
    /// Also returns the last reference followed, if any.
    pub fn resolve<'a>(&'a self, node: &'a Value) -> Result<(&'a Value, Option<&'a str>)> {
        let mut current = node;
        let mut seen: Vec<&str> = Vec::new();
        while let Some(reference) = current.get("$ref").and_then(Value::as_str) {
            if seen.contains(&reference) {
                bail!("circular reference {reference}");
            }
            seen.push(reference);
            let pointer = reference
                .strip_prefix('#')
                .ok_or_else(|| anyhow!("external reference {reference} is not supported"))?;
            current = self
                .root
                .pointer(pointer)
                .ok_or_else(|| anyhow!("unresolved reference {reference}"))?;
        }
        Ok((current, seen.last().copied()))
    }

    pub fn server_url(&self) -> &str {
        self.root
            .pointer("/servers/0/url")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Picks the auth type and API key header from the first usable security scheme.
    pub fn auth_defaults(&self) -> (AuthType, String) {
        let schemes = self
            .root
            .pointer("/components/securitySchemes")
            .and_then(Value::as_object);
        for scheme in schemes.into_iter().flat_map(|s| s.values()) {
            let Ok((scheme, _)) = self.resolve(scheme) else {
                continue;
            };
            match str_field(scheme, "type") {
                "http" => match str_field(scheme, "scheme").to_ascii_lowercase().as_str() {
                    "bearer" => return (AuthType::Bearer, String::new()),
                    "basic" => return (AuthType::Basic, String::new()),
                    _ => {}
                },
                "apiKey" if str_field(scheme, "in") == "header" => {
                    return (AuthType::ApiKey, str_field(scheme, "name").to_string());
                }
                _ => {}
            }
        }
        (AuthType::Bearer, String::new())
    }

    /// Builds the operation catalog, paths sorted, methods in [`METHODS`] order.
    pub fn operations(&self) -> Result<Operations> {
        let mut paths: Vec<(&String, &Value)> = self
            .root
            .get("paths")
            .and_then(Value::as_object)
            .map(|paths| paths.iter().collect())
            .unwrap_or_default();
        paths.sort_by(|a, b| a.0.cmp(b.0));

        let mut ops = Vec::new();
        for (path, item) in paths {
            let (item, _) = self.resolve(item)?;
            for method in METHODS {
                let Some(spec_op) = item.get(method) else {
                    continue;
                };
                let op = self
                    .operation(method, path, item, spec_op)
                    .with_context(|| format!("{} {path}", method.to_uppercase()))?;
                ops.push(op);
            }
        }
        log::debug!("loaded {} operations", ops.len());
        Ok(Operations::new(ops))
    }

    fn operation(&self, method: &str, path: &str, item: &Value, spec_op: &Value) -> Result<Operation> {
        let id = match str_field(spec_op, "operationId").to_kebab_case() {
            id if id.is_empty() => path_hash(path),
            id => id,
        };
        let tag = spec_op
            .get("tags")
            .and_then(|tags| tags.get(0))
            .and_then(Value::as_str)
            .unwrap_or("");
        let mut op = Operation {
            id,
            summary: sanitize(str_field(spec_op, "summary")),
            description: sanitize(str_field(spec_op, "description")),
            tag: tag.to_string(),
            method: method.to_uppercase(),
            path: path.to_string(),
            deprecated: bool_field(spec_op, "deprecated"),
            ..Default::default()
        };

        let declared = [item.get("parameters"), spec_op.get("parameters")];
        for param in declared.into_iter().flatten().filter_map(Value::as_array).flatten() {
            if let Some(param) = self.parameter(param)? {
                op.parameters.add(param);
            }
        }

        if let Some(body) = spec_op.get("requestBody") {
            let (body, _) = self.resolve(body)?;
            let content = body.get("content").and_then(Value::as_object);
            if let Some((format, media)) = content.and_then(|c| c.iter().next()) {
                op.body_format = format.clone();
                if let Some(schema) = media.get("schema") {
                    for param in flatten_properties(self, schema)? {
                        op.parameters.add(param);
                    }
                }
            }
        }
        Ok(op)
    }

    fn parameter(&self, node: &Value) -> Result<Option<Parameter>> {
        let (node, _) = self.resolve(node)?;
        let name = str_field(node, "name");
        let Some(location) = Location::from_param_in(str_field(node, "in")) else {
            log::debug!("skipping {} parameter {name}", str_field(node, "in"));
            return Ok(None);
        };
        let shape = match node.get("schema") {
            Some(schema) => resolve_shape(self, schema)?,
            None => Shape::default(),
        };
        let description = match str_field(node, "description") {
            "" => shape.description,
            description => sanitize(description),
        };

        Ok(Some(Parameter {
            location,
            name: name.to_string(),
            description,
            ty: shape.ty,
            enum_values: shape.enum_values,
            default: shape.default,
            example: node.get("example").map(display_value).or(shape.example),
            required: bool_field(node, "required"),
            deprecated: bool_field(node, "deprecated") || shape.deprecated,
        }))
    }
}

pub fn load_operations(path: &Path) -> Result<Operations> {
    Document::load(path)?.operations()
}

fn path_hash(path: &str) -> String {
    let mut hash = adler::Adler32::new();
    hash.write_slice(path.as_bytes());
    format!("{:08x}", hash.checksum())
}

/// Strips HTML tags and surrounding newlines.
pub fn sanitize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParamType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn testdata(name: &str) -> Document {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name);
        Document::load(&path).unwrap()
    }

    #[test]
    fn builds_the_product_catalog() {
        let ops = testdata("openapi3.yaml").operations().unwrap();
        let summary: Vec<(&str, &str, &str)> = ops
            .iter()
            .map(|op| (op.id.as_str(), op.method.as_str(), op.path.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("list-products", "GET", "/products"),
                ("create-product", "POST", "/products"),
                ("get-product", "GET", "/products/{product_id}"),
                ("update-product", "PATCH", "/products/{product_id}"),
                ("delete-product", "DELETE", "/products/{product_id}"),
            ]
        );
        assert_eq!(ops.tags(), vec!["Products"]);
        assert!(ops.by_id("delete-product").unwrap().deprecated);
    }

    #[test]
    fn classifies_parameters() {
        let ops = testdata("openapi3.yaml").operations().unwrap();
        let list = ops.by_id("list-products").unwrap();
        assert_eq!(list.body_format, "");
        assert_eq!(
            list.parameters.header.by_name("X-Vendor").unwrap().description,
            "The vendor."
        );
        let deleted = list.parameters.query.by_name("filter[deleted]").unwrap();
        assert_eq!(deleted.ty, ParamType::Boolean);
        assert_eq!(deleted.location, Location::Query);
        let page = list.parameters.query.by_name("page").unwrap();
        assert_eq!(page.default.as_deref(), Some("1"));
        let sort = list.parameters.query.by_name("sort").unwrap();
        assert_eq!(sort.enum_values, vec!["name", "price"]);

        let get = ops.by_id("get-product").unwrap();
        let product_id = get.parameters.path.by_name("product_id").unwrap();
        assert!(product_id.required);
        assert_eq!(product_id.description, "The ID of the product.");
    }

    #[test]
    fn flattens_request_bodies() {
        let ops = testdata("openapi3.yaml").operations().unwrap();
        let create = ops.by_id("create-product").unwrap();
        assert_eq!(create.body_format, "application/json");
        assert_eq!(create.description, "Creates a new product.");

        let body: Vec<String> = create.parameters.body.iter().map(|p| p.name_with_flags()).collect();
        assert_eq!(
            body,
            vec![
                "currency_code",
                "name (required)",
                "owner_id (deprecated)",
                "price",
                "sku (required)",
                "status",
            ]
        );
        let owner = create.parameters.body.by_name("owner_id").unwrap();
        assert_eq!(owner.description, "The owner ID.");
        let price = create.parameters.body.by_name("price").unwrap();
        assert_eq!(price.ty, ParamType::Number);
        assert_eq!(price.example.as_deref(), Some("9.99"));
        let status = create.parameters.body.by_name("status").unwrap();
        assert_eq!(status.default.as_deref(), Some("true"));

        let update = ops.by_id("update-product").unwrap();
        assert_eq!(update.body_format, "application/x-www-form-urlencoded");
        assert_eq!(update.parameters.path.len(), 1);
        assert_eq!(update.parameters.body.len(), 2);
    }

    #[test]
    fn swagger_documents_load_like_openapi3() {
        let v3 = testdata("openapi3.yaml");
        let v2 = testdata("swagger.yaml");
        assert_eq!(v2.operations().unwrap(), v3.operations().unwrap());
        assert_eq!(v2.server_url(), "https://api.example.com/v1");
        assert_eq!(v2.server_url(), v3.server_url());
        assert_eq!(v2.auth_defaults(), (AuthType::ApiKey, "X-MyApp-Key".to_string()));
        assert_eq!(v3.auth_defaults(), v2.auth_defaults());
    }

    #[test]
    fn ids_fall_back_to_a_path_hash() {
        let doc = testdata("nested.yaml");
        let ops = doc.operations().unwrap();
        let ids: Vec<&str> = ops.iter().map(|op| op.id.as_str()).collect();
        assert_eq!(ids, vec!["10a80387", "850d1199"]);
        assert_eq!(doc.operations().unwrap(), ops);
    }

    #[test]
    fn nested_document() {
        let doc = testdata("nested.yaml");
        assert_eq!(doc.server_url(), "http://localhost:8080/");
        assert_eq!(doc.auth_defaults(), (AuthType::Basic, String::new()));

        let ops = doc.operations().unwrap();
        let create = ops.by_id("10a80387").unwrap();
        assert_eq!(create.body_format, "application/vnd.api+json");
        let body: Vec<(String, String)> = create
            .parameters
            .body
            .iter()
            .map(|p| (p.name_with_flags(), p.ty.to_string()))
            .collect();
        assert_eq!(
            body,
            vec![
                ("title (required)".to_string(), "string".to_string()),
                ("meta.published (required)".to_string(), "boolean".to_string()),
                ("meta.score".to_string(), "number".to_string()),
                ("lucky_numbers".to_string(), "integer[]".to_string()),
            ]
        );

        let comment = ops.by_id("850d1199").unwrap();
        let names: Vec<&str> = comment.parameters.path.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["article_id", "comment_id"]);
        assert!(comment.parameters.query.is_empty());
        assert!(comment.parameters.header.is_empty());
    }

    #[test]
    fn operation_parameters_override_path_parameters() {
        let doc = Document::from_value(json!({
            "openapi": "3.0.0",
            "paths": {"/items/{id}": {
                "parameters": [
                    {"name": "id", "in": "path", "required": true, "description": "Shared."},
                    {"name": "verbose", "in": "query"},
                ],
                "get": {"parameters": [
                    {"name": "id", "in": "path", "required": true, "description": "Own."},
                ]},
            }},
        }))
        .unwrap();
        let ops = doc.operations().unwrap();
        let get = ops.iter().next().unwrap();
        assert_eq!(get.parameters.path.len(), 1);
        assert_eq!(get.parameters.path.by_name("id").unwrap().description, "Own.");
        assert_eq!(get.parameters.query.len(), 1);
    }

    #[test]
    fn rejects_bad_references_and_documents() {
        let err = Document::from_value(json!({"openapi": "3.0.0"})).unwrap_err();
        assert_eq!(err.to_string(), "document has no paths");

        let doc = Document::from_value(json!({
            "openapi": "3.0.0",
            "paths": {"/a": {"get": {"parameters": [{"$ref": "other.yaml#/Id"}]}}},
        }))
        .unwrap();
        let err = doc.operations().unwrap_err();
        assert_eq!(format!("{err:#}"), "GET /a: external reference other.yaml#/Id is not supported");

        let doc = Document::from_value(json!({
            "openapi": "3.0.0",
            "paths": {"/a": {"get": {"parameters": [{"$ref": "#/components/parameters/Missing"}]}}},
        }))
        .unwrap();
        let err = doc.operations().unwrap_err();
        assert_eq!(
            format!("{err:#}"),
            "GET /a: unresolved reference #/components/parameters/Missing"
        );
    }

    #[test]
    fn sanitizes_descriptions() {
        assert_eq!(sanitize("\n<p>Hello <b>world</b></p>\n\n"), "Hello world");
        assert_eq!(sanitize("plain"), "plain");
    }
}
