//! Plan schema validator.
//!
//! Checks every plan element against the element schema taken from the
//! corpus' JSON schema document. Only the JSON Schema keywords the corpus
//! actually uses are supported: `type`, `required`, `properties`, `items`,
//! `enum`, `minimum`, `maximum`, `additionalProperties: false`, and local
//! `$ref`. Unknown keywords are ignored.
//!
//! Violations are reported as [`ValidationIssue`]s, never as errors.

use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::models::ValidationIssue;
use crate::plan::{element_path, elements};

const KNOWN_TYPES: &[&str] = &[
    "object", "array", "string", "number", "integer", "boolean", "null",
];

/// Guards against `$ref` cycles.
const MAX_REF_DEPTH: usize = 32;

/// A schema document with its element schema resolved.
#[derive(Debug, Clone)]
pub struct ElementSchema {
    root: Value,
    element: Value,
}

impl ElementSchema {
    /// Locate the element schema: `properties.elements.items`, then `items`
    /// of an array root, then `$defs.element`, then the root itself.
    pub fn from_value(root: Value) -> Self {
        let element = {
            let resolve = |v: &Value| resolve_ref(&root, v).cloned();
            let from_elements = root
                .pointer("/properties/elements")
                .and_then(|v| resolve(v))
                .and_then(|v| v.get("items").cloned());
            let from_array_root = if type_names(&root).contains(&"array") {
                root.get("items").cloned()
            } else {
                None
            };
            from_elements
                .or(from_array_root)
                .or_else(|| root.pointer("/$defs/element").cloned())
                .or_else(|| root.pointer("/definitions/element").cloned())
                .and_then(|v| resolve(&v))
                .unwrap_or_else(|| root.clone())
        };
        Self { root, element }
    }

    pub fn element(&self) -> &Value {
        &self.element
    }

    pub fn root(&self) -> &Value {
        &self.root
    }
}

/// Validate every element of `plan`, one element at a time.
///
/// A plan that is neither an object with an `elements` array nor a bare
/// array yields a single `schema.plan_shape` error.
pub fn validate_schema<'a>(
    schema: &'a ElementSchema,
    plan: &'a Value,
) -> impl Iterator<Item = ValidationIssue> + 'a {
    let items = elements(plan);
    let shape = items.is_none().then(|| {
        ValidationIssue::error(
            "schema.plan_shape",
            "$",
            "plan must be an object with an \"elements\" array or an array of elements",
        )
    });
    let items: &[Value] = items.map(Vec::as_slice).unwrap_or(&[]);

    shape
        .into_iter()
        .chain(items.iter().enumerate().flat_map(move |(i, value)| {
            let mut out = Vec::new();
            check(&schema.root, &schema.element, value, &element_path(i), &mut out);
            out
        }))
}

fn check(
    root: &Value,
    node: &Value,
    value: &Value,
    path: &str,
    out: &mut Vec<ValidationIssue>,
) {
    let Some(node) = resolve_ref(root, node) else {
        return;
    };
    let Some(rules) = node.as_object() else {
        return;
    };

    let types = type_names(node);
    if !types.is_empty() && !types.iter().any(|t| matches_type(t, value)) {
        out.push(ValidationIssue::error(
            "schema.type",
            path,
            format!("expected {}, found {}", types.join(" or "), json_type(value)),
        ));
        return;
    }

    if let Some(allowed) = rules.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            out.push(ValidationIssue::error(
                "schema.enum",
                path,
                format!(
                    "{} is not one of {}",
                    value,
                    Value::Array(allowed.clone())
                ),
            ));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = rules.get("minimum").and_then(Value::as_f64) {
            if n < min {
                out.push(ValidationIssue::error(
                    "schema.range",
                    path,
                    format!("{} is below the minimum {}", n, min),
                ));
            }
        }
        if let Some(max) = rules.get("maximum").and_then(Value::as_f64) {
            if n > max {
                out.push(ValidationIssue::error(
                    "schema.range",
                    path,
                    format!("{} is above the maximum {}", n, max),
                ));
            }
        }
    }

    match value {
        Value::Object(fields) => check_object(root, rules, fields, path, out),
        Value::Array(items) => {
            if let Some(item_schema) = rules.get("items").filter(|v| v.is_object()) {
                for (i, item) in items.iter().enumerate() {
                    check(root, item_schema, item, &format!("{}[{}]", path, i), out);
                }
            }
        }
        _ => {}
    }
}

fn check_object(
    root: &Value,
    rules: &Map<String, Value>,
    fields: &Map<String, Value>,
    path: &str,
    out: &mut Vec<ValidationIssue>,
) {
    if let Some(required) = rules.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(name) {
                out.push(ValidationIssue::error(
                    "schema.required",
                    format!("{}.{}", path, name),
                    format!("missing required field \"{}\"", name),
                ));
            }
        }
    }

    let properties = rules.get("properties").and_then(Value::as_object);
    if let Some(properties) = properties {
        for (name, sub) in properties {
            if let Some(v) = fields.get(name) {
                check(root, sub, v, &format!("{}.{}", path, name), out);
            }
        }
    }

    if rules.get("additionalProperties") == Some(&Value::Bool(false)) {
        for name in fields.keys() {
            if !properties.is_some_and(|p| p.contains_key(name)) {
                out.push(ValidationIssue::error(
                    "schema.unknown_field",
                    format!("{}.{}", path, name),
                    format!("field \"{}\" is not allowed", name),
                ));
            }
        }
    }
}

/// Follow local `$ref`s (`#/...`). Returns `None` for unresolvable refs.
fn resolve_ref<'v>(root: &'v Value, node: &'v Value) -> Option<&'v Value> {
    let mut current = node;
    for _ in 0..MAX_REF_DEPTH {
        match current.get("$ref").and_then(Value::as_str) {
            Some(reference) => {
                let pointer = reference.strip_prefix('#')?;
                current = if pointer.is_empty() {
                    root
                } else {
                    root.pointer(pointer)?
                };
            }
            None => return Some(current),
        }
    }
    None
}

fn type_names(node: &Value) -> Vec<&str> {
    match node.get("type") {
        Some(Value::String(s)) => vec![s.as_str()],
        Some(Value::Array(list)) => list.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn matches_type(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.as_f64().is_some_and(|f| f.fract() == 0.0),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Internal consistency check for a schema document at ingestion time.
///
/// Rejects unknown `type` names, duplicate `enum` values, `required`
/// names missing from a sibling `properties`, and unresolvable local
/// `$ref`s.
pub fn check_consistency(id: &str, schema: &Value) -> Result<()> {
    let mut problems = Vec::new();
    walk(schema, schema, "#", &mut problems);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(CoreError::parse(id, problems.join("; ")))
    }
}

fn walk(root: &Value, node: &Value, at: &str, problems: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            match map.get("type") {
                Some(Value::String(_)) | Some(Value::Array(_)) => {
                    for name in type_names(node) {
                        if !KNOWN_TYPES.contains(&name) {
                            problems.push(format!("{}: unknown type \"{}\"", at, name));
                        }
                    }
                }
                _ => {}
            }
            if let Some(values) = map.get("enum").and_then(Value::as_array) {
                for (i, v) in values.iter().enumerate() {
                    if values[..i].contains(v) {
                        problems.push(format!("{}: duplicate enum value {}", at, v));
                    }
                }
            }
            if let (Some(required), Some(props)) = (
                map.get("required").and_then(Value::as_array),
                map.get("properties").and_then(Value::as_object),
            ) {
                for name in required.iter().filter_map(Value::as_str) {
                    if !props.contains_key(name) {
                        problems.push(format!(
                            "{}: required field \"{}\" is not declared in properties",
                            at, name
                        ));
                    }
                }
            }
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                if reference.starts_with('#') && resolve_ref(root, node).is_none() {
                    problems.push(format!("{}: unresolvable $ref \"{}\"", at, reference));
                }
            }
            for (key, child) in map {
                let path = format!("{}/{}", at, key);
                match key.as_str() {
                    // data, not subschemas
                    "enum" | "const" => {}
                    // keys here are user names, each value a subschema
                    "properties" | "patternProperties" | "$defs" | "definitions" => {
                        if let Some(named) = child.as_object() {
                            for (name, schema) in named {
                                walk(root, schema, &format!("{}/{}", path, name), problems);
                            }
                        }
                    }
                    _ => walk(root, child, &path, problems),
                }
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk(root, child, &format!("{}/{}", at, i), problems);
            }
        }
        _ => {}
    }
}
