//! JSON Schema and human-readable descriptions for catalog models.

use std::collections::HashSet;

use serde_json::{Map, Value, json};

use crate::catalog::{Catalog, FieldSpec, ModelSpec};

/// JSON Schema for a named model, or `None` when the catalog lacks it.
///
/// Properties are keyed by wire name (alias when set).
pub fn model_schema(catalog: &Catalog, name: &str) -> Option<Value> {
    let model = catalog.load_model(name)?;
    let mut visiting = HashSet::new();
    Some(build_model_schema(catalog, name, model, &mut visiting))
}

fn build_model_schema<'a>(
    catalog: &'a Catalog,
    name: &'a str,
    model: &'a ModelSpec,
    visiting: &mut HashSet<&'a str>,
) -> Value {
    visiting.insert(name);

    let mut properties = Map::new();
    let mut required = Vec::new();
    for (field_name, field) in &model.fields {
        let wire = field.wire_name(field_name);
        properties.insert(wire.to_string(), field_schema(catalog, field, visiting));
        if field.required {
            required.push(Value::String(wire.to_string()));
        }
    }

    visiting.remove(name);

    let mut schema = json!({
        "type": "object",
        "title": name,
        "properties": properties,
    });
    if let Some(description) = &model.description {
        schema["description"] = Value::String(description.clone());
    }
    if !required.is_empty() {
        schema["required"] = Value::Array(required);
    }
    schema
}

fn field_schema<'a>(
    catalog: &'a Catalog,
    field: &'a FieldSpec,
    visiting: &mut HashSet<&'a str>,
) -> Value {
    let mut schema = match field.model.as_deref() {
        Some(nested) => nested_schema(catalog, nested, visiting),
        None => type_schema(catalog, &field.kind, visiting),
    };
    if let (Some(description), Some(obj)) = (&field.description, schema.as_object_mut()) {
        obj.insert("description".to_string(), Value::String(description.clone()));
    }
    schema
}

fn nested_schema<'a>(catalog: &'a Catalog, name: &'a str, visiting: &mut HashSet<&'a str>) -> Value {
    match catalog.models.get_key_value(name) {
        // Cycles degrade to a plain object.
        Some((key, _)) if visiting.contains(key.as_str()) => json!({ "type": "object" }),
        Some((key, model)) => build_model_schema(catalog, key, model, visiting),
        None => json!({ "type": "object" }),
    }
}

/// Schema for a type expression: `str`, `int`, `float`, `bool`, `dict[K, V]`,
/// `list[T]`, `Optional[T]` or a model name.
fn type_schema<'a>(catalog: &'a Catalog, expr: &'a str, visiting: &mut HashSet<&'a str>) -> Value {
    let expr = expr.trim();
    if let Some(inner) = generic_arg(expr, "Optional") {
        return type_schema(catalog, inner, visiting);
    }
    if let Some(inner) = generic_arg(expr, "list").or_else(|| generic_arg(expr, "List")) {
        return json!({ "type": "array", "items": type_schema(catalog, inner, visiting) });
    }
    if let Some(inner) = generic_arg(expr, "dict").or_else(|| generic_arg(expr, "Dict")) {
        let value_type = split_top_level(inner).get(1).copied().unwrap_or("any");
        return json!({
            "type": "object",
            "additionalProperties": type_schema(catalog, value_type, visiting),
        });
    }
    match expr {
        "str" => json!({ "type": "string" }),
        "int" => json!({ "type": "integer" }),
        "float" => json!({ "type": "number" }),
        "bool" => json!({ "type": "boolean" }),
        "dict" | "Dict" => json!({ "type": "object" }),
        "list" | "List" => json!({ "type": "array" }),
        "any" | "Any" | "" => json!({}),
        model if catalog.models.contains_key(model) => nested_schema(catalog, model, visiting),
        _ => json!({}),
    }
}

/// `T` from `name[T]`.
fn generic_arg<'a>(expr: &'a str, name: &str) -> Option<&'a str> {
    expr.strip_prefix(name)?
        .strip_prefix('[')?
        .strip_suffix(']')
        .map(str::trim)
}

/// Split on commas that are not nested inside brackets.
fn split_top_level(expr: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(expr[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(expr[start..].trim());
    parts
}

/// Readable type string: `str (optional)`, `dict[str, str]`, `TenantMeta`.
pub fn friendly_type(field: &FieldSpec) -> String {
    let base = generic_arg(field.kind.trim(), "Optional").unwrap_or(field.kind.trim());
    if field.required {
        base.to_string()
    } else {
        format!("{} (optional)", base)
    }
}

/// Field descriptions for `explain`, recursing into nested models.
pub fn describe_model_fields(catalog: &Catalog, model: &ModelSpec) -> Map<String, Value> {
    let mut visiting = HashSet::new();
    describe_fields(catalog, model, &mut visiting)
}

fn describe_fields<'a>(
    catalog: &'a Catalog,
    model: &'a ModelSpec,
    visiting: &mut HashSet<&'a str>,
) -> Map<String, Value> {
    let mut fields = Map::new();
    for (name, field) in &model.fields {
        let mut entry = Map::new();
        entry.insert("type".to_string(), Value::String(friendly_type(field)));
        if field.required {
            entry.insert("required".to_string(), Value::Bool(true));
        }
        if let Some(description) = &field.description {
            entry.insert("description".to_string(), Value::String(description.clone()));
        }
        if let Some(alias) = &field.alias {
            entry.insert("alias".to_string(), Value::String(alias.clone()));
        }
        let nested = field
            .model
            .as_deref()
            .and_then(|n| catalog.models.get_key_value(n));
        if let Some((key, nested_model)) = nested {
            if visiting.insert(key.as_str()) {
                entry.insert(
                    "fields".to_string(),
                    Value::Object(describe_fields(catalog, nested_model, visiting)),
                );
                visiting.remove(key.as_str());
            }
        }
        fields.insert(name.clone(), Value::Object(entry));
    }
    fields
}

/// Wire names of required model fields absent from `body`.
pub fn missing_required_fields(model: &ModelSpec, body: &Map<String, Value>) -> Vec<String> {
    model
        .fields
        .iter()
        .filter(|(_, field)| field.required)
        .filter(|(name, field)| {
            !body.contains_key(field.wire_name(name)) && !body.contains_key(name.as_str())
        })
        .map(|(name, field)| field.wire_name(name).to_string())
        .collect()
}
