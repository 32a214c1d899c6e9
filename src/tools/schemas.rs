//! JSON schema builders for tool arguments.

use serde_json::{Map, Value};

/// Build an object schema whose properties are all required strings.
pub(crate) fn object_schema(properties: &[(&str, Value)]) -> Value {
    let mut props = Map::new();
    let mut required = Vec::with_capacity(properties.len());
    for (name, schema) in properties {
        props.insert((*name).to_string(), schema.clone());
        required.push(Value::String((*name).to_string()));
    }

    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("object".into()));
    schema.insert("properties".into(), Value::Object(props));
    schema.insert("required".into(), Value::Array(required));
    Value::Object(schema)
}

/// Build a string property schema with a description.
pub(crate) fn string_schema(description: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("string".into()));
    schema.insert("description".into(), Value::String(description.into()));
    Value::Object(schema)
}

/// Build a string property schema restricted to the given values.
pub(crate) fn enum_schema(description: &str, variants: &[&str]) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("string".into()));
    schema.insert("description".into(), Value::String(description.into()));
    schema.insert(
        "enum".into(),
        Value::Array(
            variants
                .iter()
                .map(|variant| Value::String((*variant).into()))
                .collect(),
        ),
    );
    Value::Object(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_schema_marks_every_property_required() {
        let schema = object_schema(&[
            ("query", string_schema("Search query")),
            ("kind", enum_schema("Kind", &["a", "b"])),
        ]);
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["query", "kind"]));
        assert_eq!(schema["properties"]["kind"]["enum"], json!(["a", "b"]));
    }
}
