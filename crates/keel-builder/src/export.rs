//! OpenAPI v3 structural schemas for ingested types, e.g. to validate
//! custom resources built from generated models.

use crate::model::{Container, Primitive, PropertyDef, ReleaseModel, TypeId, TypeKind, TypeRef};
use serde_json::{Map, Value, json};

fn primitive_schema(primitive: Primitive) -> Value {
    match primitive {
        Primitive::String => json!({ "type": "string" }),
        Primitive::Bytes => json!({ "type": "string", "format": "byte" }),
        Primitive::DateTime => json!({ "type": "string", "format": "date-time" }),
        Primitive::IntOrString => json!({ "x-kubernetes-int-or-string": true }),
        Primitive::Int32 => json!({ "type": "integer", "format": "int32" }),
        Primitive::Int64 => json!({ "type": "integer", "format": "int64" }),
        Primitive::Number => json!({ "type": "number" }),
        Primitive::Boolean => json!({ "type": "boolean" }),
        Primitive::Json => json!({ "x-kubernetes-preserve-unknown-fields": true }),
    }
}

/// Structural schema of `id`, nested types inlined.
///
/// A type already being rendered further up is cut off as an object that
/// preserves unknown fields.
pub fn type_schema(model: &ReleaseModel, id: TypeId) -> Value {
    let mut stack = Vec::new();
    named_schema(model, id, &mut stack)
}

fn named_schema(model: &ReleaseModel, id: TypeId, stack: &mut Vec<TypeId>) -> Value {
    if stack.contains(&id) {
        return json!({ "type": "object", "x-kubernetes-preserve-unknown-fields": true });
    }
    let ty = model.ty(id);
    let mut schema = match ty.kind {
        TypeKind::Scalar(p) => primitive_schema(p),
        TypeKind::Object => {
            stack.push(id);
            let properties: Map<String, Value> = ty
                .properties
                .iter()
                .map(|p| (p.name.to_string(), property_schema(model, p, stack)))
                .collect();
            stack.pop();
            let mut object = json!({ "type": "object", "properties": properties });
            if !ty.required.is_empty() {
                object["required"] = ty.required.iter().map(|r| r.as_str()).collect();
            }
            object
        }
    };
    if let Some(description) = &ty.description {
        schema["description"] = description.as_str().into();
    }
    schema
}

fn property_schema(model: &ReleaseModel, prop: &PropertyDef, stack: &mut Vec<TypeId>) -> Value {
    let item = match prop.ty {
        TypeRef::Named(id) => named_schema(model, id, stack),
        TypeRef::Primitive(p) => primitive_schema(p),
    };
    let mut schema = match prop.container {
        Container::None | Container::Optional => item,
        Container::List => json!({ "type": "array", "items": item }),
        Container::Map => json!({ "type": "object", "additionalProperties": item }),
    };

    let m = &prop.modifiers;
    if let Some(pattern) = &m.pattern {
        schema["pattern"] = pattern.as_str().into();
    }
    if let Some(values) = &m.enum_values {
        schema["enum"] = Value::Array(values.clone());
    }
    if let Some(minimum) = m.minimum {
        schema["minimum"] = minimum.into();
    }
    if let Some(maximum) = m.maximum {
        schema["maximum"] = maximum.into();
    }
    if let Some(min_items) = m.min_items {
        schema["minItems"] = min_items.into();
    }
    if let Some(max_items) = m.max_items {
        schema["maxItems"] = max_items.into();
    }
    if let Some(description) = &prop.description {
        schema["description"] = description.as_str().into();
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::ingest::ingest;
    use crate::swagger::SwaggerDoc;

    fn model() -> ReleaseModel {
        let doc: SwaggerDoc = serde_json::from_value(json!({
            "definitions": {
                "x.v1.Widget": {
                    "type": "object",
                    "required": ["size"],
                    "properties": {
                        "size": { "type": "integer", "format": "int32", "minimum": 1, "maximum": 10 },
                        "tags": { "type": "array", "items": { "type": "string" }, "maxItems": 4 },
                        "color": { "type": "string", "enum": ["red", "blue"], "pattern": "^[a-z]+$" },
                        "parent": { "$ref": "#/definitions/x.v1.Widget" }
                    }
                }
            }
        }))
        .unwrap();
        let mut diags = Diagnostics::new("test");
        ingest("test", &doc, &mut diags)
    }

    #[test]
    fn test_modifiers_and_cycle_guard() {
        let model = model();
        let schema = type_schema(&model, model.find("v1", "Widget")[0]);
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["size"]));
        let props = &schema["properties"];
        assert_eq!(props["size"], json!({ "type": "integer", "format": "int32", "minimum": 1.0, "maximum": 10.0 }));
        assert_eq!(props["tags"]["maxItems"], 4);
        assert_eq!(props["tags"]["items"], json!({ "type": "string" }));
        assert_eq!(props["color"]["enum"], json!(["red", "blue"]));
        assert_eq!(props["color"]["pattern"], "^[a-z]+$");
        assert_eq!(props["parent"]["x-kubernetes-preserve-unknown-fields"], true);
    }
}
