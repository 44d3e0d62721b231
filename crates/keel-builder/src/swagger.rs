//! Swagger 2.0 document types, as much of them as the builder reads.
//!
//! Maps are deserialized into `Vec<(String, T)>` so source order survives;
//! binding order and property order both follow the document.

use keel_model::Verb;
use serde::Deserialize;
use serde_with::{Map, serde_as};

#[serde_as]
#[derive(Deserialize, Debug, Clone, Default)]
pub struct SwaggerDoc {
    #[serde(default)]
    pub swagger: Option<String>,
    #[serde(default)]
    pub info: Option<Info>,
    #[serde_as(as = "Map<_, _>")]
    #[serde(default)]
    pub definitions: Vec<(String, Schema)>,
    #[serde_as(as = "Map<_, _>")]
    #[serde(default)]
    pub paths: Vec<(String, PathItem)>,
    /// Shared parameters referenced as `#/parameters/<name>`
    #[serde_as(as = "Map<_, _>")]
    #[serde(default)]
    pub parameters: Vec<(String, Parameter)>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Info {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    /// `group/version`, or `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<Schema>),
}

#[serde_as]
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "$ref")]
    pub reference: Option<String>,
    #[serde(rename = "type")]
    pub ty: Option<String>,
    pub format: Option<String>,
    pub description: Option<String>,
    #[serde_as(as = "Map<_, _>")]
    #[serde(default)]
    pub properties: Vec<(String, Schema)>,
    #[serde(default)]
    pub required: Vec<String>,
    pub items: Option<Box<Schema>>,
    pub additional_properties: Option<AdditionalProperties>,
    pub pattern: Option<String>,
    #[serde(rename = "enum")]
    pub enum_values: Option<Vec<serde_json::Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    #[serde(rename = "x-kubernetes-group-version-kind", default)]
    pub group_version_kind: Vec<GroupVersionKind>,
    #[serde(rename = "x-kubernetes-preserve-unknown-fields")]
    pub preserve_unknown_fields: Option<bool>,
    #[serde(rename = "x-kubernetes-int-or-string")]
    pub int_or_string: Option<bool>,
}

impl Schema {
    /// Definition key of a `#/definitions/<key>` reference
    pub fn definition_ref(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .map(|r| r.strip_prefix("#/definitions/").unwrap_or(r))
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|(n, _)| n == name)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PathItem {
    #[serde(default)]
    pub parameters: Vec<ParameterOrRef>,
    pub get: Option<Operation>,
    pub put: Option<Operation>,
    pub post: Option<Operation>,
    pub delete: Option<Operation>,
    pub options: Option<Operation>,
    pub head: Option<Operation>,
    pub patch: Option<Operation>,
}

impl PathItem {
    /// Operations in a fixed verb order
    pub fn operations(&self) -> impl Iterator<Item = (Verb, &Operation)> {
        [
            (Verb::Get, &self.get),
            (Verb::Put, &self.put),
            (Verb::Post, &self.post),
            (Verb::Delete, &self.delete),
            (Verb::Options, &self.options),
            (Verb::Head, &self.head),
            (Verb::Patch, &self.patch),
        ]
        .into_iter()
        .filter_map(|(verb, op)| op.as_ref().map(|op| (verb, op)))
    }
}

#[serde_as]
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_id: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterOrRef>,
    #[serde_as(as = "Map<_, _>")]
    #[serde(default)]
    pub responses: Vec<(String, Response)>,
    #[serde(default)]
    pub consumes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "x-kubernetes-action")]
    pub action: Option<String>,
    #[serde(rename = "x-kubernetes-group-version-kind")]
    pub group_version_kind: Option<GroupVersionKind>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Response {
    pub description: Option<String>,
    pub schema: Option<Schema>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ParameterOrRef {
    Ref {
        #[serde(rename = "$ref")]
        reference: String,
    },
    Inline(Parameter),
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type")]
    pub ty: Option<String>,
    pub format: Option<String>,
    pub items: Option<Box<Schema>>,
    pub schema: Option<Schema>,
    #[serde(default)]
    pub unique_items: bool,
}

impl Parameter {
    /// View a non-body parameter's type fields as a schema
    pub fn as_schema(&self) -> Schema {
        Schema {
            ty: self.ty.clone(),
            format: self.format.clone(),
            items: self.items.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_order_is_kept() {
        let doc: SwaggerDoc = serde_json::from_str(
            r##"{
                "definitions": {
                    "z.v1.Zed": {"type": "object", "properties": {"b": {"type": "string"}, "a": {"type": "string"}}},
                    "a.v1.Ay": {"type": "string"}
                },
                "paths": {}
            }"##,
        )
        .unwrap();
        let keys: Vec<_> = doc.definitions.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["z.v1.Zed", "a.v1.Ay"]);
        let props: Vec<_> = doc.definitions[0]
            .1
            .properties
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(props, ["b", "a"]);
    }

    #[test]
    fn test_parameter_ref_or_inline() {
        let params: Vec<ParameterOrRef> = serde_json::from_str(
            r##"[{"$ref": "#/parameters/pretty"}, {"name": "watch", "in": "query", "type": "boolean"}]"##,
        )
        .unwrap();
        assert!(matches!(&params[0], ParameterOrRef::Ref { reference } if reference == "#/parameters/pretty"));
        assert!(matches!(&params[1], ParameterOrRef::Inline(p) if p.name == "watch"));
    }
}
