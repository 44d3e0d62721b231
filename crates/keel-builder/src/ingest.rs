//! Schema ingestion: Swagger document -> [`ReleaseModel`]
//!
//! Types are built in two passes. The first allocates one [`TypeDef`] per
//! definition so every key has an id; the second resolves property types
//! against those ids.

use crate::diagnostics::{AnomalyKind, Diagnostics};
use crate::model::*;
use crate::swagger::{AdditionalProperties, Operation, Parameter, ParameterOrRef, Schema, SwaggerDoc};
use heck::ToPascalCase;
use keel_model::Verb;
use keel_model::document::is_version_segment;
use smol_str::SmolStr;
use std::collections::{BTreeSet, HashMap};

/// Definition keys referenced by published schemas without being defined.
///
/// Operations mentioning them are still unbindable, but the omission is expected
/// and logged quietly.
pub const KNOWN_MISSING_TYPES: &[&str] = &[
    "io.k8s.apimachinery.pkg.apis.meta.v1.Patch",
    "io.k8s.apimachinery.pkg.apis.meta.v1.WatchEvent",
    "io.k8s.apimachinery.pkg.runtime.RawExtension",
];

const RESPONSE_CODES: [&str; 3] = ["200", "201", "202"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Plain,
    List,
    Map,
}

impl Shape {
    fn container(self, required: bool) -> Container {
        match self {
            Shape::List => Container::List,
            Shape::Map => Container::Map,
            Shape::Plain if required => Container::None,
            Shape::Plain => Container::Optional,
        }
    }
}

/// Split a definition key into `(group, version, simple name)`.
///
/// `io.k8s.api.core.v1.Pod` gives `(core, v1, Pod)`; keys without a version
/// segment land in [`UNVERSIONED`].
pub fn split_definition_key(key: &str) -> (Option<SmolStr>, SmolStr, SmolStr) {
    let segments: Vec<&str> = key.split('.').collect();
    let (name, before) = match segments.split_last() {
        Some((name, before)) => (*name, before),
        None => (key, &[][..]),
    };
    match before.iter().rposition(|s| is_version_segment(s)) {
        Some(i) => {
            let group = i.checked_sub(1).map(|g| SmolStr::from(before[g]));
            (group, before[i].into(), name.into())
        }
        None => (
            before.last().map(|g| SmolStr::from(*g)),
            UNVERSIONED.into(),
            name.into(),
        ),
    }
}

/// Short group name used to match operations with types: `""` is `core`,
/// `events.k8s.io` is `events`.
pub fn short_group(api_group: &str) -> SmolStr {
    if api_group.is_empty() {
        "core".into()
    } else {
        api_group.split('.').next().unwrap_or(api_group).into()
    }
}

/// Remove the group-version infix from an operation id.
///
/// `createCoreV1NamespacedPod` becomes `createNamespacedPod`,
/// `createRbacAuthorizationV1ClusterRole` becomes `createClusterRole`.
pub fn strip_group_version(operation_id: &str, api_group: Option<&str>, version: &str) -> SmolStr {
    let Some(group) = api_group else {
        return operation_id.into();
    };
    let v = version.to_pascal_case();
    let mut candidates = Vec::new();
    if group.is_empty() {
        candidates.push(format!("Core{}", v));
    } else {
        candidates.push(format!("{}{}", group.to_pascal_case(), v));
        if let Some(trimmed) = group.strip_suffix(".k8s.io") {
            candidates.push(format!("{}{}", trimmed.to_pascal_case(), v));
        }
        candidates.push(format!("{}{}", short_group(group).to_pascal_case(), v));
    }

    let Some(split) = operation_id.find(|c: char| c.is_ascii_uppercase()) else {
        return operation_id.into();
    };
    let (verb, rest) = operation_id.split_at(split);
    for candidate in &candidates {
        if let Some(tail) = rest.strip_prefix(candidate.as_str()) {
            if tail.is_empty() || tail.starts_with(|c: char| c.is_ascii_uppercase()) {
                return format!("{}{}", verb, tail).into();
            }
        }
    }
    operation_id.into()
}

fn primitive_for(ty: &str, format: Option<&str>) -> Primitive {
    match (ty, format) {
        ("string", Some("date-time")) => Primitive::DateTime,
        ("string", Some("byte")) => Primitive::Bytes,
        ("string", Some("int-or-string")) => Primitive::IntOrString,
        ("string", _) => Primitive::String,
        ("integer", Some("int32")) => Primitive::Int32,
        ("integer", _) => Primitive::Int64,
        ("number", _) => Primitive::Number,
        ("boolean", _) => Primitive::Boolean,
        _ => Primitive::Json,
    }
}

struct Resolver<'a> {
    keys: &'a HashMap<&'a str, TypeId>,
}

impl Resolver<'_> {
    /// Type and shape of a schema; names of undefined refs go to `missing`
    fn resolve(&self, schema: &Schema, missing: &mut Vec<SmolStr>) -> (TypeRef, Shape) {
        if let Some(key) = schema.definition_ref() {
            return match self.keys.get(key) {
                Some(id) => (TypeRef::Named(*id), Shape::Plain),
                None => {
                    missing.push(key.into());
                    (TypeRef::Primitive(Primitive::Json), Shape::Plain)
                }
            };
        }
        if schema.int_or_string == Some(true) {
            return (TypeRef::Primitive(Primitive::IntOrString), Shape::Plain);
        }
        match schema.ty.as_deref() {
            Some("array") => match &schema.items {
                Some(items) => match self.resolve(items, missing) {
                    (inner, Shape::Plain) => (inner, Shape::List),
                    // nested containers degrade to free-form JSON
                    _ => (TypeRef::Primitive(Primitive::Json), Shape::List),
                },
                None => (TypeRef::Primitive(Primitive::Json), Shape::List),
            },
            Some("object") | None => match &schema.additional_properties {
                Some(AdditionalProperties::Schema(values)) => match self.resolve(values, missing) {
                    (inner, Shape::Plain) => (inner, Shape::Map),
                    _ => (TypeRef::Primitive(Primitive::Json), Shape::Map),
                },
                _ => (TypeRef::Primitive(Primitive::Json), Shape::Plain),
            },
            Some(ty) => (
                TypeRef::Primitive(primitive_for(ty, schema.format.as_deref())),
                Shape::Plain,
            ),
        }
    }
}

fn type_kind(schema: &Schema) -> TypeKind {
    if !schema.properties.is_empty() {
        return TypeKind::Object;
    }
    if schema.int_or_string == Some(true) {
        return TypeKind::Scalar(Primitive::IntOrString);
    }
    match schema.ty.as_deref() {
        Some(ty @ ("string" | "integer" | "number" | "boolean")) => {
            TypeKind::Scalar(primitive_for(ty, schema.format.as_deref()))
        }
        // property-less objects, arrays and untyped definitions are free-form
        _ => TypeKind::Scalar(Primitive::Json),
    }
}

fn document_info(schema: &Schema) -> Option<DocumentInfo> {
    let gvk = schema.group_version_kind.first()?;
    if !(schema.has_property("apiVersion") && schema.has_property("kind")) {
        return None;
    }
    Some(DocumentInfo {
        api_version: gvk.api_version().into(),
        kind: gvk.kind.as_str().into(),
    })
}

fn modifiers(schema: &Schema) -> Modifiers {
    Modifiers {
        pattern: schema.pattern.clone(),
        enum_values: schema.enum_values.clone(),
        minimum: schema.minimum,
        maximum: schema.maximum,
        min_items: schema.min_items,
        max_items: schema.max_items,
    }
}

fn record_missing(diags: &mut Diagnostics, version: &str, subject: &str, missing: &[SmolStr]) {
    for name in missing {
        let (kind, reason) = if KNOWN_MISSING_TYPES.contains(&name.as_str()) {
            (AnomalyKind::KnownMissingType, format!("references known-missing {}", name))
        } else {
            (AnomalyKind::UndefinedReference, format!("references undefined {}", name))
        };
        diags.record(kind, Some(version), subject, reason);
    }
}

/// API group and version served by an operation
fn group_version(path: &str, op: &Operation) -> (Option<SmolStr>, SmolStr) {
    if let Some(gvk) = &op.group_version_kind {
        return (Some(gvk.group.as_str().into()), gvk.version.as_str().into());
    }
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match segments.as_slice() {
        ["api", v, ..] if is_version_segment(v) => (Some("".into()), (*v).into()),
        ["apis", g, v, ..] if is_version_segment(v) => (Some((*g).into()), (*v).into()),
        _ => (None, UNVERSIONED.into()),
    }
}

fn location(param: &Parameter) -> ParamLocation {
    match param.location.as_str() {
        "path" => ParamLocation::Path,
        "body" => ParamLocation::Body,
        "header" => ParamLocation::Header,
        // query and formData
        _ => ParamLocation::Query,
    }
}

/// Ingest one release's schema document
pub fn ingest(label: &str, doc: &SwaggerDoc, diags: &mut Diagnostics) -> ReleaseModel {
    let _span = tracing::info_span!("ingest", release = label).entered();
    let mut model = ReleaseModel {
        label: label.into(),
        ..Default::default()
    };

    let mut keys: HashMap<&str, TypeId> = HashMap::with_capacity(doc.definitions.len());
    for (key, schema) in &doc.definitions {
        let id = TypeId(model.types.len());
        let (group, version, name) = split_definition_key(key);
        model
            .versions
            .entry(version.clone())
            .or_insert_with(|| VersionModel {
                version: version.clone(),
                ..Default::default()
            })
            .types
            .push(id);
        model.types.push(TypeDef {
            id,
            name,
            group,
            version,
            definition_key: key.clone(),
            kind: type_kind(schema),
            properties: Vec::new(),
            required: schema.required.iter().map(|r| SmolStr::from(r.as_str())).collect(),
            document: document_info(schema),
            description: schema.description.clone(),
        });
        keys.insert(key.as_str(), id);
    }

    let resolver = Resolver { keys: &keys };
    for (index, (key, schema)) in doc.definitions.iter().enumerate() {
        if model.types[index].kind != TypeKind::Object {
            continue;
        }
        let mut missing = Vec::new();
        let mut properties = Vec::with_capacity(schema.properties.len());
        for (name, prop) in &schema.properties {
            let (ty, shape) = resolver.resolve(prop, &mut missing);
            let required = model.types[index].required.contains(name.as_str());
            properties.push(PropertyDef {
                name: name.as_str().into(),
                ty,
                container: shape.container(required),
                description: prop.description.clone(),
                modifiers: modifiers(prop),
            });
        }
        let version = model.types[index].version.clone();
        record_missing(diags, &version, key, &missing);
        model.types[index].properties = properties;
    }

    let shared: HashMap<&str, &Parameter> = doc
        .parameters
        .iter()
        .map(|(name, p)| (name.as_str(), p))
        .collect();

    for (path, item) in &doc.paths {
        for (verb, op) in item.operations() {
            let operation = ingest_operation(
                &resolver,
                &shared,
                path,
                verb,
                &item.parameters,
                op,
                OpId(model.operations.len()),
                diags,
            );
            let version = operation.version.clone();
            model
                .versions
                .entry(version.clone())
                .or_insert_with(|| VersionModel {
                    version,
                    ..Default::default()
                })
                .operations
                .push(operation.id);
            model.operations.push(operation);
        }
    }

    tracing::debug!(
        types = model.types.len(),
        operations = model.operations.len(),
        versions = model.versions.len(),
        "ingested schema"
    );
    model
}

#[allow(clippy::too_many_arguments)]
fn ingest_operation(
    resolver: &Resolver<'_>,
    shared: &HashMap<&str, &Parameter>,
    path: &str,
    verb: Verb,
    path_params: &[ParameterOrRef],
    op: &Operation,
    id: OpId,
    diags: &mut Diagnostics,
) -> OperationDef {
    let (api_group, version) = group_version(path, op);
    let operation_id: SmolStr = match &op.operation_id {
        Some(id) => id.as_str().into(),
        None => format!("{}{}", verb.as_str().to_lowercase(), path.to_pascal_case()).into(),
    };
    let method_name = strip_group_version(&operation_id, api_group.as_deref(), &version);

    // operation-level parameters override path-level ones with the same name and location
    let mut raw: Vec<&Parameter> = Vec::new();
    for param in path_params.iter().chain(&op.parameters) {
        let param = match param {
            ParameterOrRef::Inline(p) => p,
            ParameterOrRef::Ref { reference } => {
                let name = reference.strip_prefix("#/parameters/").unwrap_or(reference);
                match shared.get(name) {
                    Some(p) => *p,
                    None => {
                        diags.record(
                            AnomalyKind::UndefinedReference,
                            Some(&version),
                            operation_id.clone(),
                            format!("parameter reference {} is undefined", reference),
                        );
                        continue;
                    }
                }
            }
        };
        raw.retain(|p| !(p.name == param.name && p.location == param.location));
        raw.push(param);
    }

    let mut missing = Vec::new();
    let params = raw
        .into_iter()
        .map(|p| {
            let location = location(p);
            let (ty, shape) = match (&p.schema, location) {
                (Some(schema), ParamLocation::Body) => resolver.resolve(schema, &mut missing),
                _ => resolver.resolve(&p.as_schema(), &mut missing),
            };
            ParamDef {
                name: p.name.as_str().into(),
                location,
                ty,
                container: shape.container(p.required || location == ParamLocation::Path),
                required: p.required || location == ParamLocation::Path,
                description: p.description.clone(),
            }
        })
        .collect::<Vec<_>>();

    let response = RESPONSE_CODES.iter().find_map(|code| {
        op.responses
            .iter()
            .find(|(c, r)| c == code && r.schema.is_some())
            .and_then(|(_, r)| r.schema.as_ref())
    });
    let response = response.map(|schema| {
        let (ty, shape) = resolver.resolve(schema, &mut missing);
        (ty, shape.container(true))
    });

    record_missing(diags, &version, &operation_id, &missing);

    let action: Option<SmolStr> = op.action.as_deref().map(SmolStr::from);
    let watch_capable = params
        .iter()
        .any(|p| p.location == ParamLocation::Query && p.name == "watch")
        || matches!(action.as_deref(), Some("watch" | "watchlist"));

    let missing: Vec<SmolStr> = missing
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    OperationDef {
        id,
        group: api_group.as_deref().map(short_group),
        api_group,
        version,
        operation_id,
        method_name,
        verb,
        path: path.to_string(),
        params,
        response,
        description: op.description.clone(),
        missing,
        watch_capable,
        namespaced: path.contains("{namespace}"),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_definition_key() {
        assert_eq!(
            split_definition_key("io.k8s.api.core.v1.Pod"),
            (Some("core".into()), "v1".into(), "Pod".into())
        );
        assert_eq!(
            split_definition_key("io.k8s.api.batch.v1beta1.CronJob"),
            (Some("batch".into()), "v1beta1".into(), "CronJob".into())
        );
        assert_eq!(
            split_definition_key("io.k8s.apimachinery.pkg.api.resource.Quantity"),
            (Some("resource".into()), UNVERSIONED.into(), "Quantity".into())
        );
        assert_eq!(
            split_definition_key("Standalone"),
            (None, UNVERSIONED.into(), "Standalone".into())
        );
    }

    #[test]
    fn test_strip_group_version() {
        assert_eq!(
            strip_group_version("createCoreV1NamespacedPod", Some(""), "v1"),
            "createNamespacedPod"
        );
        assert_eq!(
            strip_group_version("createEventsV1NamespacedEvent", Some("events.k8s.io"), "v1"),
            "createNamespacedEvent"
        );
        assert_eq!(
            strip_group_version(
                "listRbacAuthorizationV1ClusterRole",
                Some("rbac.authorization.k8s.io"),
                "v1"
            ),
            "listClusterRole"
        );
        assert_eq!(
            strip_group_version("createBatchV1beta1NamespacedCronJob", Some("batch"), "v1beta1"),
            "createNamespacedCronJob"
        );
        assert_eq!(strip_group_version("getCodeVersion", None, UNVERSIONED), "getCodeVersion");
    }

    #[test]
    fn test_short_group() {
        assert_eq!(short_group(""), "core");
        assert_eq!(short_group("events.k8s.io"), "events");
        assert_eq!(short_group("apps"), "apps");
    }
}
