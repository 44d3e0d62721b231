//! Intermediate representation built once per release.
//!
//! TypeDefs live in an arena indexed by [`TypeId`]; property types point into
//! the arena by index, so cyclic graphs need no forward declarations.

use keel_model::Verb;
use smol_str::SmolStr;
use std::collections::{BTreeMap, BTreeSet};

/// Pseudo-version for definitions without a version segment
pub const UNVERSIONED: &str = "unversioned";

/// Index of a [`TypeDef`] in [`ReleaseModel::types`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub usize);

/// Index of an [`OperationDef`] in [`ReleaseModel::operations`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    String,
    /// base64 payload
    Bytes,
    DateTime,
    IntOrString,
    Int32,
    Int64,
    Number,
    Boolean,
    /// Free-form JSON
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(TypeId),
    Primitive(Primitive),
}

impl TypeRef {
    pub fn named(&self) -> Option<TypeId> {
        match self {
            Self::Named(id) => Some(*id),
            Self::Primitive(_) => None,
        }
    }
}

/// Container modifier of a property or parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    None,
    Optional,
    List,
    /// String-keyed map
    Map,
}

/// Schema modifiers, only consumed by schema export
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifiers {
    pub pattern: Option<String>,
    pub enum_values: Option<Vec<serde_json::Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    /// Wire name
    pub name: SmolStr,
    pub ty: TypeRef,
    pub container: Container,
    pub description: Option<String>,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Object,
    /// Emitted as a type alias
    Scalar(Primitive),
}

/// `apiVersion`/`kind` markers of a document type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub api_version: SmolStr,
    pub kind: SmolStr,
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub id: TypeId,
    /// Simple name, e.g. `Pod`
    pub name: SmolStr,
    /// Owning group, e.g. `core`
    pub group: Option<SmolStr>,
    pub version: SmolStr,
    /// Full definition key, e.g. `io.k8s.api.core.v1.Pod`
    pub definition_key: String,
    pub kind: TypeKind,
    pub properties: Vec<PropertyDef>,
    pub required: BTreeSet<SmolStr>,
    pub document: Option<DocumentInfo>,
    pub description: Option<String>,
}

impl TypeDef {
    pub fn is_document(&self) -> bool {
        self.document.is_some()
    }

    /// Named types referenced by properties, in property order (with repeats)
    pub fn references(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.properties.iter().filter_map(|p| p.ty.named())
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    Path,
    Query,
    Body,
    Header,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: SmolStr,
    pub location: ParamLocation,
    pub ty: TypeRef,
    pub container: Container,
    pub required: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OperationDef {
    pub id: OpId,
    pub operation_id: SmolStr,
    /// `operationId` with the group-version infix removed, e.g. `createNamespacedPod`
    pub method_name: SmolStr,
    pub verb: Verb,
    /// Path template
    pub path: String,
    /// API group as served, `""` for core
    pub api_group: Option<SmolStr>,
    /// Short group matching [`TypeDef::group`], e.g. `core`, `events`
    pub group: Option<SmolStr>,
    pub version: SmolStr,
    /// Path-level then operation-level, in source order
    pub params: Vec<ParamDef>,
    pub response: Option<(TypeRef, Container)>,
    pub description: Option<String>,
    /// Referenced type names absent from the schema; non-empty means unbindable
    pub missing: Vec<SmolStr>,
    pub watch_capable: bool,
    pub namespaced: bool,
    pub action: Option<SmolStr>,
}

impl OperationDef {
    pub fn is_bindable(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn body(&self) -> Option<&ParamDef> {
        self.params.iter().find(|p| p.location == ParamLocation::Body)
    }

    /// Named types this operation mentions anywhere
    pub fn referenced_types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.params
            .iter()
            .filter_map(|p| p.ty.named())
            .chain(self.response.and_then(|(ty, _)| ty.named()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct VersionModel {
    pub version: SmolStr,
    /// Types in ingest order
    pub types: Vec<TypeId>,
    /// Operations in ingest order
    pub operations: Vec<OpId>,
}

/// Everything ingested for one release
#[derive(Debug, Clone, Default)]
pub struct ReleaseModel {
    pub label: SmolStr,
    pub types: Vec<TypeDef>,
    pub operations: Vec<OperationDef>,
    pub versions: BTreeMap<SmolStr, VersionModel>,
}

impl ReleaseModel {
    pub fn ty(&self, id: TypeId) -> &TypeDef {
        &self.types[id.0]
    }

    pub fn op(&self, id: OpId) -> &OperationDef {
        &self.operations[id.0]
    }

    pub fn version(&self, version: &str) -> Option<&VersionModel> {
        self.versions.get(version)
    }

    /// Look a type up by its definition key
    pub fn find_key(&self, key: &str) -> Option<TypeId> {
        self.types
            .iter()
            .find(|t| t.definition_key == key)
            .map(|t| t.id)
    }

    /// Types with simple name `name` in `version`
    pub fn find(&self, version: &str, name: &str) -> Vec<TypeId> {
        self.version(version)
            .map(|v| {
                v.types
                    .iter()
                    .copied()
                    .filter(|id| self.ty(*id).name == name)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn find_operation(&self, operation_id: &str) -> Option<OpId> {
        self.operations
            .iter()
            .find(|o| o.operation_id == operation_id)
            .map(|o| o.id)
    }
}
