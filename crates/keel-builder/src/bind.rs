//! Operation binding: each bindable operation lands on at most one class.
//!
//! Precedence:
//! 1. a document request body makes an instance method on that document
//! 2. a document response makes a static method on that document
//! 3. the override patterns and [`OVERRIDES`] table pick a static target
//! 4. otherwise the operation stays unbound

use crate::diagnostics::{AnomalyKind, Diagnostics};
use crate::model::{Container, OpId, OperationDef, ReleaseModel, TypeDef, TypeId, TypeRef};
use crate::names::{NameRegistry, group_order};
use crate::order::ReleaseOrder;
use heck::ToSnakeCase;
use smol_str::SmolStr;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Generic envelopes shared by many operations; never binding targets on their own
pub const CARRIER_TYPES: &[&str] = &["DeleteOptions", "Status", "WatchEvent", "Patch"];

/// Irregular operation names and the class they belong to
pub const OVERRIDES: &[(&str, &str)] = &[
    ("readNamespacedPodLog", "Pod"),
    ("getCodeVersion", "Info"),
    ("logFileListHandler", "Node"),
];

/// Method names the runtime traits already use on generated types
const RESERVED: &[&str] = &[
    "new", "create", "read", "read_into", "update", "delete", "modify", "absorb", "name",
    "namespace",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Takes `&self` as the request body
    Instance,
    /// Associated function
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindRule {
    Body,
    Response,
    Override,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBinding {
    pub op: OpId,
    pub target: TypeId,
    pub kind: BindingKind,
    pub rule: BindRule,
    /// Generated method name, unique within the version
    pub method_name: SmolStr,
}

#[derive(Debug, Clone, Default)]
pub struct Bindings {
    by_type: BTreeMap<TypeId, Vec<MethodBinding>>,
    by_op: HashMap<OpId, TypeId>,
    pub unbound: Vec<OpId>,
}

impl Bindings {
    /// Methods bound to `id`, in source order
    pub fn methods(&self, id: TypeId) -> &[MethodBinding] {
        self.by_type.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn binding_of(&self, op: OpId) -> Option<&MethodBinding> {
        let target = self.by_op.get(&op)?;
        self.methods(*target).iter().find(|m| m.op == op)
    }

    pub fn bound_count(&self) -> usize {
        self.by_op.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TypeId, &Vec<MethodBinding>)> {
        self.by_type.iter()
    }

    fn push(&mut self, binding: MethodBinding) {
        self.by_op.insert(binding.op, binding.target);
        self.by_type.entry(binding.target).or_default().push(binding);
    }
}

pub fn is_carrier(ty: &TypeDef) -> bool {
    CARRIER_TYPES.contains(&ty.name.as_str())
}

struct Binder<'a> {
    model: &'a ReleaseModel,
    order: &'a ReleaseOrder,
}

impl Binder<'_> {
    fn eligible(&self, id: TypeId) -> bool {
        let ty = self.model.ty(id);
        ty.is_document() && !is_carrier(ty) && !self.order.is_excluded(id)
    }

    fn single(&self, ty: TypeRef, container: Container) -> Option<TypeId> {
        match (ty, container) {
            (TypeRef::Named(id), Container::None | Container::Optional) => Some(id),
            _ => None,
        }
    }

    /// Type named `kind` in the operation's version, preferring the operation's group
    fn lookup(&self, op: &OperationDef, kind: &str, documents_only: bool) -> Option<TypeId> {
        let mut found: Vec<TypeId> = self
            .model
            .find(&op.version, kind)
            .into_iter()
            .filter(|id| !self.order.is_excluded(*id))
            .filter(|id| !documents_only || self.eligible(*id))
            .collect();
        found.sort_by(|a, b| {
            let (ga, gb) = (
                self.model.ty(*a).group.as_deref(),
                self.model.ty(*b).group.as_deref(),
            );
            let own = op.group.as_deref();
            (ga != own)
                .cmp(&(gb != own))
                .then_with(|| group_order(ga, gb))
        });
        found.first().copied()
    }

    fn override_target(&self, op: &OperationDef) -> Option<TypeId> {
        let name = op.method_name.as_str();
        if let Some((_, kind)) = OVERRIDES.iter().find(|(n, _)| *n == name) {
            return self.lookup(op, kind, false);
        }
        let unscoped = |rest: &str| -> String {
            rest.strip_prefix("Namespaced").unwrap_or(rest).to_string()
        };
        if let Some(rest) = name.strip_prefix("deleteCollection") {
            let kind = unscoped(rest);
            return self
                .lookup(op, &format!("{}List", kind), true)
                .or_else(|| self.lookup(op, &kind, true));
        }
        if let Some(rest) = name.strip_prefix("delete") {
            return self.lookup(op, &unscoped(rest), true);
        }
        if let Some(rest) = name.strip_prefix("watch") {
            let kind = unscoped(rest);
            let kind = kind.strip_suffix("ForAllNamespaces").unwrap_or(&kind);
            return self.lookup(op, kind, true).or_else(|| {
                kind.strip_suffix("List")
                    .and_then(|single| self.lookup(op, single, true))
            });
        }
        None
    }

    fn classify(&self, op: &OperationDef) -> Option<(TypeId, BindingKind, BindRule)> {
        if let Some(body) = op.body() {
            if let Some(id) = self.single(body.ty, body.container) {
                if self.eligible(id) {
                    return Some((id, BindingKind::Instance, BindRule::Body));
                }
            }
        }
        if let Some((ty, container)) = op.response {
            if let Some(id) = self.single(ty, container) {
                if self.eligible(id) {
                    return Some((id, BindingKind::Static, BindRule::Response));
                }
            }
        }
        self.override_target(op)
            .map(|id| (id, BindingKind::Static, BindRule::Override))
    }
}

/// Bind every operation of a release
pub fn bind_release(
    model: &ReleaseModel,
    names: &NameRegistry,
    order: &ReleaseOrder,
    diags: &mut Diagnostics,
) -> Bindings {
    let _span = tracing::info_span!("bind", release = %model.label).entered();
    let binder = Binder { model, order };
    let mut bindings = Bindings::default();

    // method names are unique per version of the class they land on
    let mut used: HashMap<SmolStr, HashSet<SmolStr>> = HashMap::new();
    for (version, vm) in &model.versions {
        for op_id in &vm.operations {
            let op = model.op(*op_id);
            if !op.is_bindable() {
                bindings.unbound.push(op.id);
                diags.record(
                    AnomalyKind::UnboundOperation,
                    Some(version),
                    op.operation_id.clone(),
                    format!("references undefined {}", op.missing.join(", ")),
                );
                continue;
            }
            if let Some(excluded) = op.referenced_types().find(|id| order.is_excluded(*id)) {
                bindings.unbound.push(op.id);
                diags.record(
                    AnomalyKind::UnboundOperation,
                    Some(version),
                    op.operation_id.clone(),
                    format!("references excluded type {}", names.resolved(excluded)),
                );
                continue;
            }
            let Some((target, kind, rule)) = binder.classify(op) else {
                bindings.unbound.push(op.id);
                diags.record(
                    AnomalyKind::UnboundOperation,
                    Some(version),
                    op.operation_id.clone(),
                    "no class fits",
                );
                continue;
            };

            let target_version = model.ty(target).version.clone();
            let method_name = unique_method_name(op, used.entry(target_version).or_default());
            tracing::debug!(
                operation = %op.operation_id,
                target = %names.resolved(target),
                method = %method_name,
                ?kind,
                ?rule,
                "bound operation"
            );
            bindings.push(MethodBinding {
                op: op.id,
                target,
                kind,
                rule,
                method_name,
            });
        }
    }

    bindings
}

fn unique_method_name(op: &OperationDef, used: &mut HashSet<SmolStr>) -> SmolStr {
    let short = SmolStr::from(op.method_name.to_snake_case());
    let long = SmolStr::from(op.operation_id.to_snake_case());
    let mut name = if used.contains(&short) || RESERVED.contains(&short.as_str()) {
        long
    } else {
        short
    };
    let base = name.clone();
    let mut n = 2;
    while used.contains(&name) || RESERVED.contains(&name.as_str()) {
        name = format!("{}_{}", base, n).into();
        n += 1;
    }
    used.insert(name.clone());
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest;
    use crate::order::order_release;
    use crate::swagger::SwaggerDoc;
    use serde_json::{Value, json};

    fn d(key: &str) -> Value {
        json!({ "$ref": format!("#/definitions/{}", key) })
    }

    fn document(group: &str, kind: &str) -> Value {
        json!({
            "type": "object",
            "x-kubernetes-group-version-kind": [{ "group": group, "version": "v1", "kind": kind }],
            "properties": {
                "apiVersion": { "type": "string" },
                "kind": { "type": "string" },
                "metadata": d("io.k8s.apimachinery.pkg.apis.meta.v1.ObjectMeta")
            }
        })
    }

    fn ok(schema: Value) -> Value {
        json!({ "200": { "description": "OK", "schema": schema } })
    }

    fn fixture() -> Value {
        let body = |key: &str| json!({ "name": "body", "in": "body", "required": true, "schema": d(key) });
        let ns = json!({ "name": "namespace", "in": "path", "required": true, "type": "string" });
        let name = json!({ "name": "name", "in": "path", "required": true, "type": "string" });
        json!({
            "definitions": {
                "io.k8s.api.core.v1.Pod": document("", "Pod"),
                "io.k8s.api.core.v1.PodList": {
                    "type": "object",
                    "x-kubernetes-group-version-kind": [{ "group": "", "version": "v1", "kind": "PodList" }],
                    "properties": {
                        "apiVersion": { "type": "string" },
                        "kind": { "type": "string" },
                        "items": { "type": "array", "items": d("io.k8s.api.core.v1.Pod") }
                    }
                },
                "io.k8s.api.core.v1.Event": document("", "Event"),
                "io.k8s.api.events.v1.Event": document("events.k8s.io", "Event"),
                "io.k8s.apimachinery.pkg.apis.meta.v1.ObjectMeta": {
                    "type": "object",
                    "properties": { "name": { "type": "string" }, "namespace": { "type": "string" } }
                },
                "io.k8s.apimachinery.pkg.apis.meta.v1.Status": document("", "Status"),
                "io.k8s.apimachinery.pkg.apis.meta.v1.DeleteOptions": {
                    "type": "object",
                    "properties": { "gracePeriodSeconds": { "type": "integer" } }
                },
                "io.k8s.apimachinery.pkg.apis.meta.v1.WatchEvent": {
                    "type": "object",
                    "properties": { "type": { "type": "string" } }
                },
                "io.k8s.apimachinery.pkg.version.Info": {
                    "type": "object",
                    "properties": { "major": { "type": "string" } }
                }
            },
            "paths": {
                "/api/v1/namespaces/{namespace}/pods": {
                    "parameters": [ns],
                    "post": {
                        "operationId": "createCoreV1NamespacedPod",
                        "parameters": [body("io.k8s.api.core.v1.Pod")],
                        "responses": ok(d("io.k8s.api.core.v1.Pod"))
                    },
                    "get": {
                        "operationId": "listCoreV1NamespacedPod",
                        "parameters": [{ "name": "watch", "in": "query", "type": "boolean" }],
                        "responses": ok(d("io.k8s.api.core.v1.PodList"))
                    },
                    "delete": {
                        "operationId": "deleteCoreV1CollectionNamespacedPod",
                        "responses": ok(d("io.k8s.apimachinery.pkg.apis.meta.v1.Status"))
                    }
                },
                "/api/v1/namespaces/{namespace}/pods/{name}": {
                    "parameters": [ns, name],
                    "get": {
                        "operationId": "readCoreV1NamespacedPod",
                        "responses": ok(d("io.k8s.api.core.v1.Pod"))
                    },
                    "delete": {
                        "operationId": "deleteCoreV1NamespacedPod",
                        "parameters": [body("io.k8s.apimachinery.pkg.apis.meta.v1.DeleteOptions")],
                        "responses": ok(d("io.k8s.apimachinery.pkg.apis.meta.v1.Status"))
                    }
                },
                "/api/v1/namespaces/{namespace}/pods/{name}/log": {
                    "parameters": [ns, name],
                    "get": {
                        "operationId": "readCoreV1NamespacedPodLog",
                        "responses": ok(json!({ "type": "string" }))
                    }
                },
                "/api/v1/namespaces/{namespace}/pods/{name}/proxy": {
                    "parameters": [ns, name],
                    "options": {
                        "operationId": "connectCoreV1OptionsNamespacedPodProxy",
                        "responses": ok(json!({ "type": "string" }))
                    }
                },
                "/api/v1/watch/namespaces/{namespace}/pods/{name}": {
                    "parameters": [ns, name],
                    "get": {
                        "operationId": "watchCoreV1NamespacedPod",
                        "responses": ok(d("io.k8s.apimachinery.pkg.apis.meta.v1.WatchEvent"))
                    }
                },
                "/api/v1/namespaces/{namespace}/events": {
                    "parameters": [ns],
                    "post": {
                        "operationId": "createCoreV1NamespacedEvent",
                        "parameters": [body("io.k8s.api.core.v1.Event")],
                        "responses": ok(d("io.k8s.api.core.v1.Event"))
                    }
                },
                "/apis/events.k8s.io/v1/namespaces/{namespace}/events": {
                    "parameters": [ns],
                    "post": {
                        "operationId": "createEventsV1NamespacedEvent",
                        "parameters": [body("io.k8s.api.events.v1.Event")],
                        "responses": ok(d("io.k8s.api.events.v1.Event"))
                    }
                },
                "/api/v1/namespaces/{namespace}/gadgets": {
                    "parameters": [ns],
                    "get": {
                        "operationId": "listCoreV1NamespacedGadget",
                        "responses": ok(d("io.k8s.api.core.v1.GadgetList"))
                    }
                },
                "/version/": {
                    "get": {
                        "operationId": "getCodeVersion",
                        "responses": ok(d("io.k8s.apimachinery.pkg.version.Info"))
                    }
                }
            }
        })
    }

    fn build() -> (ReleaseModel, NameRegistry, Bindings) {
        let doc: SwaggerDoc = serde_json::from_value(fixture()).unwrap();
        let mut diags = Diagnostics::new("test");
        let model = ingest("test", &doc, &mut diags);
        let names = NameRegistry::resolve(&model, &Default::default());
        let order = order_release(&model, &names, &mut diags);
        let bindings = bind_release(&model, &names, &order, &mut diags);
        (model, names, bindings)
    }

    fn binding<'a>(model: &ReleaseModel, bindings: &'a Bindings, op: &str) -> Option<&'a MethodBinding> {
        bindings.binding_of(model.find_operation(op).unwrap())
    }

    #[test]
    fn test_body_and_response_rules() {
        let (model, names, bindings) = build();
        let create = binding(&model, &bindings, "createCoreV1NamespacedPod").unwrap();
        assert_eq!(names.resolved(create.target), "Pod");
        assert_eq!(create.kind, BindingKind::Instance);
        assert_eq!(create.rule, BindRule::Body);
        assert_eq!(create.method_name, "create_namespaced_pod");

        let list = binding(&model, &bindings, "listCoreV1NamespacedPod").unwrap();
        assert_eq!(names.resolved(list.target), "PodList");
        assert_eq!(list.kind, BindingKind::Static);
        assert_eq!(list.rule, BindRule::Response);
    }

    #[test]
    fn test_carrier_operations_use_patterns() {
        let (model, names, bindings) = build();
        let delete = binding(&model, &bindings, "deleteCoreV1NamespacedPod").unwrap();
        assert_eq!(names.resolved(delete.target), "Pod");
        assert_eq!(delete.rule, BindRule::Override);
        assert_eq!(delete.kind, BindingKind::Static);

        let collection = binding(&model, &bindings, "deleteCoreV1CollectionNamespacedPod").unwrap();
        assert_eq!(names.resolved(collection.target), "PodList");

        let watch = binding(&model, &bindings, "watchCoreV1NamespacedPod").unwrap();
        assert_eq!(names.resolved(watch.target), "Pod");

        let log = binding(&model, &bindings, "readCoreV1NamespacedPodLog").unwrap();
        assert_eq!(names.resolved(log.target), "Pod");

        let version = binding(&model, &bindings, "getCodeVersion").unwrap();
        assert_eq!(names.resolved(version.target), "Info");
    }

    #[test]
    fn test_unbound_operations() {
        let (model, _names, bindings) = build();
        for op in ["connectCoreV1OptionsNamespacedPodProxy", "listCoreV1NamespacedGadget"] {
            let id = model.find_operation(op).unwrap();
            assert!(bindings.binding_of(id).is_none(), "{op} should be unbound");
            assert!(bindings.unbound.contains(&id));
        }
        assert_eq!(bindings.bound_count() + bindings.unbound.len(), model.operations.len());
    }

    #[test]
    fn test_duplicate_method_name_falls_back_to_operation_id() {
        let (model, names, bindings) = build();
        let core = binding(&model, &bindings, "createCoreV1NamespacedEvent").unwrap();
        let events = binding(&model, &bindings, "createEventsV1NamespacedEvent").unwrap();
        assert_eq!(core.method_name, "create_namespaced_event");
        assert_eq!(events.method_name, "createEventsV1NamespacedEvent".to_snake_case());
        assert_eq!(names.resolved(core.target), "Event");
        assert_eq!(names.resolved(events.target), "Event_events");
    }
}
