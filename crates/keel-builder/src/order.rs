//! Dependency ordering per version.
//!
//! Every emitted type comes after the same-version types it references. A
//! two-member cycle is broken by splitting one member into a base type (its
//! properties that do not reach the partner) and a derived type that embeds the
//! base and adds the cycle-closing properties; the partner then refers to the
//! base. Larger cycles, cycles that run through more than one version, and
//! everything that depends on them, are excluded.

use crate::diagnostics::{AnomalyKind, Diagnostics};
use crate::model::{ReleaseModel, TypeId};
use crate::names::NameRegistry;
use smol_str::SmolStr;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One emitted item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Emit {
    Plain(TypeId),
    /// Synthesized base of a split type
    Base(TypeId),
    /// The split type itself, embedding its base
    Derived(TypeId),
}

impl Emit {
    pub fn type_id(&self) -> TypeId {
        match self {
            Self::Plain(id) | Self::Base(id) | Self::Derived(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub target: TypeId,
    pub partner: TypeId,
    pub base_name: SmolStr,
    /// Indexes of the target's properties that stay on the derived type
    pub closing: Vec<usize>,
}

impl Split {
    pub fn is_closing(&self, property: usize) -> bool {
        self.closing.contains(&property)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VersionOrder {
    pub version: SmolStr,
    pub items: Vec<Emit>,
    pub splits: Vec<Split>,
}

#[derive(Debug, Clone, Default)]
pub struct ReleaseOrder {
    pub versions: BTreeMap<SmolStr, VersionOrder>,
    pub excluded: BTreeSet<TypeId>,
    splits: HashMap<TypeId, Split>,
}

impl ReleaseOrder {
    pub fn is_excluded(&self, id: TypeId) -> bool {
        self.excluded.contains(&id)
    }

    pub fn version(&self, version: &str) -> Option<&VersionOrder> {
        self.versions.get(version)
    }

    pub fn split_of(&self, target: TypeId) -> Option<&Split> {
        self.splits.get(&target)
    }

    /// Name to use when `referrer` mentions `referenced`, if it is a split base
    pub fn base_ref(&self, referrer: TypeId, referenced: TypeId) -> Option<&SmolStr> {
        self.splits
            .get(&referenced)
            .filter(|s| s.partner == referrer)
            .map(|s| &s.base_name)
    }
}

/// Tarjan's strongly connected components over `nodes`, visiting in the given order
fn tarjan(nodes: &[TypeId], edges: &HashMap<TypeId, Vec<TypeId>>) -> Vec<Vec<TypeId>> {
    struct State<'a> {
        edges: &'a HashMap<TypeId, Vec<TypeId>>,
        index: usize,
        indices: HashMap<TypeId, usize>,
        lowlink: HashMap<TypeId, usize>,
        stack: Vec<TypeId>,
        on_stack: BTreeSet<TypeId>,
        out: Vec<Vec<TypeId>>,
    }

    fn visit(s: &mut State<'_>, v: TypeId) {
        s.indices.insert(v, s.index);
        s.lowlink.insert(v, s.index);
        s.index += 1;
        s.stack.push(v);
        s.on_stack.insert(v);

        let next: Vec<TypeId> = s.edges.get(&v).cloned().unwrap_or_default();
        for w in next {
            if !s.indices.contains_key(&w) {
                visit(s, w);
                let low = s.lowlink[&v].min(s.lowlink[&w]);
                s.lowlink.insert(v, low);
            } else if s.on_stack.contains(&w) {
                let low = s.lowlink[&v].min(s.indices[&w]);
                s.lowlink.insert(v, low);
            }
        }

        if s.lowlink[&v] == s.indices[&v] {
            let mut component = Vec::new();
            while let Some(w) = s.stack.pop() {
                s.on_stack.remove(&w);
                component.push(w);
                if w == v {
                    break;
                }
            }
            s.out.push(component);
        }
    }

    let mut state = State {
        edges,
        index: 0,
        indices: HashMap::new(),
        lowlink: HashMap::new(),
        stack: Vec::new(),
        on_stack: BTreeSet::new(),
        out: Vec::new(),
    };
    for node in nodes {
        if !state.indices.contains_key(node) {
            visit(&mut state, *node);
        }
    }
    state.out
}

/// Order every version of a release
pub fn order_release(
    model: &ReleaseModel,
    names: &NameRegistry,
    diags: &mut Diagnostics,
) -> ReleaseOrder {
    let _span = tracing::info_span!("order", release = %model.label).entered();
    let mut order = ReleaseOrder::default();
    let mut candidates: Vec<(TypeId, TypeId)> = Vec::new();

    let mut nodes: Vec<TypeId> = model.versions.values().flat_map(|vm| vm.types.iter().copied()).collect();
    nodes.sort_by(|a, b| {
        let (ta, tb) = (model.ty(*a), model.ty(*b));
        (&ta.version, names.resolved(*a)).cmp(&(&tb.version, names.resolved(*b)))
    });
    let edges = reference_edges(model, names, &nodes);

    for mut component in tarjan(&nodes, &edges) {
        if component.len() < 2 {
            continue;
        }
        component.sort_by(|a, b| names.resolved(*a).cmp(names.resolved(*b)));
        let versions: BTreeSet<&SmolStr> = component.iter().map(|id| &model.ty(*id).version).collect();
        if component.len() == 2 && versions.len() == 1 {
            candidates.push((component[0], component[1]));
            continue;
        }
        let members = component
            .iter()
            .map(|id| {
                let ty = model.ty(*id);
                format!("{}.{}", ty.version, names.resolved(*id))
            })
            .collect::<Vec<_>>()
            .join(", ");
        let reason = if versions.len() > 1 {
            format!("member of a cycle across versions ({})", members)
        } else {
            format!("member of a {}-type cycle ({})", component.len(), members)
        };
        for id in &component {
            order.excluded.insert(*id);
            diags.record(
                AnomalyKind::UnsupportedCycle,
                Some(&model.ty(*id).version),
                names.resolved(*id).clone(),
                reason.clone(),
            );
        }
    }

    // exclusions propagate to every referrer, across versions
    loop {
        let newly: Vec<(TypeId, TypeId)> = model
            .types
            .iter()
            .filter(|t| !order.excluded.contains(&t.id))
            .filter_map(|t| {
                t.references()
                    .find(|r| order.excluded.contains(r))
                    .map(|r| (t.id, r))
            })
            .collect();
        if newly.is_empty() {
            break;
        }
        for (id, culprit) in newly {
            order.excluded.insert(id);
            diags.record(
                AnomalyKind::DependsOnExcluded,
                Some(&model.ty(id).version),
                names.resolved(id).clone(),
                format!("references excluded type {}", names.resolved(culprit)),
            );
        }
    }

    for (target, partner) in candidates {
        if order.excluded.contains(&target) || order.excluded.contains(&partner) {
            continue;
        }
        let ty = model.ty(target);
        let closing = ty
            .properties
            .iter()
            .enumerate()
            .filter(|(_, p)| matches!(p.ty.named(), Some(r) if r == partner || r == target))
            .map(|(i, _)| i)
            .collect();
        let resolved = names.resolved(target);
        let taken = |candidate: &str| {
            model
                .version(&ty.version)
                .is_some_and(|vm| vm.types.iter().any(|t| names.resolved(*t) == candidate))
        };
        let mut base_name = SmolStr::from(format!("{}Base", resolved));
        if taken(&base_name) {
            base_name = format!("{}SplitBase", resolved).into();
        }
        tracing::debug!(
            target = %resolved,
            partner = %names.resolved(partner),
            base = %base_name,
            "splitting two-type cycle"
        );
        order.splits.insert(
            target,
            Split {
                target,
                partner,
                base_name,
                closing,
            },
        );
    }

    for (version, vm) in &model.versions {
        let version_order = kahn(model, names, &order, version, &vm.types, diags);
        order.excluded.extend(
            vm.types
                .iter()
                .filter(|id| !version_order.items.iter().any(|e| e.type_id() == **id))
                .copied()
                .collect::<Vec<_>>(),
        );
        order.versions.insert(version.clone(), version_order);
    }

    order
}

/// Reference edges between distinct types, in any version
fn reference_edges(
    model: &ReleaseModel,
    names: &NameRegistry,
    nodes: &[TypeId],
) -> HashMap<TypeId, Vec<TypeId>> {
    nodes
        .iter()
        .map(|id| {
            let ty = model.ty(*id);
            let mut deps: Vec<TypeId> = ty
                .references()
                .filter(|r| *r != *id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            deps.sort_by(|a, b| names.resolved(*a).cmp(names.resolved(*b)));
            (*id, deps)
        })
        .collect()
}

fn kahn(
    model: &ReleaseModel,
    names: &NameRegistry,
    order: &ReleaseOrder,
    version: &SmolStr,
    types: &[TypeId],
    diags: &mut Diagnostics,
) -> VersionOrder {
    let live: Vec<TypeId> = types
        .iter()
        .copied()
        .filter(|id| !order.excluded.contains(id))
        .collect();

    let node_for = |referrer: TypeId, referenced: TypeId| match order.split_of(referenced) {
        Some(split) if split.partner == referrer => Emit::Base(referenced),
        Some(_) => Emit::Derived(referenced),
        None => Emit::Plain(referenced),
    };
    let same_version = |id: &TypeId| model.ty(*id).version == *version && !order.excluded.contains(id);

    let mut deps: BTreeMap<Emit, BTreeSet<Emit>> = BTreeMap::new();
    let mut splits = Vec::new();
    for id in &live {
        let ty = model.ty(*id);
        match order.split_of(*id) {
            Some(split) => {
                splits.push(split.clone());
                let mut base = BTreeSet::new();
                let mut derived = BTreeSet::from([Emit::Base(*id)]);
                for (i, prop) in ty.properties.iter().enumerate() {
                    let Some(r) = prop.ty.named() else { continue };
                    if r == *id || !same_version(&r) {
                        continue;
                    }
                    if split.is_closing(i) {
                        derived.insert(node_for(*id, r));
                    } else {
                        base.insert(node_for(*id, r));
                    }
                }
                deps.insert(Emit::Base(*id), base);
                deps.insert(Emit::Derived(*id), derived);
            }
            None => {
                let own = ty
                    .references()
                    .filter(|r| *r != *id && same_version(r))
                    .map(|r| node_for(*id, r))
                    .collect();
                deps.insert(Emit::Plain(*id), own);
            }
        }
    }

    let name_of = |e: &Emit| -> SmolStr {
        match e {
            Emit::Base(id) => order
                .split_of(*id)
                .map(|s| s.base_name.clone())
                .unwrap_or_else(|| names.resolved(*id).clone()),
            Emit::Plain(id) | Emit::Derived(id) => names.resolved(*id).clone(),
        }
    };

    let mut dependents: BTreeMap<Emit, Vec<Emit>> = BTreeMap::new();
    let mut pending: BTreeMap<Emit, usize> = BTreeMap::new();
    for (node, node_deps) in &deps {
        pending.insert(*node, node_deps.len());
        for dep in node_deps {
            dependents.entry(*dep).or_default().push(*node);
        }
    }

    let mut ready: BTreeSet<(SmolStr, Emit)> = pending
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(e, _)| (name_of(e), *e))
        .collect();
    let mut items = Vec::with_capacity(deps.len());
    while let Some(next) = ready.pop_first() {
        let node = next.1;
        items.push(node);
        for dependent in dependents.get(&node).into_iter().flatten() {
            if let Some(n) = pending.get_mut(dependent) {
                *n -= 1;
                if *n == 0 {
                    ready.insert((name_of(dependent), *dependent));
                }
            }
        }
    }

    if items.len() < deps.len() {
        let stuck: BTreeSet<TypeId> = deps
            .keys()
            .filter(|e| !items.contains(e))
            .map(Emit::type_id)
            .collect();
        for id in &stuck {
            diags.record(
                AnomalyKind::UnsupportedCycle,
                Some(version),
                names.resolved(*id).clone(),
                "still cyclic after splitting",
            );
        }
        // drop half-emitted split pairs
        items.retain(|e| !stuck.contains(&e.type_id()));
        splits.retain(|s| !stuck.contains(&s.target));
    }

    tracing::debug!(version = %version, items = items.len(), splits = splits.len(), "ordered version");
    VersionOrder {
        version: version.clone(),
        items,
        splits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest;
    use crate::swagger::SwaggerDoc;
    use serde_json::json;

    fn build(definitions: serde_json::Value) -> (ReleaseModel, NameRegistry, ReleaseOrder, Diagnostics) {
        let doc: SwaggerDoc = serde_json::from_value(json!({ "definitions": definitions, "paths": {} })).unwrap();
        let mut diags = Diagnostics::new("test");
        let model = ingest("test", &doc, &mut diags);
        let names = NameRegistry::resolve(&model, &Default::default());
        let order = order_release(&model, &names, &mut diags);
        (model, names, order, diags)
    }

    fn r(name: &str) -> serde_json::Value {
        json!({ "$ref": format!("#/definitions/x.v1.{}", name) })
    }

    fn labels(names: &NameRegistry, order: &ReleaseOrder) -> Vec<String> {
        order
            .version("v1")
            .unwrap()
            .items
            .iter()
            .map(|e| match e {
                Emit::Base(id) => order.split_of(*id).unwrap().base_name.to_string(),
                Emit::Plain(id) | Emit::Derived(id) => names.resolved(*id).to_string(),
            })
            .collect()
    }

    #[test]
    fn test_dependencies_first() {
        let (_model, names, order, diags) = build(json!({
            "x.v1.Top": { "type": "object", "properties": { "mid": r("Mid"), "leaf": r("Leaf") } },
            "x.v1.Mid": { "type": "object", "properties": { "leaf": r("Leaf") } },
            "x.v1.Leaf": { "type": "object", "properties": { "s": { "type": "string" } } }
        }));
        assert!(diags.is_empty());
        assert_eq!(labels(&names, &order), ["Leaf", "Mid", "Top"]);
    }

    #[test]
    fn test_two_cycle_is_split() {
        let (model, names, order, diags) = build(json!({
            "x.v1.Beta": { "type": "object", "properties": { "alpha": r("Alpha"), "n": { "type": "integer" } } },
            "x.v1.Alpha": { "type": "object", "properties": { "name": { "type": "string" }, "beta": r("Beta") } }
        }));
        assert!(diags.is_empty());
        assert_eq!(labels(&names, &order), ["AlphaBase", "Beta", "Alpha"]);
        let alpha = model.find("v1", "Alpha")[0];
        let beta = model.find("v1", "Beta")[0];
        let split = order.split_of(alpha).unwrap();
        assert_eq!(split.partner, beta);
        assert_eq!(split.closing, vec![1]);
        assert_eq!(order.base_ref(beta, alpha).map(|s| s.as_str()), Some("AlphaBase"));
        assert!(order.excluded.is_empty());
    }

    #[test]
    fn test_three_cycle_excluded_with_dependents() {
        let (model, _names, order, diags) = build(json!({
            "x.v1.Xray": { "type": "object", "properties": { "y": r("Yankee") } },
            "x.v1.Yankee": { "type": "object", "properties": { "z": r("Zulu") } },
            "x.v1.Zulu": { "type": "object", "properties": { "x": r("Xray") } },
            "x.v1.Whiskey": { "type": "object", "properties": { "x": r("Xray") } },
            "x.v1.Ok": { "type": "object", "properties": { "s": { "type": "string" } } }
        }));
        assert_eq!(diags.count(AnomalyKind::UnsupportedCycle), 3);
        assert_eq!(diags.count(AnomalyKind::DependsOnExcluded), 1);
        assert_eq!(order.excluded.len(), 4);
        let items = &order.version("v1").unwrap().items;
        assert_eq!(items, &vec![Emit::Plain(model.find("v1", "Ok")[0])]);
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        let (_model, names, order, diags) = build(json!({
            "x.v1.TreeNode": { "type": "object", "properties": {
                "children": { "type": "array", "items": r("TreeNode") },
                "parent": r("TreeNode")
            } }
        }));
        assert!(diags.is_empty());
        assert_eq!(order.version("v1").unwrap().items.len(), 1);
        assert_eq!(names.resolved(order.version("v1").unwrap().items[0].type_id()), "TreeNode");
    }

    #[test]
    fn test_cycle_across_versions_is_excluded() {
        let (model, _names, order, diags) = build(json!({
            "x.v1.Left": { "type": "object", "properties": { "right": { "$ref": "#/definitions/x.v2.Right" } } },
            "x.v2.Right": { "type": "object", "properties": { "left": r("Left") } },
            "x.v2.Holder": { "type": "object", "properties": { "right": { "$ref": "#/definitions/x.v2.Right" } } },
            "x.v2.Plain": { "type": "object", "properties": { "left": r("Left"), "s": { "type": "string" } } }
        }));
        let left = model.find("v1", "Left")[0];
        let right = model.find("v2", "Right")[0];
        assert!(order.is_excluded(left));
        assert!(order.is_excluded(right));
        assert!(order.split_of(left).is_none() && order.split_of(right).is_none());
        assert_eq!(diags.count(AnomalyKind::UnsupportedCycle), 2);
        assert!(
            diags
                .of_kind(AnomalyKind::UnsupportedCycle)
                .all(|a| a.reason.contains("across versions"))
        );
        assert!(
            diags
                .of_kind(AnomalyKind::DependsOnExcluded)
                .any(|a| a.subject == "Holder")
        );
        assert!(order.version("v1").unwrap().items.is_empty());
        assert!(order.version("v2").unwrap().items.is_empty());
    }
}
