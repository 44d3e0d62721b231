//! Name collision resolution within a version.
//!
//! Types sharing a simple name inside one version get exactly one primary
//! holder of the bare name; every other member gets a group-suffixed alias.

use crate::model::{ReleaseModel, TypeId};
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Marker used in aliases when a type has no group
pub const UNGROUPED: &str = "ungrouped";

/// One collision (or a lone name) in a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameEntry {
    pub primary: TypeId,
    pub aliases: Vec<(TypeId, SmolStr)>,
}

#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    entries: BTreeMap<(SmolStr, SmolStr), NameEntry>,
    resolved: Vec<SmolStr>,
}

/// Rank of a group in the fixed tie-break order: `core`, `meta`, the rest
/// alphabetically, no group last.
pub(crate) fn group_order(a: Option<&str>, b: Option<&str>) -> Ordering {
    let rank = |g: Option<&str>| match g {
        Some("core") => 0,
        Some("meta") => 1,
        Some(_) => 2,
        None => 3,
    };
    rank(a).cmp(&rank(b)).then_with(|| a.cmp(&b))
}

fn alias_suffix(group: Option<&str>) -> String {
    group
        .map(|g| g.replace(['.', '-'], "_"))
        .unwrap_or_else(|| UNGROUPED.to_string())
}

impl NameRegistry {
    /// Resolve every version of `model`; a pure function of its inputs
    pub fn resolve(model: &ReleaseModel, preferred: &BTreeMap<SmolStr, Vec<SmolStr>>) -> Self {
        let mut resolved: Vec<SmolStr> = model.types.iter().map(|t| t.name.clone()).collect();
        let mut entries = BTreeMap::new();

        for (version, vm) in &model.versions {
            let mut by_name: BTreeMap<&str, Vec<TypeId>> = BTreeMap::new();
            for id in &vm.types {
                by_name.entry(model.ty(*id).name.as_str()).or_default().push(*id);
            }
            let mut taken: BTreeSet<SmolStr> = by_name.keys().map(|n| SmolStr::from(*n)).collect();

            for (name, mut members) in by_name {
                members.sort_by(|a, b| {
                    let (ta, tb) = (model.ty(*a), model.ty(*b));
                    group_order(ta.group.as_deref(), tb.group.as_deref())
                        .then_with(|| ta.definition_key.cmp(&tb.definition_key))
                });
                let primary = preferred
                    .get(name)
                    .and_then(|groups| {
                        groups.iter().find_map(|g| {
                            members
                                .iter()
                                .copied()
                                .find(|m| model.ty(*m).group.as_deref() == Some(g.as_str()))
                        })
                    })
                    .unwrap_or(members[0]);

                let mut aliases = Vec::new();
                for member in members.into_iter().filter(|m| *m != primary) {
                    let base = format!("{}_{}", name, alias_suffix(model.ty(member).group.as_deref()));
                    let mut alias = SmolStr::from(base.as_str());
                    let mut n = 2;
                    while taken.contains(&alias) {
                        alias = format!("{}_{}", base, n).into();
                        n += 1;
                    }
                    taken.insert(alias.clone());
                    resolved[member.0] = alias.clone();
                    aliases.push((member, alias));
                }
                if !aliases.is_empty() {
                    tracing::debug!(
                        version = %version,
                        name,
                        primary = %model.ty(primary).definition_key,
                        aliases = aliases.len(),
                        "resolved name collision"
                    );
                }
                entries.insert(
                    (version.clone(), SmolStr::from(name)),
                    NameEntry { primary, aliases },
                );
            }
        }

        Self { entries, resolved }
    }

    /// Emitted identifier of a type
    pub fn resolved(&self, id: TypeId) -> &SmolStr {
        &self.resolved[id.0]
    }

    pub fn entry(&self, version: &str, name: &str) -> Option<&NameEntry> {
        self.entries.get(&(SmolStr::from(version), SmolStr::from(name)))
    }

    /// Entries with more than one member
    pub fn collisions(&self) -> impl Iterator<Item = (&(SmolStr, SmolStr), &NameEntry)> {
        self.entries.iter().filter(|(_, e)| !e.aliases.is_empty())
    }

    /// `alias -> primary simple name` for one version
    pub fn deprecations(&self, version: &str) -> BTreeMap<SmolStr, SmolStr> {
        self.entries
            .iter()
            .filter(|((v, _), _)| v == version)
            .flat_map(|((_, name), entry)| {
                entry
                    .aliases
                    .iter()
                    .map(move |(_, alias)| (alias.clone(), name.clone()))
            })
            .collect()
    }

    pub fn alias_count(&self) -> usize {
        self.entries.values().map(|e| e.aliases.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TypeDef, TypeKind, VersionModel};

    fn model(keys: &[&str]) -> ReleaseModel {
        let mut model = ReleaseModel::default();
        for key in keys {
            let (group, version, name) = crate::ingest::split_definition_key(key);
            let id = TypeId(model.types.len());
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
                definition_key: key.to_string(),
                kind: TypeKind::Object,
                properties: vec![],
                required: Default::default(),
                document: None,
                description: None,
            });
        }
        model
    }

    #[test]
    fn test_default_tie_break_prefers_core() {
        let m = model(&["io.k8s.api.events.v1.Event", "io.k8s.api.core.v1.Event"]);
        let names = NameRegistry::resolve(&m, &BTreeMap::new());
        assert_eq!(names.resolved(TypeId(1)), "Event");
        assert_eq!(names.resolved(TypeId(0)), "Event_events");
        assert_eq!(names.deprecations("v1").get("Event_events").unwrap(), "Event");
    }

    #[test]
    fn test_preference_changes_only_primary() {
        let m = model(&[
            "io.k8s.api.core.v1.Event",
            "io.k8s.api.events.v1.Event",
            "io.example.api.audit.v1.Event",
        ]);
        let default = NameRegistry::resolve(&m, &BTreeMap::new());
        let mut preferred = BTreeMap::new();
        preferred.insert(SmolStr::from("Event"), vec![SmolStr::from("events")]);
        let pinned = NameRegistry::resolve(&m, &preferred);

        assert_eq!(default.resolved(TypeId(0)), "Event");
        assert_eq!(pinned.resolved(TypeId(1)), "Event");
        assert_eq!(pinned.resolved(TypeId(0)), "Event_core");
        assert_eq!(default.alias_count(), pinned.alias_count());
        assert_eq!(pinned.alias_count(), 2);
    }

    #[test]
    fn test_alias_clash_gets_numbered() {
        let m = model(&["a.v1.Thing", "z.v1.Thing_ungrouped", "v1.Thing", "b.c.v1.Thing"]);
        // "v1.Thing" has no group
        let names = NameRegistry::resolve(&m, &BTreeMap::new());
        assert_eq!(names.resolved(TypeId(0)), "Thing");
        assert_eq!(names.resolved(TypeId(3)), "Thing_c");
        assert_eq!(names.resolved(TypeId(2)), "Thing_ungrouped_2");
        assert_eq!(names.resolved(TypeId(1)), "Thing_ungrouped");
    }

    #[test]
    fn test_group_chars_sanitized() {
        let m = model(&["x.core.v1.Lease", "x.coordination-k8s.v1.Lease"]);
        let names = NameRegistry::resolve(&m, &BTreeMap::new());
        assert_eq!(names.resolved(TypeId(1)), "Lease_coordination_k8s");
    }
}
