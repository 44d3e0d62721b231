//! CRUD synthesis: pick the operations that play create/read/update/delete
//! for each document type.

use crate::bind::Bindings;
use crate::model::{OpId, ReleaseModel, TypeId};
use crate::order::ReleaseOrder;
use keel_model::UpdateKind;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Create,
    Read,
    Patch,
    Replace,
    Delete,
}

impl Role {
    const ALL: [Role; 5] = [
        Role::Create,
        Role::Read,
        Role::Patch,
        Role::Replace,
        Role::Delete,
    ];

    fn prefix(self) -> &'static str {
        match self {
            Role::Create => "create",
            Role::Read => "read",
            Role::Patch => "patch",
            Role::Replace => "replace",
            Role::Delete => "delete",
        }
    }

    /// Role of `method_name` on a type named `kind`, if any
    pub fn of(method_name: &str, kind: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| {
            method_name
                .strip_prefix(role.prefix())
                .map(|rest| rest.strip_prefix("Namespaced").unwrap_or(rest))
                .is_some_and(|rest| rest == kind)
        })
    }
}

/// Operations backing the CRUD surface of one document type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrudPlan {
    pub target: TypeId,
    pub create: OpId,
    pub read: Option<OpId>,
    pub update: Option<(OpId, UpdateKind)>,
    pub delete: OpId,
}

#[derive(Debug, Default)]
struct Found {
    create: Option<OpId>,
    read: Option<OpId>,
    patch: Option<OpId>,
    replace: Option<OpId>,
    delete: Option<OpId>,
}

/// Synthesize CRUD plans for every qualifying document, keyed by type
pub fn synthesize(
    model: &ReleaseModel,
    order: &ReleaseOrder,
    bindings: &Bindings,
) -> BTreeMap<TypeId, CrudPlan> {
    let mut found: BTreeMap<TypeId, Found> = BTreeMap::new();
    for (target, methods) in bindings.iter() {
        let ty = model.ty(*target);
        if !ty.is_document() || order.is_excluded(*target) {
            continue;
        }
        for binding in methods {
            let op = model.op(binding.op);
            let Some(role) = Role::of(&op.method_name, &ty.name) else {
                continue;
            };
            let slot = found.entry(*target).or_default();
            let cell = match role {
                Role::Create => &mut slot.create,
                Role::Read => &mut slot.read,
                Role::Patch => &mut slot.patch,
                Role::Replace => &mut slot.replace,
                Role::Delete => &mut slot.delete,
            };
            // first in source order wins
            cell.get_or_insert(op.id);
        }
    }

    found
        .into_iter()
        .filter_map(|(target, f)| {
            let (Some(create), Some(delete)) = (f.create, f.delete) else {
                tracing::debug!(
                    kind = %model.ty(target).name,
                    "no create/delete pair, skipping CRUD"
                );
                return None;
            };
            let update = f
                .patch
                .map(|op| (op, UpdateKind::MergePatch))
                .or(f.replace.map(|op| (op, UpdateKind::Replace)));
            Some((
                target,
                CrudPlan {
                    target,
                    create,
                    read: f.read,
                    update,
                    delete,
                },
            ))
        })
        .collect()
}
