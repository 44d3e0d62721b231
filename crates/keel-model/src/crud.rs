//! Uniform create/read/update/delete surface for document types.
//!
//! A generated document type opts in by implementing [`Crud`] with a
//! [`CrudOps`] constant naming the low-level operations that play each role.
//! Every method here is blocking; the async path is the bound operations.

use crate::call::{ApiCall, Verb};
use crate::client::ApiClient;
use crate::document::Document;
use crate::error::{ClientError, CrudError, DecodeError, EncodeError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ops::Deref;

/// How an update is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// `PATCH` with `application/merge-patch+json`
    MergePatch,
    /// `PUT` of the full representation
    Replace,
}

/// One low-level operation used by the CRUD surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSpec {
    /// HTTP verb
    pub verb: Verb,
    /// Path template with `{namespace}` / `{name}` placeholders
    pub path: &'static str,
    /// Whether the path is addressed within a namespace
    pub namespaced: bool,
}

/// The update operation together with its semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOp {
    /// Operation descriptor
    pub op: OpSpec,
    /// Patch or replace
    pub kind: UpdateKind,
}

/// Operations backing the four CRUD roles of one document type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrudOps {
    /// Creation
    pub create: OpSpec,
    /// Single-item retrieval, if the schema exposes one
    pub read: Option<OpSpec>,
    /// Partial update, else full replacement, if either exists
    pub update: Option<UpdateOp>,
    /// Deletion
    pub delete: OpSpec,
}

/// What the server answered to a deletion
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteStatus {
    /// A generic status object
    Status(Value),
    /// The resource's final (or terminating) representation
    Resource(Value),
    /// No body
    Empty,
}

impl DeleteStatus {
    fn from_value(value: Value) -> Self {
        if value.is_null() {
            Self::Empty
        } else if value.get("kind").and_then(Value::as_str) == Some("Status") {
            Self::Status(value)
        } else {
            Self::Resource(value)
        }
    }
}

/// Result of [`Crud::delete`].
///
/// Dereferences to the unchanged instance; the server's answer is kept
/// beside it instead of being written into the instance.
#[derive(Debug)]
pub struct Deleted<'a, T> {
    object: &'a T,
    status: DeleteStatus,
}

impl<'a, T> Deleted<'a, T> {
    /// The instance that was deleted
    pub fn object(&self) -> &'a T {
        self.object
    }

    /// Server answer
    pub fn status(&self) -> &DeleteStatus {
        &self.status
    }

    /// Take the server answer
    pub fn into_status(self) -> DeleteStatus {
        self.status
    }
}

impl<T: DeserializeOwned> Deleted<'_, T> {
    /// Decode the returned representation, when the server sent the resource back
    pub fn returned_resource(&self) -> Option<Result<T, DecodeError>> {
        match &self.status {
            DeleteStatus::Resource(value) => {
                Some(serde_json::from_value(value.clone()).map_err(DecodeError::from))
            }
            _ => None,
        }
    }
}

impl<T> Deref for Deleted<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.object
    }
}

/// Reconcile an explicit namespace argument with the object's own metadata.
///
/// Disagreement always fails; cluster-scoped operations need neither.
pub fn resolve_namespace<'a>(
    kind: &'static str,
    namespaced: bool,
    explicit: Option<&'a str>,
    metadata: Option<&'a str>,
) -> Result<Option<&'a str>, CrudError> {
    match (explicit, metadata) {
        (Some(e), Some(m)) if e != m => Err(CrudError::NamespaceMismatch {
            explicit: e.to_owned(),
            metadata: m.to_owned(),
        }),
        (ns, other) => {
            let ns = ns.or(other);
            match (namespaced, ns) {
                (true, None) => Err(CrudError::MissingNamespace { kind }),
                (true, Some(ns)) => Ok(Some(ns)),
                (false, _) => Ok(None),
            }
        }
    }
}

/// Deep-merge `patch` into `target`: objects merge key by key, everything
/// else is overwritten by `patch`.
pub fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

fn call_for<R>(op: &OpSpec, namespace: Option<&str>, name: Option<&str>) -> ApiCall<R> {
    let mut call = ApiCall::new(op.verb, op.path);
    if let Some(ns) = namespace {
        call = call.path_param("namespace", ns);
    }
    if let Some(name) = name {
        call = call.path_param("name", name);
    }
    call
}

/// Create/read/update/delete capability for a document type.
pub trait Crud: Document + Serialize + DeserializeOwned + Clone {
    /// Operations backing each role
    const OPS: CrudOps;

    /// Merge a server representation into `self`, response fields winning
    fn absorb(&mut self, response: Value) -> Result<(), CrudError> {
        if response.is_null() {
            return Ok(());
        }
        let mut current = serde_json::to_value(&*self)
            .map_err(|e| CrudError::Client(ClientError::Encode(EncodeError::Json(e))))?;
        merge_json(&mut current, response);
        *self = serde_json::from_value(current).map_err(DecodeError::from)?;
        Ok(())
    }

    /// Create this object remotely and merge the stored representation back.
    ///
    /// When the object already exists (`409 Conflict`) its current state is read
    /// and merged instead, so repeated creation is harmless.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(kind = Self::KIND)))]
    fn create<C: ApiClient + ?Sized>(&mut self, client: &C) -> Result<&mut Self, CrudError> {
        let op = Self::OPS.create;
        let ns = resolve_namespace(Self::KIND, op.namespaced, None, self.namespace())?;
        let result = call_for::<Value>(&op, ns, None)
            .json_body(&*self)
            .send(client);
        match result {
            Ok(response) => {
                let value = response.value()?;
                self.absorb(value)?;
                Ok(self)
            }
            Err(err) if err.is_conflict() => {
                #[cfg(feature = "tracing")]
                tracing::debug!(kind = Self::KIND, name = ?self.name(), "already exists, reading instead");
                if Self::OPS.read.is_some() {
                    self.read_into(client, None)
                } else {
                    Ok(self)
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Fetch an object by name (and namespace, for namespaced kinds)
    fn read<C: ApiClient + ?Sized>(
        client: &C,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Self, CrudError> {
        let op = Self::OPS.read.ok_or(CrudError::Unsupported {
            kind: Self::KIND,
            role: "read",
        })?;
        let ns = resolve_namespace(Self::KIND, op.namespaced, namespace, None)?;
        let response = call_for::<Self>(&op, ns, Some(name)).send(client)?;
        Ok(response.parse()?)
    }

    /// Fetch this object's current state and merge it into `self`
    fn read_into<C: ApiClient + ?Sized>(
        &mut self,
        client: &C,
        namespace: Option<&str>,
    ) -> Result<&mut Self, CrudError> {
        let op = Self::OPS.read.ok_or(CrudError::Unsupported {
            kind: Self::KIND,
            role: "read",
        })?;
        let name = self
            .name()
            .ok_or(CrudError::MissingName { kind: Self::KIND })?
            .to_owned();
        let ns = resolve_namespace(Self::KIND, op.namespaced, namespace, self.namespace())?
            .map(str::to_owned);
        let response = call_for::<Value>(&op, ns.as_deref(), Some(&name)).send(client)?;
        let value = response.value()?;
        self.absorb(value)?;
        Ok(self)
    }

    /// Push local changes, as a merge patch when the schema allows one
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(kind = Self::KIND)))]
    fn update<C: ApiClient + ?Sized>(&mut self, client: &C) -> Result<&mut Self, CrudError> {
        let update = Self::OPS.update.ok_or(CrudError::Unsupported {
            kind: Self::KIND,
            role: "update",
        })?;
        let name = self
            .name()
            .ok_or(CrudError::MissingName { kind: Self::KIND })?
            .to_owned();
        let ns = resolve_namespace(Self::KIND, update.op.namespaced, None, self.namespace())?
            .map(str::to_owned);
        let response = call_for::<Value>(&update.op, ns.as_deref(), Some(&name))
            .json_body(&*self)
            .send(client)?;
        let value = response.value()?;
        self.absorb(value)?;
        Ok(self)
    }

    /// Delete this object by name and namespace only; no body is sent
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(kind = Self::KIND)))]
    fn delete<C: ApiClient + ?Sized>(
        &self,
        client: &C,
        namespace: Option<&str>,
    ) -> Result<Deleted<'_, Self>, CrudError> {
        let op = Self::OPS.delete;
        let name = self.name().ok_or(CrudError::MissingName { kind: Self::KIND })?;
        let ns = resolve_namespace(Self::KIND, op.namespaced, namespace, self.namespace())?;
        let response = call_for::<Value>(&op, ns, Some(name)).send(client)?;
        Ok(Deleted {
            object: self,
            status: DeleteStatus::from_value(response.value()?),
        })
    }

    /// Read, let `f` change the fresh instance, then update it.
    ///
    /// If `f` fails nothing is sent and the error comes back as
    /// [`CrudError::Aborted`].
    fn modify<C, F, E>(
        client: &C,
        name: &str,
        namespace: Option<&str>,
        f: F,
    ) -> Result<Self, CrudError>
    where
        C: ApiClient + ?Sized,
        F: FnOnce(&mut Self) -> Result<(), E>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let mut object = Self::read(client, name, namespace)?;
        f(&mut object).map_err(|e| CrudError::Aborted(e.into()))?;
        object.update(client)?;
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut target = json!({"metadata": {"name": "a", "labels": {"x": "1"}}, "spec": {"r": 1}});
        merge_json(
            &mut target,
            json!({"metadata": {"uid": "u1", "labels": {"y": "2"}}, "spec": {"r": 3}}),
        );
        assert_eq!(
            target,
            json!({"metadata": {"name": "a", "uid": "u1", "labels": {"x": "1", "y": "2"}}, "spec": {"r": 3}})
        );
    }

    #[test]
    fn test_namespace_rules() {
        assert!(matches!(
            resolve_namespace("Pod", true, Some("a"), Some("b")),
            Err(CrudError::NamespaceMismatch { .. })
        ));
        assert!(matches!(
            resolve_namespace("Pod", true, None, None),
            Err(CrudError::MissingNamespace { kind: "Pod" })
        ));
        assert_eq!(resolve_namespace("Pod", true, None, Some("b")).unwrap(), Some("b"));
        assert_eq!(resolve_namespace("Pod", true, Some("b"), Some("b")).unwrap(), Some("b"));
        assert_eq!(resolve_namespace("Node", false, None, None).unwrap(), None);
        assert!(resolve_namespace("Node", false, Some("a"), Some("b")).is_err());
    }

    #[test]
    fn test_delete_status_classification() {
        assert_eq!(DeleteStatus::from_value(Value::Null), DeleteStatus::Empty);
        assert!(matches!(
            DeleteStatus::from_value(json!({"kind": "Status", "status": "Success"})),
            DeleteStatus::Status(_)
        ));
        assert!(matches!(
            DeleteStatus::from_value(json!({"kind": "Pod"})),
            DeleteStatus::Resource(_)
        ));
    }
}
