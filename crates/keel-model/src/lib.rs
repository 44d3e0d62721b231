//! # keel-model
//!
//! Runtime support linked by keel-generated cluster API models.
//!
//! - [`ApiCall`] describes one bound operation; send it over an [`ApiClient`]
//!   or an [`AsyncApiClient`].
//! - [`Document`] and [`Crud`] are the capabilities generated document types
//!   implement; `Crud` provides `create`, `read`, `update`, `delete` and `modify`.
//! - [`Registry`] and [`ReleaseSelector`] resolve deprecated type aliases and
//!   pick a release when none is named.
//!
//! ```no_run
//! # use keel_model::{ApiCall, Verb};
//! let call: ApiCall<serde_json::Value> =
//!     ApiCall::new(Verb::Get, "/api/v1/namespaces/{namespace}/pods")
//!         .path_param("namespace", "default")
//!         .query("limit", Some(10));
//! ```

#![warn(missing_docs)]

pub mod call;
pub mod client;
pub mod crud;
pub mod document;
pub mod error;
pub mod registry;
pub mod release;
pub mod types;

pub use call::{ApiCall, Response, Verb};
pub use client::{ApiClient, AsyncApiClient};
#[cfg(feature = "reqwest-client")]
pub use client::Endpoint;
pub use crud::{Crud, CrudOps, DeleteStatus, Deleted, OpSpec, UpdateKind, UpdateOp};
pub use document::Document;
pub use error::{ClientError, ClientResult, CrudError, RegistryError};
pub use registry::{KindRegistry, Registry, RegistryIndex, ReleaseEntry};
pub use release::{ReleaseSelector, ThreadOverride};
pub use types::IntOrString;

// re-exported for generated code
pub use serde;
pub use serde_json;
