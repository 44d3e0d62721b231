//! # Versioned model generation for cluster API descriptions
//!
//! `keel-builder` reads the Swagger 2.0 description of each configured
//! release and writes a Rust module tree of strongly typed models, one module
//! per release and version, plus the registry tables and method-map
//! snapshot the `keel-model` runtime reads back.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p keel-builder --bin keel-build -- -c keel.kdl
//! ```
//!
//! Configuration lives in `keel.kdl`; see [`config`].
//!
//! Compare two method-map snapshots:
//!
//! ```bash
//! cargo run -p keel-builder --bin keel-diff -- old/methods.json generated/methods.json
//! ```
//!
//! ## Stages
//!
//! - [`ingest`] - schema document to [`model::ReleaseModel`]
//! - [`names`] - collision resolution and deprecated aliases
//! - [`order`] - dependency order, two-type cycle splitting
//! - [`bind`] - operations to classes
//! - [`crud`] - create/read/update/delete roles
//! - [`codegen`] - Rust source output
//! - [`registry`] - registry tables
//! - [`snapshot`] - method maps and their diffs
//! - [`export`] - structural schemas for ingested types
//! - [`cli`] - command-line arguments of the binaries

pub mod bind;
pub mod cli;
pub mod codegen;
pub mod config;
pub mod crud;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod ingest;
pub mod model;
pub mod names;
pub mod order;
pub mod pipeline;
pub mod registry;
pub mod snapshot;
pub mod swagger;

pub use config::Config;
pub use error::{BuildError, Result};
pub use pipeline::{ReleaseBuild, build_all, write_outputs};
