//! Index modules: per-version document and watchable listings, release roots
//! and the crate root.

use proc_macro2::TokenStream;
use quote::quote;

use super::CodeGenerator;
use super::utils::{make_ident, module_ident};

impl CodeGenerator<'_> {
    /// `R/V/documents.rs`
    pub(super) fn documents_module(&self, version: &str) -> TokenStream {
        let names: Vec<String> = self
            .build
            .documents(version)
            .into_iter()
            .map(|id| self.build.names.resolved(id).to_string())
            .collect();
        let idents = names.iter().map(|n| make_ident(n));
        let uses = (!names.is_empty()).then(|| quote! { pub use super::{#(#idents),*}; });
        quote! {
            //! Every document type of this version

            #uses

            /// Names of the document types above, in emission order
            pub const DOCUMENTS: &[&str] = &[#(#names),*];
        }
    }

    /// `R/V/watchables.rs`
    pub(super) fn watchables_module(&self, version: &str) -> TokenStream {
        let watchables = self.build.watchables(version);
        let scope = |names: Vec<String>| {
            let idents = names.iter().map(|n| make_ident(n));
            let uses = (!names.is_empty()).then(|| quote! { pub use super::super::{#(#idents),*}; });
            (uses, names)
        };
        let (namespaced_uses, namespaced) =
            scope(watchables.namespaced.iter().map(|n| n.to_string()).collect());
        let (cluster_uses, cluster) =
            scope(watchables.cluster.iter().map(|n| n.to_string()).collect());
        quote! {
            //! Types with a streaming (watch) operation, by scope

            /// Watchable within a namespace
            pub mod namespaced {
                #namespaced_uses
            }

            /// Watchable across the cluster
            pub mod cluster {
                #cluster_uses
            }

            pub const NAMESPACED: &[&str] = &[#(#namespaced),*];
            pub const CLUSTER: &[&str] = &[#(#cluster),*];
        }
    }

    /// `R.rs`: version modules and release constants
    pub(super) fn release_module(&self) -> TokenStream {
        let label = self.build.label().as_str();
        let semver = self.build.config.semver.as_str();
        let default_version = self.build.default_version.as_str();
        let versions = self.build.model.versions.keys().map(|v| module_ident(v));
        let default_ident = module_ident(default_version);
        let reexport = self
            .build
            .model
            .versions
            .contains_key(default_version)
            .then(|| quote! { pub use #default_ident::*; });
        let doc = format!(" Models for release `{}` ({})", label, semver);
        quote! {
            #![doc = #doc]

            #(pub mod #versions;)*

            #reexport

            pub const RELEASE: &str = #label;
            pub const SEMVER: &str = #semver;
            pub const DEFAULT_VERSION: &str = #default_version;
        }
    }
}

/// `lib.rs`: release modules, the default release alias and the release list
pub fn root_module(releases: &[String], default_release: Option<&str>) -> TokenStream {
    let mods = releases.iter().map(|r| module_ident(r));
    let default = default_release.map(|label| {
        let ident = module_ident(label);
        quote! {
            pub use #ident as default_release;

            pub const DEFAULT_RELEASE: &str = #label;
        }
    });
    quote! {
        #![allow(non_camel_case_types)]
        #![allow(clippy::all)]

        #(pub mod #mods;)*

        #default

        pub const RELEASES: &[&str] = &[#(#releases),*];
    }
}
