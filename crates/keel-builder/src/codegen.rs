//! Rust source generation for one release.
//!
//! Layout under the output root, for release `R` and version `V`:
//!
//! ```text
//! lib.rs                  release modules, default release alias
//! R.rs                    version modules, default version re-export
//! R/V.rs                  the version's types in dependency order
//! R/V/documents.rs        document type index
//! R/V/watchables.rs       watch-capable types by scope
//! ```

use crate::pipeline::ReleaseBuild;
use proc_macro2::TokenStream;
use quote::quote;
use std::collections::BTreeMap;
use std::path::PathBuf;

mod indexes;
mod methods;
pub mod output;
mod structs;
mod types;
pub(crate) mod utils;

pub use indexes::root_module;

/// File stem for a release label or version module
pub fn module_file_stem(s: &str) -> String {
    let ident = utils::module_ident(s).to_string();
    ident.strip_prefix("r#").map(str::to_string).unwrap_or(ident)
}

/// Code generator for one release
pub struct CodeGenerator<'b> {
    build: &'b ReleaseBuild,
}

impl<'b> CodeGenerator<'b> {
    pub fn new(build: &'b ReleaseBuild) -> Self {
        Self { build }
    }

    /// The `R/V.rs` module for one version
    pub fn generate_version(&self, version: &str) -> TokenStream {
        let items = self
            .build
            .order
            .version(version)
            .map(|vo| vo.items.as_slice())
            .unwrap_or(&[]);
        let items = items.iter().map(|emit| self.generate_item(version, *emit));
        let doc = format!(" `{}` types of release `{}`", version, self.build.label());
        quote! {
            #![doc = #doc]

            pub mod documents;
            pub mod watchables;

            #(#items)*
        }
    }

    /// Every file of the release, keyed by path relative to the output root
    pub fn generate_release(&self) -> BTreeMap<PathBuf, TokenStream> {
        let stem = module_file_stem(self.build.label());
        let mut files = BTreeMap::new();
        files.insert(PathBuf::from(format!("{}.rs", stem)), self.release_module());
        for version in self.build.model.versions.keys() {
            let dir = PathBuf::from(&stem).join(module_file_stem(version));
            let span = tracing::debug_span!("generate_version", version = %version);
            let _enter = span.enter();
            files.insert(dir.with_extension("rs"), self.generate_version(version));
            files.insert(dir.join("documents.rs"), self.documents_module(version));
            files.insert(dir.join("watchables.rs"), self.watchables_module(version));
        }
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReleaseConfig;
    use crate::pipeline::load_schema;
    use std::path::Path;

    fn build() -> ReleaseBuild {
        let doc = load_schema(Path::new("tests/fixtures/cluster_api.json")).expect("load schema");
        ReleaseBuild::from_doc(&ReleaseConfig::new("rel_1_26", "1.26.0"), &doc)
    }

    fn render(tokens: TokenStream) -> String {
        let file: syn::File = syn::parse2(tokens).expect("parse tokens");
        prettyplease::unparse(&file)
    }

    #[test]
    fn test_generate_document() {
        let build = build();
        let formatted = render(CodeGenerator::new(&build).generate_version("v1"));
        println!("\n{}\n", formatted);

        assert!(formatted.contains("pub struct Pod {"));
        assert!(formatted.contains("pub spec: Option<PodSpec>"));
        assert!(formatted.contains("impl keel_model::Document for Pod"));
        assert!(formatted.contains("const KIND: &'static str = \"Pod\";"));
        assert!(formatted.contains("self.metadata.as_ref()?.namespace.as_deref()"));
        assert!(formatted.contains("impl keel_model::Crud for Pod"));
        assert!(formatted.contains("keel_model::UpdateKind::MergePatch"));
        assert!(formatted.contains("keel_model::UpdateKind::Replace"));
        assert!(formatted.contains("pub fn list_namespaced_pod("));
        assert!(formatted.contains("pub fn read_namespaced_pod_log("));
        assert!(formatted.contains(".json_body(self)"));
        assert!(formatted.contains("#[serde(rename = \"hostIPC\")]"));
        assert!(formatted.contains("pub host_ipc: Option<bool>"));
        assert!(formatted.contains("pub r#continue: Option<String>"));
        assert!(formatted.contains(
            "pub overhead: std::collections::BTreeMap<String, super::unversioned::Quantity>"
        ));
    }

    #[test]
    fn test_split_cycle_emits_base_first() {
        let build = build();
        let formatted = render(CodeGenerator::new(&build).generate_version("v1"));

        let base = formatted.find("pub struct RuleBase {").expect("base");
        let set = formatted.find("pub struct RuleSet {").expect("partner");
        let derived = formatted.find("pub struct Rule {").expect("derived");
        assert!(base < set && set < derived);
        assert!(formatted.contains("pub rules: Vec<RuleBase>"));
        assert!(formatted.contains("pub base: RuleBase"));
        assert!(formatted.contains("pub nested: Option<RuleSet>"));
        assert!(formatted.contains("impl std::ops::Deref for Rule"));
    }

    #[test]
    fn test_self_reference_and_exclusions() {
        let build = build();
        let formatted = render(CodeGenerator::new(&build).generate_version("v1"));

        assert!(formatted.contains("pub parent: Option<Box<TreeNode>>"));
        assert!(formatted.contains("pub children: Vec<TreeNode>"));
        assert!(!formatted.contains("CycleA"));
        assert!(!formatted.contains("CycleUser"));
        assert!(!formatted.contains("connect_options_namespaced_pod_proxy"));
    }

    #[test]
    fn test_cross_version_and_unversioned() {
        let build = build();
        let codegen = CodeGenerator::new(&build);

        let beta = render(codegen.generate_version("v1beta1"));
        assert!(beta.contains("pub spec: Option<super::v1::CronJobSpec>"));

        let unversioned = render(codegen.generate_version("unversioned"));
        assert!(unversioned.contains("pub type Quantity = String;"));
        assert!(unversioned.contains("pub type IntOrString = keel_model::IntOrString;"));
        assert!(unversioned.contains("pub fn get_code_version() -> keel_model::ApiCall<Info>"));
    }

    #[test]
    fn test_index_modules() {
        let build = build();
        let codegen = CodeGenerator::new(&build);

        let documents = render(codegen.documents_module("v1"));
        assert!(documents.contains("pub use super::{"));
        assert!(documents.contains("\"Event_events\""));

        let watchables = render(codegen.watchables_module("v1"));
        assert!(watchables.contains("pub const NAMESPACED: &[&str] = &[\"Pod\", \"PodList\"];"));
        assert!(watchables.contains("pub const CLUSTER: &[&str] = &[\"PodList\"];"));

        let release = render(codegen.release_module());
        assert!(release.contains("pub mod v1beta1;"));
        assert!(release.contains("pub use v1::*;"));
        assert!(release.contains("pub const DEFAULT_VERSION: &str = \"v1\";"));

        let root = render(root_module(
            &["rel_1_25".to_string(), "rel_1_26".to_string()],
            Some("rel_1_26"),
        ));
        assert!(root.contains("pub mod rel_1_25;"));
        assert!(root.contains("pub use rel_1_26 as default_release;"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let (a, b) = (build(), build());
        let render_all = |build: &ReleaseBuild| -> Vec<(PathBuf, String)> {
            CodeGenerator::new(build)
                .generate_release()
                .into_iter()
                .map(|(path, tokens)| {
                    let text = output::format_file(&path, tokens).expect("format");
                    (path, text)
                })
                .collect()
        };
        assert_eq!(render_all(&a), render_all(&b));
    }
}
