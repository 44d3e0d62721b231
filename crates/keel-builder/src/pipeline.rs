//! One release, end to end: ingest, names, order, bindings, CRUD.
//!
//! Releases share nothing; [`build_all`] runs them on the rayon pool.

use crate::bind::{Bindings, bind_release};
use crate::codegen::output::{clear_release, write_files};
use crate::codegen::{CodeGenerator, module_file_stem, root_module};
use crate::config::{Config, ReleaseConfig, natural_cmp};
use crate::crud::{CrudPlan, synthesize};
use crate::diagnostics::{AnomalyKind, Diagnostics};
use crate::error::{BuildError, Result};
use crate::ingest::ingest;
use crate::model::{ReleaseModel, TypeId};
use crate::names::NameRegistry;
use crate::order::{Emit, ReleaseOrder};
use crate::snapshot::MethodMap;
use crate::swagger::SwaggerDoc;
use keel_model::ReleaseEntry;
use keel_model::document::is_version_segment;
use rayon::prelude::*;
use smol_str::SmolStr;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Everything derived for one release
#[derive(Debug)]
pub struct ReleaseBuild {
    pub config: ReleaseConfig,
    pub model: ReleaseModel,
    pub names: NameRegistry,
    pub order: ReleaseOrder,
    pub bindings: Bindings,
    pub crud: BTreeMap<TypeId, CrudPlan>,
    pub diagnostics: Diagnostics,
    /// Version re-exported at the release root
    pub default_version: SmolStr,
}

/// Watch-capable classes of one version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watchables {
    pub namespaced: BTreeSet<SmolStr>,
    pub cluster: BTreeSet<SmolStr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub release: SmolStr,
    pub versions: usize,
    pub types: usize,
    pub excluded: usize,
    pub bound: usize,
    pub unbound: usize,
    pub crud: usize,
    pub aliases: usize,
    pub undefined: usize,
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} versions, {} types ({} excluded, {} aliased), {} bound / {} unbound operations, {} CRUD classes, {} undefined references",
            self.release,
            self.versions,
            self.types,
            self.excluded,
            self.aliases,
            self.bound,
            self.unbound,
            self.crud,
            self.undefined
        )
    }
}

/// Pick the version re-exported at the release root
pub fn choose_default_version(model: &ReleaseModel, configured: &str) -> SmolStr {
    if model.versions.contains_key(configured) {
        return configured.into();
    }
    let ga = |v: &&SmolStr| {
        v.strip_prefix('v')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    };
    model
        .versions
        .keys()
        .find(ga)
        .or_else(|| model.versions.keys().find(|v| is_version_segment(v)))
        .or_else(|| model.versions.keys().next())
        .cloned()
        .unwrap_or_else(|| configured.into())
}

impl ReleaseBuild {
    /// Run every stage over an already parsed schema
    pub fn from_doc(config: &ReleaseConfig, doc: &SwaggerDoc) -> Self {
        let _span = tracing::info_span!("build_release", release = %config.label).entered();
        let mut diagnostics = Diagnostics::new(config.label.clone());
        let model = ingest(&config.label, doc, &mut diagnostics);
        let names = NameRegistry::resolve(&model, &config.preferred_versions);
        let order = crate::order::order_release(&model, &names, &mut diagnostics);
        let bindings = bind_release(&model, &names, &order, &mut diagnostics);
        let crud = synthesize(&model, &order, &bindings);
        let default_version = choose_default_version(&model, &config.default_version);

        let build = Self {
            config: config.clone(),
            model,
            names,
            order,
            bindings,
            crud,
            diagnostics,
            default_version,
        };
        tracing::info!("{}", build.summary());
        build
    }

    pub fn label(&self) -> &SmolStr {
        &self.config.label
    }

    pub fn summary(&self) -> BuildSummary {
        BuildSummary {
            release: self.config.label.clone(),
            versions: self.model.versions.len(),
            types: self.model.types.len(),
            excluded: self.order.excluded.len(),
            bound: self.bindings.bound_count(),
            unbound: self.bindings.unbound.len(),
            crud: self.crud.len(),
            aliases: self.names.alias_count(),
            undefined: self.diagnostics.count(AnomalyKind::UndefinedReference),
        }
    }

    /// Emitted document types of `version`, in emission order
    pub fn documents(&self, version: &str) -> Vec<TypeId> {
        self.order
            .version(version)
            .map(|vo| {
                vo.items
                    .iter()
                    .filter(|e| !matches!(e, Emit::Base(_)))
                    .map(Emit::type_id)
                    .filter(|id| self.model.ty(*id).is_document())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Classes of `version` with a watch-capable bound operation, by scope
    pub fn watchables(&self, version: &str) -> Watchables {
        let mut out = Watchables::default();
        for (target, methods) in self.bindings.iter() {
            if self.model.ty(*target).version != version {
                continue;
            }
            for binding in methods {
                let op = self.model.op(binding.op);
                if !op.watch_capable {
                    continue;
                }
                let name = self.names.resolved(*target).clone();
                if op.namespaced {
                    out.namespaced.insert(name);
                } else {
                    out.cluster.insert(name);
                }
            }
        }
        out
    }

    /// `version -> method -> class` over operation-bound methods
    pub fn method_map(&self) -> BTreeMap<SmolStr, BTreeMap<SmolStr, SmolStr>> {
        let mut map: BTreeMap<SmolStr, BTreeMap<SmolStr, SmolStr>> = BTreeMap::new();
        for (target, methods) in self.bindings.iter() {
            let ty = self.model.ty(*target);
            let version = map.entry(ty.version.clone()).or_default();
            for binding in methods {
                version.insert(
                    binding.method_name.clone(),
                    self.names.resolved(*target).clone(),
                );
            }
        }
        map
    }

    /// Registry table for this release
    pub fn registry_entry(&self) -> ReleaseEntry {
        let deprecations = self
            .model
            .versions
            .keys()
            .filter_map(|version| {
                let mut table = self.names.deprecations(version);
                table.extend(
                    self.config
                        .deprecations
                        .iter()
                        .map(|(alias, canonical)| (alias.clone(), canonical.clone())),
                );
                (!table.is_empty()).then(|| (version.clone(), table))
            })
            .collect();
        ReleaseEntry {
            release: self.config.label.clone(),
            semver: self.config.semver.clone(),
            default_version: self.default_version.clone(),
            versions: self.model.versions.keys().cloned().collect(),
            deprecations,
        }
    }
}

/// Read and parse one schema document
pub fn load_schema(path: &Path) -> Result<SwaggerDoc> {
    let text = std::fs::read_to_string(path).map_err(|e| BuildError::io_at(path, e))?;
    serde_json::from_str(&text).map_err(|e| {
        BuildError::parse_error_with_source(e, path.display().to_string(), text.clone())
    })
}

/// Build one configured release
pub fn build_release(config: &Config, release: &str) -> Result<ReleaseBuild> {
    let target = config.target(release)?;
    // checked before the schema is read so a misconfigured release aborts early
    let release_config = config.release_config(release)?;
    let doc = load_schema(&target.schema)?;
    Ok(ReleaseBuild::from_doc(release_config, &doc))
}

/// Results of a multi-release run
#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub builds: Vec<ReleaseBuild>,
    pub failures: Vec<(SmolStr, BuildError)>,
}

/// Build the selected targets (all when `only` is empty) in parallel
pub fn build_all(config: &Config, only: &[SmolStr]) -> Result<BuildOutcome> {
    for wanted in only {
        config.target(wanted)?;
    }
    let selected: Vec<&SmolStr> = config
        .targets
        .iter()
        .map(|t| &t.release)
        .filter(|r| only.is_empty() || only.contains(r))
        .collect();

    let results: Vec<(SmolStr, Result<ReleaseBuild>)> = selected
        .par_iter()
        .map(|release| ((*release).clone(), build_release(config, release)))
        .collect();

    let mut outcome = BuildOutcome::default();
    for (release, result) in results {
        match result {
            Ok(build) => outcome.builds.push(build),
            Err(err) => {
                tracing::error!(release = %release, "release aborted: {}", err);
                outcome.failures.push((release, err));
            }
        }
    }
    Ok(outcome)
}

/// Write generated code, registry tables and the method-map snapshot
pub fn write_outputs(config: &Config, builds: &[ReleaseBuild]) -> Result<()> {
    let codegen_dir = &config.output.codegen_dir;
    std::fs::create_dir_all(codegen_dir).map_err(|e| BuildError::io_at(codegen_dir, e))?;

    // releases own disjoint subtrees
    builds.par_iter().try_for_each(|build| {
        clear_release(codegen_dir, &module_file_stem(build.label()))?;
        write_files(codegen_dir, CodeGenerator::new(build).generate_release())
    })?;

    // the crate root lists every configured release present on disk
    let releases: Vec<String> = config
        .targets
        .iter()
        .map(|t| t.release.to_string())
        .filter(|r| {
            codegen_dir
                .join(format!("{}.rs", module_file_stem(r)))
                .is_file()
        })
        .collect();
    let default_release = config
        .default_release()
        .map(|d| d.to_string())
        .filter(|d| releases.contains(d))
        .or_else(|| releases.iter().max_by(|a, b| natural_cmp(a, b)).cloned());
    write_files(
        codegen_dir,
        BTreeMap::from([(
            PathBuf::from("lib.rs"),
            root_module(&releases, default_release.as_deref()),
        )]),
    )?;

    crate::registry::write_registry(
        &config.output.registry_dir,
        builds,
        default_release.as_deref(),
    )?;

    if let Some(path) = &config.output.snapshot {
        let mut methods = MethodMap::load_or_default(path)?;
        for build in builds {
            methods.insert(build);
        }
        methods.save(path)?;
    }
    Ok(())
}
