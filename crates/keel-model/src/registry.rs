//! Deprecation & default-release registry, reader side.
//!
//! The builder writes one [`ReleaseEntry`] per release plus a
//! [`RegistryIndex`]; this module loads them back and answers alias and
//! default lookups without re-running the builder.

use crate::document::{Document, validate_markers};
use crate::error::RegistryError;
use crate::release::ReleaseSelector;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// File name of the registry index inside a registry directory
pub const INDEX_FILE: &str = "index.json";

/// Per-release registry table
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ReleaseEntry {
    /// Release label
    pub release: SmolStr,
    /// Semantic version of the generated output
    pub semver: String,
    /// Version re-exported at the release root
    pub default_version: SmolStr,
    /// Every version built for the release
    pub versions: Vec<SmolStr>,
    /// `version -> alias -> canonical`
    #[serde(default)]
    pub deprecations: BTreeMap<SmolStr, BTreeMap<SmolStr, SmolStr>>,
}

impl ReleaseEntry {
    /// Whether the release carries `version`
    pub fn has_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }
}

/// Top-level registry index
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistryIndex {
    /// Release used when nothing more specific is selected
    pub default_release: Option<SmolStr>,
    /// All releases with a table in the directory
    pub releases: Vec<SmolStr>,
}

/// A fully resolved type lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Release the lookup ran against
    pub release: SmolStr,
    /// Version the lookup ran against
    pub version: SmolStr,
    /// Canonical type name
    pub name: SmolStr,
}

/// Loaded registry
#[derive(Debug, Clone, Default)]
pub struct Registry {
    index: RegistryIndex,
    releases: BTreeMap<SmolStr, ReleaseEntry>,
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, RegistryError> {
    let text = std::fs::read_to_string(path).map_err(|e| RegistryError::Load {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| RegistryError::Load {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

impl Registry {
    /// Assemble a registry from already parsed tables
    pub fn new(index: RegistryIndex, entries: impl IntoIterator<Item = ReleaseEntry>) -> Self {
        let releases = entries
            .into_iter()
            .map(|entry| (entry.release.clone(), entry))
            .collect();
        Self { index, releases }
    }

    /// Load `index.json` and every `<release>.json` it lists from `dir`
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let dir = dir.as_ref();
        let index: RegistryIndex = load_json(&dir.join(INDEX_FILE))?;
        let mut entries = Vec::with_capacity(index.releases.len());
        for release in &index.releases {
            let entry: ReleaseEntry = load_json(&dir.join(format!("{}.json", release)))?;
            entries.push(entry);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(dir = %dir.display(), releases = entries.len(), "loaded registry");
        Ok(Self::new(index, entries))
    }

    /// The index as loaded
    pub fn index(&self) -> &RegistryIndex {
        &self.index
    }

    /// Recorded default release
    pub fn default_release(&self) -> Option<&str> {
        self.index.default_release.as_deref()
    }

    /// Table for one release
    pub fn release(&self, label: &str) -> Result<&ReleaseEntry, RegistryError> {
        self.releases
            .get(label)
            .ok_or_else(|| RegistryError::UnknownRelease(label.into()))
    }

    /// All loaded release tables in label order
    pub fn releases(&self) -> impl Iterator<Item = &ReleaseEntry> {
        self.releases.values()
    }

    /// `version`, checked against the release, or the release's default version
    pub fn resolve_version<'a>(
        &'a self,
        release: &str,
        version: Option<&'a str>,
    ) -> Result<&'a str, RegistryError> {
        let entry = self.release(release)?;
        match version {
            Some(v) if entry.has_version(v) => Ok(v),
            Some(v) => Err(RegistryError::UnknownVersion {
                release: release.into(),
                version: v.into(),
            }),
            None => Ok(entry.default_version.as_str()),
        }
    }

    /// Follow the alias chain for `name` to its canonical type name.
    ///
    /// Names that are not aliases come back unchanged.
    pub fn canonical_name(
        &self,
        release: &str,
        version: &str,
        name: &str,
    ) -> Result<SmolStr, RegistryError> {
        let entry = self.release(release)?;
        if !entry.has_version(version) {
            return Err(RegistryError::UnknownVersion {
                release: release.into(),
                version: version.into(),
            });
        }
        let Some(table) = entry.deprecations.get(version) else {
            return Ok(name.into());
        };
        let mut seen = BTreeSet::new();
        let mut current = SmolStr::from(name);
        while let Some(next) = table.get(&current) {
            if !seen.insert(current.clone()) {
                return Err(RegistryError::AliasCycle(name.into()));
            }
            current = next.clone();
        }
        Ok(current)
    }

    /// Whether `name` is a deprecated alias in that release and version
    pub fn is_deprecated(&self, release: &str, version: &str, name: &str) -> bool {
        self.releases
            .get(release)
            .and_then(|e| e.deprecations.get(version))
            .is_some_and(|t| t.contains_key(name))
    }

    /// Resolve an unqualified type name through the selector's precedence
    /// (explicit, then thread override, then global default, then the
    /// registry's recorded default).
    pub fn resolve(
        &self,
        selector: &ReleaseSelector,
        explicit_release: Option<&str>,
        version: Option<&str>,
        name: &str,
    ) -> Result<Resolved, RegistryError> {
        let selected = selector.current(explicit_release);
        let release: SmolStr = match selected.as_deref().or(self.default_release()) {
            Some(r) => r.into(),
            None => return Err(RegistryError::NoDefaultRelease),
        };
        let version: SmolStr = self.resolve_version(&release, version)?.into();
        let name = self.canonical_name(&release, &version, name)?;
        Ok(Resolved {
            release,
            version,
            name,
        })
    }
}

/// Registered user-defined document types, keyed by `(api_version, kind)`.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: HashMap<(SmolStr, SmolStr), &'static str>,
}

impl KindRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`, checking its markers first
    pub fn register<T: Document>(&mut self) -> Result<(), RegistryError> {
        validate_markers::<T>()?;
        let type_name = std::any::type_name::<T>();
        self.kinds
            .insert((T::API_VERSION.into(), T::KIND.into()), type_name);
        #[cfg(feature = "tracing")]
        tracing::debug!(api_version = T::API_VERSION, kind = T::KIND, type_name, "registered kind");
        Ok(())
    }

    /// Rust type registered for `(api_version, kind)`
    pub fn lookup(&self, api_version: &str, kind: &str) -> Option<&'static str> {
        self.kinds
            .get(&(SmolStr::from(api_version), SmolStr::from(kind)))
            .copied()
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ReleaseEntry {
        let mut v1 = BTreeMap::new();
        v1.insert(SmolStr::from("Event_events"), SmolStr::from("Event"));
        v1.insert(SmolStr::from("OldEvent"), SmolStr::from("Event_events"));
        v1.insert(SmolStr::from("Loop"), SmolStr::from("Loop"));
        let mut deprecations = BTreeMap::new();
        deprecations.insert(SmolStr::from("v1"), v1);
        ReleaseEntry {
            release: "rel_1_26".into(),
            semver: "1.26.0".into(),
            default_version: "v1".into(),
            versions: vec!["v1".into(), "v1beta1".into()],
            deprecations,
        }
    }

    #[test]
    fn test_alias_chain_followed() {
        let reg = Registry::new(RegistryIndex::default(), [entry()]);
        assert_eq!(reg.canonical_name("rel_1_26", "v1", "OldEvent").unwrap(), "Event");
        assert_eq!(reg.canonical_name("rel_1_26", "v1", "Pod").unwrap(), "Pod");
        assert_eq!(reg.canonical_name("rel_1_26", "v1beta1", "OldEvent").unwrap(), "OldEvent");
        assert!(matches!(
            reg.canonical_name("rel_1_26", "v1", "Loop"),
            Err(RegistryError::AliasCycle(_))
        ));
        assert!(matches!(
            reg.canonical_name("rel_1_26", "v9", "Pod"),
            Err(RegistryError::UnknownVersion { .. })
        ));
    }

    #[test]
    fn test_resolve_uses_recorded_default() {
        let index = RegistryIndex {
            default_release: Some("rel_1_26".into()),
            releases: vec!["rel_1_26".into()],
        };
        let reg = Registry::new(index, [entry()]);
        let selector = ReleaseSelector::new();
        let r = reg.resolve(&selector, None, None, "Event_events").unwrap();
        assert_eq!(r.release, "rel_1_26");
        assert_eq!(r.version, "v1");
        assert_eq!(r.name, "Event");

        let empty = Registry::new(RegistryIndex::default(), [entry()]);
        assert!(matches!(
            empty.resolve(&selector, None, None, "Pod"),
            Err(RegistryError::NoDefaultRelease)
        ));
    }

    struct Good;
    impl Document for Good {
        const API_VERSION: &'static str = "example.io/v1alpha1";
        const KIND: &'static str = "Good";
    }

    struct NoKind;
    impl Document for NoKind {
        const API_VERSION: &'static str = "example.io/v1";
        const KIND: &'static str = "";
    }

    struct BadVersion;
    impl Document for BadVersion {
        const API_VERSION: &'static str = "example.io/stable";
        const KIND: &'static str = "BadVersion";
    }

    #[test]
    fn test_kind_registry_rejects_malformed() {
        let mut kinds = KindRegistry::new();
        kinds.register::<Good>().unwrap();
        assert!(kinds.lookup("example.io/v1alpha1", "Good").is_some());
        assert!(matches!(
            kinds.register::<NoKind>(),
            Err(RegistryError::MalformedDocument { .. })
        ));
        assert!(matches!(
            kinds.register::<BadVersion>(),
            Err(RegistryError::MalformedDocument { .. })
        ));
        assert_eq!(kinds.len(), 1);
    }
}
