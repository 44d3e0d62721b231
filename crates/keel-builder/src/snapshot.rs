//! Method-map snapshots and their differences.
//!
//! A snapshot records, per release and version, which class each
//! operation-bound method landed on. Diffing two snapshots shows API churn
//! between builder runs or releases.

use crate::error::{BuildError, Result};
use crate::pipeline::ReleaseBuild;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

type Methods = BTreeMap<SmolStr, SmolStr>;

/// `release -> version -> method -> class`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct MethodMap(pub BTreeMap<SmolStr, BTreeMap<SmolStr, Methods>>);

impl MethodMap {
    pub fn from_builds<'a>(builds: impl IntoIterator<Item = &'a ReleaseBuild>) -> Self {
        let mut map = Self::default();
        for build in builds {
            map.insert(build);
        }
        map
    }

    /// Replace the release's section with the build's methods
    pub fn insert(&mut self, build: &ReleaseBuild) {
        self.0.insert(build.label().clone(), build.method_map());
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BuildError::io_at(path, e))?;
        serde_json::from_str(&text).map_err(|e| {
            BuildError::parse_error_with_source(e, path.display().to_string(), text.clone())
        })
    }

    /// Existing snapshot at `path`, or an empty one
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| BuildError::io_at(parent, e))?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|e| BuildError::Other {
            message: "Failed to serialize method map".into(),
            source: Some(Box::new(e)),
        })?;
        std::fs::write(path, text + "\n").map_err(|e| BuildError::io_at(path, e))
    }

    fn methods(&self, release: &str, version: &str) -> Option<&Methods> {
        self.0.get(release)?.get(version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Added { class: SmolStr },
    Removed { class: SmolStr },
    Relocated { from: SmolStr, to: SmolStr },
}

/// One method whose placement differs between two snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodChange {
    pub release: SmolStr,
    pub version: SmolStr,
    pub method: SmolStr,
    pub kind: ChangeKind,
}

impl MethodChange {
    pub fn is_removal(&self) -> bool {
        matches!(self.kind, ChangeKind::Removed { .. })
    }
}

impl fmt::Display for MethodChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = format!("{}/{}", self.release, self.version);
        match &self.kind {
            ChangeKind::Added { class } => write!(f, "+ {} {}::{}", at, class, self.method),
            ChangeKind::Removed { class } => write!(f, "- {} {}::{}", at, class, self.method),
            ChangeKind::Relocated { from, to } => {
                write!(f, "~ {} {} moved {} -> {}", at, self.method, from, to)
            }
        }
    }
}

/// Changes from `old` to `new`, ordered by release, version, method
pub fn diff(old: &MethodMap, new: &MethodMap) -> Vec<MethodChange> {
    let empty = Methods::new();
    let mut keys: Vec<(&SmolStr, &SmolStr)> = old
        .0
        .iter()
        .chain(new.0.iter())
        .flat_map(|(release, versions)| versions.keys().map(move |v| (release, v)))
        .collect();
    keys.sort();
    keys.dedup();

    let mut changes = Vec::new();
    for (release, version) in keys {
        let before = old.methods(release, version).unwrap_or(&empty);
        let after = new.methods(release, version).unwrap_or(&empty);
        let mut methods: Vec<&SmolStr> = before.keys().chain(after.keys()).collect();
        methods.sort();
        methods.dedup();
        for method in methods {
            let kind = match (before.get(method), after.get(method)) {
                (None, Some(class)) => ChangeKind::Added {
                    class: class.clone(),
                },
                (Some(class), None) => ChangeKind::Removed {
                    class: class.clone(),
                },
                (Some(from), Some(to)) if from != to => ChangeKind::Relocated {
                    from: from.clone(),
                    to: to.clone(),
                },
                _ => continue,
            };
            changes.push(MethodChange {
                release: release.clone(),
                version: version.clone(),
                method: method.clone(),
                kind,
            });
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str, &str, &str)]) -> MethodMap {
        let mut map = MethodMap::default();
        for (release, version, method, class) in entries {
            map.0
                .entry((*release).into())
                .or_default()
                .entry((*version).into())
                .or_default()
                .insert((*method).into(), (*class).into());
        }
        map
    }

    #[test]
    fn test_diff_kinds() {
        let old = map(&[
            ("r1", "v1", "read_namespaced_pod_log", "Pod"),
            ("r1", "v1", "list_namespaced_pod", "PodList"),
            ("r1", "v1", "get_code_version", "Info"),
        ]);
        let new = map(&[
            ("r1", "v1", "read_namespaced_pod_log", "PodLog"),
            ("r1", "v1", "list_namespaced_pod", "PodList"),
            ("r1", "v2", "list_namespaced_pod", "PodList"),
        ]);
        let changes = diff(&old, &new);
        let rendered: Vec<String> = changes.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            rendered,
            [
                "- r1/v1 Info::get_code_version",
                "~ r1/v1 read_namespaced_pod_log moved Pod -> PodLog",
                "+ r1/v2 PodList::list_namespaced_pod",
            ]
        );
        assert_eq!(changes.iter().filter(|c| c.is_removal()).count(), 1);
    }

    #[test]
    fn test_identical_maps_have_no_changes() {
        let a = map(&[("r1", "v1", "m", "C")]);
        assert!(diff(&a, &a.clone()).is_empty());
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/methods.json");
        let a = map(&[("r1", "v1", "m", "C")]);
        a.save(&path).unwrap();
        assert_eq!(MethodMap::load(&path).unwrap(), a);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\n  \"r1\": {\n    \"v1\": {\n      \"m\": \"C\"\n    }\n  }\n}\n"
        );
    }
}
