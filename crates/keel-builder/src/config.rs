//! `keel.kdl` configuration

use crate::error::{BuildError, Result};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const DEFAULT_CONFIG: &str = "keel.kdl";

#[derive(Debug, Clone)]
pub struct Config {
    pub output: OutputConfig,
    /// Explicit default release, if configured
    pub default_release: Option<SmolStr>,
    /// Releases to build, in file order
    pub targets: Vec<Target>,
    /// Per-release configuration records
    pub releases: BTreeMap<SmolStr, ReleaseConfig>,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub codegen_dir: PathBuf,
    pub registry_dir: PathBuf,
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Target {
    pub release: SmolStr,
    pub schema: PathBuf,
}

/// The per-release configuration record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseConfig {
    pub label: SmolStr,
    /// Semantic version of the generated output
    pub semver: String,
    /// Version re-exported at the release root
    pub default_version: SmolStr,
    /// Type name -> group precedence list
    pub preferred_versions: BTreeMap<SmolStr, Vec<SmolStr>>,
    /// Alias -> canonical name, applied to every version
    pub deprecations: BTreeMap<SmolStr, SmolStr>,
}

impl ReleaseConfig {
    /// A record with no preferences or deprecations
    pub fn new(label: impl Into<SmolStr>, semver: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            semver: semver.into(),
            default_version: "v1".into(),
            ..Default::default()
        }
    }
}

impl Config {
    /// Parse configuration text; relative paths stay as written
    pub fn from_kdl(text: &str) -> Result<Self> {
        let doc = text
            .parse::<kdl::KdlDocument>()
            .map_err(|e| BuildError::config(format!("Failed to parse KDL: {}", e)))?;

        let mut output: Option<OutputConfig> = None;
        let mut default_release = None;
        let mut targets = Vec::new();
        let mut releases = BTreeMap::new();

        for node in doc.nodes() {
            match node.name().value() {
                "output" => {
                    if output.is_some() {
                        return Err(BuildError::config("Multiple output blocks found"));
                    }
                    output = Some(parse_output(node)?);
                }
                "default-release" => {
                    default_release = Some(first_string(node, "default-release")?.into());
                }
                "target" => targets.push(parse_target(node)?),
                "release" => {
                    let release = parse_release(node)?;
                    if releases.contains_key(&release.label) {
                        return Err(BuildError::config(format!(
                            "Duplicate release block {}",
                            release.label
                        )));
                    }
                    releases.insert(release.label.clone(), release);
                }
                other => {
                    return Err(BuildError::config(format!("Unknown config node: {}", other)));
                }
            }
        }

        let output = output.ok_or_else(|| BuildError::config("Missing output block"))?;

        Ok(Config {
            output,
            default_release,
            targets,
            releases,
        })
    }

    /// Load a configuration file, resolving relative paths against its directory
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| BuildError::io_at(path, e))?;
        let mut config = Self::from_kdl(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.rebase(base);
        Ok(config)
    }

    /// Make every relative path relative to `base`
    pub fn rebase(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.output.codegen_dir);
        fix(&mut self.output.registry_dir);
        if let Some(snapshot) = self.output.snapshot.as_mut() {
            fix(snapshot);
        }
        for target in &mut self.targets {
            fix(&mut target.schema);
        }
    }

    /// The configuration record for `release`; its absence is fatal for that release
    pub fn release_config(&self, release: &str) -> Result<&ReleaseConfig> {
        self.releases
            .get(release)
            .ok_or_else(|| BuildError::MissingReleaseConfig {
                release: release.into(),
            })
    }

    /// Target entry for `release`
    pub fn target(&self, release: &str) -> Result<&Target> {
        self.targets
            .iter()
            .find(|t| t.release == release)
            .ok_or_else(|| BuildError::UnknownRelease {
                release: release.into(),
            })
    }

    /// Configured default release, else the newest target label
    pub fn default_release(&self) -> Option<SmolStr> {
        self.default_release.clone().or_else(|| {
            self.targets
                .iter()
                .map(|t| t.release.clone())
                .max_by(|a, b| natural_cmp(a, b))
        })
    }
}

/// Compare labels so that `rel_1_9 < rel_1_10`
pub fn natural_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    use itertools::Itertools;
    let chunks = |s: &str| -> Vec<String> {
        let grouped = s.chars().chunk_by(|c| c.is_ascii_digit());
        grouped.into_iter().map(|(_, g)| g.collect()).collect()
    };
    let (ca, cb) = (chunks(a), chunks(b));
    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(nx), Ok(ny)) => nx.cmp(&ny),
            _ => x.cmp(y),
        };
        if ord.is_ne() {
            return ord;
        }
    }
    ca.len().cmp(&cb.len())
}

fn first_string<'a>(node: &'a kdl::KdlNode, what: &str) -> Result<&'a str> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| BuildError::config(format!("{} expects a string value", what)))
}

fn parse_output(node: &kdl::KdlNode) -> Result<OutputConfig> {
    let children = node
        .children()
        .ok_or_else(|| BuildError::config("output block has no children"))?;

    let mut codegen_dir: Option<PathBuf> = None;
    let mut registry_dir: Option<PathBuf> = None;
    let mut snapshot: Option<PathBuf> = None;

    for child in children.nodes() {
        match child.name().value() {
            "codegen" => codegen_dir = Some(PathBuf::from(first_string(child, "codegen")?)),
            "registry" => registry_dir = Some(PathBuf::from(first_string(child, "registry")?)),
            "snapshot" => snapshot = Some(PathBuf::from(first_string(child, "snapshot")?)),
            other => {
                return Err(BuildError::config(format!("Unknown output field: {}", other)));
            }
        }
    }

    Ok(OutputConfig {
        codegen_dir: codegen_dir.ok_or_else(|| BuildError::config("Missing codegen directory"))?,
        registry_dir: registry_dir
            .ok_or_else(|| BuildError::config("Missing registry directory"))?,
        snapshot,
    })
}

fn parse_target(node: &kdl::KdlNode) -> Result<Target> {
    let release = first_string(node, "target")?;
    let schema = node
        .get("schema")
        .and_then(|v| v.as_string())
        .ok_or_else(|| BuildError::config(format!("target {} missing schema attribute", release)))?;
    Ok(Target {
        release: release.into(),
        schema: PathBuf::from(schema),
    })
}

fn parse_release(node: &kdl::KdlNode) -> Result<ReleaseConfig> {
    let label = first_string(node, "release")?;
    let children = node
        .children()
        .ok_or_else(|| BuildError::config(format!("release {} has no children", label)))?;

    let mut semver = None;
    let mut default_version = None;
    let mut preferred_versions = None;
    let mut deprecations = None;

    for child in children.nodes() {
        match child.name().value() {
            "version" => semver = Some(first_string(child, "version")?.to_string()),
            "default-version" => {
                default_version = Some(SmolStr::from(first_string(child, "default-version")?))
            }
            "preferred-versions" => {
                let mut table = BTreeMap::new();
                if let Some(entries) = child.children() {
                    for entry in entries.nodes() {
                        let groups = entry
                            .entries()
                            .iter()
                            .map(|e| {
                                e.value().as_string().map(SmolStr::from).ok_or_else(|| {
                                    BuildError::config(format!(
                                        "preferred-versions {} expects group names",
                                        entry.name().value()
                                    ))
                                })
                            })
                            .collect::<Result<Vec<_>>>()?;
                        table.insert(SmolStr::from(entry.name().value()), groups);
                    }
                }
                preferred_versions = Some(table);
            }
            "deprecations" => {
                let mut table = BTreeMap::new();
                if let Some(entries) = child.children() {
                    for entry in entries.nodes() {
                        let canonical = first_string(entry, "deprecation")?;
                        table.insert(SmolStr::from(entry.name().value()), SmolStr::from(canonical));
                    }
                }
                deprecations = Some(table);
            }
            other => {
                return Err(BuildError::config(format!(
                    "Unknown release field {} in release {}",
                    other, label
                )));
            }
        }
    }

    let missing = |field: &str| BuildError::config(format!("release {} is missing {}", label, field));
    Ok(ReleaseConfig {
        label: label.into(),
        semver: semver.ok_or_else(|| missing("version"))?,
        default_version: default_version.unwrap_or_else(|| "v1".into()),
        preferred_versions: preferred_versions.ok_or_else(|| missing("preferred-versions"))?,
        deprecations: deprecations.ok_or_else(|| missing("deprecations"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
output {
    codegen "generated/src"
    registry "generated/registry"
}
target "rel_1_9" schema="schemas/rel_1_9.json"
target "rel_1_10" schema="schemas/rel_1_10.json"
release "rel_1_10" {
    version "1.10.0"
    preferred-versions {
        Event "core" "events"
    }
    deprecations {
        "Event_events" "Event"
    }
}
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_kdl(SAMPLE).expect("parse");
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.output.snapshot, None);
        let rel = config.release_config("rel_1_10").expect("release");
        assert_eq!(rel.semver, "1.10.0");
        assert_eq!(rel.default_version, "v1");
        assert_eq!(
            rel.preferred_versions.get("Event").unwrap(),
            &vec![SmolStr::from("core"), SmolStr::from("events")]
        );
        assert_eq!(rel.deprecations.get("Event_events").unwrap(), "Event");
        assert_eq!(config.default_release().as_deref(), Some("rel_1_10"));
    }

    #[test]
    fn test_missing_release_is_fatal() {
        let config = Config::from_kdl(SAMPLE).expect("parse");
        assert!(matches!(
            config.release_config("rel_1_9"),
            Err(BuildError::MissingReleaseConfig { .. })
        ));
    }

    #[test]
    fn test_release_requires_all_fields() {
        let text = r#"
output { codegen "a"; registry "b"; }
release "r" {
    version "1.0.0"
    deprecations {}
}
"#;
        let err = Config::from_kdl(text).unwrap_err();
        assert!(err.to_string().contains("preferred-versions"), "{err}");
    }

    #[test]
    fn test_unknown_node_rejected() {
        let text = "output { codegen \"a\"; registry \"b\"; }\nbogus 1\n";
        assert!(matches!(Config::from_kdl(text), Err(BuildError::Config { .. })));
    }

    #[test]
    fn test_natural_order() {
        assert!(natural_cmp("rel_1_9", "rel_1_10").is_lt());
        assert!(natural_cmp("rel_1_10", "rel_1_10").is_eq());
    }
}
