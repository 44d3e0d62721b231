//! Registry writer: one table per release plus the index
//! (`keel_model::registry` reads them back).

use crate::config::natural_cmp;
use crate::error::{BuildError, Result};
use crate::pipeline::ReleaseBuild;
use keel_model::registry::INDEX_FILE;
use keel_model::{RegistryIndex, ReleaseEntry};
use serde::Serialize;
use smol_str::SmolStr;
use std::path::Path;

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| BuildError::Other {
        message: format!("Failed to serialize {}", path.display()),
        source: Some(Box::new(e)),
    })?;
    std::fs::write(path, text + "\n").map_err(|e| BuildError::io_at(path, e))
}

/// Release labels with a table in `dir`, oldest first
pub fn releases_on_disk(dir: &Path) -> Result<Vec<SmolStr>> {
    let mut releases = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| BuildError::io_at(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| BuildError::io_at(dir, e))?.path();
        if path.extension().is_some_and(|e| e == "json")
            && path.file_name().is_some_and(|n| n != INDEX_FILE)
        {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                releases.push(SmolStr::from(stem));
            }
        }
    }
    releases.sort_by(|a, b| natural_cmp(a, b));
    Ok(releases)
}

/// Write `<R>.json` for every build and refresh the index.
///
/// The index lists every table present in `dir`, so building a subset of
/// releases keeps the others.
pub fn write_registry(
    dir: &Path,
    builds: &[ReleaseBuild],
    default_release: Option<&str>,
) -> Result<RegistryIndex> {
    std::fs::create_dir_all(dir).map_err(|e| BuildError::io_at(dir, e))?;
    for build in builds {
        let entry: ReleaseEntry = build.registry_entry();
        write_json(&dir.join(format!("{}.json", entry.release)), &entry)?;
    }

    let releases = releases_on_disk(dir)?;
    let default_release = default_release
        .filter(|d| releases.iter().any(|r| r == d))
        .map(SmolStr::from)
        .or_else(|| releases.last().cloned());
    let index = RegistryIndex {
        default_release,
        releases,
    };
    write_json(&dir.join(INDEX_FILE), &index)?;
    tracing::info!(
        releases = index.releases.len(),
        default = ?index.default_release,
        "wrote registry"
    );
    Ok(index)
}
