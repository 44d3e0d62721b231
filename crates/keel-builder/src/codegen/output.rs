use crate::error::{BuildError, Result};
use proc_macro2::TokenStream;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const HEADER: &str = "// @generated by keel-builder. DO NOT EDIT.\n//\n// This file was automatically generated from cluster API schemas.\n// Any manual changes will be overwritten on the next regeneration.\n\n";

/// Render tokens as a formatted source file with the generated-file header
pub fn format_file(path: &Path, tokens: TokenStream) -> Result<String> {
    let file: syn::File = syn::parse2(tokens).map_err(|source| BuildError::FormatError {
        source,
        path: path.to_path_buf(),
    })?;
    let formatted = prettyplease::unparse(&file);

    // blank line after top-level items and after the module declarations
    let lines: Vec<&str> = formatted.lines().collect();
    let mut result_lines = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        result_lines.push(*line);
        let Some(next) = lines.get(i + 1) else {
            continue;
        };
        if *line == "}" && !next.is_empty() {
            result_lines.push("");
        }
        if line.starts_with("pub mod ") && line.ends_with(';') && !next.starts_with("pub mod ") && !next.is_empty() {
            result_lines.push("");
        }
    }

    Ok(format!("{}{}\n", HEADER, result_lines.join("\n")))
}

/// Remove a previous rendering of a release so stale versions do not linger
pub fn clear_release(output_dir: &Path, stem: &str) -> Result<()> {
    let dir = output_dir.join(stem);
    if dir.is_dir() {
        std::fs::remove_dir_all(&dir).map_err(|e| BuildError::io_at(&dir, e))?;
    }
    let file = output_dir.join(format!("{}.rs", stem));
    if file.is_file() {
        std::fs::remove_file(&file).map_err(|e| BuildError::io_at(&file, e))?;
    }
    Ok(())
}

/// Format and write every file under `output_dir`
pub fn write_files(output_dir: &Path, files: BTreeMap<PathBuf, TokenStream>) -> Result<()> {
    for (path, tokens) in files {
        let full_path = output_dir.join(&path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BuildError::io_at(parent, e))?;
        }
        let formatted = format_file(&path, tokens)?;
        std::fs::write(&full_path, formatted).map_err(|e| BuildError::io_at(&full_path, e))?;
        tracing::debug!(path = %full_path.display(), "wrote");
    }
    Ok(())
}
