use miette::{Diagnostic, SourceSpan};
use smol_str::SmolStr;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a build
#[derive(Debug, Error, Diagnostic)]
pub enum BuildError {
    /// IO error when reading schemas or writing output
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse the schema document
    #[error("Failed to parse schema JSON in {}", path.display())]
    #[diagnostic(
        code(keel::parse_error),
        help("Check that the schema is a Swagger 2.0 JSON document")
    )]
    ParseError {
        #[source]
        source: serde_json::Error,
        /// Path to the file that failed to parse
        path: PathBuf,
        /// Source text that failed to parse
        #[source_code]
        src: Option<String>,
        /// Location of the error in the source
        #[label("parse error here")]
        span: Option<SourceSpan>,
    },

    /// Malformed configuration file
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(keel::config), help("See keel.kdl for the expected layout"))]
    Config {
        /// What is wrong
        message: String,
    },

    /// A targeted release has no `release` block
    #[error("No configuration for release {release}")]
    #[diagnostic(
        code(keel::missing_release_config),
        help("Add a matching `release` block to the config")
    )]
    MissingReleaseConfig {
        /// Release label
        release: SmolStr,
    },

    /// A release was requested that is not a configured target
    #[error("Unknown release {release}")]
    #[diagnostic(code(keel::unknown_release))]
    UnknownRelease {
        /// Release label
        release: SmolStr,
    },

    /// Generated tokens did not parse as a Rust file
    #[error("Failed to format generated code for {}", path.display())]
    #[diagnostic(code(keel::format_error))]
    FormatError {
        #[source]
        source: syn::Error,
        /// Output file being rendered
        path: PathBuf,
    },

    /// Generic error with context
    #[error("{message}")]
    #[diagnostic(code(keel::error))]
    Other {
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BuildError {
    /// Create a parse error with source text
    pub fn parse_error_with_source(
        source: serde_json::Error,
        path: impl Into<PathBuf>,
        src: String,
    ) -> Self {
        let span = offset_of(&src, source.line(), source.column()).map(|o| (o, 1).into());
        Self::ParseError {
            source,
            path: path.into(),
            src: Some(src),
            span,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wrap an IO failure on a specific path
    pub fn io_at(path: &std::path::Path, err: io::Error) -> Self {
        Self::Other {
            message: format!("{}: {}", path.display(), err),
            source: Some(Box::new(err)),
        }
    }
}

/// Byte offset of a 1-based line/column pair
fn offset_of(src: &str, line: usize, column: usize) -> Option<usize> {
    let line = line.checked_sub(1)?;
    let start: usize = src.split_inclusive('\n').take(line).map(str::len).sum();
    Some((start + column.saturating_sub(1)).min(src.len().saturating_sub(1)))
}

/// Result type for build operations
pub type Result<T> = std::result::Result<T, BuildError>;
