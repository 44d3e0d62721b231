use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate versioned Rust models from cluster API schemas")]
pub struct BuildArgs {
    /// Path to KDL config file
    #[arg(short = 'c', long, default_value = "keel.kdl")]
    pub config: PathBuf,

    /// Build only this release (repeatable)
    #[arg(short = 'r', long = "release")]
    pub releases: Vec<String>,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Compare two method-map snapshots")]
pub struct DiffArgs {
    /// Earlier snapshot
    pub old: PathBuf,

    /// Later snapshot
    pub new: PathBuf,

    /// Exit with an error when methods were removed
    #[arg(long)]
    pub fail_on_removed: bool,
}
