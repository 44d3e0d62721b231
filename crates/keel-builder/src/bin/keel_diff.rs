use clap::Parser;
use keel_builder::cli::DiffArgs;
use keel_builder::snapshot::{ChangeKind, MethodMap, diff};
use tracing_subscriber::EnvFilter;

fn main() -> miette::Result<()> {
    let args = DiffArgs::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let old = MethodMap::load(&args.old)?;
    let new = MethodMap::load(&args.new)?;
    let changes = diff(&old, &new);

    if changes.is_empty() {
        println!("No method changes");
        return Ok(());
    }
    for change in &changes {
        println!("{}", change);
    }

    let count = |pick: fn(&ChangeKind) -> bool| changes.iter().filter(|c| pick(&c.kind)).count();
    let added = count(|k| matches!(k, ChangeKind::Added { .. }));
    let removed = count(|k| matches!(k, ChangeKind::Removed { .. }));
    let relocated = count(|k| matches!(k, ChangeKind::Relocated { .. }));
    println!("{} added, {} removed, {} relocated", added, removed, relocated);
    if args.fail_on_removed && removed > 0 {
        return Err(miette::miette!("{} method(s) removed", removed));
    }
    Ok(())
}
