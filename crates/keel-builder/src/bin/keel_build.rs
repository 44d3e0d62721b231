use clap::Parser;
use keel_builder::cli::BuildArgs;
use keel_builder::{Config, build_all, write_outputs};
use smol_str::SmolStr;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> miette::Result<()> {
    let args = BuildArgs::parse();
    init_tracing(args.verbose);

    let config = Config::load(&args.config)?;
    let only: Vec<SmolStr> = args.releases.iter().map(|r| SmolStr::from(r.as_str())).collect();

    let outcome = build_all(&config, &only)?;
    write_outputs(&config, &outcome.builds)?;

    for build in &outcome.builds {
        println!("{}", build.summary());
    }
    println!("Generated code to {:?}", config.output.codegen_dir);

    if outcome.failures.is_empty() {
        return Ok(());
    }
    let aborted = outcome.failures.len();
    for (_, err) in outcome.failures {
        eprintln!("{:?}", miette::Report::new(err));
    }
    Err(miette::miette!("{} release(s) aborted", aborted))
}
