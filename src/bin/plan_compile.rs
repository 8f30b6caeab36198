use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// Compile a static reasoning chain into a signed artifact.
#[derive(Parser, Debug)]
#[command(name = "plan-compile")]
struct Args {
    /// Reasoning chain source file (YAML or JSON)
    source: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let compiled = chainplan::compile(&args.source)
        .with_context(|| format!("failed to compile '{}'", args.source.display()))?;
    println!("[compiler] Compiled: {}", compiled.artifact_path.display());
    println!("[compiler] Signature: {}", compiled.signature);
    Ok(())
}
