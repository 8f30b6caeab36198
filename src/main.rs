use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use chainplan::context::{parse_binding, InputValue, Inputs};
use chainplan::model::{self, ModelSpec};
use chainplan::{compiler, execute, repro, signing, trace};

/// chainplan: compile reasoning chains into signed plans and replay them.
#[derive(Parser, Debug)]
#[command(name = "chainplan")]
#[command(about = "Static reasoning-chain compiler and deterministic interpreter", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a chain source into a signed `.compiled.<ext>` artifact
    Compile {
        /// Path to the chain source (YAML or JSON)
        source: PathBuf,
    },

    /// Execute a compiled artifact and print the final result
    Run {
        /// Path to the compiled artifact
        artifact: PathBuf,

        /// Input binding `name=value` (repeatable)
        #[arg(long = "input", value_parser = parse_binding)]
        inputs: Vec<(String, InputValue)>,

        /// Replay model responses from a prompt -> response mapping file
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Refuse artifacts whose signature does not match their content
        #[arg(long)]
        verify: bool,

        /// Print the execution trace after the result
        #[arg(long)]
        trace: bool,
    },

    /// Execute an artifact repeatedly and check every result is identical
    Repro {
        /// Path to the compiled artifact
        artifact: PathBuf,

        /// Input binding `name=value` (repeatable)
        #[arg(long = "input", value_parser = parse_binding)]
        inputs: Vec<(String, InputValue)>,

        /// Number of executions
        #[arg(long, default_value_t = repro::DEFAULT_RUNS)]
        runs: usize,

        /// Replay model responses from a prompt -> response mapping file
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// Check an artifact's signature against its content
    Verify {
        /// Path to the compiled artifact
        artifact: PathBuf,
    },
}

fn print_error_chain(err: &anyhow::Error) {
    eprintln!("Error: {err}");

    let mut n = 0;
    let mut cur = err.source();
    while let Some(cause) = cur {
        eprintln!("  {n}: {cause}");
        n += 1;
        cur = cause.source();
    }
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn model_spec(replay: Option<PathBuf>) -> ModelSpec {
    replay.map(ModelSpec::Replay).unwrap_or_default()
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match real_main(cli.command) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            print_error_chain(&err);
            std::process::exit(1);
        }
    }
}

fn real_main(command: Command) -> Result<i32> {
    match command {
        Command::Compile { source } => {
            let compiled = compiler::compile(&source)
                .with_context(|| format!("failed to compile '{}'", source.display()))?;
            println!("[compiler] Compiled: {}", compiled.artifact_path.display());
            println!("[compiler] Signature: {}", compiled.signature);
            Ok(0)
        }
        Command::Run {
            artifact,
            inputs,
            replay,
            verify,
            trace: do_trace,
        } => {
            let inputs: Inputs = inputs.into_iter().collect();
            let model = model::build_model(&model_spec(replay))?;
            let interpreter = execute::Interpreter::new(model.as_ref()).verify_signature(verify);

            let mut tr = trace::Trace::default();
            let result = interpreter.execute_file(&artifact, &inputs, &mut tr);
            if do_trace {
                trace::print_trace(&tr);
            }
            let out = result.with_context(|| format!("failed to execute '{}'", artifact.display()))?;
            println!("{out}");
            Ok(0)
        }
        Command::Repro {
            artifact,
            inputs,
            runs,
            replay,
        } => {
            let inputs: Inputs = inputs.into_iter().collect();
            let model = model::build_model(&model_spec(replay))?;
            let report = repro::check_reproducibility(&artifact, &inputs, runs, model.as_ref())
                .with_context(|| format!("failed to execute '{}'", artifact.display()))?;

            for (i, h) in report.hashes.iter().enumerate() {
                println!("Run {:3}: {h}", i + 1);
            }
            println!();
            println!("Unique hashes: {}", report.unique().len());
            if report.is_reproducible() {
                println!("REPRODUCIBLE runs={}", report.runs());
                Ok(0)
            } else {
                println!("NON-DETERMINISTIC runs={}", report.runs());
                Ok(1)
            }
        }
        Command::Verify { artifact } => {
            let sig = signing::verify_file(&artifact)
                .with_context(|| format!("failed to verify '{}'", artifact.display()))?;
            println!("VERIFIED signature={sig}");
            Ok(0)
        }
    }
}
