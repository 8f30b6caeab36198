use std::collections::BTreeSet;
use std::path::Path;

use tracing::info;

use crate::context::Inputs;
use crate::error::Result;
use crate::execute::Interpreter;
use crate::model::Model;
use crate::signing::sha256_hex;
use crate::trace::Trace;

pub const DEFAULT_RUNS: usize = 100;

/// Per-run result hashes from repeated executions of one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReproReport {
    pub hashes: Vec<String>,
}

impl ReproReport {
    pub fn runs(&self) -> usize {
        self.hashes.len()
    }

    pub fn unique(&self) -> BTreeSet<&str> {
        self.hashes.iter().map(String::as_str).collect()
    }

    /// True when every run produced the same result bytes.
    pub fn is_reproducible(&self) -> bool {
        self.unique().len() == 1
    }
}

/// Execute `artifact_path` `runs` times with identical inputs and record the
/// SHA-256 of each result. The plan is loaded once; every run gets its own
/// execution context.
pub fn check_reproducibility(
    artifact_path: &Path,
    inputs: &Inputs,
    runs: usize,
    model: &dyn Model,
) -> Result<ReproReport> {
    let interpreter = Interpreter::new(model);
    let plan = interpreter.load(artifact_path)?;
    let signature = plan.meta.as_ref().map(|m| m.signature_sha256.clone());

    let mut hashes = Vec::with_capacity(runs);
    for _ in 0..runs {
        let mut tr = Trace::new(signature.clone());
        let out = interpreter.execute_plan(&plan, inputs, &mut tr)?;
        hashes.push(sha256_hex(out.as_bytes()));
    }

    let report = ReproReport { hashes };
    info!(
        runs = report.runs(),
        unique = report.unique().len(),
        "reproducibility check finished"
    );
    Ok(report)
}
