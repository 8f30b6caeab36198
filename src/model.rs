use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::chain::SamplingParams;

/// The reasoning-model capability invoked by `llm_call` steps.
///
/// Implementations must be deterministic for a fixed `(prompt, params)` pair;
/// reproducibility of whole runs depends on it.
pub trait Model {
    fn invoke(&self, prompt: &str, params: &SamplingParams) -> Result<String>;
}

/// Placeholder model: answers with a label derived from the prompt.
///
/// The label uses FNV-1a with its published constants, so it is identical
/// across processes, builds and platforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubModel;

impl StubModel {
    pub fn label(prompt: &str) -> String {
        format!("[STUB OUTPUT for prompt hash={}]", fnv1a64(prompt) % 100_000)
    }
}

impl Model for StubModel {
    fn invoke(&self, prompt: &str, _params: &SamplingParams) -> Result<String> {
        Ok(Self::label(prompt))
    }
}

fn fnv1a64(text: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    text.bytes().fold(OFFSET_BASIS, |h, b| (h ^ u64::from(b)).wrapping_mul(PRIME))
}

/// Returns the same response for every prompt.
#[derive(Debug, Clone)]
pub struct FixedModel {
    response: String,
}

impl FixedModel {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl Model for FixedModel {
    fn invoke(&self, _prompt: &str, _params: &SamplingParams) -> Result<String> {
        Ok(self.response.clone())
    }
}

/// Replays recorded responses keyed by the exact rendered prompt.
#[derive(Debug, Clone, Default)]
pub struct ReplayModel {
    responses: HashMap<String, String>,
}

impl ReplayModel {
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self { responses }
    }

    /// Load a YAML (or JSON) mapping of prompt -> response.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))?;
        let responses: HashMap<String, String> = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse replay file '{}'", path.display()))?;
        Ok(Self { responses })
    }
}

impl Model for ReplayModel {
    fn invoke(&self, prompt: &str, _params: &SamplingParams) -> Result<String> {
        self.responses.get(prompt).cloned().ok_or_else(|| {
            let preview: String = prompt.chars().take(80).collect();
            anyhow!("no recorded response for prompt '{preview}'")
        })
    }
}

/// Which model implementation a run should use.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModelSpec {
    #[default]
    Stub,
    Fixed(String),
    Replay(PathBuf),
}

/// Factory: build a model implementation from its spec.
pub fn build_model(spec: &ModelSpec) -> Result<Box<dyn Model>> {
    match spec {
        ModelSpec::Stub => Ok(Box::new(StubModel)),
        ModelSpec::Fixed(response) => Ok(Box::new(FixedModel::new(response.clone()))),
        ModelSpec::Replay(path) => Ok(Box::new(ReplayModel::from_file(path)?)),
    }
}
