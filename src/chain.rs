use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;

use crate::error::{PlanError, Result};

/// Top-level key holding the ordered step list.
pub const REASONING_CHAIN: &str = "reasoning_chain";
/// Top-level key holding compilation metadata.
pub const META: &str = "meta";

pub const STEP_TYPE_LLM_CALL: &str = "llm_call";
pub const STEP_TYPE_TOOL_CALL: &str = "tool_call";

pub const DEFAULT_TEMPERATURE: f64 = 0.0;
pub const DEFAULT_TOP_P: f64 = 1.0;
pub const DEFAULT_PRESENCE_PENALTY: f64 = 0.0;
pub const DEFAULT_FREQUENCY_PENALTY: f64 = 0.0;

pub const DEFAULT_IMPACT_WEIGHT: f64 = 0.6;
pub const DEFAULT_LIKELIHOOD_WEIGHT: f64 = 0.4;

/// Sampling controls passed to the model for an `llm_call` step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_presence_penalty")]
    pub presence_penalty: f64,
    #[serde(default = "default_frequency_penalty")]
    pub frequency_penalty: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            presence_penalty: DEFAULT_PRESENCE_PENALTY,
            frequency_penalty: DEFAULT_FREQUENCY_PENALTY,
        }
    }
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_top_p() -> f64 {
    DEFAULT_TOP_P
}

fn default_presence_penalty() -> f64 {
    DEFAULT_PRESENCE_PENALTY
}

fn default_frequency_penalty() -> f64 {
    DEFAULT_FREQUENCY_PENALTY
}

fn default_impact_weight() -> f64 {
    DEFAULT_IMPACT_WEIGHT
}

fn default_likelihood_weight() -> f64 {
    DEFAULT_LIKELIHOOD_WEIGHT
}

/// Compilation metadata attached to an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub compiled_at: String,
    pub compiler: String,
    pub signature_sha256: String,
    pub deterministic_sampling: bool,
}

/// Where an `llm_call` gets its prompt text from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    /// Named `{placeholder}`s resolved against inputs and prior outputs.
    Template(String),
    /// Sent as-is.
    Literal(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmCall {
    pub prompt: PromptSource,
    pub sampling: SamplingParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub input_from: String,
    pub impact_weight: f64,
    pub likelihood_weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    LlmCall(LlmCall),
    ToolCall(ToolCall),
}

impl StepAction {
    pub fn type_name(&self) -> &'static str {
        match self {
            StepAction::LlmCall(_) => STEP_TYPE_LLM_CALL,
            StepAction::ToolCall(_) => STEP_TYPE_TOOL_CALL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub id: String,
    pub action: StepAction,
}

/// A chain loaded for execution: typed steps in declared order.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub meta: Option<Meta>,
}

// Wire shapes. Unknown keys are ignored here; the compiler works on the raw
// document tree and keeps them.
#[derive(Debug, Deserialize)]
struct RawStep {
    id: String,
    #[serde(rename = "type")]
    step_type: String,
    #[serde(default)]
    llm_call: Option<RawLlmCall>,
    #[serde(default)]
    tool_call: Option<RawToolCall>,
}

#[derive(Debug, Deserialize)]
struct RawLlmCall {
    #[serde(default)]
    prompt_template: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default = "default_top_p")]
    top_p: f64,
    #[serde(default = "default_presence_penalty")]
    presence_penalty: f64,
    #[serde(default = "default_frequency_penalty")]
    frequency_penalty: f64,
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    args: RawToolArgs,
}

#[derive(Debug, Deserialize)]
struct RawToolArgs {
    input_from: String,
    #[serde(default = "default_impact_weight")]
    impact_weight: f64,
    #[serde(default = "default_likelihood_weight")]
    likelihood_weight: f64,
}

impl Step {
    fn from_raw(raw: RawStep) -> Result<Self> {
        let action = match raw.step_type.as_str() {
            STEP_TYPE_LLM_CALL => {
                let llm = raw
                    .llm_call
                    .ok_or_else(|| PlanError::invalid_step(&raw.id, "missing llm_call payload"))?;
                let prompt = match (llm.prompt_template, llm.prompt) {
                    (Some(t), None) => PromptSource::Template(t),
                    (None, Some(p)) => PromptSource::Literal(p),
                    (Some(_), Some(_)) => {
                        return Err(PlanError::invalid_step(
                            &raw.id,
                            "llm_call sets both prompt_template and prompt (exactly one is allowed)",
                        ))
                    }
                    (None, None) => {
                        return Err(PlanError::invalid_step(
                            &raw.id,
                            "llm_call requires prompt_template or prompt",
                        ))
                    }
                };
                StepAction::LlmCall(LlmCall {
                    prompt,
                    sampling: SamplingParams {
                        temperature: llm.temperature,
                        top_p: llm.top_p,
                        presence_penalty: llm.presence_penalty,
                        frequency_penalty: llm.frequency_penalty,
                    },
                })
            }
            STEP_TYPE_TOOL_CALL => {
                let tool = raw
                    .tool_call
                    .ok_or_else(|| PlanError::invalid_step(&raw.id, "missing tool_call payload"))?;
                StepAction::ToolCall(ToolCall {
                    input_from: tool.args.input_from,
                    impact_weight: tool.args.impact_weight,
                    likelihood_weight: tool.args.likelihood_weight,
                })
            }
            other => {
                return Err(PlanError::UnsupportedStepType {
                    step_id: raw.id,
                    step_type: other.to_string(),
                })
            }
        };

        Ok(Step { id: raw.id, action })
    }
}

impl Step {
    /// Check this step against the ids declared before it.
    fn check_against(&self, declared: impl Fn(&str) -> bool) -> Result<()> {
        if declared(&self.id) {
            return Err(PlanError::invalid_step(&self.id, "duplicate step id"));
        }
        if let StepAction::ToolCall(tool) = &self.action {
            if !declared(&tool.input_from) {
                return Err(PlanError::Reference {
                    step_id: self.id.clone(),
                    input_from: tool.input_from.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Plan {
    /// Build a typed plan from a parsed document.
    ///
    /// `origin` is only used for error messages. A missing or empty
    /// `reasoning_chain` fails with `EmptyPlan`.
    pub fn from_document(doc: &YamlValue, origin: &Path) -> Result<Self> {
        let map = match doc {
            YamlValue::Mapping(map) => Some(map),
            YamlValue::Null => None,
            _ => {
                return Err(PlanError::parse(
                    origin.display().to_string(),
                    "top-level document must be a mapping",
                ))
            }
        };

        let raw_steps = match map.and_then(|m| m.get(REASONING_CHAIN)) {
            None | Some(YamlValue::Null) => Vec::new(),
            Some(YamlValue::Sequence(seq)) => seq.clone(),
            Some(_) => {
                return Err(PlanError::parse(
                    origin.display().to_string(),
                    "reasoning_chain must be a sequence",
                ))
            }
        };

        if raw_steps.is_empty() {
            return Err(PlanError::EmptyPlan {
                origin: origin.display().to_string(),
            });
        }

        // Each step is converted and checked before the next one is read, so
        // the first offending step in declared order is the one reported.
        let mut steps = Vec::with_capacity(raw_steps.len());
        let mut seen: HashSet<String> = HashSet::new();
        for (idx, value) in raw_steps.into_iter().enumerate() {
            let raw: RawStep = serde_yaml::from_value(value)
                .map_err(|err| PlanError::parse(format!("reasoning_chain[{idx}]"), err))?;
            let step = Step::from_raw(raw)?;
            step.check_against(|id| seen.contains(id))?;
            seen.insert(step.id.clone());
            steps.push(step);
        }

        let meta = match map.and_then(|m| m.get(META)) {
            None | Some(YamlValue::Null) => None,
            Some(v) => Some(
                serde_yaml::from_value(v.clone()).map_err(|err| PlanError::parse(META, err))?,
            ),
        };

        Ok(Plan { steps, meta })
    }

    /// Parse and type-check a document held in memory.
    pub fn parse_str(text: &str, origin: &Path) -> Result<Self> {
        let doc = parse_document(text, &origin.display().to_string())?;
        Self::from_document(&doc, origin)
    }

    /// Check ids are unique and every `input_from` names an earlier step.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            step.check_against(|id| seen.contains(id))?;
            seen.insert(step.id.as_str());
        }
        Ok(())
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }
}

/// Parse YAML (or JSON, which the YAML reader accepts) into a document tree.
pub fn parse_document(text: &str, what: &str) -> Result<YamlValue> {
    serde_yaml::from_str(text).map_err(|err| PlanError::parse(what, err))
}

/// Read and parse a chain document from disk.
pub fn load_document(path: &Path) -> Result<YamlValue> {
    let text = read_text(path)?;
    parse_document(&text, &path.display().to_string())
}

pub(crate) fn read_text(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(PlanError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let bytes = fs::read(path).map_err(|source| PlanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|err| PlanError::parse(path.display().to_string(), err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(yaml: &str) -> Result<Plan> {
        Plan::parse_str(yaml, Path::new("test.yaml"))
    }

    #[test]
    fn parses_llm_and_tool_steps_with_defaults() {
        let p = plan(
            r#"
reasoning_chain:
  - id: fetch
    type: llm_call
    llm_call:
      prompt_template: "Price is {price}"
      top_p: 0.8
  - id: score
    type: tool_call
    tool_call:
      args:
        input_from: fetch
"#,
        )
        .expect("plan");

        assert_eq!(p.steps.len(), 2);
        match &p.steps[0].action {
            StepAction::LlmCall(llm) => {
                assert_eq!(llm.prompt, PromptSource::Template("Price is {price}".into()));
                assert_eq!(llm.sampling.top_p, 0.8);
                assert_eq!(llm.sampling.presence_penalty, 0.0);
            }
            other => panic!("expected llm_call, got {other:?}"),
        }
        match &p.steps[1].action {
            StepAction::ToolCall(tool) => {
                assert_eq!(tool.input_from, "fetch");
                assert_eq!(tool.impact_weight, DEFAULT_IMPACT_WEIGHT);
                assert_eq!(tool.likelihood_weight, DEFAULT_LIKELIHOOD_WEIGHT);
            }
            other => panic!("expected tool_call, got {other:?}"),
        }
        assert!(p.meta.is_none());
    }

    #[test]
    fn literal_prompt_is_kept_as_literal() {
        let p = plan(
            r#"
reasoning_chain:
  - id: s1
    type: llm_call
    llm_call:
      prompt: "no {substitution} here"
"#,
        )
        .expect("plan");
        match &p.steps[0].action {
            StepAction::LlmCall(llm) => {
                assert_eq!(llm.prompt, PromptSource::Literal("no {substitution} here".into()))
            }
            other => panic!("expected llm_call, got {other:?}"),
        }
    }

    #[test]
    fn both_prompt_fields_are_rejected() {
        let err = plan(
            r#"
reasoning_chain:
  - id: s1
    type: llm_call
    llm_call:
      prompt: "a"
      prompt_template: "b"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::InvalidStep { ref step_id, .. } if step_id == "s1"));
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let err = plan(
            r#"
reasoning_chain:
  - id: s1
    type: web_search
"#,
        )
        .unwrap_err();
        match err {
            PlanError::UnsupportedStepType { step_id, step_type } => {
                assert_eq!(step_id, "s1");
                assert_eq!(step_type, "web_search");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_and_empty_chains_are_empty_plans() {
        assert!(matches!(plan("other: 1\n"), Err(PlanError::EmptyPlan { .. })));
        assert!(matches!(plan("reasoning_chain: []\n"), Err(PlanError::EmptyPlan { .. })));
        assert!(matches!(plan(""), Err(PlanError::EmptyPlan { .. })));
    }

    #[test]
    fn forward_reference_fails_validation() {
        let err = plan(
            r#"
reasoning_chain:
  - id: score
    type: tool_call
    tool_call:
      args:
        input_from: later
  - id: later
    type: llm_call
    llm_call:
      prompt: "x"
"#,
        )
        .unwrap_err();
        match err {
            PlanError::Reference {
                step_id,
                input_from,
            } => {
                assert_eq!(step_id, "score");
                assert_eq!(input_from, "later");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn self_reference_fails_validation() {
        let err = plan(
            r#"
reasoning_chain:
  - id: loop
    type: tool_call
    tool_call:
      args:
        input_from: loop
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::Reference { .. }));
    }

    #[test]
    fn first_offending_step_is_reported() {
        let err = plan(
            r#"
reasoning_chain:
  - id: warmup
    type: llm_call
    llm_call:
      prompt: "x"
  - id: score
    type: tool_call
    tool_call:
      args:
        input_from: later
  - id: later
    type: web_search
"#,
        )
        .unwrap_err();
        assert!(
            matches!(err, PlanError::Reference { ref step_id, .. } if step_id == "score"),
            "got {err:?}"
        );
    }

    #[test]
    fn tool_weights_parse_from_yaml() {
        let p = plan(
            r#"
reasoning_chain:
  - id: analyze
    type: llm_call
    llm_call:
      prompt: "x"
  - id: score
    type: tool_call
    tool_call:
      args:
        input_from: analyze
        impact_weight: 1
        likelihood_weight: 0.25
"#,
        )
        .expect("plan");
        match &p.steps[1].action {
            StepAction::ToolCall(tool) => {
                assert_eq!(tool.impact_weight, 1.0);
                assert_eq!(tool.likelihood_weight, 0.25);
            }
            other => panic!("expected tool_call, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = plan(
            r#"
reasoning_chain:
  - id: s1
    type: llm_call
    llm_call:
      prompt: "a"
  - id: s1
    type: llm_call
    llm_call:
      prompt: "b"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::InvalidStep { .. }));
    }

    #[test]
    fn non_mapping_document_is_a_parse_error() {
        assert!(matches!(plan("- 1\n- 2\n"), Err(PlanError::Parse { .. })));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load_document(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, PlanError::NotFound { .. }));
    }
}
