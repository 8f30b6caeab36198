use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chain::{self, Plan, Step, StepAction, ToolCall};
use crate::context::{ExecutionContext, Inputs};
use crate::error::{PlanError, Result};
use crate::model::{Model, StubModel};
use crate::prompt;
use crate::signing;
use crate::trace::Trace;

/// Execute a compiled artifact with the placeholder model.
///
/// Returns the output of the last step in declared order.
pub fn execute(artifact_path: &Path, inputs: &Inputs) -> Result<String> {
    let mut tr = Trace::default();
    Interpreter::new(&StubModel).execute_file(artifact_path, inputs, &mut tr)
}

/// Sequential chain interpreter bound to one model implementation.
///
/// Each call to [`Interpreter::execute_plan`] owns a fresh
/// [`ExecutionContext`]; nothing is shared between runs.
pub struct Interpreter<'m> {
    model: &'m dyn Model,
    verify_signature: bool,
}

impl<'m> Interpreter<'m> {
    pub fn new(model: &'m dyn Model) -> Self {
        Self {
            model,
            verify_signature: false,
        }
    }

    /// Refuse artifacts whose recorded signature does not match their content.
    pub fn verify_signature(mut self, enabled: bool) -> Self {
        self.verify_signature = enabled;
        self
    }

    /// Read an artifact and type-check it into a [`Plan`].
    pub fn load(&self, artifact_path: &Path) -> Result<Plan> {
        let doc = chain::load_document(artifact_path)?;
        if self.verify_signature {
            let sig = signing::verify_doc(&doc, artifact_path)?;
            debug!(artifact = %artifact_path.display(), signature = %sig, "signature verified");
        }
        Plan::from_document(&doc, artifact_path)
    }

    pub fn execute_file(
        &self,
        artifact_path: &Path,
        inputs: &Inputs,
        tr: &mut Trace,
    ) -> Result<String> {
        let plan = self.load(artifact_path)?;
        if tr.signature.is_none() {
            tr.signature = plan.meta.as_ref().map(|m| m.signature_sha256.clone());
        }
        info!(
            artifact = %artifact_path.display(),
            steps = plan.steps.len(),
            "executing plan"
        );
        self.execute_plan(&plan, inputs, tr)
    }

    /// Run every step in declared order and return the last step's output.
    ///
    /// The plan is validated up front, so a dangling `input_from` fails the
    /// run before any model call is made.
    pub fn execute_plan(&self, plan: &Plan, inputs: &Inputs, tr: &mut Trace) -> Result<String> {
        plan.validate()?;
        if plan.steps.is_empty() {
            return Err(PlanError::EmptyPlan {
                origin: "<in-memory plan>".to_string(),
            });
        }

        tr.run_started(plan.steps.len());
        let mut ctx = ExecutionContext::new();
        let mut last_output: Option<String> = None;

        for step in &plan.steps {
            tr.step_started(&step.id, step.action.type_name());

            match self.run_step(step, inputs, &ctx, tr) {
                Ok(out) => {
                    tr.step_finished(&step.id, true);
                    debug!(step = %step.id, bytes = out.len(), "step finished");
                    ctx.record(&step.id, out.clone());
                    last_output = Some(out);
                }
                Err(err) => {
                    tr.step_finished(&step.id, false);
                    tr.run_failed(&err.to_string());
                    return Err(err);
                }
            }
        }

        tr.run_finished(true);
        last_output.ok_or_else(|| PlanError::EmptyPlan {
            origin: "<in-memory plan>".to_string(),
        })
    }

    fn run_step(
        &self,
        step: &Step,
        inputs: &Inputs,
        ctx: &ExecutionContext,
        tr: &mut Trace,
    ) -> Result<String> {
        match &step.action {
            StepAction::LlmCall(llm) => {
                let namespace = ctx.template_namespace(inputs);
                let prompt_text = prompt::resolve_prompt(&step.id, &llm.prompt, &namespace)?;
                tr.prompt_assembled(&step.id, &prompt::hash_prompt(&prompt_text));

                self.model
                    .invoke(&prompt_text, &llm.sampling)
                    .map_err(|err| PlanError::Model {
                        step_id: step.id.clone(),
                        message: format!("{err:#}"),
                    })
            }
            StepAction::ToolCall(tool) => score_step(&step.id, tool, ctx),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScoreEntry {
    impact_score: f64,
    likelihood_score: f64,
}

// Field order is alphabetical so the encoded object has sorted keys.
#[derive(Debug, Serialize)]
struct ScoreSummary {
    avg: f64,
    scores: Vec<f64>,
}

/// Weighted impact/likelihood scoring over a prior step's JSON output.
fn score_step(step_id: &str, tool: &ToolCall, ctx: &ExecutionContext) -> Result<String> {
    let raw = ctx
        .output(&tool.input_from)
        .ok_or_else(|| PlanError::Reference {
            step_id: step_id.to_string(),
            input_from: tool.input_from.clone(),
        })?;

    let entries: Vec<ScoreEntry> = serde_json::from_str(raw).map_err(|err| {
        PlanError::parse(
            format!(
                "output of step '{}' consumed by step '{step_id}'",
                tool.input_from
            ),
            err,
        )
    })?;
    if entries.is_empty() {
        return Err(PlanError::Division {
            step_id: step_id.to_string(),
            input_from: tool.input_from.clone(),
        });
    }

    let scores: Vec<f64> = entries
        .iter()
        .map(|e| e.impact_score * tool.impact_weight + e.likelihood_score * tool.likelihood_weight)
        .collect();
    let avg = scores.iter().sum::<f64>() / scores.len() as f64;

    encode_spaced(&ScoreSummary { avg, scores })
}

/// JSON with `", "` and `": "` separators, matching the common
/// human-readable encoding of tool results.
fn encode_spaced<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    value
        .serialize(&mut ser)
        .map_err(|err| PlanError::serialize("tool output", err))?;
    String::from_utf8(buf).map_err(|err| PlanError::serialize("tool output", err))
}

struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
