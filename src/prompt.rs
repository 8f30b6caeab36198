use std::collections::HashMap;

use crate::chain::PromptSource;
use crate::error::{PlanError, Result};
use crate::signing::sha256_hex;

/// Short content hash of rendered prompt text for trace events.
pub fn hash_prompt(prompt_text: &str) -> String {
    sha256_hex(prompt_text.as_bytes())[..16].to_string()
}

/// Resolve the text sent to the model for one step.
///
/// Literal prompts are returned verbatim; templates go through
/// [`render_template`].
pub fn resolve_prompt(
    step_id: &str,
    source: &PromptSource,
    namespace: &HashMap<String, String>,
) -> Result<String> {
    match source {
        PromptSource::Literal(text) => Ok(text.clone()),
        PromptSource::Template(template) => render_template(step_id, template, namespace),
    }
}

/// Substitute `{name}` placeholders from `namespace`.
///
/// `{{` and `}}` produce literal braces. A placeholder with no binding fails
/// with `TemplateResolution`; an unmatched brace is a malformed template.
pub fn render_template(
    step_id: &str,
    template: &str,
    namespace: &HashMap<String, String>,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    loop {
        let Some(pos) = rest.find(|c: char| c == '{' || c == '}') else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            return Err(PlanError::invalid_step(
                step_id,
                "malformed prompt_template: unmatched '}'",
            ));
        }

        let Some(end) = tail[1..].find('}') else {
            return Err(PlanError::invalid_step(
                step_id,
                "malformed prompt_template: unclosed '{'",
            ));
        };
        let key = &tail[1..1 + end];
        if key.contains('{') {
            return Err(PlanError::invalid_step(
                step_id,
                "malformed prompt_template: nested '{'",
            ));
        }
        let value = namespace
            .get(key)
            .ok_or_else(|| PlanError::TemplateResolution {
                step_id: step_id.to_string(),
                key: key.to_string(),
            })?;
        out.push_str(value);
        rest = &tail[end + 2..];
    }

    Ok(out)
}
