use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// External bindings available to prompt templates, by name.
pub type Inputs = BTreeMap<String, InputValue>;

/// A scalar input binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Bool(b) => write!(f, "{b}"),
            InputValue::Integer(i) => write!(f, "{i}"),
            // Integral floats render as `2.0`, not `2`.
            InputValue::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => {
                write!(f, "{v:.1}")
            }
            InputValue::Float(v) => write!(f, "{v}"),
            InputValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        InputValue::Text(value.to_string())
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        InputValue::Text(value)
    }
}

impl From<i64> for InputValue {
    fn from(value: i64) -> Self {
        InputValue::Integer(value)
    }
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        InputValue::Float(value)
    }
}

impl From<bool> for InputValue {
    fn from(value: bool) -> Self {
        InputValue::Bool(value)
    }
}

impl InputValue {
    /// Interpret command-line text: integer, then float, then boolean, else text.
    pub fn parse_scalar(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return InputValue::Integer(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return InputValue::Float(f);
            }
        }
        match raw {
            "true" => InputValue::Bool(true),
            "false" => InputValue::Bool(false),
            _ => InputValue::Text(raw.to_string()),
        }
    }
}

/// Parse a `name=value` binding.
pub fn parse_binding(raw: &str) -> Result<(String, InputValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("input binding '{raw}' must look like name=value"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("input binding '{raw}' has an empty name"));
    }
    Ok((name.to_string(), InputValue::parse_scalar(value)))
}

/// Outputs produced so far in one execution, keyed by step id.
///
/// Owned by a single run; never persisted or shared.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    outputs: HashMap<String, String>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step_id: &str, output: String) {
        self.outputs.insert(step_id.to_string(), output);
    }

    pub fn output(&self, step_id: &str) -> Option<&str> {
        self.outputs.get(step_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Names visible to a prompt template: every input verbatim plus
    /// `<id>_output` for each prior step. Step outputs win on collision.
    pub fn template_namespace(&self, inputs: &Inputs) -> HashMap<String, String> {
        let mut ns: HashMap<String, String> = inputs
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        for (id, out) in &self.outputs {
            ns.insert(format!("{id}_output"), out.clone());
        }
        ns
    }
}
