use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by `compile` and `execute`.
///
/// None of these are recovered internally: the current call aborts and the
/// variant carries the path, step id or key needed to diagnose it.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("path not found: '{}'", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("i/o error on '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {message}")]
    Serialize { what: String, message: String },

    #[error("plan '{origin}' has no steps to execute")]
    EmptyPlan { origin: String },

    #[error("step '{step_id}': unresolved placeholder '{key}'")]
    TemplateResolution { step_id: String, key: String },

    #[error("step '{step_id}': input_from '{input_from}' does not name an earlier step")]
    Reference { step_id: String, input_from: String },

    #[error("step '{step_id}': input '{input_from}' has no scores to average")]
    Division { step_id: String, input_from: String },

    #[error("step '{step_id}': unsupported step type '{step_type}'")]
    UnsupportedStepType { step_id: String, step_type: String },

    #[error("step '{step_id}': {reason}")]
    InvalidStep { step_id: String, reason: String },

    #[error("step '{step_id}': model invocation failed: {message}")]
    Model { step_id: String, message: String },

    #[error("artifact '{}' is unsigned (missing meta.signature_sha256)", path.display())]
    Unsigned { path: PathBuf },

    #[error("signature mismatch: artifact records {expected}, content hashes to {actual}")]
    SignatureMismatch { expected: String, actual: String },
}

impl PlanError {
    pub(crate) fn parse(what: impl Into<String>, message: impl ToString) -> Self {
        PlanError::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn serialize(what: impl Into<String>, message: impl ToString) -> Self {
        PlanError::Serialize {
            what: what.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn invalid_step(step_id: &str, reason: impl Into<String>) -> Self {
        PlanError::InvalidStep {
            step_id: step_id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;
