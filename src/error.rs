use std::error::Error as StdError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure while turning a goal into a `Task`.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to render prompt")]
    Template(#[from] TemplateError),

    /// The chat model call failed. The provider's error is kept as-is so
    /// callers can `downcast_ref` to the original type.
    #[error("model invocation failed")]
    Model(#[source] anyhow::Error),

    #[error("model invocation timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to parse model response")]
    Parse(#[from] ParseError),
}

/// The model's text could not be mapped onto the `Task` schema.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in model output")]
    NoJson { llm_output: String },

    #[error("model output is not a valid Task")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
        llm_output: String,
    },

    #[error("field `{field}` {reason}")]
    Validation {
        field: String,
        reason: String,
        llm_output: String,
    },
}

impl ParseError {
    /// Raw model output that failed to parse.
    pub fn llm_output(&self) -> &str {
        match self {
            ParseError::NoJson { llm_output }
            | ParseError::InvalidJson { llm_output, .. }
            | ParseError::Validation { llm_output, .. } => llm_output,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("missing value for template variable `{0}`")]
    MissingVariable(String),

    #[error("unterminated placeholder at byte {0}")]
    Malformed(usize),
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("service name must not be empty")]
    EmptyServiceName,

    #[error("failed to open log file {}", .path.display())]
    OpenLogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Renders an error and every `source()` below it on one line.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}
