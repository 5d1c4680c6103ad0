use tracing::debug;

use crate::error::ParseError;
use crate::schema;
use crate::task::Task;

/// Maps model text onto the `Task` schema.
#[derive(Debug, Clone, Default)]
pub struct TaskParser;

impl TaskParser {
    pub fn new() -> Self {
        Self
    }

    pub fn format_instructions(&self) -> String {
        schema::format_instructions()
    }

    /// Parse a model reply into a validated `Task`.
    pub fn parse(&self, text: &str) -> Result<Task, ParseError> {
        let json = extract_json(text).ok_or_else(|| ParseError::NoJson {
            llm_output: text.to_string(),
        })?;
        debug!("Extracted {} bytes of JSON from model output", json.len());

        let task: Task = serde_json::from_str(json).map_err(|source| ParseError::InvalidJson {
            source,
            llm_output: text.to_string(),
        })?;

        task.validate().map_err(|(field, reason)| ParseError::Validation {
            field,
            reason,
            llm_output: text.to_string(),
        })?;

        Ok(task)
    }
}

/// Finds the JSON object in a reply: the body of the first fenced code block
/// that holds one, otherwise the span from the first `{` to the last `}`.
fn extract_json(text: &str) -> Option<&str> {
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after_fence = &rest[start + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let Some(end) = after_fence[body_start..].find("```") else {
            break;
        };
        let body = after_fence[body_start..body_start + end].trim();
        if body.starts_with('{') {
            return Some(body);
        }
        rest = &after_fence[body_start + end + 3..];
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
