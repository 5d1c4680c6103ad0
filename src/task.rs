use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A unit of planned work produced from a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Action-oriented verb phrase
    pub title: String,

    /// Numbered steps with time allocations per step
    pub description: String,

    /// Total minutes
    pub time_required: u32,

    #[serde(default)]
    pub resources: Vec<String>,

    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Quantifiable success criteria
    #[serde(default)]
    pub metrics: Vec<String>,

    #[serde(default = "default_weight")]
    pub complexity: f32,

    #[serde(default = "default_weight")]
    pub priority: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,

    #[serde(default)]
    pub subtasks: Vec<Task>,
}

fn default_weight() -> f32 { 0.5 }

impl Task {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        time_required: u32,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            time_required,
            resources: Vec::new(),
            dependencies: Vec::new(),
            metrics: Vec::new(),
            complexity: default_weight(),
            priority: default_weight(),
            start_date: None,
            subtasks: Vec::new(),
        }
    }

    /// Checks the constraints serde cannot express. Returns the offending
    /// field path and reason for the first violation found.
    pub fn validate(&self) -> Result<(), (String, String)> {
        self.validate_at("")
    }

    fn validate_at(&self, prefix: &str) -> Result<(), (String, String)> {
        let field = |name: &str| format!("{}{}", prefix, name);

        if self.title.trim().is_empty() {
            return Err((field("title"), "must not be empty".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err((field("description"), "must not be empty".to_string()));
        }
        if self.time_required == 0 {
            return Err((field("time_required"), "must be at least 1 minute".to_string()));
        }
        for (name, value) in [("complexity", self.complexity), ("priority", self.priority)] {
            if !(0.0..=1.0).contains(&value) {
                return Err((field(name), format!("must be within 0.0..=1.0, got {}", value)));
            }
        }
        for (i, subtask) in self.subtasks.iter().enumerate() {
            subtask.validate_at(&format!("{}subtasks[{}].", prefix, i))?;
        }
        Ok(())
    }
}
