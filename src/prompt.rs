use chrono::{Days, Local, NaiveDate};
use std::collections::HashMap;

use crate::error::TemplateError;

/// Planning instructions sent ahead of every goal.
pub const PLANNING_PROMPT: &str = r#"
You are TaskMaster AI, an expert in hierarchical task decomposition and time-based planning.
Transform high-level goals into detailed daily action plans with atomic subtasks.


RULES FOR SUBTASK DECOMPOSITION:
1. ATOMIC TASKS:
   - Each subtask must be executable without further breakdown
   - Maximum 1 core action per subtask
   - Clear completion criteria for every subtask

2. TIME MANAGEMENT:
   - Calculate duration from explicit time markers (e.g., "[15 min]")
   - Default scheduling:
     * Weekdays: First task at {weekday_start}
     * Weekends: First task at {weekend_start}
   - Minimum 10min buffer between subtasks

3. REQUIRED FIELDS PER SUBTASK:
   - title: Action-oriented verb phrase ("Practice scales", "Write API endpoints")
   - description: Numbered steps with time allocations per step
   - time_required: Total minutes (sum of step times)
   - resources: Any needed tools/materials
   - dependencies: Previous subtask IDs if required
   - metrics: Quantifiable success criteria

4. HIERARCHY PRINCIPLES:
   - 3-5 subtasks per day
   - Progressive difficulty: Foundation → Application → Mastery
   - Weekly themes: Week 1: Basics, Week 2: Integration, etc.

5. CONTENT REQUIREMENTS:
   - Include time estimates for EVERY step (e.g., "1. Warm-up [10 min]: ...")
   - Add pedagogical elements:
     * Theory + practice balance
     * Progressive overload
     * Spaced repetition
   - Domain-specific details (technical terms, best practices)

6. DEFAULTS:
   - Start date: Tomorrow ({start_date})
   - Subtask duration: 25-50min (learning), 30-90min (projects)
   - Complexity/Priority:
        Skill acquisition: 0.8/0.7
        Project delivery: 0.9/0.9
        Habit building: 0.5/0.6

USER'S GOAL:
{goal}

{format_instructions}
"#;

/// Scheduling values substituted into the planning prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanningDefaults {
    /// Fixed start date; `None` means "tomorrow" at render time.
    pub start_date: Option<NaiveDate>,
    pub weekday_start: String,
    pub weekend_start: String,
}

impl Default for PlanningDefaults {
    fn default() -> Self {
        Self {
            start_date: None,
            weekday_start: "19:00".to_string(),
            weekend_start: "10:00".to_string(),
        }
    }
}

impl PlanningDefaults {
    pub fn resolve_start_date(&self) -> NaiveDate {
        self.start_date.unwrap_or_else(|| {
            let today = Local::now().date_naive();
            today.checked_add_days(Days::new(1)).unwrap_or(today)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Var(String),
}

/// A text template with `{name}` placeholders. `{{` and `}}` render as
/// literal braces. Substituted values are inserted verbatim.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
    partials: HashMap<String, String>,
}

impl PromptTemplate {
    pub fn from_template(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    text.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    let name = name.trim();
                    if !closed || name.is_empty() || name.contains('{') {
                        return Err(TemplateError::Malformed(pos));
                    }
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Var(name.to_string()));
                }
                '}' => return Err(TemplateError::Malformed(pos)),
                _ => text.push(c),
            }
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self {
            segments,
            partials: HashMap::new(),
        })
    }

    /// Bind a variable for every future render.
    pub fn partial(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.partials.insert(name.into(), value.into());
        self
    }

    /// Names of variables that still need a value at render time, in order of
    /// first appearance.
    pub fn input_variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Var(name) = segment {
                if !self.partials.contains_key(name) && !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    pub fn render(&self, values: &[(&str, &str)]) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Var(name) => {
                    let value = values
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, v)| *v)
                        .or_else(|| self.partials.get(name).map(String::as_str))
                        .ok_or_else(|| TemplateError::MissingVariable(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}
