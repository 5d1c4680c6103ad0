//! Machine-readable description of the `Task` record handed to the model.
//!
//! The schema is written out by hand from [`TASK_FIELDS`] so that it stays a
//! plain function of the field list. Keep the table in sync with
//! [`crate::task::Task`]; `test_fields_match_task_serialization` fails when
//! they drift.

use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Date,
    StringList,
    TaskList,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub required: bool,
}

pub const TASK_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "title",
        kind: FieldKind::String,
        description: "Action-oriented verb phrase, e.g. \"Practice scales\"",
        required: true,
    },
    FieldSpec {
        name: "description",
        kind: FieldKind::String,
        description: "Numbered steps with a time allocation per step, e.g. \"1. Warm-up [10 min]: ...\"",
        required: true,
    },
    FieldSpec {
        name: "time_required",
        kind: FieldKind::Integer,
        description: "Total minutes (sum of step times)",
        required: true,
    },
    FieldSpec {
        name: "resources",
        kind: FieldKind::StringList,
        description: "Tools or materials needed",
        required: false,
    },
    FieldSpec {
        name: "dependencies",
        kind: FieldKind::StringList,
        description: "Titles of subtasks that must be completed first",
        required: false,
    },
    FieldSpec {
        name: "metrics",
        kind: FieldKind::StringList,
        description: "Quantifiable success criteria",
        required: false,
    },
    FieldSpec {
        name: "complexity",
        kind: FieldKind::Number,
        description: "Complexity from 0.0 to 1.0",
        required: false,
    },
    FieldSpec {
        name: "priority",
        kind: FieldKind::Number,
        description: "Priority from 0.0 to 1.0",
        required: false,
    },
    FieldSpec {
        name: "start_date",
        kind: FieldKind::Date,
        description: "Scheduled start date (YYYY-MM-DD)",
        required: false,
    },
    FieldSpec {
        name: "subtasks",
        kind: FieldKind::TaskList,
        description: "Atomic subtasks, each following this same schema",
        required: false,
    },
];

fn property(field: &FieldSpec) -> Value {
    let mut prop = match field.kind {
        FieldKind::String => json!({ "type": "string" }),
        FieldKind::Integer => json!({ "type": "integer", "minimum": 1 }),
        FieldKind::Number => json!({ "type": "number", "minimum": 0.0, "maximum": 1.0 }),
        FieldKind::Date => json!({ "type": "string", "format": "date" }),
        FieldKind::StringList => json!({ "type": "array", "items": { "type": "string" } }),
        FieldKind::TaskList => json!({ "type": "array", "items": { "$ref": "#" } }),
    };
    prop["description"] = Value::String(field.description.to_string());
    prop
}

/// JSON schema for `Task`, built from [`TASK_FIELDS`].
pub fn task_json_schema() -> Value {
    let mut properties = Map::new();
    for field in TASK_FIELDS {
        properties.insert(field.name.to_string(), property(field));
    }
    let required: Vec<Value> = TASK_FIELDS
        .iter()
        .filter(|f| f.required)
        .map(|f| Value::String(f.name.to_string()))
        .collect();

    json!({
        "title": "Task",
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Instructions appended to the prompt telling the model how to shape its reply.
pub fn format_instructions() -> String {
    let schema = task_json_schema().to_string();
    format!(
        r#"The output should be formatted as a JSON instance that conforms to the JSON schema below.

As an example, for the schema {{"properties": {{"foo": {{"title": "Foo", "description": "a list of strings", "type": "array", "items": {{"type": "string"}}}}}}, "required": ["foo"]}}
the object {{"foo": ["bar", "baz"]}} is a well-formatted instance of the schema. The object {{"properties": {{"foo": ["bar", "baz"]}}}} is not well-formatted.

Here is the output schema:
```
{}
```"#,
        schema
    )
}
