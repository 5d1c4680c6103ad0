//! Turns free-text goals into structured, scheduled tasks by prompting a chat
//! model and parsing its reply against the `Task` schema.

pub mod config;
pub mod error;
pub mod llm_manager;
pub mod logger;
pub mod parser;
pub mod processor;
pub mod prompt;
pub mod providers;
pub mod schema;
pub mod task;

pub use error::{LoggingError, ParseError, ProcessError, TemplateError};
pub use llm_manager::ChatModel;
pub use logger::{LoggerRegistry, ServiceLogger};
pub use processor::TaskProcessor;
pub use task::Task;
