use std::sync::Arc;
use std::time::Duration;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info};

use crate::error::{ProcessError, error_chain};
use crate::llm_manager::ChatModel;
use crate::logger::ServiceLogger;
use crate::parser::TaskParser;
use crate::prompt::{PLANNING_PROMPT, PlanningDefaults, PromptTemplate};
use crate::task::Task;

const PREVIEW_CHARS: usize = 50;

/// Turns goals into structured tasks with a chat model.
///
/// Holds only immutable configuration, so one processor can serve
/// concurrent calls. Every event emitted while a call runs, including the
/// provider's and the parser's, goes to the service logger's sinks.
pub struct TaskProcessor {
    model: Arc<dyn ChatModel>,
    prompt: PromptTemplate,
    parser: TaskParser,
    defaults: PlanningDefaults,
    timeout: Option<Duration>,
    logger: Arc<ServiceLogger>,
}

impl TaskProcessor {
    pub fn new(
        model: Arc<dyn ChatModel>,
        logger: Arc<ServiceLogger>,
    ) -> Result<Self, ProcessError> {
        let parser = TaskParser::new();
        let prompt = PromptTemplate::from_template(PLANNING_PROMPT)?
            .partial("format_instructions", parser.format_instructions());
        logger.in_scope(|| {
            debug!(
                "Task processor for '{}' using {} model '{}'",
                logger.name(),
                model.name(),
                model.model_name()
            )
        });
        Ok(Self {
            model,
            prompt,
            parser,
            defaults: PlanningDefaults::default(),
            timeout: None,
            logger,
        })
    }

    pub fn with_defaults(mut self, defaults: PlanningDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Bound each model call. Without this a call waits as long as the
    /// provider does.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Process a free-text goal into a new `Task`.
    pub async fn process_goal(&self, goal: &str) -> Result<Task, ProcessError> {
        async {
            info!("Starting to process goal: '{}...'", preview(goal));
            self.run(goal).await
        }
        .with_subscriber(self.logger.dispatch().clone())
        .await
    }

    /// Re-plan an existing task, producing a new `Task`.
    pub async fn process_task(&self, task: &Task) -> Result<Task, ProcessError> {
        let goal = task_goal(task);
        async {
            info!(
                "Starting to process goal: '{}...'",
                preview(&format!("{:?}", task))
            );
            self.run(&goal).await
        }
        .with_subscriber(self.logger.dispatch().clone())
        .await
    }

    async fn run(&self, goal: &str) -> Result<Task, ProcessError> {
        match self.invoke_chain(goal).await {
            Ok(task) => {
                info!(
                    "Successfully parsed LLM response for goal: '{}...'",
                    preview(goal)
                );
                Ok(task)
            }
            Err(err) => {
                if let ProcessError::Parse(parse) = &err {
                    debug!("Unparsed model output: {}", parse.llm_output());
                }
                error!(
                    "Failed to process goal '{}...'. Error: {}",
                    preview(goal),
                    error_chain(&err)
                );
                Err(err)
            }
        }
    }

    /// Render, call the model, parse.
    async fn invoke_chain(&self, goal: &str) -> Result<Task, ProcessError> {
        let start_date = self.defaults.resolve_start_date().to_string();
        let prompt = self.prompt.render(&[
            ("goal", goal),
            ("start_date", &start_date),
            ("weekday_start", &self.defaults.weekday_start),
            ("weekend_start", &self.defaults.weekend_start),
        ])?;

        let call = self.model.invoke(&prompt);
        let reply = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ProcessError::Timeout(limit))?,
            None => call.await,
        }
        .map_err(ProcessError::Model)?;

        debug!("Received {} bytes from {}", reply.len(), self.model.name());
        Ok(self.parser.parse(&reply)?)
    }
}

/// Goal text used when re-planning an existing task.
pub fn task_goal(task: &Task) -> String {
    format!("- {} - \n{}", task.title, task.description)
}

/// First characters of `text`, cut on a char boundary.
fn preview(text: &str) -> &str {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::io::{self, Write};
    use std::sync::Mutex;
    use tracing::warn;
    use tracing_subscriber::filter::LevelFilter;

    const SPANISH_PLAN: &str = r#"```json
{
  "title": "Learn Spanish in 30 days",
  "description": "1. Set up Anki deck [15 min]\n2. Core vocabulary [30 min]",
  "time_required": 45,
  "resources": ["Anki", "Spanish podcast"],
  "metrics": ["Recall 50 words with 90% accuracy"],
  "complexity": 0.8,
  "priority": 0.7,
  "start_date": "2025-06-23"
}
```"#;

    /// Replies with a fixed text and remembers every prompt it saw.
    struct ScriptedModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("provider unavailable (status {0})")]
    struct Unavailable(u16);

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn invoke(&self, _prompt: &str) -> Result<String> {
            Err(Unavailable(503).into())
        }
    }

    /// Warns the way a provider does on a truncated reply.
    struct TruncatingModel;

    #[async_trait]
    impl ChatModel for TruncatingModel {
        fn name(&self) -> &str {
            "truncating"
        }

        async fn invoke(&self, _prompt: &str) -> Result<String> {
            warn!("Response was truncated by the token limit");
            Ok(SPANISH_PLAN.to_string())
        }
    }

    struct SlowModel;

    #[async_trait]
    impl ChatModel for SlowModel {
        fn name(&self) -> &str {
            "slow"
        }

        async fn invoke(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(SPANISH_PLAN.to_string())
        }
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }

        fn lines(&self) -> Vec<String> {
            self.text().lines().map(str::to_string).collect()
        }
    }

    fn capture_logger_at(level: LevelFilter) -> (Arc<ServiceLogger>, Captured) {
        let captured = Captured::default();
        let writer = captured.clone();
        let logger = ServiceLogger::builder("task_processor", level)
            .writer(move || writer.clone())
            .build();
        (Arc::new(logger), captured)
    }

    fn capture_logger() -> (Arc<ServiceLogger>, Captured) {
        capture_logger_at(LevelFilter::INFO)
    }

    #[tokio::test]
    async fn test_process_goal_returns_task() {
        let model = ScriptedModel::new(SPANISH_PLAN);
        let (logger, captured) = capture_logger();
        let processor = TaskProcessor::new(model.clone(), logger).unwrap();

        let task = processor.process_goal("Learn Spanish in 30 days").await.unwrap();

        assert!(!task.title.is_empty());
        assert!(!task.description.is_empty());
        assert!(task.time_required > 0);

        let lines = captured.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(
            " - task_processor - INFO - Starting to process goal: 'Learn Spanish in 30 days...'"
        ));
        assert!(lines[1].contains("Successfully parsed LLM response"));
    }

    #[tokio::test]
    async fn test_prompt_contains_goal_and_schema() {
        let model = ScriptedModel::new(SPANISH_PLAN);
        let (logger, _) = capture_logger();
        let processor = TaskProcessor::new(model.clone(), logger)
            .unwrap()
            .with_defaults(PlanningDefaults {
                start_date: NaiveDate::from_ymd_opt(2025, 6, 23),
                weekday_start: "18:30".to_string(),
                ..Default::default()
            });

        processor.process_goal("Run a 10k").await.unwrap();

        let prompt = model.last_prompt();
        assert!(prompt.contains("USER'S GOAL:\nRun a 10k\n"));
        assert!(prompt.contains("Start date: Tomorrow (2025-06-23)"));
        assert!(prompt.contains("Weekdays: First task at 18:30"));
        assert!(prompt.contains("Weekends: First task at 10:00"));
        assert!(prompt.contains(&crate::schema::task_json_schema().to_string()));
    }

    #[tokio::test]
    async fn test_process_task_derives_goal() {
        let model = ScriptedModel::new(SPANISH_PLAN);
        let (logger, _) = capture_logger();
        let processor = TaskProcessor::new(model.clone(), logger).unwrap();
        let existing = Task::new("Practice scales", "1. Warm-up [10 min]", 10);

        let task = processor.process_task(&existing).await.unwrap();

        assert_ne!(task, existing);
        assert_eq!(task_goal(&existing), "- Practice scales - \n1. Warm-up [10 min]");
        assert!(
            model
                .last_prompt()
                .contains("USER'S GOAL:\n- Practice scales - \n1. Warm-up [10 min]\n")
        );
    }

    #[tokio::test]
    async fn test_model_error_is_returned_unchanged() {
        let (logger, captured) = capture_logger();
        let processor = TaskProcessor::new(Arc::new(FailingModel), logger).unwrap();

        let err = processor.process_goal("Learn Spanish in 30 days").await.unwrap_err();

        match &err {
            ProcessError::Model(inner) => {
                assert_eq!(inner.downcast_ref::<Unavailable>().map(|u| u.0), Some(503));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let lines = captured.lines();
        assert!(lines.iter().all(|l| l.contains(" - task_processor - ")));
        let error_line = lines.iter().find(|l| l.contains(" - ERROR - ")).unwrap();
        assert!(error_line.ends_with(
            "Failed to process goal 'Learn Spanish in 30 days...'. \
             Error: model invocation failed: provider unavailable (status 503)"
        ));
        assert_eq!(captured.text().matches("provider unavailable").count(), 1);
    }

    #[tokio::test]
    async fn test_model_events_reach_service_sinks() {
        let (logger, captured) = capture_logger();
        let processor = TaskProcessor::new(Arc::new(TruncatingModel), logger).unwrap();

        processor.process_goal("Learn Spanish").await.unwrap();

        assert!(captured.lines().iter().any(|l| {
            l.ends_with(" - task_processor - WARNING - Response was truncated by the token limit")
        }));
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_a_parse_error() {
        let model = ScriptedModel::new("Sure! Start by buying a phrasebook.");
        let (logger, captured) = capture_logger();
        let processor = TaskProcessor::new(model, logger).unwrap();

        let err = processor.process_goal("Learn Spanish").await.unwrap_err();

        assert!(matches!(err, ProcessError::Parse(ParseError::NoJson { .. })));
        assert!(captured.lines().iter().any(|l| l.contains(" - ERROR - ")));
    }

    #[tokio::test]
    async fn test_unparsed_output_logged_at_debug() {
        let model = ScriptedModel::new("Sure! Start by buying a phrasebook.");
        let (logger, captured) = capture_logger_at(LevelFilter::DEBUG);
        let processor = TaskProcessor::new(model, logger).unwrap();

        processor.process_goal("Learn Spanish").await.unwrap_err();

        assert!(captured.lines().iter().any(|l| {
            l.ends_with(" - DEBUG - Unparsed model output: Sure! Start by buying a phrasebook.")
        }));
    }

    #[tokio::test]
    async fn test_schema_violation_is_a_parse_error() {
        let model = ScriptedModel::new(r#"{"title": "", "description": "x", "time_required": 5}"#);
        let (logger, _) = capture_logger();
        let processor = TaskProcessor::new(model, logger).unwrap();

        match processor.process_goal("Learn Spanish").await {
            Err(ProcessError::Parse(ParseError::Validation { field, .. })) => {
                assert_eq!(field, "title")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let (logger, _) = capture_logger();
        let processor = TaskProcessor::new(Arc::new(SlowModel), logger)
            .unwrap()
            .with_timeout(Duration::from_secs(5));

        let err = processor.process_goal("Learn Spanish").await.unwrap_err();
        assert!(matches!(err, ProcessError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_processor() {
        let model = ScriptedModel::new(SPANISH_PLAN);
        let (logger, _) = capture_logger();
        let processor = Arc::new(TaskProcessor::new(model.clone(), logger).unwrap());

        let handles: Vec<_> = ["Run a 10k", "Learn Spanish", "Read 12 books"]
            .into_iter()
            .map(|goal| {
                let processor = Arc::clone(&processor);
                tokio::spawn(async move { processor.process_goal(goal).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(model.prompts.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let goal = "ñ".repeat(60);
        assert_eq!(preview(&goal).chars().count(), 50);
        assert_eq!(preview("short"), "short");
    }
}
