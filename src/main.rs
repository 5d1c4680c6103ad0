use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs;
use tracing_subscriber::filter::LevelFilter;

use task_processor::config::Config;
use task_processor::llm_manager::model_from_config;
use task_processor::{LoggerRegistry, Task, TaskProcessor};

#[derive(Parser)]
#[command(name = "task_processor")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<String>,
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
    /// Re-plan the task stored in this JSON file instead of a goal
    #[arg(long, value_name = "TASK_JSON")]
    refine: Option<String>,
    /// Goal in natural language
    #[arg(last = true)]
    goal: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        config.logging.level_filter()?
    };
    let registry = LoggerRegistry::new(&config.logging.log_dir).with_level(level);
    let logger = registry.setup_service_logging(&config.logging.service_name)?;
    logger
        .install_global()
        .context("Failed to install global logger")?;

    let model = model_from_config(&config.ai_providers)?;
    let mut processor =
        TaskProcessor::new(model, logger)?.with_defaults(config.planner.defaults());
    if let Some(timeout) = config.planner.timeout() {
        processor = processor.with_timeout(timeout);
    }

    let task = match &args.refine {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read task file: {}", path))?;
            let existing: Task = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse task file: {}", path))?;
            processor.process_task(&existing).await?
        }
        None => {
            let goal = args.goal.join(" ");
            if goal.trim().is_empty() {
                bail!("No goal given. Usage: task_processor -- <goal>");
            }
            processor.process_goal(&goal).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}
