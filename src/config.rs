use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;

use crate::prompt::PlanningDefaults;

/// Main configuration structure for task_processor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// AI provider configurations
    #[serde(default)]
    pub ai_providers: AIProvidersConfig,

    /// Planning prompt defaults
    #[serde(default)]
    pub planner: PlannerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logger name and log file prefix
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Minimum level ("error", "warn", "info", "debug", "trace")
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory holding `<service_name>.log`
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIProvidersConfig {
    pub openai: Option<ProviderConfig>,
    pub anthropic: Option<ProviderConfig>,
    pub openrouter: Option<ProviderConfig>,
    pub ollama: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Whether this provider is enabled
    pub enabled: bool,

    /// Model to use
    pub model: String,

    /// Temperature setting
    pub temperature: Option<f32>,

    /// Override for API-compatible endpoints
    pub base_url: Option<String>,

    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Fixed plan start date; tomorrow when unset
    pub start_date: Option<NaiveDate>,

    #[serde(default = "default_weekday_start")]
    pub weekday_start: String,

    #[serde(default = "default_weekend_start")]
    pub weekend_start: String,

    /// Upper bound on a single model call; unbounded when unset
    pub timeout_secs: Option<u64>,
}

// Default value functions
fn default_service_name() -> String { "task_processor".to_string() }
fn default_level() -> String { "info".to_string() }
fn default_log_dir() -> String { ".".to_string() }
fn default_weekday_start() -> String { "19:00".to_string() }
fn default_weekend_start() -> String { "10:00".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            level: default_level(),
            log_dir: default_log_dir(),
        }
    }
}

impl Default for AIProvidersConfig {
    fn default() -> Self {
        Self {
            openai: Some(ProviderConfig {
                enabled: true,
                model: "gpt-4.1".to_string(),
                temperature: Some(0.2),
                base_url: None,
                max_tokens: None,
            }),
            anthropic: Some(ProviderConfig {
                enabled: false,
                model: "claude-sonnet-4-0".to_string(),
                temperature: Some(0.2),
                base_url: None,
                max_tokens: Some(8192),
            }),
            openrouter: None,
            ollama: Some(ProviderConfig {
                enabled: false,
                model: "qwen3:8b".to_string(),
                temperature: Some(0.7),
                base_url: Some("http://localhost:11434".to_string()),
                max_tokens: None,
            }),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            weekday_start: default_weekday_start(),
            weekend_start: default_weekend_start(),
            timeout_secs: None,
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.level)
            .map_err(|_| anyhow!("Invalid log level '{}'", self.level))
    }
}

impl PlannerConfig {
    pub fn defaults(&self) -> PlanningDefaults {
        PlanningDefaults {
            start_date: self.start_date,
            weekday_start: self.weekday_start.clone(),
            weekend_start: self.weekend_start.clone(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from command line argument or default locations
    pub fn load(config_path: &Option<String>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::from_file(shellexpand::tilde(path).as_ref());
        }

        let default_paths = [
            "task_processor.toml",
            ".task_processor.toml",
            "~/.config/task_processor/config.toml",
        ];

        for path in default_paths {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                // Logging is not up yet, so warnings go straight to stderr.
                match Self::from_file(expanded_path.as_ref()) {
                    Ok(config) => return Ok(config),
                    Err(e) => eprintln!("Warning: Failed to load config from {}: {:#}", path, e),
                }
            }
        }

        Ok(Self::default())
    }
}
