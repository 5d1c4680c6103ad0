use chrono::Local;
use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::dispatcher::{self, SetGlobalDefaultError};
use tracing::{Dispatch, Event, Level, Subscriber, debug};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::{LookupSpan, Registry};
use tracing_subscriber::Layer;

use crate::error::LoggingError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Where a service logger writes its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkKind {
    Console,
    File(PathBuf),
    Writer,
}

/// Formats every event as `timestamp - name - LEVEL - message`.
struct LineFormat {
    name: String,
}

fn level_label(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} - {} - {} - ",
            Local::now().format(TIMESTAMP_FORMAT),
            self.name,
            level_label(event.metadata().level())
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Named logger handle shared by the components of one service.
///
/// Events reach the sinks while the handle's dispatcher is in scope, see
/// [`ServiceLogger::in_scope`] and [`ServiceLogger::dispatch`].
#[derive(Debug)]
pub struct ServiceLogger {
    name: String,
    sinks: Vec<SinkKind>,
    dispatch: Dispatch,
}

pub struct ServiceLoggerBuilder {
    name: String,
    level: LevelFilter,
    sinks: Vec<SinkKind>,
    layers: Vec<BoxedLayer>,
}

impl ServiceLoggerBuilder {
    fn layer<W>(&self, make_writer: W) -> BoxedLayer
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        tracing_subscriber::fmt::layer()
            .with_writer(make_writer)
            .with_ansi(false)
            .event_format(LineFormat {
                name: self.name.clone(),
            })
            .with_filter(self.level)
            .boxed()
    }

    pub fn console(mut self) -> Self {
        self.layers.push(self.layer(std::io::stdout));
        self.sinks.push(SinkKind::Console);
        self
    }

    /// Append to `path`, creating it if absent.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Result<Self, LoggingError> {
        let path = path.into();
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LoggingError::OpenLogFile {
                path: path.clone(),
                source,
            })?;
        self.layers.push(self.layer(Arc::new(file)));
        self.sinks.push(SinkKind::File(path));
        Ok(self)
    }

    pub fn writer<W>(mut self, make_writer: W) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        self.layers.push(self.layer(make_writer));
        self.sinks.push(SinkKind::Writer);
        self
    }

    pub fn build(self) -> ServiceLogger {
        let subscriber = tracing_subscriber::registry().with(self.layers);
        ServiceLogger {
            name: self.name,
            sinks: self.sinks,
            dispatch: Dispatch::new(subscriber),
        }
    }
}

impl ServiceLogger {
    pub fn builder(name: impl Into<String>, level: LevelFilter) -> ServiceLoggerBuilder {
        ServiceLoggerBuilder {
            name: name.into(),
            level,
            sinks: Vec::new(),
            layers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sinks(&self) -> &[SinkKind] {
        &self.sinks
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run `f` with this logger as the current dispatcher.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, f)
    }

    /// Make this logger the process-wide default for events emitted outside
    /// any scoped logger. Fails if a global default is already set.
    pub fn install_global(&self) -> Result<(), SetGlobalDefaultError> {
        dispatcher::set_global_default(self.dispatch.clone())
    }
}

/// Owns the loggers of a process, one per service name.
#[derive(Debug)]
pub struct LoggerRegistry {
    log_dir: PathBuf,
    level: LevelFilter,
    loggers: Mutex<HashMap<String, Arc<ServiceLogger>>>,
}

impl LoggerRegistry {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            level: LevelFilter::INFO,
            loggers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Return the logger for `service_name`, writing to stdout and
    /// `<service_name>.log`. Sinks are attached only when the logger is first
    /// created, so repeated calls never duplicate output.
    pub fn setup_service_logging(
        &self,
        service_name: &str,
    ) -> Result<Arc<ServiceLogger>, LoggingError> {
        if service_name.is_empty() {
            return Err(LoggingError::EmptyServiceName);
        }
        let mut loggers = self.loggers.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = loggers.get(service_name) {
            return Ok(Arc::clone(existing));
        }

        let logger = ServiceLogger::builder(service_name, self.level)
            .console()
            .file(self.log_dir.join(format!("{}.log", service_name)))?
            .build();
        logger.in_scope(|| debug!(sinks = ?logger.sinks(), "Service logging configured"));

        let logger = Arc::new(logger);
        loggers.insert(service_name.to_string(), Arc::clone(&logger));
        Ok(logger)
    }
}
