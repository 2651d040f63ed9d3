//! Logging support for mongo-logger.
//! A [Logger] fans every accepted [LogEvent] out to a set of [Sink]s, each gated by its own minimum level.
//! The logger is fed by `tracing`: it implements [tracing_subscriber::Layer], so any `tracing` event becomes a [LogEvent].

use std::{any::Any, fmt::Debug};

use bson::Document;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod batching;

mod console_sink;
pub use console_sink::ConsoleSink;

pub mod email_sink;
pub use email_sink::{EmailSink, MailTransport};

pub mod mongo_logger;
pub use mongo_logger::{MongoSink, MongoTarget};

mod log_interface;
pub use log_interface::{Logger, RegisteredSink};

mod log_functions;
pub use log_functions::*;

/// Target used by the crate's own diagnostics. Events on this target only reach sinks that accept diagnostics.
pub const SELF_LOG_TARGET: &str = "mongo_logger";

/// Errors which may occur while configuring or running a logging pipeline.
#[derive(Error, Debug)]
pub enum LogError {
    /// A required argument was missing (the Rust stand-in for a null reference) or out of range.
    #[error("Missing or invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// `init` was called after a logger had already been installed.
    #[error("A global logger has already been initialized")]
    AlreadyInitialized,

    /// Some other `tracing` subscriber already owns the process.
    #[error("Could not install the logger as the global subscriber")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),

    /// The connection string did not name a database.
    #[error("Connection string {0:?} does not name a database")]
    MissingDatabaseName(String),

    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// The sink's writer has already shut down.
    #[error("Could not send event! Was the sink already flushed?")]
    SendError,

    #[error("Could not send mail: {0}")]
    Mail(String),

    #[error("Invalid configuration read from {path:?}: {source}")]
    Config {
        path: std::path::PathBuf,
        source: toml::de::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The configuration file was missing a required section.
    #[error("Missing [{0}] section in configuration")]
    MissingSection(&'static str),
}

/// Severity of a log event, from most to least verbose.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    /// Anything and everything.
    #[default]
    Verbose,
    Debug,
    Information,
    Warning,
    Error,
    /// The process cannot continue.
    Fatal,
}

impl LogLevel {
    /// Three-letter form used by the console sink.
    pub fn short_name(&self) -> &'static str {
        match self {
            LogLevel::Verbose => "VRB",
            LogLevel::Debug => "DBG",
            LogLevel::Information => "INF",
            LogLevel::Warning => "WRN",
            LogLevel::Error => "ERR",
            LogLevel::Fatal => "FTL",
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::INFO => LogLevel::Information,
            tracing::Level::DEBUG => LogLevel::Debug,
            _ => LogLevel::Verbose,
        }
    }
}

/// Named bounds of the level range.
pub struct LevelAlias;

impl LevelAlias {
    /// The lowest threshold: capture everything.
    pub const MINIMUM: LogLevel = LogLevel::Verbose;
    pub const MAXIMUM: LogLevel = LogLevel::Fatal;
}

/// A structured log event, as handed to every sink and as stored in MongoDB.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct LogEvent {
    pub timestamp: bson::DateTime,

    pub level: LogLevel,

    /// The message as written at the call site.
    pub message_template: String,

    /// The message after formatting. Sinks with a format hook overwrite this.
    pub rendered_message: String,

    /// Module path or `tracing` target that produced the event.
    pub target: String,

    pub properties: Document,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            timestamp: bson::DateTime::now(),
            level,
            rendered_message: message.clone(),
            message_template: message,
            target: String::new(),
            properties: Document::new(),
            exception: None,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<bson::Bson>) -> Self {
        self.properties.insert(name, value);
        self
    }

    /// Adds the property unless the event already carries one with that name.
    pub fn add_property_if_absent(&mut self, name: &str, value: &bson::Bson) {
        if !self.properties.contains_key(name) {
            self.properties.insert(name, value.clone());
        }
    }

    /// Whether this event came from the crate's own diagnostics.
    pub fn is_diagnostic(&self) -> bool {
        self.target.split("::").next() == Some(SELF_LOG_TARGET)
    }
}

/// Sinks are responsible for delivering events somewhere (console, email, database).
pub trait Sink: Send + Sync + Debug {
    /// Delivers (or queues) one event. Must not block on the network.
    fn emit(&self, event: &LogEvent);

    /// Pushes out anything buffered. Batching sinks stop accepting events afterwards.
    fn flush(&self) {}

    /// Whether the crate's own diagnostics may be written here.
    fn receives_diagnostics(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}
