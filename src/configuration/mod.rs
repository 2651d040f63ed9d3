//! Fluent assembly of a [Logger].
//!
//! ```ignore
//! let logger = LoggerConfiguration::new()
//!     .minimum_level().verbose()
//!     .write_to().console(LogLevel::Verbose)
//!     .write_to().mongodb_capped("mongodb://localhost:27017/app", CappedMongoSinkOptions::default())?
//!     .enrich().with_property("dApp", "Billing")
//!     .create_logger();
//! ```

use std::sync::Arc;

use bson::Bson;

use crate::logging::{
    email_sink::{EmailSinkOptions, UnconfiguredTransport},
    ConsoleSink, EmailSink, LevelAlias, LogError, LogLevel, Logger, MailTransport, RegisteredSink,
    Sink,
};

mod mongo;
pub use mongo::*;

/// Accumulates sinks and enrichers until [LoggerConfiguration::create_logger] is called.
#[derive(Debug, Default)]
pub struct LoggerConfiguration {
    minimum_level: LogLevel,
    sinks: Vec<RegisteredSink>,
    enrichers: Vec<(String, Bson)>,
}

impl LoggerConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn minimum_level(self) -> LoggerMinimumLevelConfiguration {
        LoggerMinimumLevelConfiguration { configuration: self }
    }

    pub fn write_to(self) -> LoggerSinkConfiguration {
        LoggerSinkConfiguration { configuration: self }
    }

    pub fn enrich(self) -> LoggerEnrichmentConfiguration {
        LoggerEnrichmentConfiguration { configuration: self }
    }

    /// Registers `sink`, gated at `restricted_to_minimum_level`.
    pub fn sink(mut self, sink: impl Sink + 'static, restricted_to_minimum_level: LogLevel) -> Self {
        tracing::debug!(?restricted_to_minimum_level, "registering {sink:?}");
        self.sinks.push(RegisteredSink {
            sink: Arc::new(sink),
            minimum_level: restricted_to_minimum_level,
        });
        self
    }

    pub fn sinks(&self) -> &[RegisteredSink] {
        &self.sinks
    }

    pub fn enrichers(&self) -> &[(String, Bson)] {
        &self.enrichers
    }

    /// Finds the first registered sink of type `T`.
    pub fn find_sink<T: Sink + 'static>(&self) -> Option<(&T, LogLevel)> {
        self.sinks.iter().find_map(|registered| {
            registered
                .downcast_ref::<T>()
                .map(|sink| (sink, registered.minimum_level))
        })
    }

    pub fn create_logger(self) -> Logger {
        Logger::new(self.minimum_level, self.sinks, self.enrichers)
    }
}

pub struct LoggerMinimumLevelConfiguration {
    configuration: LoggerConfiguration,
}

impl LoggerMinimumLevelConfiguration {
    pub fn is(mut self, level: LogLevel) -> LoggerConfiguration {
        self.configuration.minimum_level = level;
        self.configuration
    }

    pub fn verbose(self) -> LoggerConfiguration {
        self.is(LevelAlias::MINIMUM)
    }

    pub fn debug(self) -> LoggerConfiguration {
        self.is(LogLevel::Debug)
    }

    pub fn information(self) -> LoggerConfiguration {
        self.is(LogLevel::Information)
    }

    pub fn warning(self) -> LoggerConfiguration {
        self.is(LogLevel::Warning)
    }

    pub fn error(self) -> LoggerConfiguration {
        self.is(LogLevel::Error)
    }

    pub fn fatal(self) -> LoggerConfiguration {
        self.is(LevelAlias::MAXIMUM)
    }
}

/// Entry point for registering sinks. The MongoDB entry points are defined in `configuration/mongo.rs`.
pub struct LoggerSinkConfiguration {
    configuration: LoggerConfiguration,
}

impl LoggerSinkConfiguration {
    pub fn sink(self, sink: impl Sink + 'static, restricted_to_minimum_level: LogLevel) -> LoggerConfiguration {
        self.configuration.sink(sink, restricted_to_minimum_level)
    }

    pub fn console(self, restricted_to_minimum_level: LogLevel) -> LoggerConfiguration {
        self.sink(ConsoleSink::default(), restricted_to_minimum_level)
    }

    /// Registers a batched email sink. Without a transport, see [LoggerSinkConfiguration::email_with_transport],
    /// messages are dropped and reported as diagnostics.
    pub fn email(
        self,
        options: EmailSinkOptions,
        restricted_to_minimum_level: LogLevel,
    ) -> Result<LoggerConfiguration, LogError> {
        self.email_with_transport(options, restricted_to_minimum_level, Arc::new(UnconfiguredTransport))
    }

    pub fn email_with_transport(
        self,
        options: EmailSinkOptions,
        restricted_to_minimum_level: LogLevel,
        transport: Arc<dyn MailTransport>,
    ) -> Result<LoggerConfiguration, LogError> {
        if options.from.trim().is_empty() {
            return Err(LogError::InvalidArgument("from_email"));
        }
        if options.to.is_empty() {
            return Err(LogError::InvalidArgument("to_emails"));
        }
        Ok(self.sink(EmailSink::new(options, transport), restricted_to_minimum_level))
    }
}

pub struct LoggerEnrichmentConfiguration {
    configuration: LoggerConfiguration,
}

impl LoggerEnrichmentConfiguration {
    /// Attaches `name = value` to every event that does not already carry `name`.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Bson>) -> LoggerConfiguration {
        self.configuration.enrichers.push((name.into(), value.into()));
        self.configuration
    }
}
