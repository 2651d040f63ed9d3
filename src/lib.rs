//! Structured logging to MongoDB, with console output and batched email alerts.
//!
//! [configuration::LoggerConfiguration] assembles a [logging::Logger] from sinks and enrichers;
//! [bootstrap::init] does it the standard way for an application and installs the result
//! as the process-wide `tracing` subscriber.

pub mod bootstrap;
pub mod config;
pub mod configuration;
pub mod logging;

// Re-exports what most applications need.
pub mod prelude {
    pub use crate::bootstrap::{
        build_configuration, build_configuration_with_transport, init, init_from_config,
        init_from_config_with_transport, init_with_transport, resolve, AppOptions, MailNotifyOptions,
        MongoOptions, MongoOptionsV2, MongoSettings,
    };
    pub use crate::configuration::{
        CappedMongoSinkOptions, CappedMongoSinkOptionsBuilder, LoggerConfiguration, MongoSinkOptions,
        MongoSinkOptionsBuilder,
    };
    pub use crate::logging::{
        email_sink::{MailMessage, MailTransport},
        LevelAlias, LogError, LogEvent, LogLevel, Logger, MongoSink, MongoTarget, Sink,
    };
}
