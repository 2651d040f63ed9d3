//! `write_to().mongodb(..)` and `write_to().mongodb_capped(..)`.
//!
//! Both accept anything convertible into a [MongoTarget]: a connection string (`&str`/`String`) naming the
//! database, or an open [mongodb::sync::Database].

use std::time::Duration;

use derive_builder::Builder;
use mongodb::options::CreateCollectionOptions;

use super::{LoggerConfiguration, LoggerSinkConfiguration};
use crate::logging::{
    mongo_logger::{
        FormatHook, MongoSinkSettings, DEFAULT_BATCH_POSTING_LIMIT, DEFAULT_COLLECTION_NAME, DEFAULT_PERIOD,
    },
    LevelAlias, LogError, LogLevel, MongoSink, MongoTarget,
};

pub const DEFAULT_CAPPED_MAX_SIZE_MB: u64 = 50;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Options for an uncapped log collection named [DEFAULT_COLLECTION_NAME].
#[derive(Clone, Debug, Builder)]
#[builder(pattern = "owned", default)]
pub struct MongoSinkOptions {
    /// The minimum level required in order to write an event to the sink.
    pub restricted_to_minimum_level: LogLevel,

    /// The maximum number of events to post in a single batch.
    pub batch_posting_limit: usize,

    /// The time to wait between checking for event batches.
    pub period: Duration,

    #[builder(setter(strip_option))]
    pub format_hook: Option<FormatHook>,
}

impl Default for MongoSinkOptions {
    fn default() -> Self {
        Self {
            restricted_to_minimum_level: LevelAlias::MINIMUM,
            batch_posting_limit: DEFAULT_BATCH_POSTING_LIMIT,
            period: DEFAULT_PERIOD,
            format_hook: None,
        }
    }
}

/// Options for a capped log collection.
#[derive(Clone, Debug, Builder)]
#[builder(pattern = "owned", default)]
pub struct CappedMongoSinkOptions {
    pub restricted_to_minimum_level: LogLevel,

    /// Max total size of the created capped collection, in megabytes.
    pub max_size_mb: u64,

    /// Max number of documents of the created capped collection. Unlimited if unset.
    #[builder(setter(strip_option))]
    pub max_documents: Option<u64>,

    /// Falls back to [DEFAULT_COLLECTION_NAME].
    #[builder(setter(into, strip_option))]
    pub collection_name: Option<String>,

    pub batch_posting_limit: usize,

    pub period: Duration,

    #[builder(setter(strip_option))]
    pub format_hook: Option<FormatHook>,
}

impl Default for CappedMongoSinkOptions {
    fn default() -> Self {
        Self {
            restricted_to_minimum_level: LevelAlias::MINIMUM,
            max_size_mb: DEFAULT_CAPPED_MAX_SIZE_MB,
            max_documents: None,
            collection_name: None,
            batch_posting_limit: DEFAULT_BATCH_POSTING_LIMIT,
            period: DEFAULT_PERIOD,
            format_hook: None,
        }
    }
}

impl CappedMongoSinkOptions {
    /// Creation options applied when the collection does not exist yet.
    ///
    /// Fails with [LogError::InvalidArgument] if `max_size_mb` does not fit in bytes.
    pub fn collection_options(&self) -> Result<CreateCollectionOptions, LogError> {
        let size = self
            .max_size_mb
            .checked_mul(BYTES_PER_MB)
            .ok_or(LogError::InvalidArgument("max_size_mb"))?;
        Ok(CreateCollectionOptions::builder()
            .capped(true)
            .size(size)
            .max(self.max_documents)
            .build())
    }

    pub fn resolved_collection_name(&self) -> String {
        self.collection_name
            .clone()
            .unwrap_or_else(|| DEFAULT_COLLECTION_NAME.to_string())
    }
}

impl LoggerSinkConfiguration {
    /// Adds a sink that writes log events as documents to the [DEFAULT_COLLECTION_NAME] collection of a MongoDB database.
    ///
    /// Fails with [LogError::InvalidArgument] if `target` is a blank connection string; no sink is registered then.
    pub fn mongodb(
        self,
        target: impl Into<MongoTarget>,
        options: MongoSinkOptions,
    ) -> Result<LoggerConfiguration, LogError> {
        let sink = MongoSink::new(MongoSinkSettings {
            target: target.into(),
            batch_posting_limit: options.batch_posting_limit,
            period: options.period,
            format_hook: options.format_hook,
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            collection_options: CreateCollectionOptions::default(),
        })?;
        Ok(self.sink(sink, options.restricted_to_minimum_level))
    }

    /// Adds a sink that writes log events as documents to a capped collection in a MongoDB database.
    ///
    /// Fails with [LogError::InvalidArgument] if `target` is a blank connection string or `max_size_mb` overflows;
    /// no sink is registered then.
    pub fn mongodb_capped(
        self,
        target: impl Into<MongoTarget>,
        options: CappedMongoSinkOptions,
    ) -> Result<LoggerConfiguration, LogError> {
        let collection_options = options.collection_options()?;
        let collection_name = options.resolved_collection_name();
        let sink = MongoSink::new(MongoSinkSettings {
            target: target.into(),
            batch_posting_limit: options.batch_posting_limit,
            period: options.period,
            format_hook: options.format_hook,
            collection_name,
            collection_options,
        })?;
        Ok(self.sink(sink, options.restricted_to_minimum_level))
    }
}
