//! This module provides MongoDB support for logging.
//!
//! The [MongoSink] queues [LogEvent]s for a dedicated writer thread, which writes them to the database in
//! batches of up to `batch_posting_limit` events, or whatever arrived within `period`.
//! Nothing touches the network until the first event is emitted.

use std::{any::Any, fmt, sync::Arc, time::Duration};

use mongodb::{
    options::{CreateCollectionOptions, InsertManyOptions, WriteConcern},
    sync::{Client, Collection, Database},
};

use super::{batching::BatchQueue, LogError, LogEvent, Sink};

pub use mongodb;

pub const DEFAULT_BATCH_POSTING_LIMIT: usize = 50;
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(2);
pub const DEFAULT_COLLECTION_NAME: &str = "log";

/// Where the log collection lives: a connection string naming a database, or an already open database.
#[derive(Clone, Debug)]
pub enum MongoTarget {
    Url(String),
    Database(Database),
}

impl MongoTarget {
    /// Rejects the Rust equivalent of a missing target: a blank connection string.
    pub fn validate(&self) -> Result<(), LogError> {
        match self {
            MongoTarget::Url(url) if url.trim().is_empty() => {
                Err(LogError::InvalidArgument("database_url"))
            }
            _ => Ok(()),
        }
    }

    fn open(&self) -> Result<Database, LogError> {
        match self {
            MongoTarget::Database(database) => Ok(database.clone()),
            MongoTarget::Url(url) => Client::with_uri_str(url)?
                .default_database()
                .ok_or_else(|| LogError::MissingDatabaseName(url.clone())),
        }
    }
}

impl From<&str> for MongoTarget {
    fn from(url: &str) -> Self {
        MongoTarget::Url(url.to_string())
    }
}

impl From<String> for MongoTarget {
    fn from(url: String) -> Self {
        MongoTarget::Url(url)
    }
}

impl From<Database> for MongoTarget {
    fn from(database: Database) -> Self {
        MongoTarget::Database(database)
    }
}

/// Renders `RenderedMessage` for an event in place of the message as written.
#[derive(Clone)]
pub struct FormatHook(Arc<dyn Fn(&LogEvent) -> String + Send + Sync>);

impl FormatHook {
    pub fn new(hook: impl Fn(&LogEvent) -> String + Send + Sync + 'static) -> Self {
        Self(Arc::new(hook))
    }

    pub fn render(&self, event: &LogEvent) -> String {
        (self.0)(event)
    }
}

impl fmt::Debug for FormatHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FormatHook(..)")
    }
}

/// Everything the writer needs, fixed when the sink is registered.
#[derive(Clone, Debug)]
pub struct MongoSinkSettings {
    pub target: MongoTarget,
    pub batch_posting_limit: usize,
    pub period: Duration,
    pub format_hook: Option<FormatHook>,
    pub collection_name: String,
    pub collection_options: CreateCollectionOptions,
}

/// A sink using MongoDB as the backing datastore.
#[derive(Debug)]
pub struct MongoSink {
    settings: MongoSinkSettings,
    queue: BatchQueue,
}

impl MongoSink {
    pub fn new(settings: MongoSinkSettings) -> Result<Self, LogError> {
        settings.target.validate()?;
        let queue = BatchQueue::new(
            format!("mongo-sink({})", settings.collection_name),
            settings.batch_posting_limit,
            settings.period,
        );
        Ok(Self { settings, queue })
    }

    pub fn settings(&self) -> &MongoSinkSettings {
        &self.settings
    }

    pub fn collection_name(&self) -> &str {
        &self.settings.collection_name
    }

    pub fn collection_options(&self) -> &CreateCollectionOptions {
        &self.settings.collection_options
    }

    /// Whether the writer thread has been started.
    pub fn is_running(&self) -> bool {
        self.queue.is_running()
    }
}

impl Sink for MongoSink {
    fn emit(&self, event: &LogEvent) {
        self.queue.push(event, || {
            let settings = self.settings.clone();
            move || MongoWriter::open(settings)
        });
    }

    fn flush(&self) {
        self.queue.close();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The writer half, owned by the dedicated thread.
struct MongoWriter {
    collection: Collection<LogEvent>,
    format_hook: Option<FormatHook>,
}

impl MongoWriter {
    /// Connects and returns the batch writer.
    fn open(
        settings: MongoSinkSettings,
    ) -> Result<impl FnMut(Vec<LogEvent>) -> Result<(), LogError>, LogError> {
        let writer = MongoWriter {
            collection: Self::open_collection(&settings)?,
            format_hook: settings.format_hook,
        };
        Ok(move |batch: Vec<LogEvent>| writer.write_batch(batch))
    }

    /// Creates the collection with the configured options if it does not exist yet.
    /// Existing collections keep whatever options they were created with.
    fn open_collection(settings: &MongoSinkSettings) -> Result<Collection<LogEvent>, LogError> {
        let database = settings.target.open()?;
        let name = settings.collection_name.as_str();
        if !database.list_collection_names(None)?.iter().any(|n| n == name) {
            database.create_collection(name, settings.collection_options.clone())?;
        }
        Ok(database.collection::<LogEvent>(name))
    }

    fn render(&self, mut event: LogEvent) -> LogEvent {
        if let Some(hook) = &self.format_hook {
            event.rendered_message = hook.render(&event);
        }
        event
    }

    fn write_batch(&self, batch: Vec<LogEvent>) -> Result<(), LogError> {
        let batch: Vec<_> = batch.into_iter().map(|event| self.render(event)).collect();
        self.collection.insert_many(
            batch.iter(),
            Some(
                InsertManyOptions::builder()
                    .write_concern(WriteConcern::builder().journal(false).build())
                    .ordered(false)
                    .build(),
            ),
        )?;
        Ok(())
    }
}
