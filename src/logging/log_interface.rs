use std::{fmt, sync::Arc};

use bson::Bson;
use tracing::{
    field::{Field, Visit},
    Event, Metadata, Subscriber,
};
use tracing_subscriber::{layer::Context, Layer};

use super::{LogEvent, LogLevel, Sink};

/// A sink together with the lowest level it accepts.
#[derive(Clone, Debug)]
pub struct RegisteredSink {
    pub sink: Arc<dyn Sink>,
    pub minimum_level: LogLevel,
}

impl RegisteredSink {
    pub fn downcast_ref<T: Sink + 'static>(&self) -> Option<&T> {
        self.sink.as_any().downcast_ref::<T>()
    }
}

#[derive(Debug)]
struct LoggerInner {
    minimum_level: LogLevel,
    sinks: Vec<RegisteredSink>,
    enrichers: Vec<(String, Bson)>,
}

/// A finished logging pipeline. Cheap to clone; all clones share the same sinks.
#[derive(Clone, Debug)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    pub(crate) fn new(
        minimum_level: LogLevel,
        sinks: Vec<RegisteredSink>,
        enrichers: Vec<(String, Bson)>,
    ) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                minimum_level,
                sinks,
                enrichers,
            }),
        }
    }

    pub fn minimum_level(&self) -> LogLevel {
        self.inner.minimum_level
    }

    pub fn sinks(&self) -> &[RegisteredSink] {
        &self.inner.sinks
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.inner.minimum_level
    }

    /// Enriches the event and hands it to every sink whose minimum level it meets.
    /// The crate's own diagnostics only go to sinks that accept them.
    pub fn write(&self, mut event: LogEvent) {
        if !self.is_enabled(event.level) {
            return;
        }
        for (name, value) in &self.inner.enrichers {
            event.add_property_if_absent(name, value);
        }
        let diagnostic = event.is_diagnostic();
        for registered in &self.inner.sinks {
            if event.level < registered.minimum_level {
                continue;
            }
            if diagnostic && !registered.sink.receives_diagnostics() {
                continue;
            }
            registered.sink.emit(&event);
        }
    }

    /// Flushes every sink. Batching sinks drain their queues and stop.
    pub fn shutdown(&self) {
        for registered in &self.inner.sinks {
            registered.sink.flush();
        }
    }
}

impl<S: Subscriber> Layer<S> for Logger {
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        self.is_enabled(LogLevel::from(metadata.level()))
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let mut entry = LogEvent::new(LogLevel::from(metadata.level()), visitor.message);
        entry.target = metadata.target().to_string();
        entry.properties = visitor.properties;
        entry.exception = visitor.exception;
        self.write(entry);
    }
}

/// Collects the fields of a `tracing` event.
#[derive(Default)]
struct EventVisitor {
    message: String,
    exception: Option<String>,
    properties: bson::Document,
}

impl EventVisitor {
    fn record(&mut self, field: &Field, value: Bson) {
        match (field.name(), value) {
            ("message", Bson::String(message)) => self.message = message,
            ("error" | "exception", Bson::String(error)) => self.exception = Some(error),
            (name, value) => {
                self.properties.insert(name, value);
            }
        }
    }
}

impl Visit for EventVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record(field, Bson::Double(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record(field, Bson::Int64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        let value = i64::try_from(value).map_or_else(|_| Bson::String(value.to_string()), Bson::Int64);
        self.record(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record(field, Bson::Boolean(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, Bson::String(value.to_string()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record(field, Bson::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, Bson::String(format!("{value:?}")));
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use parking_lot::Mutex;
    use tracing_subscriber::prelude::*;

    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        events: Mutex<Vec<LogEvent>>,
        diagnostics: bool,
    }

    impl Sink for Recorder {
        fn emit(&self, event: &LogEvent) {
            self.events.lock().push(event.clone());
        }

        fn receives_diagnostics(&self) -> bool {
            self.diagnostics
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn logger(sinks: Vec<(Arc<Recorder>, LogLevel)>) -> Logger {
        let sinks = sinks
            .into_iter()
            .map(|(sink, minimum_level)| RegisteredSink {
                sink: sink as Arc<dyn Sink>,
                minimum_level,
            })
            .collect();
        Logger::new(
            LogLevel::Verbose,
            sinks,
            vec![("dApp".to_string(), Bson::String("Billing".to_string()))],
        )
    }

    #[test]
    fn per_sink_levels_gate_events() {
        let all = Arc::new(Recorder::default());
        let warnings = Arc::new(Recorder::default());
        let logger = logger(vec![
            (all.clone(), LogLevel::Verbose),
            (warnings.clone(), LogLevel::Warning),
        ]);

        logger.write(LogEvent::new(LogLevel::Information, "started"));
        logger.write(LogEvent::new(LogLevel::Error, "failed"));

        assert_eq!(all.events.lock().len(), 2);
        let seen = warnings.events.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].rendered_message, "failed");
        assert_eq!(seen[0].properties.get_str("dApp").unwrap(), "Billing");
    }

    #[test]
    fn tracing_events_become_log_events() {
        let sink = Arc::new(Recorder::default());
        let logger = logger(vec![(sink.clone(), LogLevel::Verbose)]);
        let subscriber = tracing_subscriber::registry().with(logger);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "billing", invoice = 42, error = "timeout", "payment retry");
            tracing::error!(target: "mongo_logger::logging::mongo_logger", "mongo sink dropped a batch");
        });

        let events = sink.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, LogLevel::Warning);
        assert_eq!(events[0].target, "billing");
        assert_eq!(events[0].rendered_message, "payment retry");
        assert_eq!(events[0].properties.get_i64("invoice").unwrap(), 42);
        assert_eq!(events[0].properties.get_str("dApp").unwrap(), "Billing");
        assert_eq!(events[0].exception.as_deref(), Some("timeout"));
    }

    #[test]
    fn diagnostics_only_reach_sinks_that_accept_them() {
        let console = Arc::new(Recorder {
            diagnostics: true,
            ..Default::default()
        });
        let database = Arc::new(Recorder::default());
        let logger = logger(vec![
            (console.clone(), LogLevel::Verbose),
            (database.clone(), LogLevel::Verbose),
        ]);

        let mut event = LogEvent::new(LogLevel::Error, "mongo sink dropped a batch");
        event.target = "mongo_logger::logging::mongo_logger".to_string();
        logger.write(event);

        assert_eq!(console.events.lock().len(), 1);
        assert!(database.events.lock().is_empty());
    }
}
