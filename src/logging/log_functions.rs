use std::sync::OnceLock;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::{LogError, LogEvent, Logger};

// The process-wide logger. Set exactly once; later attempts are rejected rather than replacing it.
static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Installs `logger` as the process-wide `tracing` subscriber.
/// Fails with [LogError::AlreadyInitialized] if a logger was installed before.
pub fn initialize_log(logger: Logger) -> Result<Logger, LogError> {
    LOGGER
        .set(logger.clone())
        .map_err(|_| LogError::AlreadyInitialized)?;
    tracing_subscriber::registry()
        .with(logger.clone())
        .try_init()?;
    Ok(logger)
}

/// Gets the installed logger, if any.
pub fn copy_log() -> Option<Logger> {
    LOGGER.get().cloned()
}

/// Writes straight to the installed logger, bypassing `tracing`. This is the only way to emit [super::LogLevel::Fatal].
#[inline]
pub fn log_event(event: LogEvent) {
    if let Some(logger) = LOGGER.get() {
        logger.write(event);
    }
}

/// Flushes the installed logger's sinks. Call before the process exits.
pub fn close_and_flush() {
    if let Some(logger) = LOGGER.get() {
        logger.shutdown();
    }
}
