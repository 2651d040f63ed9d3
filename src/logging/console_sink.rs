use std::{
    any::Any,
    fmt::Write as _,
    io::{self, Write},
};

use super::{LogEvent, Sink};

/// Writes one line per event to stdout.
#[derive(Debug, Default, Clone)]
pub struct ConsoleSink {}

impl ConsoleSink {
    /// Renders the line written for `event`, without the trailing newline.
    pub fn render(event: &LogEvent) -> String {
        let timestamp = event
            .timestamp
            .try_to_rfc3339_string()
            .unwrap_or_else(|_| event.timestamp.timestamp_millis().to_string());
        let mut line = format!(
            "[{} {}] {}",
            timestamp,
            event.level.short_name(),
            event.rendered_message
        );
        if !event.properties.is_empty() {
            let rendered: Vec<_> = event
                .properties
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            let _ = write!(line, " {{{}}}", rendered.join(", "));
        }
        if let Some(exception) = &event.exception {
            line.push('\n');
            line.push_str(exception);
        }
        line
    }
}

impl Sink for ConsoleSink {
    fn emit(&self, event: &LogEvent) {
        let mut stdout = io::stdout().lock();
        // Nowhere left to report a failing stdout.
        let _ = writeln!(stdout, "{}", Self::render(event));
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }

    fn receives_diagnostics(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
