//! Batched email notifications.
//!
//! The sink only builds messages. Delivery is left to a [MailTransport]; without one,
//! messages are dropped and reported as diagnostics.

use std::{any::Any, fmt::Debug, sync::Arc, time::Duration};

use derive_more::Constructor;
use serde::{Deserialize, Serialize};

use super::{batching::BatchQueue, ConsoleSink, LogError, LogEvent, Sink};

/// Username/password pair handed to the mail server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Constructor)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Everything needed to deliver one notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub mail_server: String,
    pub credentials: Option<Credentials>,
}

/// Delivers finished messages (SMTP, an HTTP mail API, a test recorder).
pub trait MailTransport: Send + Sync + Debug {
    fn send(&self, message: &MailMessage) -> Result<(), LogError>;
}

/// Used when no transport was supplied.
#[derive(Debug, Default)]
pub struct UnconfiguredTransport;

impl MailTransport for UnconfiguredTransport {
    fn send(&self, message: &MailMessage) -> Result<(), LogError> {
        Err(LogError::Mail(format!(
            "no transport configured for {}, dropped {:?}",
            message.mail_server, message.subject
        )))
    }
}

/// Time an alert may wait for more events before it is mailed.
pub const DEFAULT_EMAIL_PERIOD: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct EmailSinkOptions {
    pub from: String,
    pub to: Vec<String>,
    pub mail_server: String,
    pub credentials: Option<Credentials>,
    pub subject: String,
    pub batch_posting_limit: usize,
    pub period: Duration,
}

impl EmailSinkOptions {
    fn compose(&self, batch: &[LogEvent]) -> MailMessage {
        let body: Vec<_> = batch.iter().map(ConsoleSink::render).collect();
        MailMessage {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: self.subject.clone(),
            body: body.join("\n"),
            mail_server: self.mail_server.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

/// Collects events and mails them out once `batch_posting_limit` have been collected, once `period` has passed,
/// or on flush.
#[derive(Debug)]
pub struct EmailSink {
    options: EmailSinkOptions,
    transport: Arc<dyn MailTransport>,
    queue: BatchQueue,
}

impl EmailSink {
    pub fn new(options: EmailSinkOptions, transport: Arc<dyn MailTransport>) -> Self {
        let queue = BatchQueue::new(
            format!("email-sink({})", options.mail_server),
            options.batch_posting_limit,
            options.period,
        );
        Self {
            options,
            transport,
            queue,
        }
    }

    pub fn options(&self) -> &EmailSinkOptions {
        &self.options
    }
}

impl Sink for EmailSink {
    fn emit(&self, event: &LogEvent) {
        self.queue.push(event, || {
            let options = self.options.clone();
            let transport = self.transport.clone();
            move || {
                Ok::<_, LogError>(move |batch: Vec<LogEvent>| transport.send(&options.compose(&batch)))
            }
        });
    }

    fn flush(&self) {
        self.queue.close();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
