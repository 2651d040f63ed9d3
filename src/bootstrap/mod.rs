//! Application bootstrap: console always, mail alerts and a capped MongoDB collection when configured,
//! and the application identity (`dApp`, `dAuthor`) on every event.

use std::sync::Arc;

use crate::{
    config,
    configuration::{CappedMongoSinkOptions, LoggerConfiguration},
    logging::{
        email_sink::{EmailSinkOptions, UnconfiguredTransport, DEFAULT_EMAIL_PERIOD},
        initialize_log, LevelAlias, LogError, Logger, MailTransport,
    },
};

mod options;
pub use options::*;

pub const APPLICATION_PROPERTY: &str = "dApp";
pub const AUTHOR_PROPERTY: &str = "dAuthor";

/// Assembles the standard configuration without finalizing it.
pub fn build_configuration(
    app: &AppOptions,
    mail: Option<&MailNotifyOptions>,
    mongo: Option<&MongoOptionsV2>,
) -> Result<LoggerConfiguration, LogError> {
    build_configuration_with_transport(app, mail, mongo, Arc::new(UnconfiguredTransport))
}

/// As [build_configuration], delivering mail alerts through `transport`.
pub fn build_configuration_with_transport(
    app: &AppOptions,
    mail: Option<&MailNotifyOptions>,
    mongo: Option<&MongoOptionsV2>,
    transport: Arc<dyn MailTransport>,
) -> Result<LoggerConfiguration, LogError> {
    let mut configuration = LoggerConfiguration::new()
        .minimum_level()
        .verbose()
        .write_to()
        .console(LevelAlias::MINIMUM);

    if let Some(mail) = mail {
        let from = mail
            .mail_list
            .first()
            .cloned()
            .ok_or(LogError::InvalidArgument("mail_list"))?;
        configuration = configuration.write_to().email_with_transport(
            EmailSinkOptions {
                from,
                to: mail.mail_list.clone(),
                mail_server: mail.mail_server.clone(),
                credentials: Some(mail.credentials.clone()),
                subject: mail.subject_for(app),
                batch_posting_limit: mail.batch_posting_limit,
                period: DEFAULT_EMAIL_PERIOD,
            },
            mail.log_level,
            transport,
        )?;
    }

    if let Some(mongo) = mongo {
        configuration = configuration.write_to().mongodb_capped(
            mongo.database_url.as_str(),
            CappedMongoSinkOptions {
                restricted_to_minimum_level: mongo.log_level,
                max_size_mb: mongo.collection_mb,
                max_documents: None,
                collection_name: Some(mongo.collection_name.clone()),
                batch_posting_limit: mongo.batch_posting_limit,
                period: mongo.batch_period,
                format_hook: None,
            },
        )?;
    }

    Ok(configuration
        .enrich()
        .with_property(APPLICATION_PROPERTY, app.project_name.as_str())
        .enrich()
        .with_property(AUTHOR_PROPERTY, app.author_name.as_str()))
}

/// Builds the standard logger and installs it as the process-wide subscriber.
///
/// Legacy MongoDB settings are resolved first. Only one logger can be installed per process;
/// a second call fails with [LogError::AlreadyInitialized]. The returned handle shares its sinks
/// with the installed logger; call [Logger::shutdown] on it before exiting to drain batched sinks.
///
/// Mail alerts need a transport to leave the process, see [init_with_transport].
pub fn init(
    app: &AppOptions,
    mail: Option<&MailNotifyOptions>,
    mongo: Option<MongoSettings>,
) -> Result<Logger, LogError> {
    init_with_transport(app, mail, mongo, Arc::new(UnconfiguredTransport))
}

/// As [init], delivering mail alerts through `transport`.
pub fn init_with_transport(
    app: &AppOptions,
    mail: Option<&MailNotifyOptions>,
    mongo: Option<MongoSettings>,
    transport: Arc<dyn MailTransport>,
) -> Result<Logger, LogError> {
    let mongo = mongo.map(|settings| settings.resolve(app));
    let logger = build_configuration_with_transport(app, mail, mongo.as_ref(), transport)?.create_logger();
    initialize_log(logger)
}

/// [init] with options read from `mongo-logger.toml` (see [config::get_settings]).
pub fn init_from_config() -> Result<Logger, LogError> {
    init_from_config_with_transport(Arc::new(UnconfiguredTransport))
}

/// [init_with_transport] with options read from `mongo-logger.toml`.
pub fn init_from_config_with_transport(transport: Arc<dyn MailTransport>) -> Result<Logger, LogError> {
    let settings = config::get_settings()?;
    let app = settings.app.clone().ok_or(LogError::MissingSection("app"))?;
    let mongo = settings.mongo_settings(&app)?;
    init_with_transport(&app, settings.mail.as_ref(), mongo, transport)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::logging::{
        email_sink::{tests::RecordingTransport, Credentials},
        ConsoleSink, EmailSink, LogEvent, LogLevel, MongoSink,
    };

    fn app() -> AppOptions {
        AppOptions::new("Billing".to_string(), "Alice".to_string())
    }

    fn mail() -> MailNotifyOptions {
        MailNotifyOptions {
            mail_list: vec!["ops@example.com".to_string(), "dev@example.com".to_string()],
            batch_posting_limit: 1,
            log_level: LogLevel::Error,
            mail_server: "smtp.example.com".to_string(),
            credentials: Credentials::new("ops".to_string(), "pw".to_string()),
            mail_subject_template: "[{0}] failed".to_string(),
        }
    }

    #[test]
    fn mail_alerts_carry_identity_and_subject() {
        let transport = Arc::new(RecordingTransport::default());
        let logger =
            build_configuration_with_transport(&app(), Some(&mail()), None, transport.clone())
                .unwrap()
                .create_logger();

        logger.write(LogEvent::new(LogLevel::Information, "ignored"));
        logger.write(LogEvent::new(LogLevel::Error, "charge failed"));
        logger.shutdown();

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, "ops@example.com");
        assert_eq!(sent[0].subject, "[Billing] failed");
        assert!(sent[0].body.contains("charge failed"));
        assert!(sent[0].body.contains("dApp=\"Billing\""));
    }

    #[test]
    fn empty_mail_list_is_rejected() {
        let mut mail = mail();
        mail.mail_list.clear();
        let err = build_configuration(&app(), Some(&mail), None).unwrap_err();
        assert!(matches!(err, LogError::InvalidArgument("mail_list")));
    }

    #[test]
    fn mongo_sink_follows_the_resolved_options() {
        let app = app();
        let mut legacy = MongoOptions::new(&app, "10.0.0.5");
        legacy.batch_posting_limit = 100;
        legacy.batch_period = Duration::from_secs(2);
        legacy.log_level = LogLevel::Warning;
        let resolved = resolve(&legacy, &app);

        let configuration = build_configuration(&app, None, Some(&resolved)).unwrap();
        assert!(configuration.find_sink::<ConsoleSink>().is_some());
        assert!(configuration.find_sink::<EmailSink>().is_none());

        let (sink, level) = configuration.find_sink::<MongoSink>().unwrap();
        assert_eq!(level, LogLevel::Warning);
        assert_eq!(sink.settings().batch_posting_limit, 100);
        assert!(matches!(
            &sink.settings().target,
            crate::logging::MongoTarget::Url(url) if url == "mongodb://10.0.0.5:27017/Alice_Billing"
        ));
    }
}
