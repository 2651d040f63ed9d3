use std::time::Duration;

use derive_more::Constructor;
use serde::{Deserialize, Serialize};

use crate::logging::{
    email_sink::Credentials,
    mongo_logger::{DEFAULT_BATCH_POSTING_LIMIT, DEFAULT_COLLECTION_NAME, DEFAULT_PERIOD},
    LevelAlias, LogLevel,
};

/// Port used when a legacy host-only option set is turned into a connection string.
pub const MONGO_PORT: u16 = 27017;

/// Identity of the application doing the logging.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Constructor)]
pub struct AppOptions {
    pub project_name: String,
    pub author_name: String,
}

impl AppOptions {
    /// `author_project`, also the name of the log database.
    pub fn author_project(&self) -> String {
        format!("{}_{}", self.author_name, self.project_name)
    }
}

/// Mail alerting. The first address of `mail_list` is also the sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailNotifyOptions {
    pub mail_list: Vec<String>,
    pub batch_posting_limit: usize,
    pub log_level: LogLevel,
    pub mail_server: String,
    pub credentials: Credentials,
    /// One slot, `{0}`, receives the project name.
    pub mail_subject_template: String,
}

impl MailNotifyOptions {
    pub fn subject_for(&self, app: &AppOptions) -> String {
        let template = &self.mail_subject_template;
        if template.contains("{0}") {
            template.replace("{0}", &app.project_name)
        } else {
            template.replacen("{}", &app.project_name, 1)
        }
    }
}

/// MongoDB settings in the legacy form: only the host is given, the rest of the URL is derived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MongoOptions {
    author_project: String,
    pub host: String,
    pub collection_name: String,
    pub collection_mb: u64,
    pub batch_posting_limit: usize,
    pub batch_period: Duration,
    pub log_level: LogLevel,
}

impl MongoOptions {
    /// Defaults: collection `log`, 50 MB, the sink's batch size and period, everything logged.
    pub fn new(app: &AppOptions, host: impl Into<String>) -> Self {
        Self {
            author_project: app.author_project(),
            host: host.into(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            collection_mb: crate::configuration::DEFAULT_CAPPED_MAX_SIZE_MB,
            batch_posting_limit: DEFAULT_BATCH_POSTING_LIMIT,
            batch_period: DEFAULT_PERIOD,
            log_level: LevelAlias::MINIMUM,
        }
    }

    /// Kept for callers that read it; nothing in the pipeline does.
    pub fn author_project(&self) -> &str {
        &self.author_project
    }
}

/// MongoDB settings with a complete connection string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MongoOptionsV2 {
    author_project: String,
    pub database_url: String,
    pub collection_name: String,
    pub collection_mb: u64,
    pub batch_posting_limit: usize,
    pub batch_period: Duration,
    pub log_level: LogLevel,
}

impl MongoOptionsV2 {
    pub fn new(app: &AppOptions, database_url: impl Into<String>) -> Self {
        Self {
            author_project: app.author_project(),
            database_url: database_url.into(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            collection_mb: crate::configuration::DEFAULT_CAPPED_MAX_SIZE_MB,
            batch_posting_limit: DEFAULT_BATCH_POSTING_LIMIT,
            batch_period: DEFAULT_PERIOD,
            log_level: LevelAlias::MINIMUM,
        }
    }

    pub fn author_project(&self) -> &str {
        &self.author_project
    }
}

/// Either shape of MongoDB settings accepted by [super::init].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MongoSettings {
    Legacy(MongoOptions),
    Resolved(MongoOptionsV2),
}

impl From<MongoOptions> for MongoSettings {
    fn from(options: MongoOptions) -> Self {
        MongoSettings::Legacy(options)
    }
}

impl From<MongoOptionsV2> for MongoSettings {
    fn from(options: MongoOptionsV2) -> Self {
        MongoSettings::Resolved(options)
    }
}

/// Turns legacy options into the connection-string form: `mongodb://{host}:27017/{author}_{project}`.
pub fn resolve(mongo: &MongoOptions, app: &AppOptions) -> MongoOptionsV2 {
    MongoOptionsV2 {
        author_project: mongo.author_project.clone(),
        database_url: format!("mongodb://{}:{}/{}", mongo.host, MONGO_PORT, app.author_project()),
        collection_name: mongo.collection_name.clone(),
        collection_mb: mongo.collection_mb,
        batch_posting_limit: mongo.batch_posting_limit,
        batch_period: mongo.batch_period,
        log_level: mongo.log_level,
    }
}

impl MongoSettings {
    pub fn resolve(self, app: &AppOptions) -> MongoOptionsV2 {
        match self {
            MongoSettings::Legacy(legacy) => resolve(&legacy, app),
            MongoSettings::Resolved(resolved) => resolved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> AppOptions {
        AppOptions::new("Billing".to_string(), "Alice".to_string())
    }

    #[test]
    fn resolve_builds_the_connection_string() {
        let app = app();
        for host in ["10.0.0.5", "localhost", "db.internal"] {
            let resolved = resolve(&MongoOptions::new(&app, host), &app);
            assert_eq!(
                resolved.database_url,
                format!("mongodb://{host}:27017/Alice_Billing")
            );
        }
    }

    #[test]
    fn resolve_copies_everything_else() {
        let app = app();
        let mut legacy = MongoOptions::new(&app, "10.0.0.5");
        legacy.collection_name = "events".to_string();
        legacy.collection_mb = 8;
        legacy.batch_posting_limit = 100;
        legacy.batch_period = Duration::from_millis(500);
        legacy.log_level = LogLevel::Error;

        let resolved = resolve(&legacy, &app);
        assert_eq!(resolved.collection_name, "events");
        assert_eq!(resolved.collection_mb, 8);
        assert_eq!(resolved.batch_posting_limit, 100);
        assert_eq!(resolved.batch_period, Duration::from_millis(500));
        assert_eq!(resolved.log_level, LogLevel::Error);
        assert_eq!(resolved.author_project(), "Alice_Billing");
    }

    #[test]
    fn resolved_settings_pass_through() {
        let app = app();
        let v2 = MongoOptionsV2::new(&app, "mongodb://replica/logs");
        assert_eq!(MongoSettings::from(v2.clone()).resolve(&app), v2);
    }

    #[test]
    fn subject_template_takes_the_project_name() {
        let mut mail = MailNotifyOptions {
            mail_list: vec!["ops@example.com".to_string()],
            batch_posting_limit: 1,
            log_level: LogLevel::Error,
            mail_server: "smtp.example.com".to_string(),
            credentials: Credentials::new("ops".to_string(), "pw".to_string()),
            mail_subject_template: "[{0}] needs attention".to_string(),
        };
        assert_eq!(mail.subject_for(&app()), "[Billing] needs attention");

        mail.mail_subject_template = "{} is down".to_string();
        assert_eq!(mail.subject_for(&app()), "Billing is down");
    }
}
