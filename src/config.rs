// This file defines the settings file that the bootstrapper reads from, in order:
// $HOME
// $PWD
// $MONGO_LOGGER_CONFIG_PATH (if set)
// Later files override earlier ones section by section.

use std::{fs, path::PathBuf, sync::OnceLock, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    bootstrap::{AppOptions, MailNotifyOptions, MongoOptions, MongoOptionsV2, MongoSettings},
    logging::{LogError, LogLevel},
};

static DEFAULT_SETTINGS: OnceLock<Settings> = OnceLock::new();

const FILE_NAME: &str = "mongo-logger.toml";
const PATH_VARIABLE: &str = "MONGO_LOGGER_CONFIG_PATH";

/// The `[mongo]` section. Exactly one of `host` (legacy) and `database_url` should be given;
/// `database_url` wins if both are.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct MongoSection {
    pub host: Option<String>,
    pub database_url: Option<String>,
    pub collection_name: Option<String>,
    pub collection_mb: Option<u64>,
    pub batch_posting_limit: Option<usize>,
    pub batch_period_secs: Option<f64>,
    pub log_level: Option<LogLevel>,
}

impl MongoSection {
    fn update(&mut self, other: MongoSection) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(host, database_url, collection_name, collection_mb, batch_posting_limit, batch_period_secs, log_level);
    }

    /// Fills in defaults for whatever the file left out.
    pub fn to_settings(&self, app: &AppOptions) -> Result<MongoSettings, LogError> {
        match (&self.database_url, &self.host) {
            (Some(url), _) => {
                let mut resolved = MongoOptionsV2::new(app, url.clone());
                self.apply(
                    &mut resolved.collection_name,
                    &mut resolved.collection_mb,
                    &mut resolved.batch_posting_limit,
                    &mut resolved.batch_period,
                    &mut resolved.log_level,
                )?;
                Ok(resolved.into())
            }
            (None, Some(host)) => {
                let mut legacy = MongoOptions::new(app, host.clone());
                self.apply(
                    &mut legacy.collection_name,
                    &mut legacy.collection_mb,
                    &mut legacy.batch_posting_limit,
                    &mut legacy.batch_period,
                    &mut legacy.log_level,
                )?;
                Ok(legacy.into())
            }
            (None, None) => Err(LogError::InvalidArgument("host")),
        }
    }

    fn apply(
        &self,
        collection_name: &mut String,
        collection_mb: &mut u64,
        batch_posting_limit: &mut usize,
        batch_period: &mut Duration,
        log_level: &mut LogLevel,
    ) -> Result<(), LogError> {
        if let Some(name) = &self.collection_name {
            *collection_name = name.clone();
        }
        if let Some(mb) = self.collection_mb {
            *collection_mb = mb;
        }
        if let Some(limit) = self.batch_posting_limit {
            *batch_posting_limit = limit;
        }
        if let Some(secs) = self.batch_period_secs {
            *batch_period = Duration::try_from_secs_f64(secs.max(0.0))
                .map_err(|_| LogError::InvalidArgument("batch_period_secs"))?;
        }
        if let Some(level) = self.log_level {
            *log_level = level;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Settings {
    pub app: Option<AppOptions>,
    pub mail: Option<MailNotifyOptions>,
    pub mongo: Option<MongoSection>,
}

impl Settings {
    pub fn update(&mut self, other: Settings) {
        if other.app.is_some() {
            self.app = other.app;
        }
        if other.mail.is_some() {
            self.mail = other.mail;
        }
        if let Some(new) = other.mongo {
            match self.mongo.as_mut() {
                Some(base) => base.update(new),
                None => self.mongo = Some(new),
            }
        }
    }

    pub fn mongo_settings(&self, app: &AppOptions) -> Result<Option<MongoSettings>, LogError> {
        self.mongo
            .as_ref()
            .map(|section| section.to_settings(app))
            .transpose()
    }

    pub fn parse(text: &str, path: PathBuf) -> Result<Settings, LogError> {
        toml::from_str::<Settings>(text).map_err(|source| LogError::Config { path, source })
    }
}

/// Reads and merges every settings file that exists. Missing files are skipped.
pub fn load_settings() -> Result<Settings, LogError> {
    let mut paths_to_check = vec![
        // Check $HOME
        home::home_dir(),
        // Check $PWD
        std::env::current_dir().ok(),
    ];

    if let Ok(path) = std::env::var(PATH_VARIABLE) {
        paths_to_check.push(Some(PathBuf::from(path)));
    }

    let mut settings = Settings::default();
    for path in paths_to_check.into_iter().flatten() {
        let file = path.join(FILE_NAME);
        if let Ok(text) = fs::read_to_string(&file) {
            settings.update(Settings::parse(&text, file)?);
        }
    }
    Ok(settings)
}

/// [load_settings], cached for the life of the process after the first successful read.
pub fn get_settings() -> Result<Settings, LogError> {
    if let Some(settings) = DEFAULT_SETTINGS.get() {
        return Ok(settings.clone());
    }
    let settings = load_settings()?;
    Ok(DEFAULT_SETTINGS.get_or_init(|| settings).clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [app]
        project_name = "Billing"
        author_name = "Alice"

        [mail]
        mail_list = ["ops@example.com"]
        batch_posting_limit = 5
        log_level = "Error"
        mail_server = "smtp.example.com"
        mail_subject_template = "[{0}] failed"
        credentials = { username = "ops", password = "pw" }

        [mongo]
        host = "10.0.0.5"
        collection_mb = 50
        batch_posting_limit = 100
        batch_period_secs = 2
        log_level = "Warning"
    "#;

    #[test]
    fn parses_a_full_file() {
        let settings = Settings::parse(FULL, PathBuf::from("mongo-logger.toml")).unwrap();
        let app = settings.app.clone().unwrap();
        assert_eq!(app.author_project(), "Alice_Billing");
        assert_eq!(settings.mail.as_ref().unwrap().log_level, LogLevel::Error);

        let resolved = settings.mongo_settings(&app).unwrap().unwrap().resolve(&app);
        assert_eq!(resolved.database_url, "mongodb://10.0.0.5:27017/Alice_Billing");
        assert_eq!(resolved.collection_name, "log");
        assert_eq!(resolved.batch_posting_limit, 100);
        assert_eq!(resolved.batch_period, Duration::from_secs(2));
        assert_eq!(resolved.log_level, LogLevel::Warning);
    }

    #[test]
    fn later_files_override_earlier_sections() {
        let mut settings = Settings::parse(FULL, PathBuf::from("home")).unwrap();
        let local = Settings::parse(
            r#"
            [mongo]
            database_url = "mongodb://replica:27017/logs"
            collection_name = "audit"
            "#,
            PathBuf::from("pwd"),
        )
        .unwrap();
        settings.update(local);

        let app = settings.app.clone().unwrap();
        let resolved = settings.mongo_settings(&app).unwrap().unwrap().resolve(&app);
        assert_eq!(resolved.database_url, "mongodb://replica:27017/logs");
        assert_eq!(resolved.collection_name, "audit");
        assert_eq!(resolved.batch_posting_limit, 100);
        assert!(settings.mail.is_some());
    }

    #[test]
    fn mongo_section_needs_a_host_or_url() {
        let app = AppOptions::new("Billing".to_string(), "Alice".to_string());
        let err = MongoSection::default().to_settings(&app).unwrap_err();
        assert!(matches!(err, LogError::InvalidArgument("host")));
    }

    #[test]
    fn invalid_files_name_their_path() {
        let err = Settings::parse("[app]\nproject_name = 3", PathBuf::from("broken.toml")).unwrap_err();
        assert!(matches!(err, LogError::Config { ref path, .. } if path == &PathBuf::from("broken.toml")));
    }

    #[test]
    fn unrepresentable_batch_period_is_an_error() {
        for period in ["inf", "1e300"] {
            let settings = Settings::parse(
                &format!("[mongo]\nhost = \"h\"\nbatch_period_secs = {period}"),
                PathBuf::from("mongo-logger.toml"),
            )
            .unwrap();
            let app = AppOptions::new("Billing".to_string(), "Alice".to_string());
            let err = settings.mongo_settings(&app).unwrap_err();
            assert!(matches!(err, LogError::InvalidArgument("batch_period_secs")));
        }
    }
}
