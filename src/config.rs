use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::clienv::{self, EnvVar};
use crate::error::WatchError;
use crate::scheduler::{parse_timezone, parse_trigger_time};
use crate::source::SourceConfig;
use crate::Result;

pub const DEFAULT_DATABASE_PATH: &str = "/var/lib/oxiwatch/oxiwatch.db";
pub const DEFAULT_GEOIP_PATH: &str = "/var/lib/oxiwatch/dbip-city-lite.mmdb";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    /// Shown in alerts and reports. Defaults to the hostname.
    pub server_name: String,
    pub geoip_enabled: bool,
    pub geoip_database_path: PathBuf,
    pub database_path: PathBuf,
    pub daily_report_enabled: bool,
    /// `HH:MM`, evaluated in `daily_report_timezone`.
    pub daily_report_time: String,
    pub daily_report_timezone: String,
    pub retention_days: u32,
    pub log_level: String,
    pub journal_unit: String,
    pub syslog_identifiers: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            telegram_chat_id: String::new(),
            server_name: clienv::hostname(),
            geoip_enabled: true,
            geoip_database_path: PathBuf::from(DEFAULT_GEOIP_PATH),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            daily_report_enabled: true,
            daily_report_time: "08:00".to_string(),
            daily_report_timezone: "UTC".to_string(),
            retention_days: 90,
            log_level: "info".to_string(),
            journal_unit: "ssh".to_string(),
            syslog_identifiers: vec!["sshd".to_string()],
        }
    }
}

impl Settings {
    /// Load from `$OXIWATCH_CONFIG` (or the default path) and apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(&clienv::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::trace!(path = %path.display(), "Loading settings");

        let mut settings = match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::trace!("Config file does not exist, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(WatchError::Config(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        settings.apply_overrides(clienv::env_opt);
        if settings.server_name.is_empty() {
            settings.server_name = clienv::hostname();
        }

        tracing::trace!(
            server = %settings.server_name,
            geoip = settings.geoip_enabled,
            report = settings.daily_report_enabled,
            "Settings loaded"
        );
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `OXIWATCH_*` overrides. `lookup` returns a variable's value,
    /// or `None` when it is unset or empty.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: EnvVar| lookup(var.as_str());

        if let Some(v) = get(EnvVar::TelegramBotToken) {
            self.telegram_bot_token = v;
        }
        if let Some(v) = get(EnvVar::TelegramChatId) {
            self.telegram_chat_id = v;
        }
        if let Some(v) = get(EnvVar::ServerName) {
            self.server_name = v;
        }
        if let Some(v) = get(EnvVar::GeoipEnabled) {
            self.geoip_enabled = clienv::is_truthy(&v);
        }
        if let Some(v) = get(EnvVar::GeoipDatabasePath) {
            self.geoip_database_path = PathBuf::from(v);
        }
        if let Some(v) = get(EnvVar::DatabasePath) {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = get(EnvVar::DailyReportEnabled) {
            self.daily_report_enabled = clienv::is_truthy(&v);
        }
        if let Some(v) = get(EnvVar::DailyReportTime) {
            self.daily_report_time = v;
        }
        if let Some(v) = get(EnvVar::DailyReportTimezone) {
            self.daily_report_timezone = v;
        }
        if let Some(v) = get(EnvVar::RetentionDays) {
            match v.trim().parse() {
                Ok(days) => self.retention_days = days,
                Err(_) => tracing::warn!(value = %v, "ignoring unparsable retention override"),
            }
        }
        if let Some(v) = get(EnvVar::LogLevel) {
            self.log_level = v;
        }
        if let Some(v) = get(EnvVar::JournalUnit) {
            self.journal_unit = v;
        }
        if let Some(v) = get(EnvVar::SyslogIdentifiers) {
            let ids: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !ids.is_empty() {
                self.syslog_identifiers = ids;
            }
        }
    }

    /// Everything `oxiwatch daemon` needs before it starts.
    pub fn validate(&self) -> Result<()> {
        if self.telegram_bot_token.is_empty() {
            return Err(WatchError::Config("telegram_bot_token is required".into()));
        }
        if self.telegram_chat_id.is_empty() {
            return Err(WatchError::Config("telegram_chat_id is required".into()));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(WatchError::Config("database_path is required".into()));
        }
        if self.retention_days < 1 {
            return Err(WatchError::Config("retention_days must be at least 1".into()));
        }
        if self.syslog_identifiers.is_empty() {
            return Err(WatchError::Config("syslog_identifiers must not be empty".into()));
        }
        parse_trigger_time(&self.daily_report_time)?;
        parse_timezone(&self.daily_report_timezone)?;
        Ok(())
    }

    /// Copy safe to print: the bot token is masked.
    pub fn masked(&self) -> Self {
        Self {
            telegram_bot_token: mask_secret(&self.telegram_bot_token),
            ..self.clone()
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| WatchError::Config(e.to_string()))
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            unit: self.journal_unit.clone(),
            identifiers: self.syslog_identifiers.clone(),
            ..SourceConfig::default()
        }
    }
}

/// First four characters, then asterisks.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let visible: String = secret.chars().take(4).collect();
    if visible.len() == secret.len() {
        return "****".to_string();
    }
    format!("{visible}****")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> Settings {
        Settings {
            telegram_bot_token: "123456:ABCDEF".into(),
            telegram_chat_id: "-100123".into(),
            ..Settings::default()
        }
    }

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert!(s.geoip_enabled);
        assert!(s.daily_report_enabled);
        assert_eq!(s.daily_report_time, "08:00");
        assert_eq!(s.daily_report_timezone, "UTC");
        assert_eq!(s.retention_days, 90);
        assert_eq!(s.database_path, PathBuf::from(DEFAULT_DATABASE_PATH));
        assert_eq!(s.syslog_identifiers, vec!["sshd"]);
        assert!(!s.server_name.is_empty());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let s = Settings::from_toml_str(
            r#"
            telegram_bot_token = "tok"
            telegram_chat_id = "42"
            retention_days = 30
            "#,
        )
        .unwrap();
        assert_eq!(s.telegram_bot_token, "tok");
        assert_eq!(s.retention_days, 30);
        assert_eq!(s.journal_unit, "ssh");
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            Settings::from_toml_str("retention_days = \"many\""),
            Err(WatchError::Toml(_))
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(s.retention_days, 90);
    }

    #[test]
    fn loads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "server_name = \"bastion\"\ngeoip_enabled = false\n").unwrap();
        let s = Settings::load_from(&path).unwrap();
        assert_eq!(s.server_name, "bastion");
        assert!(!s.geoip_enabled);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OXIWATCH_TELEGRAM_BOT_TOKEN", "env-token"),
            ("OXIWATCH_GEOIP_ENABLED", "0"),
            ("OXIWATCH_DAILY_REPORT_ENABLED", "TRUE"),
            ("OXIWATCH_RETENTION_DAYS", "7"),
            ("OXIWATCH_SYSLOG_IDENTIFIERS", "sshd, sshd-session"),
        ]);
        let mut s = Settings::default();
        s.daily_report_enabled = false;
        s.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(s.telegram_bot_token, "env-token");
        assert!(!s.geoip_enabled);
        assert!(s.daily_report_enabled);
        assert_eq!(s.retention_days, 7);
        assert_eq!(s.syslog_identifiers, vec!["sshd", "sshd-session"]);
    }

    #[test]
    fn bad_retention_override_is_ignored() {
        let mut s = Settings::default();
        s.apply_overrides(|name| (name == "OXIWATCH_RETENTION_DAYS").then(|| "lots".to_string()));
        assert_eq!(s.retention_days, 90);
    }

    #[test]
    fn validate_requires_credentials() {
        assert!(valid().validate().is_ok());

        let mut s = valid();
        s.telegram_bot_token.clear();
        assert!(s.validate().is_err());

        let mut s = valid();
        s.telegram_chat_id.clear();
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_checks_schedule_and_retention() {
        let mut s = valid();
        s.retention_days = 0;
        assert!(s.validate().is_err());

        let mut s = valid();
        s.daily_report_time = "8 o'clock".into();
        assert!(matches!(s.validate(), Err(WatchError::InvalidTriggerTime(_))));

        let mut s = valid();
        s.daily_report_timezone = "Nowhere/Special".into();
        assert!(matches!(s.validate(), Err(WatchError::InvalidTimezone { .. })));
    }

    #[test]
    fn masking() {
        assert_eq!(mask_secret(""), "");
        assert_eq!(mask_secret("abc"), "****");
        assert_eq!(mask_secret("123456:ABCDEF"), "1234****");
        assert_eq!(valid().masked().telegram_bot_token, "1234****");
        assert_eq!(valid().masked().telegram_chat_id, "-100123");
    }

    #[test]
    fn serializes_back_to_toml() {
        let text = valid().masked().to_toml().unwrap();
        assert!(text.contains("telegram_bot_token = \"1234****\""));
        assert!(text.contains("retention_days = 90"));
    }
}
