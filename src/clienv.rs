use std::path::PathBuf;

macro_rules! env_vars {
    ($($variant:ident => $name:literal),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum EnvVar {
            $($variant),*
        }

        impl EnvVar {
            pub const ALL: &'static [EnvVar] = &[$(EnvVar::$variant),*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(EnvVar::$variant => $name),*
                }
            }
        }
    };
}

env_vars! {
    Config              => "OXIWATCH_CONFIG",
    TelegramBotToken    => "OXIWATCH_TELEGRAM_BOT_TOKEN",
    TelegramChatId      => "OXIWATCH_TELEGRAM_CHAT_ID",
    ServerName          => "OXIWATCH_SERVER_NAME",
    GeoipEnabled        => "OXIWATCH_GEOIP_ENABLED",
    GeoipDatabasePath   => "OXIWATCH_GEOIP_DATABASE_PATH",
    DatabasePath        => "OXIWATCH_DATABASE_PATH",
    DailyReportEnabled  => "OXIWATCH_DAILY_REPORT_ENABLED",
    DailyReportTime     => "OXIWATCH_DAILY_REPORT_TIME",
    DailyReportTimezone => "OXIWATCH_DAILY_REPORT_TIMEZONE",
    RetentionDays       => "OXIWATCH_RETENTION_DAYS",
    LogLevel            => "OXIWATCH_LOG_LEVEL",
    JournalUnit         => "OXIWATCH_JOURNAL_UNIT",
    SyslogIdentifiers   => "OXIWATCH_SYSLOG_IDENTIFIERS",
    ReleaseRepo         => "OXIWATCH_RELEASE_REPO",
}

pub const DEFAULT_CONFIG_PATH: &str = "/etc/oxiwatch/config.toml";
pub const DEFAULT_RELEASE_REPO: &str = "oxisoft/oxiwatch";

/// Non-empty value of an environment variable.
pub fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// `true` (any case) and `1` are truthy, anything else is false.
pub fn is_truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

/// Config file path ($OXIWATCH_CONFIG or /etc/oxiwatch/config.toml)
pub fn config_path() -> PathBuf {
    let path = env_opt(EnvVar::Config.as_str())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    tracing::trace!(path = %path.display(), "Resolved config path");
    path
}

/// GitHub `owner/repo` releases are fetched from ($OXIWATCH_RELEASE_REPO)
pub fn release_repo() -> String {
    let repo = env_opt(EnvVar::ReleaseRepo.as_str()).unwrap_or_else(|| DEFAULT_RELEASE_REPO.to_string());
    tracing::trace!(repo = %repo, "Release repository");
    repo
}

/// Kernel hostname, used when no server name is configured.
pub fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .or_else(|_| std::fs::read_to_string("/etc/hostname"))
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| env_opt("HOSTNAME"))
        .unwrap_or_else(|| "localhost".to_string())
}
