use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid timezone '{name}': {reason}")]
    InvalidTimezone { name: String, reason: String },

    #[error("invalid trigger time '{0}', expected HH:MM")]
    InvalidTriggerTime(String),

    #[error("task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database is closed")]
    StoreClosed,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geoip error: {0}")]
    GeoIp(#[from] maxminddb::MaxMindDBError),

    #[error("telegram API error: {description} (status {status})")]
    Telegram { status: u16, description: String },

    #[error("download failed: {0}")]
    Download(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Checksum { expected: String, actual: String },

    #[error("release error: {0}")]
    Release(String),
}

pub type Result<T> = std::result::Result<T, WatchError>;
