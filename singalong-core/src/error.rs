use crate::player::PlayerError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - edit it if needed and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Lyrics errors
    #[error("Invalid timestamp {input:?}: {reason}")]
    TimestampFormat { input: String, reason: String },

    #[error("Unsupported location: {location}")]
    InvalidLocation { location: String },

    #[error("Lyrics unavailable at {location}: {reason}")]
    LyricsUnavailable { location: String, reason: String },

    // Playback errors
    #[error("Player error: {0}")]
    Player(#[from] PlayerError),

    #[error("Fixed-delay plan references line {index} but the document has {line_count} lines")]
    PlanMismatch { index: usize, line_count: usize },

    // Storage errors
    #[error("Store database error: {0}")]
    Store(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // Network errors
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
