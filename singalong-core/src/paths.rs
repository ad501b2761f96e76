//! Path constants for configuration, storage and log files.

use std::path::PathBuf;

/// The name of the configuration directory under ~/.config/
pub const CONFIG_DIR_NAME: &str = "singalong";

/// The name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The name of the key-value store database file
pub const STORE_DB_FILE_NAME: &str = "store.db";

/// The name of the directory downloaded soundtracks are kept in
pub const SOUNDTRACK_DIR_NAME: &str = "soundtracks";

/// The name of the log file written when file logging is enabled
pub const LOG_FILE_NAME: &str = "singalong.log";

/// Get the configuration directory path (~/.config/singalong/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.config/singalong/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the key-value store path (`~/.config/singalong/store.db`)
#[must_use]
pub fn store_db_path() -> PathBuf {
    config_dir().join(STORE_DB_FILE_NAME)
}

/// Get the default soundtrack directory (`~/.config/singalong/soundtracks/`)
#[must_use]
pub fn soundtrack_dir() -> PathBuf {
    config_dir().join(SOUNDTRACK_DIR_NAME)
}

/// Get the log file path (`~/.config/singalong/singalong.log`)
#[must_use]
pub fn log_file_path() -> PathBuf {
    config_dir().join(LOG_FILE_NAME)
}
