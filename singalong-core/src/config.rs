use crate::error::{CoreError, Result};
use crate::fixed_delay::{
    DEFAULT_FRAME_INTERVAL_MS, DEFAULT_LAST_LINE_HOLD_SECS, DEFAULT_MAX_LINE_HOLD_SECS,
};
use crate::lyrics::LyricsFormat;
use crate::playlist::{default_local_songs, SongEntry, DEFAULT_PLAYLIST_URL};
use crate::sync::{DEFAULT_FALLBACK_SPAN_SECS, DEFAULT_SEEK_THRESHOLD_SECS};
use crate::tracker::{ClockResolution, DEFAULT_POLL_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SingalongConfig {
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistConfig {
    #[serde(default = "default_playlist_url")]
    pub url: String,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// Listed when neither the cache nor the network has a playlist
    #[serde(default = "default_local_songs")]
    pub local: Vec<SongEntry>,
}

fn default_playlist_url() -> String {
    DEFAULT_PLAYLIST_URL.to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            url: default_playlist_url(),
            cache_enabled: default_true(),
            local: default_local_songs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LyricsConfig {
    #[serde(default)]
    pub format: LyricsFormat,
}

/// Where the synchronization clock comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Follow the player position.
    #[default]
    Clock,
    /// Advance line by line on timers, without a player clock.
    FixedDelay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub mode: SyncMode,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub clock_resolution: ClockResolution,
    /// Window for the last segment of the last line
    #[serde(default = "default_fallback_span")]
    pub fallback_span_secs: f64,
    #[serde(default = "default_seek_threshold")]
    pub seek_threshold_secs: f64,
    #[serde(default = "default_last_line_hold")]
    pub last_line_hold_secs: f64,
    #[serde(default = "default_max_line_hold")]
    pub max_line_hold_secs: f64,
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
}

const fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

const fn default_fallback_span() -> f64 {
    DEFAULT_FALLBACK_SPAN_SECS
}

const fn default_seek_threshold() -> f64 {
    DEFAULT_SEEK_THRESHOLD_SECS
}

const fn default_last_line_hold() -> f64 {
    DEFAULT_LAST_LINE_HOLD_SECS
}

const fn default_max_line_hold() -> f64 {
    DEFAULT_MAX_LINE_HOLD_SECS
}

const fn default_frame_interval() -> u64 {
    DEFAULT_FRAME_INTERVAL_MS
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            poll_interval_ms: default_poll_interval(),
            clock_resolution: ClockResolution::default(),
            fallback_span_secs: default_fallback_span(),
            seek_threshold_secs: default_seek_threshold(),
            last_line_hold_secs: default_last_line_hold(),
            max_line_hold_secs: default_max_line_hold(),
            frame_interval_ms: default_frame_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Defaults to `~/.config/singalong/soundtracks`
    #[serde(default)]
    pub soundtrack_dir: Option<PathBuf>,
}

impl StorageConfig {
    #[must_use]
    pub fn soundtrack_dir(&self) -> PathBuf {
        self.soundtrack_dir
            .clone()
            .unwrap_or_else(crate::paths::soundtrack_dir)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to `~/.config/singalong/singalong.log`
    #[serde(default)]
    pub enabled: bool,
}

impl SingalongConfig {
    /// Get the config file path
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default location, or create the template.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] when the template was just
    /// written, or an error if the file cannot be read, parsed or validated.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Load config from `config_path`, writing the template there if the
    /// file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] when the template was just
    /// written, or an error if the file cannot be read, parsed or validated.
    pub fn load_or_create_at(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(config_path, CONFIG_TEMPLATE)?;

            return Err(CoreError::ConfigNotFound {
                path: config_path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(config_path)?;
        Self::parse(&content)
    }

    /// Parse and validate TOML config text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this structure or
    /// fails validation.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`CoreError::ConfigInvalid`] describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        let sync = &self.sync;
        if sync.poll_interval_ms == 0 {
            return Err(invalid("sync.poll_interval_ms must be greater than 0"));
        }
        if sync.frame_interval_ms == 0 {
            return Err(invalid("sync.frame_interval_ms must be greater than 0"));
        }
        for (field, value) in [
            ("sync.fallback_span_secs", sync.fallback_span_secs),
            ("sync.last_line_hold_secs", sync.last_line_hold_secs),
            ("sync.max_line_hold_secs", sync.max_line_hold_secs),
            ("sync.seek_threshold_secs", sync.seek_threshold_secs),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(invalid(&format!("{field} must be a positive number")));
            }
        }
        if self.playlist.url.trim().is_empty() {
            return Err(invalid("playlist.url must not be empty"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> CoreError {
    CoreError::ConfigInvalid {
        message: message.to_string(),
    }
}

const CONFIG_TEMPLATE: &str = r#"# Singalong Configuration
#
# Every setting is optional; the values below are the defaults.

[playlist]
# URL (or local path) of the playlist JSON
url = "https://gcpa-enssat-24-25.s3.eu-west-3.amazonaws.com/playlist.json"
# Keep the last downloaded playlist and reuse it on the next start
cache_enabled = true

# Songs shown when no playlist can be loaded
[[playlist.local]]
name = "Hey Jude"
artist = "The Beatles"
locked = true

[[playlist.local]]
name = "Bohemian Rhapsody"
artist = "Queen"
locked = true

[[playlist.local]]
name = "Sweet Child O' Mine"
artist = "Guns N' Roses"
locked = true

[lyrics]
# "auto", "single_timestamp" or "multi_segment"
format = "auto"

[sync]
# "clock" follows the player position, "fixed_delay" advances line by line
mode = "clock"
# How often the player position is sampled
poll_interval_ms = 16
# "tenths" or "seconds"
clock_resolution = "tenths"
# How long the final segment of the song is revealed over
fallback_span_secs = 5.0
# Forward clock jumps larger than this are treated as seeks
seek_threshold_secs = 2.0
# fixed_delay mode: how long the last line stays on screen
last_line_hold_secs = 3.0
# fixed_delay mode: longest a line is shown before switching to a pause
max_line_hold_secs = 10.0
# fixed_delay mode: reveal animation frame interval
frame_interval_ms = 16

[storage]
# Where downloaded soundtracks are kept (default: ~/.config/singalong/soundtracks)
# soundtrack_dir = "/path/to/soundtracks"

[logging]
# Also write logs to ~/.config/singalong/singalong.log
enabled = false
"#;
