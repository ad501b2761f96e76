pub mod config;
pub mod error;
pub mod fixed_delay;
pub mod loader;
pub mod location;
pub mod lyrics;
pub mod paths;
pub mod player;
pub mod playlist;
pub mod session;
pub mod store;
pub mod sync;
pub mod time;
pub mod timestamp;
pub mod tracker;

pub use config::{
    LoggingConfig, LyricsConfig, PlaylistConfig, SingalongConfig, StorageConfig, SyncConfig,
    SyncMode,
};

/// Re-export toml error type for config parsing error handling
pub use toml::de::Error as TomlParseError;
pub use error::{CoreError, Result};
pub use fixed_delay::{DriverOutcome, FixedDelayDriver, FixedDelayPlan, PlanStep};
pub use loader::{LoadedLyrics, LyricsLoader};
pub use location::{http_client, Location};
pub use lyrics::{
    extract_soundtrack, normalize_lyrics, LyricLine, LyricsDocument, LyricsFormat, Segment,
};
pub use paths::{config_dir, CONFIG_DIR_NAME};
pub use player::{MediaPlayer, PlayerError, SimulatedPlayer};
pub use playlist::{default_local_songs, PlaylistSource, SongEntry};
pub use session::{KaraokeSession, SongInfo};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use sync::{
    compute_sync_state, reveal_split, LineReveal, RevealScope, SyncEngine, SyncEvent, SyncPhase,
    SyncState,
};
pub use time::DurationExt;
pub use timestamp::{format_timestamp, parse_timestamp};
pub use tracker::{ClockResolution, PositionTracker};
