mod render;

use crate::render::KaraokeView;
use clap::{Parser, Subcommand, ValueEnum};
use singalong_core::{
    http_client, CoreError, KaraokeSession, KeyValueStore, LyricsLoader, PlaylistSource,
    SimulatedPlayer, SingalongConfig, SongInfo, SqliteStore, SyncConfig, SyncEngine, SyncEvent,
    SyncMode,
};
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_TARGET: &str = "singalong::cli";

/// Source the simulated player plays when the lyrics name no soundtrack.
const SILENT_SOURCE: &str = "simulated://silence";

/// How often the session is checked for playback that ended on its own.
const END_CHECK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(name = "singalong", version, about = "Karaoke player with time-synchronized lyrics")]
struct Cli {
    /// Override config file path.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the songs of the playlist.
    List {
        /// Ignore the cached playlist and download it again.
        #[arg(long)]
        refresh: bool,
    },
    /// Sing along to a song from the playlist, or to a lyrics file.
    Play {
        /// Song name as shown by `list`.
        #[arg(required_unless_present = "lyrics")]
        name: Option<String>,

        /// Lyrics file path or URL, bypassing the playlist.
        #[arg(long, conflicts_with = "name")]
        lyrics: Option<String>,

        /// Override the configured synchronization mode.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Follow the player position.
    Clock,
    /// Advance line by line on timers.
    FixedDelay,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Clock => Self::Clock,
            ModeArg::FixedDelay => Self::FixedDelay,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(SingalongConfig::config_path);

    // Tracing is set up before the full config load so that load is logged
    let file_logging_enabled = check_file_logging_enabled(&config_path);
    init_tracing(file_logging_enabled);

    let config = match SingalongConfig::load_or_create_at(&config_path) {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            info!(target: LOG_TARGET, "Created config template at {}, using defaults", path.display());
            SingalongConfig::default()
        }
        Err(e) => {
            error!(target: LOG_TARGET, "{e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(target: LOG_TARGET, "Failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Create shared cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();
    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!(target: LOG_TARGET, "Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!(target: LOG_TARGET, "Failed to set Ctrl+C handler: {}", e);
    }

    let result = runtime.block_on(async {
        match cli.command {
            Command::List { refresh } => list_songs(&config, refresh).await,
            Command::Play { name, lyrics, mode } => {
                let mut config = config;
                if let Some(mode) = mode {
                    config.sync.mode = mode.into();
                }
                play(&config, name, lyrics, &cancel_token).await
            }
        }
    });

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(target: LOG_TARGET, "{e}");
            ExitCode::FAILURE
        }
    }
}

async fn playlist_source(config: &SingalongConfig) -> Result<PlaylistSource, CoreError> {
    let store: Option<Arc<dyn KeyValueStore>> = if config.playlist.cache_enabled {
        match SqliteStore::new().await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(target: LOG_TARGET, "Playlist cache disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(PlaylistSource::new(
        http_client()?,
        config.playlist.url.clone(),
        store,
        config.playlist.local.clone(),
    ))
}

async fn list_songs(config: &SingalongConfig, refresh: bool) -> Result<ExitCode, CoreError> {
    let source = playlist_source(config).await?;
    let songs = if refresh {
        source.refresh().await
    } else {
        source.fetch_songs().await
    };

    for song in songs {
        let marker = if song.is_playable() { " " } else { "*" };
        println!("{marker} {} - {}", song.name, song.artist);
    }
    Ok(ExitCode::SUCCESS)
}

async fn play(
    config: &SingalongConfig,
    name: Option<String>,
    lyrics: Option<String>,
    cancel_token: &CancellationToken,
) -> Result<ExitCode, CoreError> {
    let (location, song) = match (name, lyrics) {
        (_, Some(lyrics)) => (lyrics, SongInfo::default()),
        (Some(name), None) => {
            let source = playlist_source(config).await?;
            let Some(song) = source.find(&name).await else {
                error!(target: LOG_TARGET, "No song named {:?} in the playlist", name);
                return Ok(ExitCode::FAILURE);
            };
            if !song.is_playable() {
                error!(target: LOG_TARGET, "{} is locked", song.name);
                return Ok(ExitCode::FAILURE);
            }
            let location = source.lyrics_location(&song)?.to_string();
            let info = SongInfo {
                title: Some(song.name),
                author: Some(song.artist),
            };
            (location, info)
        }
        (None, None) => return Ok(ExitCode::FAILURE),
    };

    let sync_engine = SyncEngine::with_settings(
        config.sync.fallback_span_secs,
        config.sync.seek_threshold_secs,
    );
    let loader = Arc::new(LyricsLoader::new(
        http_client()?,
        config.storage.soundtrack_dir(),
        config.lyrics.format,
    ));
    let session = KaraokeSession::new(
        SimulatedPlayer::new(),
        sync_engine.clone(),
        loader,
        config.sync.clone(),
        cancel_token,
    )
    .with_fallback_source(SILENT_SOURCE);

    // Subscribe before opening so the lyrics event is not missed
    let mut rx = sync_engine.subscribe();
    session.open(&location, song).await;

    let code = run_view(&session, &mut rx, config, cancel_token).await;
    session.close().await;
    Ok(code)
}

/// Draw sync events until the song ends, lyrics turn out to be missing or
/// the user interrupts.
async fn run_view(
    session: &KaraokeSession<SimulatedPlayer>,
    rx: &mut tokio::sync::broadcast::Receiver<SyncEvent>,
    config: &SingalongConfig,
    cancel_token: &CancellationToken,
) -> ExitCode {
    let mut view = KaraokeView::new();
    let mut end_check = tokio::time::interval(END_CHECK_INTERVAL);

    if let Err(e) = view.draw(&session.sync_engine().state().await) {
        warn!(target: LOG_TARGET, "Failed to draw: {}", e);
    }

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                announce(&mut view, "");
                return ExitCode::SUCCESS;
            }
            _ = end_check.tick() => {
                if session.playback_ended().await {
                    announce(&mut view, "");
                    info!(target: LOG_TARGET, "Playback ended");
                    return ExitCode::SUCCESS;
                }
            }
            event = rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        info!(target: LOG_TARGET, "Missed {} sync events", n);
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        info!(target: LOG_TARGET, "Sync event channel closed");
                        return ExitCode::SUCCESS;
                    }
                };

                let drawn = match event {
                    SyncEvent::LyricsLoaded { document } => {
                        let title = match (&document.title, &document.author) {
                            (Some(title), Some(author)) => format!("{title} - {author}"),
                            (Some(title), None) => title.clone(),
                            _ => format!("{} lyric lines", document.lines.len()),
                        };
                        set_song_length(session, &document, config).await;
                        view.set_lyrics(document);
                        view.announce(&title)
                    }
                    SyncEvent::LyricsUnavailable => {
                        view.clear_lyrics();
                        announce(&mut view, "No lyrics available for this song");
                        return ExitCode::FAILURE;
                    }
                    SyncEvent::StateChanged { state } => view.draw(&state),
                    SyncEvent::SeekOccurred { from, to } => {
                        info!(target: LOG_TARGET, "Seek from {:.1}s to {:.1}s", from, to);
                        Ok(())
                    }
                    SyncEvent::SessionFinished => {
                        announce(&mut view, "");
                        info!(target: LOG_TARGET, "Session finished");
                        return ExitCode::SUCCESS;
                    }
                };
                if let Err(e) = drawn {
                    warn!(target: LOG_TARGET, "Failed to draw: {}", e);
                }
            }
        }
    }
}

fn announce(view: &mut KaraokeView, message: &str) {
    if let Err(e) = view.announce(message) {
        warn!(target: LOG_TARGET, "Failed to draw: {}", e);
    }
}

/// Let the simulated track end a little after the last line.
async fn set_song_length(
    session: &KaraokeSession<SimulatedPlayer>,
    document: &singalong_core::LyricsDocument,
    config: &SingalongConfig,
) {
    let Some(seconds) = song_length_secs(document, &config.sync) else {
        return;
    };
    let end = singalong_core::time::seconds_to_duration(seconds);
    session.player().lock().await.set_duration(Some(end));
}

/// Seconds until the last line is done: its reveal span in clock mode, or
/// the longer of that and the last-line hold in fixed-delay mode.
fn song_length_secs(document: &singalong_core::LyricsDocument, sync: &SyncConfig) -> Option<f64> {
    let last = document.lines.last()?;
    let tail = match sync.mode {
        SyncMode::Clock => sync.fallback_span_secs,
        SyncMode::FixedDelay => sync.fallback_span_secs.max(sync.last_line_hold_secs),
    };
    Some(last.start + tail)
}

/// Check if file logging is enabled by reading the config file.
/// This is done before full config loading to set up tracing first.
/// Returns `false` if config doesn't exist or can't be parsed.
fn check_file_logging_enabled(config_path: &std::path::Path) -> bool {
    // Minimal structs to parse just the logging.enabled field
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        enabled: bool,
    }

    let Ok(content) = std::fs::read_to_string(config_path) else {
        return false;
    };

    toml::from_str::<PartialConfig>(&content)
        .map(|c| c.logging.enabled)
        .unwrap_or(false)
}

/// Initialize tracing with stderr output and optional file logging
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Lyrics own stdout
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if file_logging_enabled {
        let log_path = singalong_core::paths::log_file_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: stderr only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use singalong_core::LyricsDocument;

    #[test]
    fn test_song_length_covers_last_line() {
        let document = LyricsDocument::parse("{0:01} first\n{0:10} last");
        let mut sync = SyncConfig {
            fallback_span_secs: 2.0,
            last_line_hold_secs: 6.0,
            ..SyncConfig::default()
        };

        let clock = song_length_secs(&document, &sync).unwrap();
        assert!((clock - 12.0).abs() < 1e-9);

        sync.mode = SyncMode::FixedDelay;
        let fixed = song_length_secs(&document, &sync).unwrap();
        assert!((fixed - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_song_length_without_lines() {
        let document = LyricsDocument::parse("");
        assert!(song_length_secs(&document, &SyncConfig::default()).is_none());
    }
}
