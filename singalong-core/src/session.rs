//! One karaoke session: a song being played with its lyrics on screen.

use crate::config::{SyncConfig, SyncMode};
use crate::fixed_delay::{FixedDelayDriver, FixedDelayPlan};
use crate::loader::LyricsLoader;
use crate::lyrics::LyricsDocument;
use crate::player::MediaPlayer;
use crate::sync::SyncEngine;
use crate::tracker::PositionTracker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const LOG_TARGET: &str = "singalong::session";

/// Descriptive metadata attached to the parsed lyrics.
#[derive(Debug, Clone, Default)]
pub struct SongInfo {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Owns the player for the lifetime of one song.
///
/// Background work (lyrics fetch, position sampling or fixed-delay playback)
/// runs on a child of the caller's cancellation token and is stopped by
/// [`KaraokeSession::close`]. The player is stopped if needed and released
/// exactly once.
pub struct KaraokeSession<P: MediaPlayer + 'static> {
    player: Arc<Mutex<P>>,
    sync_engine: Arc<SyncEngine>,
    loader: Arc<LyricsLoader>,
    settings: SyncConfig,
    fallback_source: Option<String>,
    cancel_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    saved_position_ms: Mutex<Option<u64>>,
    closed: AtomicBool,
}

impl<P: MediaPlayer + 'static> KaraokeSession<P> {
    pub fn new(
        player: P,
        sync_engine: Arc<SyncEngine>,
        loader: Arc<LyricsLoader>,
        settings: SyncConfig,
        cancel_token: &CancellationToken,
    ) -> Self {
        Self {
            player: Arc::new(Mutex::new(player)),
            sync_engine,
            loader,
            settings,
            fallback_source: None,
            cancel_token: cancel_token.child_token(),
            tasks: Mutex::new(Vec::new()),
            saved_position_ms: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Source handed to the player when the lyrics name no soundtrack.
    ///
    /// Without one the player stays unprepared and the clock reads 0.
    #[must_use]
    pub fn with_fallback_source(mut self, uri: impl Into<String>) -> Self {
        self.fallback_source = Some(uri.into());
        self
    }

    #[must_use]
    pub fn sync_engine(&self) -> &Arc<SyncEngine> {
        &self.sync_engine
    }

    #[must_use]
    pub fn player(&self) -> &Arc<Mutex<P>> {
        &self.player
    }

    /// Start loading `lyrics_location` and, depending on the sync mode,
    /// start position sampling right away or fixed-delay playback once the
    /// lyrics are in.
    ///
    /// Failures never surface here: missing lyrics leave the engine without
    /// a document, player errors are logged.
    pub async fn open(&self, lyrics_location: &str, song: SongInfo) {
        if self.closed.load(Ordering::SeqCst) {
            warn!(target: LOG_TARGET, "Ignoring open on a closed session");
            return;
        }
        info!(target: LOG_TARGET, "Opening session for {} ({:?})", lyrics_location, self.settings.mode);

        let mut tasks = self.tasks.lock().await;

        if self.settings.mode == SyncMode::Clock {
            let tracker = Arc::new(PositionTracker::new(
                self.player.clone(),
                self.sync_engine.clone(),
                self.settings.poll_interval_ms,
                self.settings.clock_resolution,
                Some(self.cancel_token.clone()),
            ));
            tasks.push(tracker.start());
        }

        let fetch = LoadTask {
            player: self.player.clone(),
            sync_engine: self.sync_engine.clone(),
            loader: self.loader.clone(),
            settings: self.settings.clone(),
            fallback_source: self.fallback_source.clone(),
            cancel_token: self.cancel_token.clone(),
            location: lyrics_location.to_string(),
            song,
        };
        tasks.push(tokio::spawn(fetch.run()));
    }

    /// Remember the playhead and pause, e.g. while the app is in the
    /// background.
    pub async fn suspend(&self) {
        let mut player = self.player.lock().await;
        let position = player.current_position_ms().unwrap_or(0);
        *self.saved_position_ms.lock().await = Some(position);

        if let Err(e) = player.pause() {
            warn!(target: LOG_TARGET, "Pause on suspend failed: {}", e);
        }
        info!(target: LOG_TARGET, "Session suspended at {}ms", position);
    }

    /// Seek back to the position saved by [`Self::suspend`] and play.
    pub async fn resume(&self) {
        let Some(position) = self.saved_position_ms.lock().await.take() else {
            return;
        };
        let mut player = self.player.lock().await;
        if !player.is_loaded() {
            info!(target: LOG_TARGET, "Nothing loaded to resume");
            return;
        }

        if let Err(e) = player.seek(position).and_then(|()| player.play()) {
            warn!(target: LOG_TARGET, "Resume failed: {}", e);
            return;
        }
        info!(target: LOG_TARGET, "Session resumed at {}ms", position);
    }

    /// Whether a source finished playing on its own.
    pub async fn playback_ended(&self) -> bool {
        if self.saved_position_ms.lock().await.is_some() {
            return false;
        }
        let player = self.player.lock().await;
        player.is_loaded() && !player.is_playing() && player.current_position_ms().unwrap_or(0) > 0
    }

    /// Stop background work, stop playback if active and release the
    /// player. Calling this again is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(target: LOG_TARGET, "Closing session");
        self.cancel_token.cancel();

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(target: LOG_TARGET, "Session task ended abnormally: {}", e);
            }
        }

        shut_down(&mut *self.player.lock().await);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<P: MediaPlayer + 'static> Drop for KaraokeSession<P> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // A background task may still be holding the player.
        match self.player.try_lock() {
            Ok(mut player) => {
                info!(target: LOG_TARGET, "Session dropped without close");
                shut_down(&mut *player);
            }
            Err(_) => warn!(target: LOG_TARGET, "Player busy while dropping session, not released"),
        }
    }
}

/// Stop playback if active, then release the player.
fn shut_down<P: MediaPlayer>(player: &mut P) {
    if player.is_playing()
        && let Err(e) = player.stop()
    {
        warn!(target: LOG_TARGET, "Stop on close failed: {}", e);
    }
    if let Err(e) = player.release() {
        warn!(target: LOG_TARGET, "Release on close failed: {}", e);
    }
}

/// The one-shot fetch, parse and playback start.
struct LoadTask<P> {
    player: Arc<Mutex<P>>,
    sync_engine: Arc<SyncEngine>,
    loader: Arc<LyricsLoader>,
    settings: SyncConfig,
    fallback_source: Option<String>,
    cancel_token: CancellationToken,
    location: String,
    song: SongInfo,
}

impl<P: MediaPlayer + 'static> LoadTask<P> {
    async fn run(self) {
        let loaded = tokio::select! {
            () = self.cancel_token.cancelled() => return,
            loaded = self.loader.load(&self.location) => loaded,
        };

        let Some(loaded) = loaded else {
            self.sync_engine.set_no_lyrics().await;
            return;
        };

        let document = Arc::new(
            loaded
                .document
                .with_metadata(self.song.title.clone(), self.song.author.clone()),
        );
        self.sync_engine.set_lyrics(document.clone()).await;

        let source = loaded
            .soundtrack
            .map(|path| path.to_string_lossy().into_owned())
            .or_else(|| self.fallback_source.clone());
        match source {
            Some(source) => self.start_playback(&source).await,
            None => info!(target: LOG_TARGET, "No soundtrack to play"),
        }

        if self.settings.mode == SyncMode::FixedDelay {
            self.run_fixed_delay(document).await;
        }
    }

    async fn start_playback(&self, source: &str) {
        let mut player = self.player.lock().await;
        let result = player
            .set_source(source)
            .and_then(|()| player.prepare())
            .and_then(|()| player.play());

        match result {
            Ok(()) => info!(target: LOG_TARGET, "Playing {}", source),
            Err(e) => warn!(target: LOG_TARGET, "Could not play {}: {}", source, e),
        }
    }

    async fn run_fixed_delay(&self, document: Arc<LyricsDocument>) {
        let plan = FixedDelayPlan::build(
            &document,
            self.settings.last_line_hold_secs,
            self.settings.max_line_hold_secs,
        );
        let driver = FixedDelayDriver::new(
            self.sync_engine.clone(),
            document,
            plan,
            self.settings.frame_interval_ms,
            Some(self.cancel_token.clone()),
        );
        match driver.run().await {
            Ok(outcome) => info!(target: LOG_TARGET, "Fixed-delay playback ended: {:?}", outcome),
            Err(e) => warn!(target: LOG_TARGET, "Fixed-delay playback failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::LyricsFormat;
    use crate::player::{PlayerError, SimulatedPlayer};
    use crate::sync::{SyncEvent, SyncPhase};
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Counts teardown calls on top of a simulated player.
    #[derive(Default)]
    struct RecordingPlayer {
        inner: SimulatedPlayer,
        stops: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
    }

    impl MediaPlayer for RecordingPlayer {
        fn set_source(&mut self, uri: &str) -> Result<(), PlayerError> {
            self.inner.set_source(uri)
        }
        fn prepare(&mut self) -> Result<(), PlayerError> {
            self.inner.prepare()
        }
        fn play(&mut self) -> Result<(), PlayerError> {
            self.inner.play()
        }
        fn pause(&mut self) -> Result<(), PlayerError> {
            self.inner.pause()
        }
        fn stop(&mut self) -> Result<(), PlayerError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.inner.stop()
        }
        fn seek(&mut self, position_ms: u64) -> Result<(), PlayerError> {
            self.inner.seek(position_ms)
        }
        fn release(&mut self) -> Result<(), PlayerError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.inner.release()
        }
        fn current_position_ms(&self) -> Option<u64> {
            self.inner.current_position_ms()
        }
        fn is_playing(&self) -> bool {
            self.inner.is_playing()
        }
        fn is_loaded(&self) -> bool {
            self.inner.is_loaded()
        }
    }

    struct Fixture {
        _dir: TempDir,
        lyrics: PathBuf,
        loader: Arc<LyricsLoader>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let lyrics = dir.path().join("lyrics.md");
        std::fs::write(
            &lyrics,
            "# soundtrack song.mp3\n{0:01}Hello{0:03}World\n{0:06}Goodbye",
        )
        .unwrap();
        std::fs::write(dir.path().join("song.mp3"), b"audio").unwrap();

        let loader = Arc::new(LyricsLoader::new(
            reqwest::Client::new(),
            dir.path().join("cache"),
            LyricsFormat::Auto,
        ));
        Fixture {
            _dir: dir,
            lyrics,
            loader,
        }
    }

    async fn wait_for_lyrics(rx: &mut tokio::sync::broadcast::Receiver<SyncEvent>) -> bool {
        loop {
            match rx.recv().await {
                Ok(SyncEvent::LyricsLoaded { .. }) => return true,
                Ok(SyncEvent::LyricsUnavailable)
                | Err(tokio::sync::broadcast::error::RecvError::Closed) => return false,
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
            }
        }
    }

    #[tokio::test]
    async fn test_open_loads_lyrics_and_starts_playback() {
        let f = fixture();
        let engine = SyncEngine::new();
        let mut rx = engine.subscribe();
        let session = KaraokeSession::new(
            SimulatedPlayer::new(),
            engine.clone(),
            f.loader.clone(),
            SyncConfig::default(),
            &CancellationToken::new(),
        );

        let song = SongInfo {
            title: Some("Greeting".into()),
            author: Some("Someone".into()),
        };
        session.open(f.lyrics.to_str().unwrap(), song).await;
        assert!(wait_for_lyrics(&mut rx).await);

        let lyrics = engine.lyrics().await.unwrap();
        assert_eq!(lyrics.title.as_deref(), Some("Greeting"));
        assert_eq!(lyrics.lines.len(), 2);

        // Playback starts right after the lyrics are published.
        for _ in 0..100 {
            if session.player().lock().await.is_playing() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let player = session.player().lock().await;
        assert!(player.is_playing());
        assert!(player.source().unwrap().ends_with("song.mp3"));
        drop(player);

        session.close().await;
    }

    #[tokio::test]
    async fn test_missing_lyrics_leave_engine_idle() {
        let f = fixture();
        let engine = SyncEngine::new();
        let mut rx = engine.subscribe();
        let session = KaraokeSession::new(
            SimulatedPlayer::new(),
            engine.clone(),
            f.loader.clone(),
            SyncConfig::default(),
            &CancellationToken::new(),
        );

        session.open("/no/such/lyrics.md", SongInfo::default()).await;
        assert!(!wait_for_lyrics(&mut rx).await);
        assert_eq!(engine.state().await.phase, SyncPhase::NoActiveLine);
        assert!(!session.player().lock().await.is_loaded());
        session.close().await;
    }

    #[tokio::test]
    async fn test_close_twice_releases_once() {
        let f = fixture();
        let player = RecordingPlayer::default();
        let stops = player.stops.clone();
        let releases = player.releases.clone();

        let session = KaraokeSession::new(
            player,
            SyncEngine::new(),
            f.loader.clone(),
            SyncConfig::default(),
            &CancellationToken::new(),
        );
        {
            let mut player = session.player().lock().await;
            player.set_source("memory://song").unwrap();
            player.prepare().unwrap();
            player.play().unwrap();
        }

        session.close().await;
        session.close().await;

        assert!(session.is_closed());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_without_close_releases_once() {
        let f = fixture();
        let player = RecordingPlayer::default();
        let stops = player.stops.clone();
        let releases = player.releases.clone();

        let session = KaraokeSession::new(
            player,
            SyncEngine::new(),
            f.loader.clone(),
            SyncConfig::default(),
            &CancellationToken::new(),
        );
        {
            let mut player = session.player().lock().await;
            player.set_source("memory://song").unwrap();
            player.prepare().unwrap();
            player.play().unwrap();
        }
        drop(session);

        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_after_close_does_not_release_again() {
        let f = fixture();
        let player = RecordingPlayer::default();
        let releases = player.releases.clone();

        let session = KaraokeSession::new(
            player,
            SyncEngine::new(),
            f.loader.clone(),
            SyncConfig::default(),
            &CancellationToken::new(),
        );
        session.close().await;
        drop(session);

        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_skips_stop_when_idle() {
        let f = fixture();
        let player = RecordingPlayer::default();
        let stops = player.stops.clone();
        let releases = player.releases.clone();

        let session = KaraokeSession::new(
            player,
            SyncEngine::new(),
            f.loader.clone(),
            SyncConfig::default(),
            &CancellationToken::new(),
        );
        session.close().await;

        assert_eq!(stops.load(Ordering::SeqCst), 0);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_and_resume_restore_position() {
        let f = fixture();
        let session = KaraokeSession::new(
            SimulatedPlayer::new(),
            SyncEngine::new(),
            f.loader.clone(),
            SyncConfig::default(),
            &CancellationToken::new(),
        );
        {
            let mut player = session.player().lock().await;
            player.set_source("memory://song").unwrap();
            player.prepare().unwrap();
            player.play().unwrap();
        }
        tokio::time::advance(Duration::from_millis(4200)).await;

        session.suspend().await;
        assert!(!session.player().lock().await.is_playing());
        assert!(!session.playback_ended().await);

        // Something else moves the playhead while suspended.
        session.player().lock().await.seek(0).unwrap();

        session.resume().await;
        let player = session.player().lock().await;
        assert!(player.is_playing());
        assert_eq!(player.current_position_ms(), Some(4200));
        drop(player);

        session.close().await;
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_tracker() {
        let f = fixture();
        let parent = CancellationToken::new();
        let session = KaraokeSession::new(
            SimulatedPlayer::new(),
            SyncEngine::new(),
            f.loader.clone(),
            SyncConfig::default(),
            &parent,
        );
        session.open(f.lyrics.to_str().unwrap(), SongInfo::default()).await;

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), session.close())
            .await
            .unwrap();
        assert!(session.player().lock().await.is_released());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_session_finishes() {
        let f = fixture();
        let engine = SyncEngine::new();
        let mut rx = engine.subscribe();
        let settings = SyncConfig {
            mode: SyncMode::FixedDelay,
            ..SyncConfig::default()
        };
        let session = KaraokeSession::new(
            SimulatedPlayer::new(),
            engine.clone(),
            f.loader.clone(),
            settings,
            &CancellationToken::new(),
        );

        session.open(f.lyrics.to_str().unwrap(), SongInfo::default()).await;
        let finished = loop {
            match rx.recv().await {
                Ok(SyncEvent::SessionFinished) => break true,
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break false,
            }
        };
        assert!(finished);
        assert_eq!(engine.state().await.phase, SyncPhase::Finished);
        session.close().await;
    }
}
