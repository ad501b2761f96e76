use crate::lyrics::{LyricLine, LyricsDocument};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Window length used for the final segment of the final line.
pub const DEFAULT_FALLBACK_SPAN_SECS: f64 = 5.0;

/// Clock jumps forward by more than this many seconds are reported as seeks.
pub const DEFAULT_SEEK_THRESHOLD_SECS: f64 = 2.0;

/// What part of the active line the progress value applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealScope {
    /// Progress runs through the active segment only (clock-driven mode).
    Segment,
    /// Progress runs through the whole line (fixed-delay mode).
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncPhase {
    /// Before the first line, or no lyrics at all.
    NoActiveLine,
    ActiveLine {
        line_index: usize,
        segment_index: usize,
        /// In `[0, 1]`.
        progress: f64,
        scope: RevealScope,
    },
    /// Gap before `next_line_index` in fixed-delay mode.
    Paused { next_line_index: usize },
    /// Fixed-delay mode ran past the last line.
    Finished,
}

/// Snapshot of where playback is within the lyrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncState {
    pub clock_seconds: f64,
    pub phase: SyncPhase,
}

impl SyncState {
    #[must_use]
    pub const fn idle(clock_seconds: f64) -> Self {
        Self {
            clock_seconds,
            phase: SyncPhase::NoActiveLine,
        }
    }

    /// Split the active line of `document` into its read and unread parts.
    ///
    /// Returns `None` unless the phase is [`SyncPhase::ActiveLine`] and the
    /// line index exists in `document`.
    #[must_use]
    pub fn reveal<'a>(&self, document: &'a LyricsDocument) -> Option<LineReveal<'a>> {
        let SyncPhase::ActiveLine {
            line_index,
            segment_index,
            progress,
            scope,
        } = self.phase
        else {
            return None;
        };
        let line = document.lines.get(line_index)?;

        let split_at = match scope {
            RevealScope::Line => split_char_index(&line.full_text, progress),
            RevealScope::Segment => segment_split_char_index(line, segment_index, progress),
        };
        let (read, unread) = split_at_char(&line.full_text, split_at);

        Some(LineReveal {
            line_index,
            read,
            unread,
        })
    }
}

/// The active line divided at the reveal point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineReveal<'a> {
    pub line_index: usize,
    pub read: &'a str,
    pub unread: &'a str,
}

/// Split `text` at character index `round(progress * char_count)`.
#[must_use]
pub fn reveal_split(text: &str, progress: f64) -> (&str, &str) {
    split_at_char(text, split_char_index(text, progress))
}

/// Fraction of the window `[start, end)` that `clock` has covered, clamped
/// to `[0, 1]`. Empty or inverted windows count as complete.
#[must_use]
pub fn progress_in_window(start: f64, end: f64, clock: f64) -> f64 {
    let duration = end - start;
    if duration.is_nan() || duration <= 0.0 {
        return 1.0;
    }
    let progress = (clock - start) / duration;
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

/// Map a playback clock onto the lyrics timeline.
///
/// The result depends only on the arguments, so seeking backwards simply
/// produces the earlier state. A missing or empty document always yields
/// [`SyncPhase::NoActiveLine`].
#[must_use]
pub fn compute_sync_state(
    document: Option<&LyricsDocument>,
    clock: f64,
    fallback_span: f64,
) -> SyncState {
    let Some(document) = document else {
        return SyncState::idle(clock);
    };
    let Some(line_index) = document.line_index_at(clock) else {
        return SyncState::idle(clock);
    };
    let Some(line) = document.lines.get(line_index) else {
        return SyncState::idle(clock);
    };

    let segment_index = line.segment_index_at(clock).unwrap_or(0);
    let segment_start = line
        .segments
        .get(segment_index)
        .map_or(line.start, |segment| segment.timestamp);

    let window_end = line
        .segments
        .get(segment_index + 1)
        .map(|segment| segment.timestamp)
        .or_else(|| document.lines.get(line_index + 1).map(|next| next.start))
        .unwrap_or(segment_start + fallback_span);

    SyncState {
        clock_seconds: clock,
        phase: SyncPhase::ActiveLine {
            line_index,
            segment_index,
            progress: progress_in_window(segment_start, window_end, clock),
            scope: RevealScope::Segment,
        },
    }
}

// `progress` is clamped to [0, 1] so the product fits in `usize`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn split_char_index(text: &str, progress: f64) -> usize {
    let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
    let char_count = text.chars().count();
    (progress * char_count as f64).round() as usize
}

/// Character offset into `line.full_text` where the reveal of the active
/// segment currently stands. Earlier segments count as fully read.
fn segment_split_char_index(line: &LyricLine, segment_index: usize, progress: f64) -> usize {
    let mut offset = 0;
    for segment in line.segments.iter().take(segment_index) {
        if !segment.text.is_empty() {
            offset += segment.text.chars().count() + 1;
        }
    }

    let active = line
        .segments
        .get(segment_index)
        .map_or(0, |segment| split_char_index(&segment.text, progress));

    (offset + active).min(line.full_text.chars().count())
}

fn split_at_char(text: &str, char_index: usize) -> (&str, &str) {
    let byte_index = text
        .char_indices()
        .nth(char_index)
        .map_or(text.len(), |(index, _)| index);
    text.split_at(byte_index)
}

/// Events emitted by the sync engine
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Lyrics were parsed and attached
    LyricsLoaded { document: Arc<LyricsDocument> },
    /// Fetching or parsing produced nothing to show
    LyricsUnavailable,
    /// The derived state differs from the previous one
    StateChanged { state: SyncState },
    /// The clock moved backwards, or jumped forwards past the seek threshold
    SeekOccurred { from: f64, to: f64 },
    /// Fixed-delay playback went past the last line
    SessionFinished,
}

/// Sync engine state
struct SyncEngineInner {
    lyrics: Option<Arc<LyricsDocument>>,
    clock: Option<f64>,
    state: SyncState,
}

/// Holds the current lyrics and clock, derives [`SyncState`] from them and
/// broadcasts every change.
pub struct SyncEngine {
    inner: RwLock<SyncEngineInner>,
    event_tx: broadcast::Sender<SyncEvent>,
    fallback_span: f64,
    seek_threshold: f64,
}

impl SyncEngine {
    /// Create a new sync engine with default spans
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_settings(DEFAULT_FALLBACK_SPAN_SECS, DEFAULT_SEEK_THRESHOLD_SECS)
    }

    #[must_use]
    pub fn with_settings(fallback_span: f64, seek_threshold: f64) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);

        Arc::new(Self {
            inner: RwLock::new(SyncEngineInner {
                lyrics: None,
                clock: None,
                state: SyncState::idle(0.0),
            }),
            event_tx,
            fallback_span,
            seek_threshold,
        })
    }

    /// Subscribe to sync events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Attach a parsed document and re-evaluate the state
    pub async fn set_lyrics(&self, document: Arc<LyricsDocument>) {
        let mut inner = self.inner.write().await;
        inner.lyrics = Some(document.clone());
        let _ = self.event_tx.send(SyncEvent::LyricsLoaded { document });
        self.recompute(&mut inner);
    }

    /// Mark that no lyrics are available
    pub async fn set_no_lyrics(&self) {
        let mut inner = self.inner.write().await;
        inner.lyrics = None;
        let _ = self.event_tx.send(SyncEvent::LyricsUnavailable);
        self.recompute(&mut inner);
    }

    /// Feed a new clock sample and re-evaluate the state
    pub async fn update_clock(&self, clock: f64) {
        let mut inner = self.inner.write().await;

        if let Some(previous) = inner.clock
            && (clock < previous || clock - previous > self.seek_threshold)
        {
            debug!(from = previous, to = clock, "Seek detected");
            let _ = self.event_tx.send(SyncEvent::SeekOccurred {
                from: previous,
                to: clock,
            });
        }

        inner.clock = Some(clock);
        self.recompute(&mut inner);
    }

    /// Publish a state computed elsewhere, e.g. by the fixed-delay driver
    pub async fn apply_state(&self, state: SyncState) {
        let mut inner = self.inner.write().await;
        inner.clock = Some(state.clock_seconds);
        Self::publish(&self.event_tx, &mut inner, state);
    }

    /// Signal that the session has nothing left to show
    pub async fn finish(&self) {
        let mut inner = self.inner.write().await;
        let clock = inner.clock.unwrap_or(0.0);
        Self::publish(
            &self.event_tx,
            &mut inner,
            SyncState {
                clock_seconds: clock,
                phase: SyncPhase::Finished,
            },
        );
        let _ = self.event_tx.send(SyncEvent::SessionFinished);
    }

    /// Get the current derived state
    pub async fn state(&self) -> SyncState {
        self.inner.read().await.state
    }

    /// Get current lyrics
    pub async fn lyrics(&self) -> Option<Arc<LyricsDocument>> {
        self.inner.read().await.lyrics.clone()
    }

    /// Get the latest clock sample
    pub async fn clock(&self) -> f64 {
        self.inner.read().await.clock.unwrap_or(0.0)
    }

    fn recompute(&self, inner: &mut SyncEngineInner) {
        let state = compute_sync_state(
            inner.lyrics.as_deref(),
            inner.clock.unwrap_or(0.0),
            self.fallback_span,
        );
        Self::publish(&self.event_tx, inner, state);
    }

    fn publish(
        event_tx: &broadcast::Sender<SyncEvent>,
        inner: &mut SyncEngineInner,
        state: SyncState,
    ) {
        if inner.state != state {
            inner.state = state;
            let _ = event_tx.send(SyncEvent::StateChanged { state });
        }
    }
}
