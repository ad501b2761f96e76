use singalong_core::{LyricsDocument, SyncPhase, SyncState};
use std::io::{self, Write};
use std::sync::Arc;

/// Shown between lines while the fixed-delay driver is pausing.
const PAUSE_TEXT: &str = "...";
const LOADING_TEXT: &str = "Loading lyrics...";

/// Single-line terminal view of the karaoke state.
///
/// The sung part of the current line is followed by a `|` marker and the
/// part still to come. The loading placeholder stays up until a line
/// becomes active. Only changes are written.
#[derive(Debug, Default)]
pub struct KaraokeView {
    lyrics: Option<Arc<LyricsDocument>>,
    last_frame: Option<String>,
}

impl KaraokeView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lyrics(&mut self, lyrics: Arc<LyricsDocument>) {
        self.lyrics = Some(lyrics);
        self.last_frame = None;
    }

    pub fn clear_lyrics(&mut self) {
        self.lyrics = None;
        self.last_frame = None;
    }

    /// Text for `state`, or `None` if it matches what is already on screen.
    pub fn frame(&mut self, state: &SyncState) -> Option<String> {
        let frame = self.describe(state);
        if self.last_frame.as_ref() == Some(&frame) {
            return None;
        }
        self.last_frame = Some(frame.clone());
        Some(frame)
    }

    /// Redraw the terminal line if `state` changes what is shown.
    pub fn draw(&mut self, state: &SyncState) -> io::Result<()> {
        let Some(frame) = self.frame(state) else {
            return Ok(());
        };
        let mut stdout = io::stdout().lock();
        write!(stdout, "\r\x1b[2K{frame}")?;
        stdout.flush()
    }

    /// Print a message on its own line below the lyrics.
    pub fn announce(&mut self, message: &str) -> io::Result<()> {
        self.announce_to(&mut io::stdout().lock(), message)
    }

    /// Like [`Self::announce`], writing to `out`. The next frame is always
    /// drawn, even if writing fails.
    pub fn announce_to<W: Write>(&mut self, out: &mut W, message: &str) -> io::Result<()> {
        self.last_frame = None;
        writeln!(out, "\r\x1b[2K{message}")
    }

    fn describe(&self, state: &SyncState) -> String {
        let Some(lyrics) = &self.lyrics else {
            return LOADING_TEXT.to_string();
        };

        match state.phase {
            SyncPhase::Paused { .. } => PAUSE_TEXT.to_string(),
            SyncPhase::NoActiveLine => LOADING_TEXT.to_string(),
            SyncPhase::Finished => String::new(),
            SyncPhase::ActiveLine { .. } => state
                .reveal(lyrics)
                .map(|reveal| format!("{}|{}", reveal.read, reveal.unread))
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use singalong_core::RevealScope;

    fn view() -> KaraokeView {
        let mut view = KaraokeView::new();
        view.set_lyrics(Arc::new(LyricsDocument::parse(
            "{0:01} Hello World\n{0:04} Goodbye",
        )));
        view
    }

    fn active(clock_seconds: f64, line_index: usize, progress: f64) -> SyncState {
        SyncState {
            clock_seconds,
            phase: SyncPhase::ActiveLine {
                line_index,
                segment_index: 0,
                progress,
                scope: RevealScope::Line,
            },
        }
    }

    #[test]
    fn test_loading_until_lyrics_arrive() {
        let mut view = KaraokeView::new();
        assert_eq!(view.frame(&SyncState::idle(0.0)).as_deref(), Some(LOADING_TEXT));
        assert_eq!(view.frame(&SyncState::idle(0.1)), None);
    }

    #[test]
    fn test_active_line_split_at_progress() {
        let mut view = view();
        assert_eq!(view.frame(&active(1.0, 0, 0.0)).as_deref(), Some("|Hello World"));
        assert_eq!(view.frame(&active(4.0, 1, 1.0)).as_deref(), Some("Goodbye|"));
    }

    #[test]
    fn test_unchanged_frame_is_skipped() {
        let mut view = view();
        assert!(view.frame(&active(1.0, 0, 0.0)).is_some());
        assert!(view.frame(&active(1.05, 0, 0.0)).is_none());
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_announce_reports_write_failure() {
        let mut view = view();
        assert!(view.frame(&active(1.0, 0, 0.0)).is_some());

        let err = view.announce_to(&mut BrokenPipe, "bye").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        // The line is redrawn after the message.
        assert!(view.frame(&active(1.0, 0, 0.0)).is_some());

        let mut out = Vec::new();
        view.announce_to(&mut out, "Hey Jude").unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\r\x1b[2KHey Jude\n");
    }

    #[test]
    fn test_pause_and_blank_phases() {
        let mut view = view();
        let paused = SyncState {
            clock_seconds: 0.5,
            phase: SyncPhase::Paused { next_line_index: 0 },
        };
        assert_eq!(view.frame(&paused).as_deref(), Some(PAUSE_TEXT));
        assert_eq!(view.frame(&SyncState::idle(0.5)).as_deref(), Some(LOADING_TEXT));

        let finished = SyncState {
            clock_seconds: 9.0,
            phase: SyncPhase::Finished,
        };
        assert_eq!(view.frame(&finished).as_deref(), Some(""));
    }
}
