//! Karaoke lyrics parsing.
//!
//! Lyrics are plain text where every timed line carries one or more
//! `{M:SS.fff}` markers. Two layouts are accepted:
//!
//! * single timestamp: `{0:12.5} Hello world` (one marker per line, the
//!   whole line is displayed from that instant),
//! * multi segment: `{0:12.5} Hello {0:13.1} world` (each marker times the
//!   text that follows it up to the next marker).
//!
//! A `# soundtrack <file>` directive names the audio file that goes with
//! the lyrics. Lines without both `{` and `}` are ignored.

use crate::timestamp::{format_timestamp, parse_timestamp};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::debug;

const LOG_TARGET: &str = "singalong::lyrics";

/// `}` followed by optional whitespace and `{`; the capture keeps everything after the `}`.
#[allow(clippy::expect_used)]
static ADJACENT_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\}(\s*\{)").expect("adjacent marker pattern is valid"));

#[allow(clippy::expect_used)]
static SOUNDTRACK_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*#[ \t]*soundtrack[ \t]+(.+)$").expect("soundtrack pattern is valid")
});

/// Which marker layout to parse lyrics with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricsFormat {
    /// Pick per document, see [`LyricsDocument::detect_format`].
    #[default]
    Auto,
    SingleTimestamp,
    MultiSegment,
}

/// A timed piece of a lyric line.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Seconds from the start of the song.
    pub timestamp: f64,
    pub text: String,
}

/// One karaoke display unit.
#[derive(Debug, Clone, PartialEq)]
pub struct LyricLine {
    /// Timestamp of the first segment, in seconds.
    pub start: f64,
    pub full_text: String,
    /// Never empty, ascending by timestamp.
    pub segments: Vec<Segment>,
}

impl LyricLine {
    /// Index of the last segment whose timestamp is at or before `clock`.
    #[must_use]
    pub fn segment_index_at(&self, clock: f64) -> Option<usize> {
        self.segments.iter().rposition(|s| s.timestamp <= clock)
    }
}

/// Parsed lyrics in playback order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LyricsDocument {
    /// Not present in the lyrics text; attached from playlist metadata.
    pub title: Option<String>,
    /// Not present in the lyrics text; attached from playlist metadata.
    pub author: Option<String>,
    /// Value of the `# soundtrack` directive.
    pub soundtrack: Option<String>,
    /// Sorted by start time; lines sharing a start keep their textual order.
    pub lines: Vec<LyricLine>,
}

impl LyricsDocument {
    /// Parse lyrics, detecting the marker layout automatically.
    ///
    /// Parsing never fails: lines with unparsable timestamps are skipped and
    /// the worst case is a document without lines.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self::parse_with_format(text, LyricsFormat::Auto)
    }

    /// Parse lyrics using a specific marker layout.
    #[must_use]
    pub fn parse_with_format(text: &str, format: LyricsFormat) -> Self {
        let format = match format {
            LyricsFormat::Auto => Self::detect_format(text),
            explicit => explicit,
        };

        let mut lines = match format {
            LyricsFormat::MultiSegment => parse_lines(text, parse_multi_segment_line),
            LyricsFormat::SingleTimestamp | LyricsFormat::Auto => {
                parse_lines(&normalize_lyrics(text), parse_single_timestamp_line)
            }
        };
        lines.sort_by(|a, b| a.start.total_cmp(&b.start));

        debug!(
            target: LOG_TARGET,
            ?format,
            lines = lines.len(),
            "Parsed lyrics document"
        );

        Self {
            title: None,
            author: None,
            soundtrack: extract_soundtrack(text),
            lines,
        }
    }

    /// Guess the marker layout of `text`.
    ///
    /// A document is multi segment when at least one line has a timestamp
    /// marker whose text is non-blank and is followed by another timestamp
    /// marker, e.g. `{0:01} Hel {0:02} lo`. Groups that are not timestamps,
    /// such as `{Chorus}`, are ignored. Everything else is single timestamp.
    #[must_use]
    pub fn detect_format(text: &str) -> LyricsFormat {
        let multi = text.lines().filter(|line| is_candidate(line)).any(|line| {
            let timed: Vec<_> = scan_markers(line)
                .into_iter()
                .filter(|marker| parse_timestamp(marker.label).is_ok())
                .collect();
            timed
                .windows(2)
                .any(|pair| !pair[0].text.trim().is_empty())
        });

        if multi {
            LyricsFormat::MultiSegment
        } else {
            LyricsFormat::SingleTimestamp
        }
    }

    /// Attach descriptive metadata that the lyrics text does not carry.
    #[must_use]
    pub fn with_metadata(mut self, title: Option<String>, author: Option<String>) -> Self {
        self.title = title;
        self.author = author;
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Index of the last line starting at or before `clock`.
    #[must_use]
    pub fn line_index_at(&self, clock: f64) -> Option<usize> {
        self.lines
            .partition_point(|line| line.start <= clock)
            .checked_sub(1)
    }

    /// Serialize back to multi-segment lyrics text.
    ///
    /// Parsing the output yields the same lines (timestamps rounded to
    /// milliseconds) and soundtrack.
    #[must_use]
    pub fn to_source_text(&self) -> String {
        let mut out = String::new();
        if let Some(soundtrack) = &self.soundtrack {
            let _ = writeln!(out, "# soundtrack {soundtrack}");
        }
        for line in &self.lines {
            let rendered = line
                .segments
                .iter()
                .map(|segment| format!("{{{}}} {}", format_timestamp(segment.timestamp), segment.text))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(out, "{}", rendered.trim_end());
        }
        out
    }
}

/// Insert a line break after every `}` that is followed, optionally through
/// whitespace, by `{`. Nothing else in the text changes.
#[must_use]
pub fn normalize_lyrics(text: &str) -> String {
    ADJACENT_MARKERS.replace_all(text, "}\n$1").into_owned()
}

/// Value of the first `# soundtrack <name>` directive, trimmed.
#[must_use]
pub fn extract_soundtrack(text: &str) -> Option<String> {
    SOUNDTRACK_DIRECTIVE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|name| !name.is_empty())
        .map(str::to_string)
}

/// A `{label}` marker and the text up to the next `{` or end of line.
#[derive(Debug, PartialEq, Eq)]
struct Marker<'a> {
    label: &'a str,
    text: &'a str,
}

fn is_candidate(line: &str) -> bool {
    line.contains('{') && line.contains('}')
}

/// Split a physical line into its markers. Text before the first `{` and an
/// unterminated trailing `{` are not part of any marker.
fn scan_markers(line: &str) -> Vec<Marker<'_>> {
    let mut markers = Vec::new();
    let mut rest = line;

    while let Some(open) = rest.find('{') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            break;
        };
        let label = &after_open[..close];
        let after_close = &after_open[close + 1..];
        let text_end = after_close.find('{').unwrap_or(after_close.len());

        markers.push(Marker {
            label,
            text: &after_close[..text_end],
        });
        rest = &after_close[text_end..];
    }

    markers
}

/// Remove every closed `{...}` group from a line.
fn strip_markers(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

fn parse_lines(text: &str, parse_line: fn(&str) -> Option<LyricLine>) -> Vec<LyricLine> {
    text.lines()
        .filter(|line| is_candidate(line))
        .filter_map(parse_line)
        .collect()
}

fn parse_single_timestamp_line(line: &str) -> Option<LyricLine> {
    let marker = scan_markers(line).into_iter().next()?;
    let start = match parse_timestamp(marker.label) {
        Ok(start) => start,
        Err(e) => {
            debug!(target: LOG_TARGET, line, error = %e, "Skipping lyric line");
            return None;
        }
    };

    let text = strip_markers(line).trim().to_string();
    Some(LyricLine {
        start,
        full_text: text.clone(),
        segments: vec![Segment {
            timestamp: start,
            text,
        }],
    })
}

fn parse_multi_segment_line(line: &str) -> Option<LyricLine> {
    let mut segments = Vec::new();
    for marker in scan_markers(line) {
        match parse_timestamp(marker.label) {
            Ok(timestamp) => segments.push(Segment {
                timestamp,
                text: marker.text.trim().to_string(),
            }),
            Err(e) => {
                debug!(target: LOG_TARGET, line, error = %e, "Skipping lyric segment");
            }
        }
    }

    segments.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    let Some(first) = segments.first() else {
        debug!(target: LOG_TARGET, line, "Skipping lyric line without timed segments");
        return None;
    };
    let start = first.timestamp;
    let full_text = segments
        .iter()
        .map(|segment| segment.text.as_str())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Some(LyricLine {
        start,
        full_text,
        segments,
    })
}
