use crate::error::{CoreError, Result};
use crate::location::Location;
use crate::lyrics::{LyricsDocument, LyricsFormat};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const LOG_TARGET: &str = "singalong::loader";

/// Lyrics ready for a session, with the local soundtrack file if one was
/// named and could be obtained.
#[derive(Debug, Clone)]
pub struct LoadedLyrics {
    pub document: LyricsDocument,
    pub soundtrack: Option<PathBuf>,
}

/// Fetches and parses lyrics, and keeps downloaded soundtracks in a local
/// directory so each one is transferred only once.
pub struct LyricsLoader {
    client: reqwest::Client,
    soundtrack_dir: PathBuf,
    format: LyricsFormat,
}

impl LyricsLoader {
    pub fn new(client: reqwest::Client, soundtrack_dir: PathBuf, format: LyricsFormat) -> Self {
        Self {
            client,
            soundtrack_dir,
            format,
        }
    }

    #[must_use]
    pub fn soundtrack_dir(&self) -> &Path {
        &self.soundtrack_dir
    }

    /// Load lyrics from `location`, logging and swallowing any failure.
    pub async fn load(&self, location: &str) -> Option<LoadedLyrics> {
        match self.try_load(location).await {
            Ok(loaded) => Some(loaded),
            Err(e) => {
                warn!(target: LOG_TARGET, "Lyrics unavailable: {}", e);
                None
            }
        }
    }

    /// Load lyrics from `location`.
    ///
    /// A soundtrack that cannot be obtained does not fail the load; the
    /// lyrics are returned without it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lyrics cannot be read or contain no timed
    /// lines.
    pub async fn try_load(&self, location: &str) -> Result<LoadedLyrics> {
        let lyrics_location = Location::parse(location)?;
        info!(target: LOG_TARGET, "Fetching lyrics from {}", lyrics_location);

        let text = lyrics_location.read_text(&self.client).await?;
        let document = LyricsDocument::parse_with_format(&text, self.format);
        if document.is_empty() {
            return Err(CoreError::LyricsUnavailable {
                location: lyrics_location.to_string(),
                reason: "no timed lines".into(),
            });
        }
        info!(
            target: LOG_TARGET,
            "Parsed {} lyric lines (soundtrack: {:?})",
            document.lines.len(),
            document.soundtrack
        );

        let soundtrack = match document.soundtrack.as_deref() {
            Some(name) => match self.ensure_soundtrack(&lyrics_location, name).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(target: LOG_TARGET, "Soundtrack {} unavailable: {}", name, e);
                    None
                }
            },
            None => None,
        };

        Ok(LoadedLyrics {
            document,
            soundtrack,
        })
    }

    /// Return the local copy of soundtrack `name`, downloading it from next
    /// to the lyrics file if it is not there yet.
    async fn ensure_soundtrack(&self, lyrics_location: &Location, name: &str) -> Result<PathBuf> {
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| CoreError::InvalidLocation {
                location: name.to_string(),
            })?;
        let local = self.soundtrack_dir.join(file_name);

        if tokio::fs::try_exists(&local).await? {
            info!(target: LOG_TARGET, "Soundtrack already downloaded: {}", local.display());
            return Ok(local);
        }

        let remote = lyrics_location.sibling(name)?;
        info!(target: LOG_TARGET, "Downloading soundtrack {} to {}", remote, local.display());
        remote.download_to(&self.client, &local).await?;
        Ok(local)
    }
}
