//! Where lyrics, playlists and soundtracks come from.

use crate::error::{CoreError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

/// Timeout for a whole request, including soundtrack bodies (30 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Build the HTTP client shared by the playlist source and lyrics loader.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be created.
pub fn http_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("Singalong/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// An HTTP(S) resource or a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Remote(Url),
    Local(PathBuf),
}

impl Location {
    /// Interpret `input` as an `http(s)://` URL, a `file://` URL or a plain
    /// filesystem path.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidLocation`] for a `file://` URL that does
    /// not map to a local path, or an empty input.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(invalid(input));
        }

        match Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Self::Remote(url)),
            Ok(url) if url.scheme() == "file" => {
                url.to_file_path().map(Self::Local).map_err(|()| invalid(input))
            }
            _ => Ok(Self::Local(PathBuf::from(input))),
        }
    }

    /// Resolve `relative` against the directory this location lives in.
    ///
    /// # Errors
    ///
    /// Returns an error if the joined URL is invalid.
    pub fn sibling(&self, relative: &str) -> Result<Self> {
        match self {
            Self::Remote(url) => Ok(Self::Remote(url.join(relative)?)),
            Self::Local(path) => {
                let dir = path.parent().unwrap_or_else(|| Path::new(""));
                Ok(Self::Local(dir.join(relative)))
            }
        }
    }

    /// Fetch the resource as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, a non-success HTTP status, or a
    /// file that cannot be read.
    pub async fn read_text(&self, client: &reqwest::Client) -> Result<String> {
        debug!("Reading {}", self);
        match self {
            Self::Remote(url) => {
                let response = client.get(url.clone()).send().await?.error_for_status()?;
                Ok(response.text().await?)
            }
            Self::Local(path) => Ok(tokio::fs::read_to_string(path).await?),
        }
    }

    /// Copy the resource to `dest`.
    ///
    /// Data is written to `<dest>.part` first and renamed once complete, so
    /// an interrupted transfer never leaves a truncated `dest` behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be fetched or `dest` cannot
    /// be written.
    pub async fn download_to(&self, client: &reqwest::Client, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = part_path(dest);

        let result = self.write_part(client, &part).await;
        if let Err(e) = result {
            if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                debug!("No partial file to clean up at {}: {}", part.display(), cleanup);
            }
            warn!("Download of {} failed: {}", self, e);
            return Err(e);
        }

        tokio::fs::rename(&part, dest).await?;
        Ok(())
    }

    async fn write_part(&self, client: &reqwest::Client, part: &Path) -> Result<()> {
        match self {
            Self::Remote(url) => {
                let mut response = client.get(url.clone()).send().await?.error_for_status()?;
                let mut file = tokio::fs::File::create(part).await?;
                while let Some(chunk) = response.chunk().await? {
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
            }
            Self::Local(path) => {
                tokio::fs::copy(path, part).await?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "{url}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

fn invalid(input: &str) -> CoreError {
    CoreError::InvalidLocation {
        location: input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        assert!(matches!(
            Location::parse("https://example.com/a/lyrics.md").unwrap(),
            Location::Remote(_)
        ));
        assert_eq!(
            Location::parse("songs/lyrics.md").unwrap(),
            Location::Local(PathBuf::from("songs/lyrics.md"))
        );
        assert!(Location::parse("   ").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_file_url() {
        assert_eq!(
            Location::parse("file:///tmp/lyrics.md").unwrap(),
            Location::Local(PathBuf::from("/tmp/lyrics.md"))
        );
    }

    #[test]
    fn test_sibling_of_url() {
        let base = Location::parse("https://example.com/data/playlist.json").unwrap();
        let song = base.sibling("Hey Jude/lyrics.md").unwrap();
        assert_eq!(
            song.to_string(),
            "https://example.com/data/Hey%20Jude/lyrics.md"
        );
        let track = song.sibling("song.mp3").unwrap();
        assert_eq!(track.to_string(), "https://example.com/data/Hey%20Jude/song.mp3");
    }

    #[test]
    fn test_sibling_of_path() {
        let base = Location::parse("songs/jude/lyrics.md").unwrap();
        assert_eq!(
            base.sibling("jude.mp3").unwrap(),
            Location::Local(PathBuf::from("songs/jude/jude.mp3"))
        );
        let bare = Location::parse("lyrics.md").unwrap();
        assert_eq!(
            bare.sibling("jude.mp3").unwrap(),
            Location::Local(PathBuf::from("jude.mp3"))
        );
    }

    #[tokio::test]
    async fn test_read_and_download_local() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("track.mp3");
        std::fs::write(&source, b"not really audio").unwrap();

        let client = reqwest::Client::new();
        let location = Location::Local(source);
        assert_eq!(location.read_text(&client).await.unwrap(), "not really audio");

        let dest = dir.path().join("cache").join("track.mp3");
        location.download_to(&client, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"not really audio");
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let client = reqwest::Client::new();
        let location = Location::Local(dir.path().join("missing.mp3"));
        let dest = dir.path().join("out.mp3");

        assert!(location.download_to(&client, &dest).await.is_err());
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }
}
