//! Song catalog: cached playlist, then the network, then a built-in list.

use crate::error::{CoreError, Result};
use crate::location::Location;
use crate::store::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const LOG_TARGET: &str = "singalong::playlist";

/// Store key holding the last playlist fetched from the network.
pub const CACHED_PLAYLIST_KEY: &str = "cached_playlist";

/// Where the playlist is published by default.
pub const DEFAULT_PLAYLIST_URL: &str =
    "https://gcpa-enssat-24-25.s3.eu-west-3.amazonaws.com/playlist.json";

/// One playlist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongEntry {
    pub name: String,
    pub artist: String,
    /// Locked songs are listed but cannot be played.
    #[serde(default)]
    pub locked: bool,
    /// Lyrics file, relative to the playlist location or absolute.
    #[serde(default)]
    pub path: Option<String>,
}

impl SongEntry {
    #[must_use]
    pub fn is_playable(&self) -> bool {
        !self.locked && self.path.is_some()
    }
}

/// Songs listed when neither the cache nor the network has a playlist.
#[must_use]
pub fn default_local_songs() -> Vec<SongEntry> {
    [
        ("Hey Jude", "The Beatles"),
        ("Bohemian Rhapsody", "Queen"),
        ("Sweet Child O' Mine", "Guns N' Roses"),
    ]
    .into_iter()
    .map(|(name, artist)| SongEntry {
        name: name.to_string(),
        artist: artist.to_string(),
        locked: true,
        path: None,
    })
    .collect()
}

pub struct PlaylistSource {
    client: reqwest::Client,
    playlist_url: String,
    store: Option<Arc<dyn KeyValueStore>>,
    local_songs: Vec<SongEntry>,
}

impl PlaylistSource {
    /// Create a playlist source
    ///
    /// # Arguments
    /// * `client` - HTTP client for the playlist download
    /// * `playlist_url` - URL or path of the playlist JSON
    /// * `store` - Cache for the downloaded playlist; `None` disables caching
    /// * `local_songs` - Fallback list when no playlist can be obtained
    pub fn new(
        client: reqwest::Client,
        playlist_url: impl Into<String>,
        store: Option<Arc<dyn KeyValueStore>>,
        local_songs: Vec<SongEntry>,
    ) -> Self {
        Self {
            client,
            playlist_url: playlist_url.into(),
            store,
            local_songs,
        }
    }

    /// The cached playlist if there is one, otherwise the network playlist,
    /// otherwise the local list.
    pub async fn fetch_songs(&self) -> Vec<SongEntry> {
        if let Some(cached) = self.cached_songs().await
            && !cached.is_empty()
        {
            info!(target: LOG_TARGET, "Using cached playlist ({} songs)", cached.len());
            return cached;
        }
        self.network_or_local().await
    }

    /// Bypass the cache and fetch the playlist again.
    pub async fn refresh(&self) -> Vec<SongEntry> {
        self.network_or_local().await
    }

    /// Download the playlist, keep entries that have a lyrics path and
    /// cache them. Any failure yields an empty list.
    pub async fn fetch_from_network(&self) -> Vec<SongEntry> {
        let songs = match self.download().await {
            Ok(songs) => songs,
            Err(e) => {
                warn!(target: LOG_TARGET, "Playlist download failed: {}", e);
                return Vec::new();
            }
        };

        let songs: Vec<SongEntry> = songs.into_iter().filter(|s| s.path.is_some()).collect();
        info!(target: LOG_TARGET, "Fetched playlist ({} songs)", songs.len());

        if let Some(store) = &self.store {
            match serde_json::to_string(&songs) {
                Ok(json) => {
                    if let Err(e) = store.put_string(CACHED_PLAYLIST_KEY, &json).await {
                        warn!(target: LOG_TARGET, "Failed to cache playlist: {}", e);
                    }
                }
                Err(e) => warn!(target: LOG_TARGET, "Failed to serialize playlist: {}", e),
            }
        }

        songs
    }

    /// Find a song by name, ignoring case.
    pub async fn find(&self, name: &str) -> Option<SongEntry> {
        self.fetch_songs()
            .await
            .into_iter()
            .find(|song| song.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Where the lyrics of `song` live.
    ///
    /// # Errors
    ///
    /// Returns an error if the song has no path, or the path cannot be
    /// resolved against the playlist location.
    pub fn lyrics_location(&self, song: &SongEntry) -> Result<Location> {
        let path = song.path.as_deref().ok_or_else(|| CoreError::LyricsUnavailable {
            location: song.name.clone(),
            reason: "song has no lyrics path".into(),
        })?;

        match Location::parse(path)? {
            remote @ Location::Remote(_) => Ok(remote),
            Location::Local(local) if local.is_absolute() => Ok(Location::Local(local)),
            Location::Local(_) => Location::parse(&self.playlist_url)?.sibling(path),
        }
    }

    async fn network_or_local(&self) -> Vec<SongEntry> {
        let songs = self.fetch_from_network().await;
        if songs.is_empty() {
            info!(target: LOG_TARGET, "Falling back to local playlist");
            return self.local_songs.clone();
        }
        songs
    }

    async fn cached_songs(&self) -> Option<Vec<SongEntry>> {
        let store = self.store.as_ref()?;
        let json = match store.get_string(CACHED_PLAYLIST_KEY).await {
            Ok(json) => json?,
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to read cached playlist: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&json) {
            Ok(songs) => Some(songs),
            Err(e) => {
                warn!(target: LOG_TARGET, "Ignoring unreadable cached playlist: {}", e);
                None
            }
        }
    }

    async fn download(&self) -> Result<Vec<SongEntry>> {
        let location = Location::parse(&self.playlist_url)?;
        let json = location.read_text(&self.client).await?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const PLAYLIST_JSON: &str = r#"[
        {"name": "Hey Jude", "artist": "The Beatles", "path": "HeyJude/lyrics.md"},
        {"name": "Untimed", "artist": "Nobody"},
        {"name": "Locked", "artist": "Someone", "locked": true, "path": "Locked/lyrics.md"}
    ]"#;

    fn source(url: &str, store: Option<Arc<dyn KeyValueStore>>) -> PlaylistSource {
        PlaylistSource::new(reqwest::Client::new(), url, store, default_local_songs())
    }

    #[tokio::test]
    async fn test_network_playlist_is_filtered_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let playlist = dir.path().join("playlist.json");
        std::fs::write(&playlist, PLAYLIST_JSON).unwrap();

        let store = Arc::new(MemoryStore::new());
        let source = source(playlist.to_str().unwrap(), Some(store.clone()));

        let songs = source.fetch_songs().await;
        let names: Vec<_> = songs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Hey Jude", "Locked"]);
        assert!(songs[0].is_playable());
        assert!(!songs[1].is_playable());

        let cached = store.get_string(CACHED_PLAYLIST_KEY).await.unwrap().unwrap();
        let cached: Vec<SongEntry> = serde_json::from_str(&cached).unwrap();
        assert_eq!(cached, songs);
    }

    #[tokio::test]
    async fn test_cached_playlist_wins() {
        let store = Arc::new(MemoryStore::new());
        let cached = vec![SongEntry {
            name: "Cached".into(),
            artist: "Artist".into(),
            locked: false,
            path: Some("cached.md".into()),
        }];
        store
            .put_string(CACHED_PLAYLIST_KEY, &serde_json::to_string(&cached).unwrap())
            .await
            .unwrap();

        let source = source("/definitely/not/here/playlist.json", Some(store));
        assert_eq!(source.fetch_songs().await, cached);
    }

    #[tokio::test]
    async fn test_unreachable_playlist_falls_back_to_local_songs() {
        let source = source("/definitely/not/here/playlist.json", None);
        assert!(source.fetch_from_network().await.is_empty());
        assert_eq!(source.fetch_songs().await, default_local_songs());
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        store.put_string(CACHED_PLAYLIST_KEY, "not json").await.unwrap();
        let source = source("/definitely/not/here/playlist.json", Some(store));
        assert_eq!(source.fetch_songs().await, default_local_songs());
    }

    #[tokio::test]
    async fn test_find_ignores_case() {
        let source = source("/definitely/not/here/playlist.json", None);
        let song = source.find("  bohemian rhapsody ").await.unwrap();
        assert_eq!(song.artist, "Queen");
        assert!(source.find("Unknown Song").await.is_none());
    }

    #[test]
    fn test_lyrics_location_resolution() {
        let source = source("https://example.com/karaoke/playlist.json", None);
        let mut song = SongEntry {
            name: "Hey Jude".into(),
            artist: "The Beatles".into(),
            locked: false,
            path: Some("HeyJude/lyrics.md".into()),
        };
        assert_eq!(
            source.lyrics_location(&song).unwrap().to_string(),
            "https://example.com/karaoke/HeyJude/lyrics.md"
        );

        song.path = Some("https://cdn.example.com/jude.md".into());
        assert_eq!(
            source.lyrics_location(&song).unwrap().to_string(),
            "https://cdn.example.com/jude.md"
        );

        song.path = None;
        assert!(source.lyrics_location(&song).is_err());
    }
}
