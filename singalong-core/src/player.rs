//! Media player collaborator.
//!
//! The core never decodes audio. It drives an external player through
//! [`MediaPlayer`] and reads the playback position back from it.
//! [`SimulatedPlayer`] stands in when no audio backend is attached: it
//! keeps a virtual playhead that advances with the tokio clock.

use crate::time::DurationExt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    #[error("no source has been set")]
    NoSource,

    #[error("player is not prepared")]
    NotPrepared,

    #[error("player has been released")]
    Released,

    #[error("player backend failed: {0}")]
    Backend(String),
}

/// Control surface the session needs from a media player.
///
/// Positions are in milliseconds from the start of the source.
pub trait MediaPlayer: Send {
    /// Replace the current source. The player must be prepared again.
    ///
    /// # Errors
    ///
    /// Returns an error if the player was released or rejects the source.
    fn set_source(&mut self, uri: &str) -> Result<(), PlayerError>;

    /// # Errors
    ///
    /// Returns an error if no source is set or the backend cannot load it.
    fn prepare(&mut self) -> Result<(), PlayerError>;

    /// # Errors
    ///
    /// Returns an error if the player is not prepared.
    fn play(&mut self) -> Result<(), PlayerError>;

    /// # Errors
    ///
    /// Returns an error if the player was released.
    fn pause(&mut self) -> Result<(), PlayerError>;

    /// Stop playback. The player must be prepared again before playing.
    ///
    /// # Errors
    ///
    /// Returns an error if the player was released.
    fn stop(&mut self) -> Result<(), PlayerError>;

    /// # Errors
    ///
    /// Returns an error if the player is not prepared.
    fn seek(&mut self, position_ms: u64) -> Result<(), PlayerError>;

    /// Free backend resources. Calling this more than once is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to shut down.
    fn release(&mut self) -> Result<(), PlayerError>;

    /// Current playhead, or `None` while nothing is prepared.
    fn current_position_ms(&self) -> Option<u64>;

    fn is_playing(&self) -> bool;

    /// Whether a source is prepared and ready to play.
    fn is_loaded(&self) -> bool;
}

/// Player without audio output whose playhead follows the tokio clock.
#[derive(Debug, Default)]
pub struct SimulatedPlayer {
    source: Option<String>,
    prepared: bool,
    released: bool,
    /// Position accumulated up to `playing_since`.
    offset: Duration,
    playing_since: Option<Instant>,
    /// Playback stops by itself once the playhead reaches this.
    duration: Option<Duration>,
}

impl SimulatedPlayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the simulated track end after `duration`.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn set_duration(&mut self, duration: Option<Duration>) {
        self.duration = duration;
    }

    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }

    fn position(&self) -> Duration {
        let position = self
            .playing_since
            .map_or(self.offset, |since| self.offset + since.elapsed());
        self.duration.map_or(position, |end| position.min(end))
    }

    fn reached_end(&self) -> bool {
        self.duration.is_some_and(|end| self.position() >= end)
    }

    fn ensure_alive(&self) -> Result<(), PlayerError> {
        if self.released {
            Err(PlayerError::Released)
        } else {
            Ok(())
        }
    }

    fn ensure_prepared(&self) -> Result<(), PlayerError> {
        self.ensure_alive()?;
        if self.prepared {
            Ok(())
        } else {
            Err(PlayerError::NotPrepared)
        }
    }

    fn freeze(&mut self) {
        self.offset = self.position();
        self.playing_since = None;
    }
}

impl MediaPlayer for SimulatedPlayer {
    fn set_source(&mut self, uri: &str) -> Result<(), PlayerError> {
        self.ensure_alive()?;
        self.source = Some(uri.to_string());
        self.prepared = false;
        self.offset = Duration::ZERO;
        self.playing_since = None;
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), PlayerError> {
        self.ensure_alive()?;
        if self.source.is_none() {
            return Err(PlayerError::NoSource);
        }
        self.prepared = true;
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.ensure_prepared()?;
        if self.playing_since.is_none() {
            self.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        self.ensure_alive()?;
        self.freeze();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        self.ensure_alive()?;
        self.playing_since = None;
        self.offset = Duration::ZERO;
        self.prepared = false;
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Result<(), PlayerError> {
        self.ensure_prepared()?;
        let target = Duration::from_millis(position_ms);
        self.offset = self.duration.map_or(target, |end| target.min(end));
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), PlayerError> {
        if self.released {
            return Ok(());
        }
        self.playing_since = None;
        self.prepared = false;
        self.source = None;
        self.released = true;
        Ok(())
    }

    fn current_position_ms(&self) -> Option<u64> {
        (self.prepared && !self.released).then(|| self.position().as_millis_u64())
    }

    fn is_playing(&self) -> bool {
        self.playing_since.is_some() && !self.reached_end()
    }

    fn is_loaded(&self) -> bool {
        self.prepared && !self.released
    }
}
