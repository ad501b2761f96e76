//! Periodic sampling of the player position.

use crate::player::MediaPlayer;
use crate::sync::SyncEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default sampling interval, about one frame at 60 Hz.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 16;

/// Granularity of the clock derived from the player position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockResolution {
    /// Whole seconds.
    Seconds,
    /// Tenths of a second.
    #[default]
    Tenths,
}

/// Convert a player position to clock seconds, truncating to `resolution`.
#[must_use]
pub fn clock_from_millis(position_ms: u64, resolution: ClockResolution) -> f64 {
    let (unit_ms, units_per_second) = match resolution {
        ClockResolution::Seconds => (1000, 1.0),
        ClockResolution::Tenths => (100, 10.0),
    };
    let units = u32::try_from(position_ms / unit_ms).unwrap_or(u32::MAX);
    f64::from(units) / units_per_second
}

/// Samples a player every `poll_interval` and feeds the clock to the
/// [`SyncEngine`] until cancelled.
pub struct PositionTracker<P> {
    player: Arc<Mutex<P>>,
    sync_engine: Arc<SyncEngine>,
    poll_interval: Duration,
    resolution: ClockResolution,
    cancel_token: CancellationToken,
}

impl<P: MediaPlayer + 'static> PositionTracker<P> {
    /// Create a new tracker
    ///
    /// # Arguments
    /// * `player` - Player shared with the owning session
    /// * `sync_engine` - Sync engine receiving the clock
    /// * `poll_interval_ms` - Sampling interval in milliseconds
    /// * `resolution` - Clock granularity
    /// * `cancel_token` - Optional external cancellation token
    pub fn new(
        player: Arc<Mutex<P>>,
        sync_engine: Arc<SyncEngine>,
        poll_interval_ms: u64,
        resolution: ClockResolution,
        cancel_token: Option<CancellationToken>,
    ) -> Self {
        Self {
            player,
            sync_engine,
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
            resolution,
            cancel_token: cancel_token.unwrap_or_default(),
        }
    }

    /// Start sampling in a background task
    #[must_use]
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Sample until the cancellation token fires.
    pub async fn run(&self) {
        info!(
            "Position tracker started (interval: {}ms, resolution: {:?})",
            self.poll_interval.as_millis(),
            self.resolution
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!("Position tracker shutting down gracefully");
                    break;
                }
                () = tokio::time::sleep(self.poll_interval) => {
                    let clock = self.poll_once().await;
                    debug!(clock, "Position sampled");
                }
            }
        }
    }

    /// Take one sample, publish it and return the clock value.
    pub async fn poll_once(&self) -> f64 {
        let position_ms = self.player.lock().await.current_position_ms().unwrap_or(0);
        let clock = clock_from_millis(position_ms, self.resolution);
        self.sync_engine.update_clock(clock).await;
        clock
    }

    /// Stop the tracker loop.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::SimulatedPlayer;

    fn playing_player() -> Arc<Mutex<SimulatedPlayer>> {
        let mut player = SimulatedPlayer::new();
        player.set_source("memory://song.mp3").unwrap();
        player.prepare().unwrap();
        player.play().unwrap();
        Arc::new(Mutex::new(player))
    }

    #[test]
    fn test_clock_from_millis() {
        assert!((clock_from_millis(1234, ClockResolution::Tenths) - 1.2).abs() < 1e-9);
        assert!((clock_from_millis(1999, ClockResolution::Seconds) - 1.0).abs() < 1e-9);
        assert!(clock_from_millis(99, ClockResolution::Tenths).abs() < 1e-9);
        assert!(clock_from_millis(0, ClockResolution::Seconds).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unprepared_player_reads_as_zero() {
        let player = Arc::new(Mutex::new(SimulatedPlayer::new()));
        let tracker = PositionTracker::new(player, SyncEngine::new(), 16, ClockResolution::Tenths, None);
        assert!(tracker.poll_once().await.abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_feeds_engine_until_cancelled() {
        let engine = SyncEngine::new();
        let cancel_token = CancellationToken::new();
        let tracker = Arc::new(PositionTracker::new(
            playing_player(),
            engine.clone(),
            DEFAULT_POLL_INTERVAL_MS,
            ClockResolution::Tenths,
            Some(cancel_token.clone()),
        ));
        let handle = tracker.start();

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let clock = engine.clock().await;
        assert!((0.8..=1.0).contains(&clock), "clock was {clock}");

        cancel_token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        let frozen = engine.clock().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!((engine.clock().await - frozen).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_loop() {
        let tracker = Arc::new(PositionTracker::new(
            playing_player(),
            SyncEngine::new(),
            16,
            ClockResolution::Seconds,
            None,
        ));
        let handle = tracker.clone().start();
        tracker.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
