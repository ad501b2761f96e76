//! Line-by-line playback for when no playback clock is available.
//!
//! Lines are shown strictly in document order, each for the gap to the
//! next line's timestamp. Holds are capped, and whatever time a capped hold
//! leaves before the next line (plus any silence before the first line)
//! becomes an explicit pause.

use crate::error::{CoreError, Result};
use crate::lyrics::LyricsDocument;
use crate::sync::{RevealScope, SyncEngine, SyncPhase, SyncState};
use crate::time::seconds_to_duration;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const DEFAULT_LAST_LINE_HOLD_SECS: f64 = 3.0;
pub const DEFAULT_MAX_LINE_HOLD_SECS: f64 = 10.0;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanStep {
    /// Show the pause indicator before `next_line_index`.
    Pause {
        next_line_index: usize,
        duration: Duration,
    },
    /// Show line `index`, revealing it over `duration`.
    Line { index: usize, duration: Duration },
}

/// Ordered display schedule for a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixedDelayPlan {
    steps: Vec<PlanStep>,
}

impl FixedDelayPlan {
    /// Build the schedule for `document`.
    ///
    /// * `last_line_hold` - seconds the final line stays on screen
    /// * `max_line_hold` - upper bound on any single line's display time
    #[must_use]
    pub fn build(document: &LyricsDocument, last_line_hold: f64, max_line_hold: f64) -> Self {
        let mut steps = Vec::with_capacity(document.lines.len() * 2);
        let mut cursor = 0.0_f64;

        for (index, line) in document.lines.iter().enumerate() {
            let gap = line.start - cursor;
            if gap > 0.0 {
                steps.push(PlanStep::Pause {
                    next_line_index: index,
                    duration: seconds_to_duration(gap),
                });
            }

            let natural = document
                .lines
                .get(index + 1)
                .map_or(last_line_hold, |next| next.start - line.start);
            let hold = natural.min(max_line_hold).max(0.0);

            steps.push(PlanStep::Line {
                index,
                duration: seconds_to_duration(hold),
            });
            cursor = line.start + hold;
        }

        Self { steps }
    }

    #[must_use]
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.steps
            .iter()
            .map(|step| match step {
                PlanStep::Pause { duration, .. } | PlanStep::Line { duration, .. } => *duration,
            })
            .sum()
    }
}

/// How a driver run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOutcome {
    /// Every step was shown and completion was signalled.
    Finished,
    Cancelled,
}

/// Walks a [`FixedDelayPlan`], publishing frame-by-frame states to the
/// [`SyncEngine`] and signalling completion after the last line.
pub struct FixedDelayDriver {
    sync_engine: Arc<SyncEngine>,
    document: Arc<LyricsDocument>,
    plan: FixedDelayPlan,
    frame_interval: Duration,
    cancel_token: CancellationToken,
}

impl FixedDelayDriver {
    pub fn new(
        sync_engine: Arc<SyncEngine>,
        document: Arc<LyricsDocument>,
        plan: FixedDelayPlan,
        frame_interval_ms: u64,
        cancel_token: Option<CancellationToken>,
    ) -> Self {
        Self {
            sync_engine,
            document,
            plan,
            frame_interval: Duration::from_millis(frame_interval_ms.max(1)),
            cancel_token: cancel_token.unwrap_or_default(),
        }
    }

    /// Play every step of the plan.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PlanMismatch`] if the plan was built for a
    /// different document.
    pub async fn run(&self) -> Result<DriverOutcome> {
        self.validate()?;
        info!(
            "Fixed-delay playback started ({} steps, {:?} total)",
            self.plan.steps().len(),
            self.plan.total_duration()
        );

        let mut cursor = 0.0_f64;
        for step in self.plan.steps() {
            let outcome = match *step {
                PlanStep::Pause {
                    next_line_index,
                    duration,
                } => {
                    self.sync_engine
                        .apply_state(SyncState {
                            clock_seconds: cursor,
                            phase: SyncPhase::Paused { next_line_index },
                        })
                        .await;
                    let outcome = self.wait(duration).await;
                    cursor += duration.as_secs_f64();
                    outcome
                }
                PlanStep::Line { index, duration } => {
                    let start = self
                        .document
                        .lines
                        .get(index)
                        .map_or(cursor, |line| line.start);
                    let outcome = self.reveal_line(index, start, duration).await;
                    cursor = start + duration.as_secs_f64();
                    outcome
                }
            };

            if outcome == DriverOutcome::Cancelled {
                info!("Fixed-delay playback cancelled");
                return Ok(DriverOutcome::Cancelled);
            }
        }

        self.sync_engine.finish().await;
        Ok(DriverOutcome::Finished)
    }

    fn validate(&self) -> Result<()> {
        let line_count = self.document.lines.len();
        for step in self.plan.steps() {
            let index = match *step {
                PlanStep::Pause {
                    next_line_index, ..
                } => next_line_index,
                PlanStep::Line { index, .. } => index,
            };
            if index >= line_count {
                return Err(CoreError::PlanMismatch { index, line_count });
            }
        }
        Ok(())
    }

    async fn reveal_line(&self, index: usize, start: f64, duration: Duration) -> DriverOutcome {
        let began = Instant::now();

        loop {
            let elapsed = began.elapsed().min(duration);
            let progress = if duration.is_zero() {
                1.0
            } else {
                elapsed.as_secs_f64() / duration.as_secs_f64()
            };
            let clock = start + elapsed.as_secs_f64();
            let segment_index = self
                .document
                .lines
                .get(index)
                .and_then(|line| line.segment_index_at(clock))
                .unwrap_or(0);

            self.sync_engine
                .apply_state(SyncState {
                    clock_seconds: clock,
                    phase: SyncPhase::ActiveLine {
                        line_index: index,
                        segment_index,
                        progress,
                        scope: RevealScope::Line,
                    },
                })
                .await;

            if elapsed >= duration {
                return DriverOutcome::Finished;
            }
            if self.wait(self.frame_interval.min(duration - elapsed)).await
                == DriverOutcome::Cancelled
            {
                return DriverOutcome::Cancelled;
            }
        }
    }

    async fn wait(&self, duration: Duration) -> DriverOutcome {
        tokio::select! {
            () = self.cancel_token.cancelled() => DriverOutcome::Cancelled,
            () = tokio::time::sleep(duration) => DriverOutcome::Finished,
        }
    }
}
