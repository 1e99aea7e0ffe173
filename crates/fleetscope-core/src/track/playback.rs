//! Track playback
//!
//! Cooperative, single-timer state machine that steps through a track.
//!
//! The scheduler never sleeps itself. It records which tick it expects next
//! ([`ArmedTick`]) and the owner of the real timer calls
//! [`PlaybackScheduler::on_tick`] with that tick's generation once the period
//! has elapsed. Every state change that cancels or re-arms the timer bumps the
//! generation, so at most one tick is ever live.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::TrackPoint;

/// Errors raised by the playback scheduler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Unsupported playback speed: x{0}")]
    UnsupportedSpeed(u32),

    #[error("Stale playback tick {got} (armed: {armed:?})")]
    StaleTick { got: u64, armed: Option<u64> },
}

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

/// The single pending timer tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTick {
    /// Identifies this arming; older generations are stale
    pub generation: u64,
    /// Delay until the tick should fire
    pub period: Duration,
}

/// Result of a delivered tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Moved to the given index and re-armed
    Advanced(usize),
    /// Reached the end of the track and stopped
    Finished(usize),
}

/// What the renderer needs to draw the playback marker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackFrame {
    pub index: usize,
    pub len: usize,
    pub point: TrackPoint,
    pub state: PlayState,
    pub speed: u32,
    /// Fraction of the track already played, 0.0 to 1.0
    pub progress: f64,
}

/// Track player with play/pause/scrub and variable speed
pub struct PlaybackScheduler {
    /// Loaded track
    track: Vec<TrackPoint>,
    /// Current playback position
    index: usize,
    state: PlayState,
    /// Active speed multiplier
    speed: u32,
    /// Tick period at x1
    base_interval: Duration,
    /// Allowed speed multipliers
    speeds: Vec<u32>,
    timer: Option<ArmedTick>,
    next_generation: u64,
}

impl PlaybackScheduler {
    /// Create a scheduler; the first allowed multiplier becomes the initial speed
    pub fn new(base_interval: Duration, speeds: Vec<u32>) -> Self {
        let speed = speeds.first().copied().unwrap_or(1);
        Self {
            track: Vec::new(),
            index: 0,
            state: PlayState::Stopped,
            speed,
            base_interval,
            speeds,
            timer: None,
            next_generation: 0,
        }
    }

    /// Replace the track; resets to the first point and stops
    pub fn load(&mut self, track: Vec<TrackPoint>) {
        self.disarm();
        self.track = track;
        self.index = 0;
        self.state = PlayState::Stopped;
    }

    /// Drop the track and cancel any pending tick
    pub fn teardown(&mut self) {
        self.load(Vec::new());
    }

    /// Get the number of points
    pub fn len(&self) -> usize {
        self.track.len()
    }

    /// Check if no track is loaded
    pub fn is_empty(&self) -> bool {
        self.track.is_empty()
    }

    /// Get the loaded track
    pub fn track(&self) -> &[TrackPoint] {
        &self.track
    }

    /// Get the current position
    pub fn index(&self) -> usize {
        self.index
    }

    /// Get the play state
    pub fn state(&self) -> PlayState {
        self.state
    }

    /// Get the active speed multiplier
    pub fn speed(&self) -> u32 {
        self.speed
    }

    /// Tick period at the active speed
    pub fn period(&self) -> Duration {
        self.base_interval / self.speed.max(1)
    }

    /// The pending tick, if the timer is armed
    pub fn armed(&self) -> Option<ArmedTick> {
        self.timer
    }

    /// Get the current point
    pub fn current(&self) -> Option<&TrackPoint> {
        self.track.get(self.index)
    }

    /// Snapshot of the current playback position for rendering
    pub fn frame(&self) -> Option<PlaybackFrame> {
        let point = self.current()?.clone();
        let last = self.len().saturating_sub(1);
        let progress = if last == 0 {
            1.0
        } else {
            self.index as f64 / last as f64
        };

        Some(PlaybackFrame {
            index: self.index,
            len: self.len(),
            point,
            state: self.state,
            speed: self.speed,
            progress,
        })
    }

    /// Start or resume playback
    ///
    /// Starting from a stopped player parked on the last point rewinds to the
    /// beginning. Returns `false` if nothing changed.
    pub fn play(&mut self) -> bool {
        if self.is_empty() || self.state == PlayState::Playing {
            return false;
        }
        if self.state == PlayState::Stopped && self.index + 1 >= self.len() && self.len() > 1 {
            self.index = 0;
        }
        self.state = PlayState::Playing;
        self.arm();
        true
    }

    /// Pause playback, cancelling the pending tick
    pub fn pause(&mut self) -> bool {
        if self.state != PlayState::Playing {
            return false;
        }
        self.state = PlayState::Paused;
        self.disarm();
        true
    }

    /// Jump to a point, clamped to the track; play state is unchanged
    pub fn scrub(&mut self, index: usize) -> usize {
        self.index = index.min(self.len().saturating_sub(1));
        self.index
    }

    /// Change the speed multiplier
    ///
    /// While playing, the pending tick is cancelled and re-armed at the new
    /// period.
    pub fn set_speed(&mut self, multiplier: u32) -> Result<(), PlaybackError> {
        if multiplier == 0 || !self.speeds.contains(&multiplier) {
            return Err(PlaybackError::UnsupportedSpeed(multiplier));
        }
        if multiplier == self.speed {
            return Ok(());
        }
        self.speed = multiplier;
        if self.state == PlayState::Playing {
            self.arm();
        }
        Ok(())
    }

    /// Deliver a timer tick
    ///
    /// A generation other than the armed one means a cancelled timer fired
    /// anyway, which is a defect in the timer owner.
    pub fn on_tick(&mut self, generation: u64) -> Result<TickOutcome, PlaybackError> {
        let armed = self.timer.map(|t| t.generation);
        if armed != Some(generation) || self.state != PlayState::Playing {
            return Err(PlaybackError::StaleTick {
                got: generation,
                armed,
            });
        }

        if self.index + 1 < self.len() {
            self.index += 1;
            self.arm();
            Ok(TickOutcome::Advanced(self.index))
        } else {
            self.state = PlayState::Stopped;
            self.disarm();
            Ok(TickOutcome::Finished(self.index))
        }
    }

    fn arm(&mut self) {
        self.next_generation += 1;
        self.timer = Some(ArmedTick {
            generation: self.next_generation,
            period: self.period(),
        });
    }

    fn disarm(&mut self) {
        self.timer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Position;
    use chrono::{TimeZone, Utc};

    fn track(len: usize) -> Vec<TrackPoint> {
        (0..len)
            .map(|i| TrackPoint {
                position: Position::new(i as f64, i as f64),
                speed_kmph: 0.0,
                address: String::new(),
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 30, 0).unwrap(),
            })
            .collect()
    }

    fn make_test_player(len: usize) -> PlaybackScheduler {
        let mut player = PlaybackScheduler::new(Duration::from_millis(400), vec![2, 4, 8]);
        player.load(track(len));
        player
    }

    /// Deliver ticks until the timer disarms, returning simulated elapsed time
    fn run_to_end(player: &mut PlaybackScheduler) -> Duration {
        let mut elapsed = Duration::ZERO;
        while let Some(tick) = player.armed() {
            elapsed += tick.period;
            player.on_tick(tick.generation).unwrap();
        }
        elapsed
    }

    #[test]
    fn test_ten_points_at_x4_take_one_second() {
        let mut player = make_test_player(10);
        player.set_speed(4).unwrap();
        assert!(player.play());

        assert_eq!(run_to_end(&mut player), Duration::from_millis(1000));
        assert_eq!(player.index(), 9);
        assert_eq!(player.state(), PlayState::Stopped);
        assert!(player.armed().is_none());
    }

    #[test]
    fn test_play_on_empty_track_is_noop() {
        let mut player = make_test_player(0);
        assert!(!player.play());
        assert_eq!(player.state(), PlayState::Stopped);
        assert!(player.armed().is_none());
        assert!(player.frame().is_none());
    }

    #[test]
    fn test_pause_cancels_pending_tick() {
        let mut player = make_test_player(5);
        player.play();
        let tick = player.armed().unwrap();

        assert!(player.pause());
        assert_eq!(player.state(), PlayState::Paused);
        assert!(player.armed().is_none());
        assert!(matches!(
            player.on_tick(tick.generation),
            Err(PlaybackError::StaleTick { armed: None, .. })
        ));
        assert_eq!(player.index(), 0);

        assert!(player.play());
        let tick = player.armed().unwrap();
        assert_eq!(player.on_tick(tick.generation), Ok(TickOutcome::Advanced(1)));
    }

    #[test]
    fn test_speed_change_rearms_once() {
        let mut player = make_test_player(5);
        player.play();
        let old = player.armed().unwrap();
        assert_eq!(old.period, Duration::from_millis(200));

        player.set_speed(8).unwrap();
        let new = player.armed().unwrap();
        assert_ne!(old.generation, new.generation);
        assert_eq!(new.period, Duration::from_millis(50));

        // the cancelled tick must not step the index
        assert!(player.on_tick(old.generation).is_err());
        assert_eq!(player.index(), 0);
        assert_eq!(player.on_tick(new.generation), Ok(TickOutcome::Advanced(1)));
        assert!(player.on_tick(new.generation).is_err());
    }

    #[test]
    fn test_unsupported_speed() {
        let mut player = make_test_player(3);
        assert_eq!(player.set_speed(3), Err(PlaybackError::UnsupportedSpeed(3)));
        assert_eq!(player.set_speed(0), Err(PlaybackError::UnsupportedSpeed(0)));
        assert_eq!(player.speed(), 2);
    }

    #[test]
    fn test_scrub_clamps_and_keeps_state() {
        let mut player = make_test_player(5);
        assert_eq!(player.scrub(99), 4);
        assert_eq!(player.state(), PlayState::Stopped);

        player.scrub(1);
        player.play();
        let armed = player.armed();
        assert_eq!(player.scrub(3), 3);
        assert_eq!(player.state(), PlayState::Playing);
        assert_eq!(player.armed(), armed);
    }

    #[test]
    fn test_play_at_end_rewinds() {
        let mut player = make_test_player(3);
        player.play();
        run_to_end(&mut player);
        assert_eq!(player.index(), 2);

        assert!(player.play());
        assert_eq!(player.index(), 0);
    }

    #[test]
    fn test_load_resets_and_disarms() {
        let mut player = make_test_player(5);
        player.play();
        let tick = player.armed().unwrap();
        player.on_tick(tick.generation).unwrap();

        player.load(track(2));
        assert_eq!(player.index(), 0);
        assert_eq!(player.state(), PlayState::Stopped);
        assert!(player.armed().is_none());
    }

    #[test]
    fn test_teardown_cancels_timer() {
        let mut player = make_test_player(5);
        player.play();
        player.teardown();
        assert!(player.armed().is_none());
        assert!(player.is_empty());
    }

    #[test]
    fn test_frame_progress() {
        let mut player = make_test_player(5);
        player.scrub(2);
        let frame = player.frame().unwrap();
        assert_eq!(frame.index, 2);
        assert_eq!(frame.len, 5);
        assert_eq!(frame.progress, 0.5);
        assert_eq!(frame.point.position, Position::new(2.0, 2.0));
    }
}
