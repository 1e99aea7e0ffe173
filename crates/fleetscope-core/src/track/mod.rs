//! Trip History
//!
//! Normalizes historical position records into ordered tracks and replays
//! them at variable speed.

mod normalizer;
mod playback;

pub use normalizer::{history_records, TrackNormalizer};
pub use playback::{
    ArmedTick, PlayState, PlaybackError, PlaybackFrame, PlaybackScheduler, TickOutcome,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Position;

/// One historical position sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    /// Sampled position
    pub position: Position,
    /// Speed in km/h at the sample
    pub speed_kmph: f64,
    /// Reverse-geocoded address, empty if the provider had none
    pub address: String,
    /// Sample instant
    pub timestamp: DateTime<Utc>,
}

/// Requested history window, in milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRange {
    pub from_ms: i64,
    pub to_ms: i64,
}

impl HistoryRange {
    /// Create a range, returning `None` if `from_ms` is after `to_ms`
    pub fn new(from_ms: i64, to_ms: i64) -> Option<Self> {
        (from_ms <= to_ms).then_some(Self { from_ms, to_ms })
    }

    /// Length of the window in milliseconds, saturating at `i64::MAX`
    pub fn span_ms(&self) -> i64 {
        self.to_ms.saturating_sub(self.from_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_rejects_reversed_bounds() {
        assert!(HistoryRange::new(10, 5).is_none());
        assert_eq!(HistoryRange::new(5, 5).map(|r| r.span_ms()), Some(0));
    }

    #[test]
    fn test_extreme_range_span_saturates() {
        let range = HistoryRange::new(i64::MIN, i64::MAX).unwrap();
        assert_eq!(range.span_ms(), i64::MAX);
        assert_eq!(HistoryRange::new(i64::MIN, 0).unwrap().span_ms(), i64::MAX);
    }
}
