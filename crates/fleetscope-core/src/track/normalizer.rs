//! History normalization
//!
//! Builds an ordered, deduplicated track from raw provider history records.
//! Records without a usable position or timestamp are dropped; the batch is
//! never rejected as a whole.

use std::collections::HashSet;

use serde_json::Value;

use super::TrackPoint;
use crate::telemetry::fields::{first_instant, first_number, first_position, first_text, FieldAliases};

/// Top-level payload keys that may carry history records, checked in order
pub const HISTORY_KEYS: [&str; 3] = ["vehicleLocations", "data", "track"];

/// Extract the record list from a history payload
pub fn history_records(payload: &Value) -> Option<&[Value]> {
    match payload {
        Value::Array(records) => Some(records),
        Value::Object(map) => HISTORY_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice),
        _ => None,
    }
}

/// Converts raw history records into a [`TrackPoint`] sequence
#[derive(Debug, Clone, Default)]
pub struct TrackNormalizer {
    aliases: FieldAliases,
}

impl TrackNormalizer {
    /// Create a track normalizer using the given alias lists
    pub fn new(aliases: FieldAliases) -> Self {
        Self { aliases }
    }

    /// Build a track sorted by timestamp; equal timestamps keep input order
    pub fn build(&self, raw_history: &[Value]) -> Vec<TrackPoint> {
        let mut seen = HashSet::new();
        let mut points: Vec<TrackPoint> = raw_history
            .iter()
            .filter_map(|raw| self.point(raw))
            .filter(|p| {
                seen.insert((
                    p.timestamp.timestamp_millis(),
                    p.position.lat.to_bits(),
                    p.position.lng.to_bits(),
                ))
            })
            .collect();

        // sort_by_key is stable
        points.sort_by_key(|p| p.timestamp);

        let dropped = raw_history.len() - points.len();
        if dropped > 0 {
            tracing::debug!(dropped, kept = points.len(), "dropped history records");
        }
        points
    }

    fn point(&self, raw: &Value) -> Option<TrackPoint> {
        let raw = raw.as_object()?;
        let aliases = &self.aliases;

        let position = first_position(raw, &aliases.coordinates)?;
        let timestamp = first_instant(raw, &aliases.timestamp)?;

        Some(TrackPoint {
            position,
            speed_kmph: first_number(raw, &aliases.speed).unwrap_or(0.0),
            address: first_text(raw, &aliases.address).unwrap_or_default(),
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_build_sorts_and_drops() {
        let raw = vec![
            json!({"lat": 3.0, "lng": 3.0, "timestamp": 1_700_000_300}),
            json!({"lat": 1.0, "lng": 1.0, "timestamp": 1_700_000_100_000i64}),
            json!({"lat": 9.0, "timestamp": 1_700_000_200}),
            json!({"lat": 2.0, "lng": 2.0, "timestamp": "2023-11-14T22:16:40Z"}),
            json!({"lat": 4.0, "lng": 4.0}),
        ];
        let track = TrackNormalizer::default().build(&raw);

        let lats: Vec<f64> = track.iter().map(|p| p.position.lat).collect();
        assert_eq!(lats, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let raw = vec![
            json!({"lat": 5.0, "lng": 0.0, "time": 1_700_000_500}),
            json!({"lat": 1.0, "lng": 0.0, "time": 1_700_000_000}),
            json!({"lat": 2.0, "lng": 0.0, "time": 1_700_000_000}),
            json!({"lat": 3.0, "lng": 0.0, "time": 1_700_000_000}),
        ];
        let track = TrackNormalizer::default().build(&raw);

        let lats: Vec<f64> = track.iter().map(|p| p.position.lat).collect();
        assert_eq!(lats, vec![1.0, 2.0, 3.0, 5.0]);
    }

    #[test]
    fn test_duplicates_are_removed() {
        let raw = vec![
            json!({"lat": 1.0, "lng": 1.0, "timestamp": 1_700_000_000}),
            json!({"lat": 1.0, "lng": 1.0, "timestamp": 1_700_000_000_000i64}),
            json!({"lat": 1.0, "lng": 1.0, "timestamp": 1_700_000_060}),
        ];
        assert_eq!(TrackNormalizer::default().build(&raw).len(), 2);
    }

    #[test]
    fn test_optional_fields_default() {
        let raw = vec![json!({"latitude": 1.0, "longitude": 2.0, "ts": "1700000000"})];
        let track = TrackNormalizer::default().build(&raw);
        assert_eq!(track[0].speed_kmph, 0.0);
        assert_eq!(track[0].address, "");
    }

    #[test]
    fn test_history_records_key_order() {
        let payload = json!({"track": [1], "data": [1, 2], "vehicleLocations": [1, 2, 3]});
        assert_eq!(history_records(&payload).map(<[Value]>::len), Some(3));

        let payload = json!({"track": [1], "data": "not-an-array"});
        assert_eq!(history_records(&payload).map(<[Value]>::len), Some(1));

        assert!(history_records(&json!({"points": []})).is_none());
    }
}
