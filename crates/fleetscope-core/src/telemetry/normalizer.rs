//! Provider record normalization
//!
//! Malformed records are an expected condition for a third-party feed: they
//! are dropped (`None`), never reported as errors.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::fields::{
    first_instant, first_number, first_position, first_text, resolve, value_text, FieldAliases,
};
use super::{ClassifierRules, Ignition, StatusClassifier, VehicleSnapshot};

/// Extract the record list from a live poll payload
///
/// Accepts a bare array or an object carrying the array under `data`.
pub fn live_records(payload: &Value) -> Option<&[Value]> {
    match payload {
        Value::Array(records) => Some(records),
        Value::Object(map) => map.get("data").and_then(Value::as_array).map(Vec::as_slice),
        _ => None,
    }
}

/// Converts raw provider records into [`VehicleSnapshot`]s
#[derive(Debug, Clone, Default)]
pub struct TelemetryNormalizer {
    aliases: FieldAliases,
    classifier: StatusClassifier,
}

impl TelemetryNormalizer {
    /// Create a normalizer from alias lists and classifier rules
    pub fn new(aliases: FieldAliases, rules: ClassifierRules) -> Self {
        Self {
            aliases,
            classifier: StatusClassifier::new(rules),
        }
    }

    /// The classifier applied to every snapshot
    pub fn classifier(&self) -> &StatusClassifier {
        &self.classifier
    }

    /// Normalize one record, stamping missing update times with "now"
    pub fn normalize(&self, raw: &Map<String, Value>) -> Option<VehicleSnapshot> {
        self.normalize_at(raw, Utc::now())
    }

    /// Normalize one record with an explicit ingestion time
    pub fn normalize_at(
        &self,
        raw: &Map<String, Value>,
        ingested_at: DateTime<Utc>,
    ) -> Option<VehicleSnapshot> {
        let aliases = &self.aliases;

        let id = first_text(raw, &aliases.vehicle_id)?;
        let position = first_position(raw, &aliases.coordinates)?;

        let speed_kmph = first_number(raw, &aliases.speed).unwrap_or(0.0);
        let distance_km = first_number(raw, &aliases.distance);
        let ignition = first_text(raw, &aliases.ignition)
            .map(|text| Ignition::parse(&text))
            .unwrap_or(Ignition::Unknown);
        let status = self.classifier.classify(speed_kmph, ignition, raw);

        let label = first_text(raw, &aliases.label).unwrap_or_else(|| id.clone());
        let name = first_text(raw, &aliases.name).unwrap_or_else(|| label.clone());
        let updated_at = self
            .display_time(raw)
            .unwrap_or_else(|| ingested_at.to_rfc3339_opts(SecondsFormat::Secs, true));

        Some(VehicleSnapshot {
            id,
            label,
            name,
            position,
            speed_kmph,
            ignition,
            status,
            distance_km,
            updated_at,
        })
    }

    /// Normalize a whole poll payload, dropping unusable records
    pub fn normalize_batch(&self, records: &[Value]) -> Vec<VehicleSnapshot> {
        self.normalize_batch_at(records, Utc::now())
    }

    /// [`normalize_batch`](Self::normalize_batch) with an explicit ingestion time
    pub fn normalize_batch_at(
        &self,
        records: &[Value],
        ingested_at: DateTime<Utc>,
    ) -> Vec<VehicleSnapshot> {
        let snapshots: Vec<VehicleSnapshot> = records
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|raw| self.normalize_at(raw, ingested_at))
            .collect();

        let dropped = records.len() - snapshots.len();
        if dropped > 0 {
            tracing::debug!(dropped, kept = snapshots.len(), "dropped unusable vehicle records");
        }
        snapshots
    }

    /// Epoch values become RFC 3339; text is passed through for display
    fn display_time(&self, raw: &Map<String, Value>) -> Option<String> {
        self.aliases.updated_at.iter().find_map(|key| {
            let value = resolve(raw, key)?;
            if value.is_number() {
                first_instant(raw, std::slice::from_ref(key))
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            } else {
                value_text(value)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Position;
    use crate::telemetry::VehicleStatus;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_normalize_full_record() {
        let n = TelemetryNormalizer::default();
        let raw = record(json!({
            "vehicleId": "KA-01-4411",
            "name": "Compactor 7",
            "latitude": "12.9716",
            "longitude": 77.5946,
            "speed": "32.5",
            "ignition": "on",
            "distance": 14.2,
            "updatedAt": "01-03-2024 08:29"
        }));

        let snap = n.normalize_at(&raw, now()).unwrap();
        assert_eq!(
            snap,
            VehicleSnapshot {
                id: "KA-01-4411".into(),
                label: "KA-01-4411".into(),
                name: "Compactor 7".into(),
                position: Position::new(12.9716, 77.5946),
                speed_kmph: 32.5,
                ignition: Ignition::On,
                status: VehicleStatus::Running,
                distance_km: Some(14.2),
                updated_at: "01-03-2024 08:29".into(),
            }
        );
    }

    #[test]
    fn test_missing_position_is_rejected() {
        let n = TelemetryNormalizer::default();
        assert!(n.normalize(&record(json!({"vehicleId": "A"}))).is_none());
        assert!(n.normalize(&record(json!({"vehicleId": "A", "lat": 10.0}))).is_none());
        assert!(n
            .normalize(&record(json!({"vehicleId": "A", "lat": "x", "lng": 20.0})))
            .is_none());
    }

    #[test]
    fn test_missing_identity_is_rejected() {
        let n = TelemetryNormalizer::default();
        let raw = record(json!({"vehicleId": "", "lat": 10.0, "lng": 20.0}));
        assert!(n.normalize(&raw).is_none());
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let n = TelemetryNormalizer::default();
        let raw = record(json!({"regNo": 42, "lat": 10.0, "lng": 20.0}));
        let snap = n.normalize_at(&raw, now()).unwrap();

        assert_eq!(snap.id, "42");
        assert_eq!(snap.speed_kmph, 0.0);
        assert_eq!(snap.distance_km, None);
        assert_eq!(snap.ignition, Ignition::Unknown);
        assert_eq!(snap.status, VehicleStatus::Idle);
        assert_eq!(snap.updated_at, "2024-03-01T08:30:00Z");
    }

    #[test]
    fn test_epoch_update_time_is_rendered() {
        let n = TelemetryNormalizer::default();
        let raw = record(json!({"id": "A", "lat": 1.0, "lng": 2.0, "gpsTime": 1_700_000_000}));
        let snap = n.normalize_at(&raw, now()).unwrap();
        assert_eq!(snap.updated_at, "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_nested_position_and_boolean_ignition() {
        let n = TelemetryNormalizer::default();
        let raw = record(json!({
            "imei": "8633",
            "gps": {"lat": 10.5, "lng": 20.5},
            "ignition": false
        }));
        let snap = n.normalize(&raw).unwrap();
        assert_eq!(snap.position, Position::new(10.5, 20.5));
        assert_eq!(snap.ignition, Ignition::Off);
        assert_eq!(snap.status, VehicleStatus::Parked);
    }

    #[test]
    fn test_numeric_ignition_values() {
        let n = TelemetryNormalizer::default();
        let on = record(json!({"id": "A", "lat": 1.0, "lng": 2.0, "ign": 1.0}));
        let off = record(json!({"id": "B", "lat": 1.0, "lng": 2.0, "ign": 0}));
        assert_eq!(n.normalize_at(&on, now()).unwrap().ignition, Ignition::On);
        assert_eq!(n.normalize_at(&off, now()).unwrap().ignition, Ignition::Off);
    }

    #[test]
    fn test_batch_drops_bad_records() {
        let n = TelemetryNormalizer::default();
        let payload = json!({"data": [
            {"vehicleId": "A", "lat": 10.0, "lng": 20.0},
            {"vehicleId": "B"},
            "garbage",
            {"vehicleId": "C", "lat": 30.0, "lng": 40.0}
        ]});

        let records = live_records(&payload).unwrap();
        let ids: Vec<String> = n.normalize_batch(records).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[test]
    fn test_live_records_shapes() {
        assert_eq!(live_records(&json!([])).map(<[Value]>::len), Some(0));
        assert_eq!(live_records(&json!({"data": [1, 2]})).map(<[Value]>::len), Some(2));
        assert!(live_records(&json!({"items": []})).is_none());
        assert!(live_records(&json!("oops")).is_none());
    }
}
