//! Field alias resolution
//!
//! Tracking providers spell the same logical field many ways (`lat`,
//! `latitude`, `gps.lat`, ...). Each logical field is configured as an ordered
//! list of candidate paths; the first candidate holding a usable value wins.
//! Paths may use dots to reach into nested objects.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geo::Position;

/// Epoch values above this are milliseconds, anything else is seconds
pub const EPOCH_MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// A latitude/longitude key pair that must resolve together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateAlias {
    pub lat: String,
    pub lng: String,
}

impl CoordinateAlias {
    /// Create a coordinate alias pair
    pub fn new(lat: impl Into<String>, lng: impl Into<String>) -> Self {
        Self {
            lat: lat.into(),
            lng: lng.into(),
        }
    }
}

/// Ordered candidate field names for every logical field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldAliases {
    pub vehicle_id: Vec<String>,
    pub label: Vec<String>,
    pub name: Vec<String>,
    pub coordinates: Vec<CoordinateAlias>,
    pub speed: Vec<String>,
    pub distance: Vec<String>,
    pub ignition: Vec<String>,
    pub updated_at: Vec<String>,
    pub timestamp: Vec<String>,
    pub address: Vec<String>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for FieldAliases {
    fn default() -> Self {
        Self {
            vehicle_id: names(&[
                "vehicleId",
                "vehicle_id",
                "vehicleNumber",
                "vehicle_number",
                "vehicleNo",
                "regNo",
                "registrationNumber",
                "imei",
                "deviceId",
                "id",
            ]),
            label: names(&["label", "vehicleLabel", "regNo", "vehicle_number", "vehicleNumber"]),
            name: names(&["name", "vehicleName", "driverName", "vehicleType"]),
            coordinates: vec![
                CoordinateAlias::new("lat", "lng"),
                CoordinateAlias::new("lat", "lon"),
                CoordinateAlias::new("latitude", "longitude"),
                CoordinateAlias::new("Latitude", "Longitude"),
                CoordinateAlias::new("gps.lat", "gps.lng"),
                CoordinateAlias::new("gps.latitude", "gps.longitude"),
                CoordinateAlias::new("location.lat", "location.lng"),
                CoordinateAlias::new("position.lat", "position.lng"),
            ],
            speed: names(&["speed", "speedKmph", "speed_kmph", "gpsSpeed", "Speed"]),
            distance: names(&[
                "distance",
                "distanceKm",
                "distance_km",
                "todayDistance",
                "odometer",
            ]),
            ignition: names(&["ignition", "ignitionStatus", "ign", "acc", "Ignition"]),
            updated_at: names(&[
                "updatedAt",
                "updated_at",
                "lastUpdated",
                "gpsTime",
                "dateTime",
                "timestamp",
            ]),
            timestamp: names(&[
                "timestamp",
                "gpsTime",
                "time",
                "dateTime",
                "datetime",
                "createdAt",
                "ts",
            ]),
            address: names(&["address", "location", "place", "addr"]),
        }
    }
}

/// Look up a (possibly dotted) path in a record
///
/// An exact key match takes precedence over the dotted interpretation.
pub fn resolve<'a>(raw: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = raw.get(path) {
        return Some(value);
    }
    if !path.contains('.') {
        return None;
    }

    let mut parts = path.split('.');
    let mut current = raw.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Stringify a scalar value; empty strings, nulls and containers yield `None`
pub fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Read a finite number from a JSON number or numeric string
pub fn value_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Interpret a value as an instant
///
/// Accepts integer epoch milliseconds, integer or numeric-string epoch
/// seconds (told apart by [`EPOCH_MILLIS_THRESHOLD`]), RFC 3339 strings, and
/// naive ISO-8601 date-times which are taken to be UTC.
pub fn value_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(int) => epoch_instant(int),
            None => fractional_epoch_instant(n.as_f64()?),
        },
        Value::String(s) => text_instant(s.trim()),
        _ => None,
    }
}

fn epoch_instant(value: i64) -> Option<DateTime<Utc>> {
    if value > EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

fn fractional_epoch_instant(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value > EPOCH_MILLIS_THRESHOLD as f64 {
        value.round()
    } else {
        (value * 1000.0).round()
    };
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

fn text_instant(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(int) = text.parse::<i64>() {
        return epoch_instant(int);
    }
    if let Ok(float) = text.parse::<f64>() {
        return fractional_epoch_instant(float);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// First candidate with a non-empty textual value
pub fn first_text(raw: &Map<String, Value>, candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .find_map(|key| resolve(raw, key).and_then(value_text))
}

/// First candidate with a finite numeric value
pub fn first_number(raw: &Map<String, Value>, candidates: &[String]) -> Option<f64> {
    candidates
        .iter()
        .find_map(|key| resolve(raw, key).and_then(value_number))
}

/// First candidate that parses to an instant
pub fn first_instant(raw: &Map<String, Value>, candidates: &[String]) -> Option<DateTime<Utc>> {
    candidates
        .iter()
        .find_map(|key| resolve(raw, key).and_then(value_instant))
}

/// First coordinate pair where both halves are finite numbers
pub fn first_position(raw: &Map<String, Value>, candidates: &[CoordinateAlias]) -> Option<Position> {
    candidates.iter().find_map(|alias| {
        let lat = resolve(raw, &alias.lat).and_then(value_number)?;
        let lng = resolve(raw, &alias.lng).and_then(value_number)?;
        Some(Position::new(lat, lng))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_resolve_dotted_path() {
        let raw = record(json!({"gps": {"lat": 1.5}, "a.b": "flat"}));
        assert_eq!(resolve(&raw, "gps.lat"), Some(&json!(1.5)));
        assert_eq!(resolve(&raw, "a.b"), Some(&json!("flat")));
        assert_eq!(resolve(&raw, "gps.lng"), None);
        assert_eq!(resolve(&raw, "missing"), None);
    }

    #[test]
    fn test_first_text_skips_empty() {
        let raw = record(json!({"vehicleId": "  ", "regNo": 4411, "id": "x"}));
        let keys = names(&["vehicleId", "regNo", "id"]);
        assert_eq!(first_text(&raw, &keys), Some("4411".to_string()));
    }

    #[test]
    fn test_value_number() {
        assert_eq!(value_number(&json!(" 12.5 ")), Some(12.5));
        assert_eq!(value_number(&json!(7)), Some(7.0));
        assert_eq!(value_number(&json!("NaN")), None);
        assert_eq!(value_number(&json!("inf")), None);
        assert_eq!(value_number(&json!("north")), None);
        assert_eq!(value_number(&json!(null)), None);
    }

    #[test]
    fn test_first_position_requires_both_halves() {
        let raw = record(json!({"lat": 10.0, "latitude": "11.5", "longitude": "22.5"}));
        let pos = first_position(&raw, &FieldAliases::default().coordinates).unwrap();
        assert_eq!(pos, Position::new(11.5, 22.5));
    }

    #[test]
    fn test_instant_encodings_agree() {
        let secs = value_instant(&json!(1_700_000_000)).unwrap();
        let millis = value_instant(&json!(1_700_000_000_000i64)).unwrap();
        let text = value_instant(&json!("1700000000")).unwrap();
        let iso = value_instant(&json!("2023-11-14T22:13:20Z")).unwrap();
        let naive = value_instant(&json!("2023-11-14 22:13:20")).unwrap();
        assert_eq!(secs, millis);
        assert_eq!(secs, text);
        assert_eq!(secs, iso);
        assert_eq!(secs, naive);
    }

    #[test]
    fn test_instant_rejects_garbage() {
        assert!(value_instant(&json!("yesterday")).is_none());
        assert!(value_instant(&json!("")).is_none());
        assert!(value_instant(&json!(true)).is_none());
    }
}
