//! Live Telemetry
//!
//! Turns loosely-typed tracking provider records into canonical vehicle
//! snapshots and classifies their operating state.

mod classifier;
pub mod fields;
mod normalizer;

pub use classifier::{ClassifierRules, StatusClassifier};
pub use fields::{CoordinateAlias, FieldAliases};
pub use normalizer::{live_records, TelemetryNormalizer};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::geo::Position;

/// Ignition state as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Ignition {
    On,
    Off,
    Unknown,
}

impl Ignition {
    /// Interpret a provider ignition value (case-insensitive)
    ///
    /// Numeric text is compared by value, so `1.0` reads as on.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text.to_ascii_uppercase().as_str() {
            "ON" | "1" | "TRUE" | "YES" => Ignition::On,
            "OFF" | "0" | "FALSE" | "NO" => Ignition::Off,
            _ => match text.parse::<f64>() {
                Ok(value) if value == 1.0 => Ignition::On,
                Ok(value) if value == 0.0 => Ignition::Off,
                _ => Ignition::Unknown,
            },
        }
    }
}

/// Operating state derived for a vehicle at one poll
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    Running,
    Idle,
    Parked,
    NoData,
}

impl VehicleStatus {
    /// Every status, in display order
    pub const ALL: [VehicleStatus; 4] = [
        VehicleStatus::Running,
        VehicleStatus::Idle,
        VehicleStatus::Parked,
        VehicleStatus::NoData,
    ];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Running => "running",
            VehicleStatus::Idle => "idle",
            VehicleStatus::Parked => "parked",
            VehicleStatus::NoData => "no_data",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "running" => Ok(VehicleStatus::Running),
            "idle" => Ok(VehicleStatus::Idle),
            "parked" => Ok(VehicleStatus::Parked),
            "no_data" | "nodata" => Ok(VehicleStatus::NoData),
            other => Err(format!("unknown vehicle status '{other}'")),
        }
    }
}

/// One vehicle's normalized state at a single poll
///
/// Snapshots are never mutated; the next poll supersedes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSnapshot {
    /// Stable identity key (registration or provider id)
    pub id: String,
    /// Display label
    pub label: String,
    /// Display name
    pub name: String,
    /// Current position
    pub position: Position,
    /// Speed in km/h
    pub speed_kmph: f64,
    /// Ignition state
    pub ignition: Ignition,
    /// Derived operating state
    pub status: VehicleStatus,
    /// Distance travelled in km, if reported
    pub distance_km: Option<f64>,
    /// Display timestamp
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignition_parse() {
        assert_eq!(Ignition::parse("on"), Ignition::On);
        assert_eq!(Ignition::parse(" Yes "), Ignition::On);
        assert_eq!(Ignition::parse("1"), Ignition::On);
        assert_eq!(Ignition::parse("false"), Ignition::Off);
        assert_eq!(Ignition::parse("NO"), Ignition::Off);
        assert_eq!(Ignition::parse("acc"), Ignition::Unknown);
        assert_eq!(Ignition::parse(""), Ignition::Unknown);
    }

    #[test]
    fn test_ignition_parse_numeric_text() {
        assert_eq!(Ignition::parse("1.0"), Ignition::On);
        assert_eq!(Ignition::parse("0.0"), Ignition::Off);
        assert_eq!(Ignition::parse("-0"), Ignition::Off);
        assert_eq!(Ignition::parse("2"), Ignition::Unknown);
        assert_eq!(Ignition::parse("NaN"), Ignition::Unknown);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Running".parse::<VehicleStatus>(), Ok(VehicleStatus::Running));
        assert_eq!("no-data".parse::<VehicleStatus>(), Ok(VehicleStatus::NoData));
        assert_eq!("NODATA".parse::<VehicleStatus>(), Ok(VehicleStatus::NoData));
        assert!("moving".parse::<VehicleStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&VehicleStatus::NoData).unwrap();
        assert_eq!(json, "\"NO_DATA\"");
    }
}
