//! Vehicle status classification
//!
//! Priority order, first match wins:
//! 1. no-data flag or no-data text hint -> `NoData`
//! 2. speed above threshold or running text hint -> `Running`
//! 3. ignition off or parked text hint -> `Parked`
//! 4. otherwise `Idle`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::fields::{resolve, value_text};
use super::{Ignition, VehicleStatus};

/// Hint vocabulary and thresholds used by [`StatusClassifier`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierRules {
    /// Speeds strictly above this (km/h) count as running
    pub running_speed_kmph: f64,
    /// Boolean-ish fields that mark a record as having no data
    pub no_data_flags: Vec<String>,
    /// Free-text status/mode fields searched for hint terms
    pub text_fields: Vec<String>,
    pub no_data_terms: Vec<String>,
    pub running_terms: Vec<String>,
    pub parked_terms: Vec<String>,
}

fn terms(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            running_speed_kmph: 0.5,
            no_data_flags: terms(&["noData", "no_data", "isNoData", "nodata"]),
            text_fields: terms(&[
                "status",
                "vehicleStatus",
                "movementStatus",
                "mode",
                "state",
            ]),
            no_data_terms: terms(&["no data", "nodata"]),
            running_terms: terms(&["run", "move"]),
            parked_terms: terms(&["park", "stop"]),
        }
    }
}

/// Derives a [`VehicleStatus`] from speed, ignition and raw provider hints
#[derive(Debug, Clone, Default)]
pub struct StatusClassifier {
    rules: ClassifierRules,
}

impl StatusClassifier {
    /// Create a classifier with the given rules
    pub fn new(rules: ClassifierRules) -> Self {
        Self { rules }
    }

    /// Access the active rules
    pub fn rules(&self) -> &ClassifierRules {
        &self.rules
    }

    /// Classify a vehicle
    pub fn classify(
        &self,
        speed_kmph: f64,
        ignition: Ignition,
        raw_hints: &Map<String, Value>,
    ) -> VehicleStatus {
        let hints = self.hint_text(raw_hints);
        let mentions = |vocabulary: &[String]| {
            vocabulary.iter().any(|term| {
                let term = term.to_lowercase();
                !term.is_empty() && hints.iter().any(|h| h.contains(&term))
            })
        };

        if self.no_data_flagged(raw_hints) || mentions(&self.rules.no_data_terms) {
            VehicleStatus::NoData
        } else if speed_kmph > self.rules.running_speed_kmph
            || mentions(&self.rules.running_terms)
        {
            VehicleStatus::Running
        } else if ignition == Ignition::Off || mentions(&self.rules.parked_terms) {
            VehicleStatus::Parked
        } else {
            VehicleStatus::Idle
        }
    }

    fn no_data_flagged(&self, raw: &Map<String, Value>) -> bool {
        self.rules
            .no_data_flags
            .iter()
            .filter_map(|key| resolve(raw, key))
            .any(is_truthy)
    }

    fn hint_text(&self, raw: &Map<String, Value>) -> Vec<String> {
        self.rules
            .text_fields
            .iter()
            .filter_map(|key| resolve(raw, key).and_then(value_text))
            .map(|text| text.to_lowercase())
            .collect()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "y"
        ),
        _ => false,
    }
}
