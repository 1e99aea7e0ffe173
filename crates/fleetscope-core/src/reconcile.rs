//! Live map reconciliation
//!
//! Diffs each poll's snapshot set against the markers already on the map and
//! produces the add/update/remove/highlight instructions that bring the map in
//! line with the feed.
//!
//! Markers hidden by the status filter are destroyed, not hidden, so
//! re-enabling a filter re-adds them as new (highlighted) markers. The
//! renderer looks markers up by vehicle id; it never holds references into
//! the engine.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::geo::{Bounds, Position};
use crate::telemetry::{VehicleSnapshot, VehicleStatus};

/// Default noise floor for position changes, in degrees
pub const DEFAULT_POSITION_EPSILON: f64 = 5e-5;

/// Default relative padding for the fit-bounds instruction
pub const DEFAULT_FIT_PADDING: f64 = 0.1;

/// Set of statuses currently shown on the map
pub type StatusFilter = BTreeSet<VehicleStatus>;

/// Filter that shows every status
pub fn all_statuses() -> StatusFilter {
    VehicleStatus::ALL.into_iter().collect()
}

/// What the engine remembers about a rendered marker
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerState {
    /// Last rendered position
    pub position: Position,
    /// Last rendered status
    pub status: VehicleStatus,
    /// Poll cycle in which the vehicle was last seen
    pub last_seen_cycle: u64,
}

/// Instructions for the rendering collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    /// New markers to create
    pub to_add: Vec<VehicleSnapshot>,
    /// Existing markers to refresh (position, icon, popup)
    pub to_update: Vec<VehicleSnapshot>,
    /// Marker ids to destroy
    pub to_remove: Vec<String>,
    /// Marker ids to flash because they are new or moved
    pub to_highlight: Vec<String>,
    /// Viewport to fit, present only when every visible vehicle has a marker
    pub fit_bounds: Option<Bounds>,
}

impl ReconcileResult {
    /// Check if the result adds, removes or highlights anything
    pub fn has_changes(&self) -> bool {
        !(self.to_add.is_empty() && self.to_remove.is_empty() && self.to_highlight.is_empty())
    }
}

/// Owns the live marker set
pub struct ReconciliationEngine {
    markers: BTreeMap<String, MarkerState>,
    /// Number of polls reconciled so far
    cycle: u64,
    epsilon: f64,
    padding: f64,
    /// Snapshot set of the most recent poll, re-used on filter changes
    last_snapshots: Vec<VehicleSnapshot>,
    filter: StatusFilter,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_POSITION_EPSILON, DEFAULT_FIT_PADDING)
    }
}

impl ReconciliationEngine {
    /// Create an engine with the given movement threshold and viewport padding
    pub fn new(epsilon: f64, padding: f64) -> Self {
        Self {
            markers: BTreeMap::new(),
            cycle: 0,
            epsilon,
            padding,
            last_snapshots: Vec::new(),
            filter: all_statuses(),
        }
    }

    /// Get the number of live markers
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Check if no markers are live
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Look up a marker by vehicle id
    pub fn marker(&self, id: &str) -> Option<&MarkerState> {
        self.markers.get(id)
    }

    /// Iterate live markers in id order
    pub fn markers(&self) -> impl Iterator<Item = (&str, &MarkerState)> {
        self.markers.iter().map(|(id, m)| (id.as_str(), m))
    }

    /// Number of polls reconciled so far
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// The filter applied by the last reconciliation
    pub fn filter(&self) -> &StatusFilter {
        &self.filter
    }

    /// Reconcile a new poll's snapshots
    pub fn reconcile(
        &mut self,
        snapshots: &[VehicleSnapshot],
        active_filter: &StatusFilter,
    ) -> ReconcileResult {
        self.cycle += 1;
        self.last_snapshots = snapshots.to_vec();
        self.filter = active_filter.clone();
        self.apply()
    }

    /// Re-run reconciliation against the last poll with a new filter
    pub fn set_filter(&mut self, filter: StatusFilter) -> ReconcileResult {
        self.filter = filter;
        self.apply()
    }

    /// Destroy every marker, returning the removed ids
    pub fn clear(&mut self) -> Vec<String> {
        self.last_snapshots.clear();
        std::mem::take(&mut self.markers).into_keys().collect()
    }

    fn apply(&mut self) -> ReconcileResult {
        let visible = visible_snapshots(&self.last_snapshots, &self.filter);
        let mut result = ReconcileResult::default();

        let visible_ids: BTreeSet<&str> = visible.iter().map(|s| s.id.as_str()).collect();
        self.markers.retain(|id, _| {
            let keep = visible_ids.contains(id.as_str());
            if !keep {
                result.to_remove.push(id.clone());
            }
            keep
        });

        for snapshot in &visible {
            let marker = MarkerState {
                position: snapshot.position,
                status: snapshot.status,
                last_seen_cycle: self.cycle,
            };

            match self.markers.insert(snapshot.id.clone(), marker) {
                None => {
                    result.to_add.push((*snapshot).clone());
                    result.to_highlight.push(snapshot.id.clone());
                }
                Some(previous) => {
                    if previous.position.moved_beyond(&snapshot.position, self.epsilon) {
                        result.to_highlight.push(snapshot.id.clone());
                    }
                    result.to_update.push((*snapshot).clone());
                }
            }
        }

        if self.markers.len() == visible.len() {
            result.fit_bounds =
                Bounds::enclosing(self.markers.values().map(|m| &m.position), self.padding);
        }

        tracing::debug!(
            cycle = self.cycle,
            added = result.to_add.len(),
            updated = result.to_update.len(),
            removed = result.to_remove.len(),
            highlighted = result.to_highlight.len(),
            "reconciled markers"
        );

        result
    }
}

/// Snapshots passing the filter
///
/// A repeated id keeps its first slot but the last record's data, and only
/// that last record is checked against the filter.
fn visible_snapshots<'a>(
    snapshots: &'a [VehicleSnapshot],
    filter: &StatusFilter,
) -> Vec<&'a VehicleSnapshot> {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut latest: Vec<&VehicleSnapshot> = Vec::new();

    for snapshot in snapshots {
        match slots.get(snapshot.id.as_str()) {
            Some(&slot) => latest[slot] = snapshot,
            None => {
                slots.insert(snapshot.id.as_str(), latest.len());
                latest.push(snapshot);
            }
        }
    }

    latest.retain(|s| filter.contains(&s.status));
    latest
}
