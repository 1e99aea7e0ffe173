//! # FleetScope Core Library
//!
//! Telemetry normalization and live map reconciliation for vehicle fleets.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Normalization of heterogeneous provider records into vehicle snapshots
//! - Status classification (running, idle, parked, no data)
//! - Trip history normalization and timed playback
//! - Diffing of live snapshots against the markers already on a map
//! - A live map view that polls a provider and drives a renderer
//!
//! ## Example
//!
//! ```rust,ignore
//! use fleetscope_core::prelude::*;
//!
//! let config = FleetConfig::load_or_default("config.json")?;
//! let (events, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let view = MapView::new(&config, DemoFleet::new(12, 7), events).spawn();
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```

pub mod config;
pub mod demo;
pub mod geo;
pub mod reconcile;
pub mod source;
pub mod telemetry;
pub mod track;
pub mod view;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigError, FleetConfig};
    pub use crate::demo::DemoFleet;
    pub use crate::geo::{Bounds, Position};
    pub use crate::reconcile::{all_statuses, ReconcileResult, ReconciliationEngine, StatusFilter};
    pub use crate::source::{FeedError, HttpTelemetrySource, TelemetrySource};
    pub use crate::telemetry::{
        StatusClassifier, TelemetryNormalizer, VehicleSnapshot, VehicleStatus,
    };
    pub use crate::track::{
        HistoryRange, PlayState, PlaybackFrame, PlaybackScheduler, TrackNormalizer, TrackPoint,
    };
    pub use crate::view::{Advisory, MapView, MapViewHandle, RenderEvent, RenderSink, ViewCommand};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
