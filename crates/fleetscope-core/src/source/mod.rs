//! Telemetry Sources
//!
//! Where live positions and trip history come from: the tracking provider's
//! HTTP API, or the built-in demo fleet.

mod error;
mod http;

pub use error::FeedError;
pub use http::HttpTelemetrySource;

use std::future::Future;

use serde_json::Value;

use crate::track::HistoryRange;

/// A provider of raw vehicle telemetry payloads
///
/// The returned futures own everything they need (`'static`), so the caller
/// can start a request, keep running, and spawn the request as a task.
/// Requests start in call order, which is the order the live view issues
/// sequence numbers in.
pub trait TelemetrySource: Send + Sync + 'static {
    /// Fetch the current live payload (bare array or `{data: [...]}`)
    fn fetch_live(&self) -> impl Future<Output = Result<Value, FeedError>> + Send + 'static;

    /// Fetch raw history for one vehicle over a time window
    fn fetch_history(
        &self,
        vehicle_id: &str,
        range: HistoryRange,
    ) -> impl Future<Output = Result<Value, FeedError>> + Send + 'static;
}

impl<T: TelemetrySource> TelemetrySource for std::sync::Arc<T> {
    fn fetch_live(&self) -> impl Future<Output = Result<Value, FeedError>> + Send + 'static {
        (**self).fetch_live()
    }

    fn fetch_history(
        &self,
        vehicle_id: &str,
        range: HistoryRange,
    ) -> impl Future<Output = Result<Value, FeedError>> + Send + 'static {
        (**self).fetch_history(vehicle_id, range)
    }
}
