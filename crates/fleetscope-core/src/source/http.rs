//! Tracking provider HTTP client
//!
//! ```ignore
//! let source = HttpTelemetrySource::new(&config.provider)?;
//! let payload = source.fetch_live().await?;
//! ```

use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use super::{FeedError, TelemetrySource};
use crate::config::ProviderSettings;
use crate::track::HistoryRange;

/// Telemetry source backed by the provider's REST API
#[derive(Debug, Clone)]
pub struct HttpTelemetrySource {
    /// HTTP client (cheap to clone, shares its connection pool)
    client: reqwest::Client,
    live_url: String,
    history_url: String,
    api_key: Option<String>,
}

impl HttpTelemetrySource {
    /// Create a client for the configured provider
    pub fn new(settings: &ProviderSettings) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("FleetScope/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let base = settings.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            live_url: format!("{}/{}", base, settings.live_path.trim_start_matches('/')),
            history_url: format!("{}/{}", base, settings.history_path.trim_start_matches('/')),
            api_key: settings.api_key.clone(),
        })
    }

    /// Get the live endpoint URL
    pub fn live_url(&self) -> &str {
        &self.live_url
    }

    /// Get the history endpoint URL
    pub fn history_url(&self) -> &str {
        &self.history_url
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }
}

async fn send_json(request: reqwest::RequestBuilder) -> Result<Value, FeedError> {
    let response = request.send().await?;

    if !response.status().is_success() {
        return Err(FeedError::HttpStatus(response.status().as_u16()));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| FeedError::Malformed(e.to_string()))
}

impl TelemetrySource for HttpTelemetrySource {
    fn fetch_live(&self) -> impl Future<Output = Result<Value, FeedError>> + Send + 'static {
        let request = self.request(&self.live_url);
        async move { send_json(request).await }
    }

    fn fetch_history(
        &self,
        vehicle_id: &str,
        range: HistoryRange,
    ) -> impl Future<Output = Result<Value, FeedError>> + Send + 'static {
        let request = self.request(&self.history_url).query(&[
            ("vehicleId", vehicle_id.to_string()),
            ("from", range.from_ms.to_string()),
            ("to", range.to_ms.to_string()),
        ]);
        async move { send_json(request).await }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_are_joined() {
        let settings = ProviderSettings {
            base_url: "https://tracker.example.org/api/".into(),
            live_path: "/vehicles/live".into(),
            history_path: "vehicles/history".into(),
            ..ProviderSettings::default()
        };
        let source = HttpTelemetrySource::new(&settings).unwrap();
        assert_eq!(source.live_url(), "https://tracker.example.org/api/vehicles/live");
        assert_eq!(source.history_url(), "https://tracker.example.org/api/vehicles/history");
    }
}
