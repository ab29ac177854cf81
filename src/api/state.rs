//! Application State
//!
//! Shared state accessible by all handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::thresholds::{HttpThresholdSource, StaticThresholds, ThresholdError, ThresholdPair, ThresholdSource};
use crate::websocket::{ConnectionHub, HubConfig};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Connection registry and broadcaster
    pub hub: Arc<ConnectionHub>,
    /// Where each session gets its thresholds from
    pub thresholds: Arc<dyn ThresholdSource>,
    /// Used when the threshold fetch fails
    pub default_thresholds: ThresholdPair,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create state from explicit parts
    pub fn new(
        thresholds: Arc<dyn ThresholdSource>,
        default_thresholds: ThresholdPair,
        hub_config: HubConfig,
    ) -> Self {
        Self {
            hub: Arc::new(ConnectionHub::new(hub_config)),
            thresholds,
            default_thresholds,
            start_time: Instant::now(),
        }
    }

    /// Build state from the loaded configuration
    pub fn from_config(config: &Config) -> Result<Self, ThresholdError> {
        let defaults = config.thresholds.defaults()?;

        let source: Arc<dyn ThresholdSource> = if config.thresholds.enabled {
            Arc::new(HttpThresholdSource::new(
                config.thresholds.url.clone(),
                config.thresholds.request_timeout(),
            )?)
        } else {
            Arc::new(StaticThresholds(defaults))
        };

        let hub_config = HubConfig {
            max_connections: config.server.max_connections,
        };

        Ok(Self::new(source, defaults, hub_config))
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get WebSocket connection count
    pub async fn ws_connection_count(&self) -> usize {
        self.hub.connection_count().await
    }
}
