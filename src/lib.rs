//! # banjir-relay
//!
//! Real-time relay for flood-monitoring telemetry. Water-level and rainfall
//! sensors connect over WebSocket; every reading is classified and
//! re-broadcast to all other connected dashboards and sensors.
//!
//! ## Modules
//!
//! - [`websocket`]: Connection hub, broadcaster and per-connection sessions
//! - [`classify`]: Elevation status and rainfall intensity classification
//! - [`thresholds`]: Per-session threshold source with fallback defaults
//! - [`api`]: Axum router, health endpoints and server lifecycle
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use banjir_relay::{serve, AppState, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     config.validate()?;
//!
//!     let state = AppState::from_config(&config)?;
//!     serve(state, &config.server).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod classify;
pub mod config;
pub mod thresholds;
pub mod websocket;

// Re-export top-level types for convenience
pub use api::{build_router, serve, serve_with_shutdown, ApiError, ApiResult, AppState};

pub use classify::{classify_elevation, classify_rainfall, ElevationStatus, RainfallIntensity};

pub use config::{Config, ConfigError, LoggingConfig, ServerConfig, ThresholdsConfig};

pub use thresholds::{
    HttpThresholdSource, StaticThresholds, ThresholdError, ThresholdPair, ThresholdSource,
};

pub use websocket::{
    websocket_handler, ConnectionHub, ConnectionId, EnrichedReading, FrameError, FrameKind,
    HubConfig, HubError, InboundFrame, Payload, Reading, ServerMessage,
};
