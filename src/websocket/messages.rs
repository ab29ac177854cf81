//! WebSocket Message Types
//!
//! Defines the frames exchanged between sensors, dashboards and the relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

use crate::classify::{classify_elevation, classify_rainfall, whole_part, ElevationStatus, RainfallIntensity};
use crate::thresholds::ThresholdPair;

/// Format of the `timestamp` field on enriched readings (RFC 1123, UTC)
pub const TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %H:%M:%S UTC";

/// Frames sent from a client to the relay
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// A sensor reading to classify and relay
    Data(Reading),
    /// Timer control message, relayed verbatim to every client
    Time(TimeSignal),
}

impl InboundFrame {
    /// Decode a raw text or binary frame
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        serde_json::from_slice(bytes).map_err(FrameError::from)
    }
}

/// Sensor reading as sent by field hardware
#[derive(Debug, Clone, Deserialize)]
pub struct Reading {
    #[serde(rename = "hardwareId", default)]
    pub hardware_id: Option<Value>,
    pub elevation: Number,
    pub curah_hujan: Number,
    #[serde(default)]
    pub latitude: Option<Value>,
    #[serde(default)]
    pub longitude: Option<Value>,
    #[serde(default)]
    pub level_siaga: Option<Value>,
    #[serde(default)]
    pub level_banjir: Option<Value>,
}

impl Reading {
    /// Classify this reading and stamp it with the capture time
    pub fn enrich(self, thresholds: &ThresholdPair, captured_at: DateTime<Utc>) -> EnrichedReading {
        let status_elevation = classify_elevation(whole_part(&self.elevation), thresholds);
        let status_curah_hujan = classify_rainfall(whole_part(&self.curah_hujan));

        EnrichedReading {
            hardware_id: self.hardware_id,
            timestamp: captured_at.format(TIMESTAMP_FORMAT).to_string(),
            elevation: self.elevation,
            status_elevation,
            curah_hujan: self.curah_hujan,
            status_curah_hujan,
            latitude: self.latitude,
            longitude: self.longitude,
            level_siaga: self.level_siaga,
            level_banjir: self.level_banjir,
        }
    }
}

/// Timer-ready control message
#[derive(Debug, Clone, Deserialize)]
pub struct TimeSignal {
    #[serde(rename = "timeReady")]
    pub time_ready: Value,
}

/// A reading after classification, as broadcast to peers
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedReading {
    #[serde(rename = "hardwareId")]
    pub hardware_id: Option<Value>,
    pub timestamp: String,
    pub elevation: Number,
    pub status_elevation: ElevationStatus,
    pub curah_hujan: Number,
    pub status_curah_hujan: RainfallIntensity,
    pub latitude: Option<Value>,
    pub longitude: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_siaga: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_banjir: Option<Value>,
}

/// Messages generated by the relay
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Classified reading from another client
    Data(EnrichedReading),
    /// Number of currently connected clients
    Connection { connection_count: usize },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(FrameError::from)
    }
}

/// Inbound frame could not be decoded
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}
