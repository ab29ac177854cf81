//! Threshold Source
//!
//! Supplies the elevation thresholds used to classify readings. The relay
//! fetches them once per session from an external HTTP endpoint and falls
//! back to configured defaults when the fetch fails.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Elevation thresholds for one session
///
/// Wire form is `{"Normal": int, "Banjir": int}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdPair {
    #[serde(rename = "Normal")]
    pub normal: i64,
    #[serde(rename = "Banjir")]
    pub banjir: i64,
}

impl ThresholdPair {
    /// Build a validated pair
    pub fn new(normal: i64, banjir: i64) -> Result<Self, ThresholdError> {
        let pair = Self { normal, banjir };
        pair.validate()?;
        Ok(pair)
    }

    /// `banjir` must sit strictly below `normal`, otherwise the Siaga band
    /// is empty or inverted.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        if self.banjir >= self.normal {
            return Err(ThresholdError::Inverted {
                normal: self.normal,
                banjir: self.banjir,
            });
        }
        Ok(())
    }
}

/// Anything that can supply thresholds for a new session
#[async_trait]
pub trait ThresholdSource: Send + Sync {
    async fn fetch(&self) -> Result<ThresholdPair, ThresholdError>;
}

/// Fetches thresholds with a single HTTP GET
pub struct HttpThresholdSource {
    client: Client,
    url: String,
}

impl HttpThresholdSource {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, ThresholdError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(ThresholdError::Request)?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ThresholdSource for HttpThresholdSource {
    async fn fetch(&self) -> Result<ThresholdPair, ThresholdError> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                ThresholdError::Timeout
            } else if e.is_connect() {
                ThresholdError::Unavailable
            } else {
                ThresholdError::Request(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ThresholdError::Status(status.as_u16()));
        }

        let pair: ThresholdPair = response
            .json()
            .await
            .map_err(|e| ThresholdError::Decode(e.to_string()))?;
        pair.validate()?;

        tracing::debug!(normal = pair.normal, banjir = pair.banjir, "Fetched thresholds");
        Ok(pair)
    }
}

/// Fixed thresholds, used when no endpoint is configured
pub struct StaticThresholds(pub ThresholdPair);

#[async_trait]
impl ThresholdSource for StaticThresholds {
    async fn fetch(&self) -> Result<ThresholdPair, ThresholdError> {
        Ok(self.0)
    }
}

/// Fetch thresholds, degrading to `fallback` on any error
pub async fn fetch_or_default(source: &dyn ThresholdSource, fallback: ThresholdPair) -> ThresholdPair {
    match source.fetch().await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!(
                error = %e,
                normal = fallback.normal,
                banjir = fallback.banjir,
                "Threshold fetch failed, using defaults"
            );
            fallback
        }
    }
}

/// Threshold fetch and validation errors
#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("Threshold endpoint timed out")]
    Timeout,

    #[error("Threshold endpoint unavailable")]
    Unavailable,

    #[error("Threshold endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Threshold request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Invalid threshold body: {0}")]
    Decode(String),

    #[error("Inverted thresholds: banjir ({banjir}) must be below normal ({normal})")]
    Inverted { normal: i64, banjir: i64 },
}
