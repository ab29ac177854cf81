//! Reading Classification
//!
//! Maps raw sensor values onto the status labels dashboards display.
//!
//! ## Elevation
//!
//! | Range                        | Status   |
//! |------------------------------|----------|
//! | `elevation < banjir`         | `Banjir` |
//! | `banjir <= elevation < normal` | `Siaga`  |
//! | `elevation >= normal`        | `Normal` |
//!
//! ## Rainfall (curah hujan)
//!
//! | Range     | Label             |
//! |-----------|-------------------|
//! | `>= 50`   | `Hujan deras`     |
//! | `20..=49` | `Hujan sedang`    |
//! | `1..=19`  | `Hujan ringan`    |
//! | `<= 0`    | `Tidak ada hujan` |

use serde::Serialize;
use serde_json::Number;

use crate::thresholds::ThresholdPair;

/// Water level status derived from an elevation reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ElevationStatus {
    Normal,
    Siaga,
    Banjir,
}

impl ElevationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElevationStatus::Normal => "Normal",
            ElevationStatus::Siaga => "Siaga",
            ElevationStatus::Banjir => "Banjir",
        }
    }
}

impl std::fmt::Display for ElevationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rainfall intensity band, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RainfallIntensity {
    #[serde(rename = "Tidak ada hujan")]
    Dry,
    #[serde(rename = "Hujan ringan")]
    Light,
    #[serde(rename = "Hujan sedang")]
    Moderate,
    #[serde(rename = "Hujan deras")]
    Heavy,
}

impl RainfallIntensity {
    pub fn as_str(&self) -> &'static str {
        match self {
            RainfallIntensity::Dry => "Tidak ada hujan",
            RainfallIntensity::Light => "Hujan ringan",
            RainfallIntensity::Moderate => "Hujan sedang",
            RainfallIntensity::Heavy => "Hujan deras",
        }
    }
}

impl std::fmt::Display for RainfallIntensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify an elevation reading against the session thresholds.
///
/// `banjir` itself is `Siaga`; `normal` itself is `Normal`.
pub fn classify_elevation(elevation: i64, thresholds: &ThresholdPair) -> ElevationStatus {
    if elevation < thresholds.banjir {
        ElevationStatus::Banjir
    } else if elevation < thresholds.normal {
        ElevationStatus::Siaga
    } else {
        ElevationStatus::Normal
    }
}

/// Classify a rainfall measurement
pub fn classify_rainfall(curah_hujan: i64) -> RainfallIntensity {
    match curah_hujan {
        50.. => RainfallIntensity::Heavy,
        20..=49 => RainfallIntensity::Moderate,
        1..=19 => RainfallIntensity::Light,
        _ => RainfallIntensity::Dry,
    }
}

/// Integer part of a JSON number, truncated toward zero.
///
/// Floats outside the `i64` range saturate.
pub fn whole_part(value: &Number) -> i64 {
    if let Some(n) = value.as_i64() {
        return n;
    }
    if value.as_u64().is_some() {
        return i64::MAX;
    }
    // `as` truncates toward zero and saturates
    value.as_f64().map(|f| f as i64).unwrap_or_default()
}
