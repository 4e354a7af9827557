//! Prediction request/response payloads.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::features::{FEATURE_COUNT, TARGET_UNIT};

/// Named feature values for a single prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PredictionRequest {
    #[serde(rename = "P_downhole")]
    pub p_downhole: f64,
    #[serde(rename = "Q_liquid")]
    pub q_liquid: f64,
    #[serde(rename = "H_pump")]
    pub h_pump: f64,
    #[serde(rename = "WC_percent")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub wc_percent: f64,
    #[serde(rename = "GFR")]
    pub gfr: f64,
    #[serde(rename = "choke_size")]
    #[validate(range(min = 0.0))]
    pub choke_size: f64,
}

impl PredictionRequest {
    /// Feature values in [`FEATURE_NAMES`](crate::features::FEATURE_NAMES) order.
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.p_downhole,
            self.q_liquid,
            self.h_pump,
            self.wc_percent,
            self.gfr,
            self.choke_size,
        ]
    }

    /// Range checks plus a finiteness check on every feature.
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        if self.to_vector().iter().any(|v| !v.is_finite()) {
            return Err(CoreError::Validation(
                "All feature values must be finite numbers".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: f64,
    pub unit: String,
    /// `true` when the raw model output was non-positive and was clamped to
    /// zero ("near zero").
    pub clamped: bool,
}

impl PredictionResponse {
    /// Clamp a raw model output: production cannot be negative.
    pub fn from_raw(raw: f64) -> Self {
        if raw > 0.0 {
            Self {
                prediction: raw,
                unit: TARGET_UNIT.to_string(),
                clamped: false,
            }
        } else {
            Self {
                prediction: 0.0,
                unit: TARGET_UNIT.to_string(),
                clamped: true,
            }
        }
    }
}
