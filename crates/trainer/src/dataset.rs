//! Production dataset loading and feature derivation.
//!
//! The source CSV carries daily well measurements. Model features are
//! derived from those columns; rows where any feature or the target cannot
//! be computed are dropped.

use std::collections::HashMap;
use std::io::Read;

use oilcast_core::features::FEATURE_COUNT;

use crate::error::TrainError;

/// Source columns the derivations read.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "AVG_DOWNHOLE_PRESSURE",
    "AVG_DP_TUBING",
    "AVG_CHOKE_SIZE_P",
    "BORE_OIL_VOL",
    "BORE_GAS_VOL",
    "BORE_WAT_VOL",
];

/// Tubing pressure differential (bar) to pump head (m).
const PUMP_HEAD_FACTOR: f64 = 10.2;

/// Oil volume (Sm³) to mass (t).
const OIL_DENSITY_T_PER_M3: f64 = 0.842;

/// Parse a numeric cell. Thousands separators (`,`) are stripped; blank or
/// unparseable cells are treated as missing.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Check that `bytes` start with a CSV header containing every required
/// column. Only the header row is read.
pub fn validate_header(bytes: &[u8]) -> Result<(), TrainError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader.headers()?.clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h.trim() == *col))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TrainError::MissingColumns(missing.join(", ")))
    }
}

/// Feature matrix and target vector ready for training.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub features: Vec<[f64; FEATURE_COUNT]>,
    pub targets: Vec<f64>,
}

impl Dataset {
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self, TrainError> {
        Self::from_reader(bytes)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TrainError> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers = reader.headers()?.clone();
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim(), i))
            .collect();

        let mut columns = [0usize; REQUIRED_COLUMNS.len()];
        let mut missing = Vec::new();
        for (slot, col) in columns.iter_mut().zip(REQUIRED_COLUMNS) {
            match index.get(col) {
                Some(&i) => *slot = i,
                None => missing.push(col),
            }
        }
        if !missing.is_empty() {
            return Err(TrainError::MissingColumns(missing.join(", ")));
        }

        let mut dataset = Dataset::default();
        let mut skipped = 0usize;
        for record in reader.records() {
            let record = record?;
            let cell = |slot: usize| record.get(columns[slot]).and_then(parse_numeric);
            let source = SourceRow {
                downhole_pressure: cell(0),
                dp_tubing: cell(1),
                choke_size: cell(2),
                oil: cell(3),
                gas: cell(4),
                water: cell(5),
            };
            match source.derive() {
                Some((features, target)) => {
                    dataset.features.push(features);
                    dataset.targets.push(target);
                }
                None => skipped += 1,
            }
        }

        tracing::debug!(rows = dataset.len(), skipped, "Dataset loaded");
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            features: indices.iter().map(|&i| self.features[i]).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
        }
    }
}

/// Raw measurements of one CSV row.
struct SourceRow {
    downhole_pressure: Option<f64>,
    dp_tubing: Option<f64>,
    choke_size: Option<f64>,
    oil: Option<f64>,
    gas: Option<f64>,
    water: Option<f64>,
}

impl SourceRow {
    /// Derived features and target, or `None` if any of them is missing.
    fn derive(&self) -> Option<([f64; FEATURE_COUNT], f64)> {
        let oil = self.oil?;
        // GFR is undefined without oil, which also guarantees a positive
        // liquid total for the water cut.
        if oil <= 0.0 {
            return None;
        }
        let water = self.water.unwrap_or(0.0);
        let liquid = oil + water;

        let p_downhole = self.downhole_pressure?;
        let h_pump = self.dp_tubing? * PUMP_HEAD_FACTOR;
        let wc_percent = water / liquid * 100.0;
        let gfr = self.gas? / oil;
        let choke = self.choke_size?;
        let target = oil * OIL_DENSITY_T_PER_M3;

        Some((
            [p_downhole, liquid, h_pump, wc_percent, gfr, choke],
            target,
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
