//! Feature/target correlation data attached to completed ticks.
//!
//! Two payload shapes have historically been sent for correlation data: a
//! single series for one feature, and a map of series keyed by feature name.
//! Both are normalized here, at deserialization time, into the tagged
//! [`CorrelationData`] enum so nothing downstream has to handle more than
//! one shape. Serialization always produces the tagged form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CorrelationPoint
// ---------------------------------------------------------------------------

/// One `(feature value, target value)` sample. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPoint")]
pub struct CorrelationPoint(pub f64, pub f64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPoint {
    Pair(f64, f64),
    Object { x: f64, y: f64 },
}

impl From<RawPoint> for CorrelationPoint {
    fn from(raw: RawPoint) -> Self {
        match raw {
            RawPoint::Pair(x, y) | RawPoint::Object { x, y } => CorrelationPoint(x, y),
        }
    }
}

// ---------------------------------------------------------------------------
// CorrelationSeries
// ---------------------------------------------------------------------------

/// Sampled scatter points for one feature plus its Pearson coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationSeries {
    pub points: Vec<CorrelationPoint>,
    #[serde(alias = "correlation_coefficient")]
    pub correlation_coefficient: f64,
}

// ---------------------------------------------------------------------------
// CorrelationData
// ---------------------------------------------------------------------------

/// Canonical correlation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawCorrelation")]
pub enum CorrelationData {
    Single(CorrelationSeries),
    ByFeature(BTreeMap<String, CorrelationSeries>),
}

impl CorrelationData {
    /// Look up the series for `feature`. A `Single` payload has no feature
    /// name, so it never matches.
    pub fn feature(&self, feature: &str) -> Option<&CorrelationSeries> {
        match self {
            Self::Single(_) => None,
            Self::ByFeature(map) => map.get(feature),
        }
    }

    /// Number of series carried.
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::ByFeature(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
enum TaggedCorrelation {
    Single(CorrelationSeries),
    ByFeature(BTreeMap<String, CorrelationSeries>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCorrelation {
    Tagged(TaggedCorrelation),
    Series(CorrelationSeries),
    Map(BTreeMap<String, CorrelationSeries>),
}

impl From<RawCorrelation> for CorrelationData {
    fn from(raw: RawCorrelation) -> Self {
        match raw {
            RawCorrelation::Tagged(TaggedCorrelation::Single(series))
            | RawCorrelation::Series(series) => CorrelationData::Single(series),
            RawCorrelation::Tagged(TaggedCorrelation::ByFeature(map))
            | RawCorrelation::Map(map) => CorrelationData::ByFeature(map),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
