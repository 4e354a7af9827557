//! The fixed feature set the model is trained on and queried with.

use serde::Serialize;

/// Model input features, in the column order used by the network.
pub const FEATURE_NAMES: [&str; 6] = [
    "P_downhole",
    "Q_liquid",
    "H_pump",
    "WC_percent",
    "GFR",
    "choke_size",
];

/// Number of model inputs.
pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Name of the predicted quantity.
pub const TARGET_NAME: &str = "debit_oil_t_per_day";

/// Unit of the predicted quantity (tonnes per day).
pub const TARGET_UNIT: &str = "т/сут";

/// Hidden layer widths of the dense network.
pub const HIDDEN_LAYERS: [usize; 2] = [64, 32];

/// One layer of the architecture summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub units: usize,
    pub activation: &'static str,
}

/// Architecture summary as reported by the model info endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Architecture {
    pub layers: Vec<LayerSpec>,
}

impl Architecture {
    /// The dense `64 relu -> 32 relu -> 1 linear` network.
    pub fn dense() -> Self {
        let mut layers: Vec<LayerSpec> = HIDDEN_LAYERS
            .iter()
            .map(|&units| LayerSpec {
                kind: "Dense",
                units,
                activation: "relu",
            })
            .collect();
        layers.push(LayerSpec {
            kind: "Dense",
            units: 1,
            activation: "linear",
        });
        Self { layers }
    }
}

/// Position of `name` in [`FEATURE_NAMES`].
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|f| *f == name)
}
