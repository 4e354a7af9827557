/// Failures inside the training pipeline and model artifact handling.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("Failed to read dataset: {0}")]
    Csv(#[from] csv::Error),

    #[error("Dataset is missing required column(s): {0}")]
    MissingColumns(String),

    #[error("Dataset has {rows} usable rows, at least {min} are required")]
    TooFewRows { rows: usize, min: usize },

    #[error("Training diverged at epoch {epoch}: loss is not finite")]
    Diverged { epoch: u32 },

    #[error("Model expects {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("Model artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model artifact is malformed: {0}")]
    Artifact(#[from] serde_json::Error),
}
