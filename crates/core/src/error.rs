use thiserror::Error;

pub type CampaignResult<T> = Result<T, CampaignError>;

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dimension mismatch on {dimension}: expected {expected}, got {actual}")]
    DimensionMismatch {
        dimension: String,
        expected: usize,
        actual: usize,
    },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Policy artifact error: {0}")]
    PolicyArtifact(String),

    #[error("Policy diverged: no termination after {steps} steps")]
    PolicyDiverged { steps: usize },

    #[error("Rollout deadline exceeded after {steps} steps")]
    DeadlineExceeded { steps: usize },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CampaignError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for errors caused by caller input rather than server state.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::DimensionMismatch { .. })
    }
}
