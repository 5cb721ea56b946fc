use thiserror::Error;

#[derive(Debug, Error)]
pub enum RatioStudyError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Computation failure: {0}")]
    ComputationFailure(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for RatioStudyError {
    fn from(e: serde_json::Error) -> Self {
        RatioStudyError::SerializationError(e.to_string())
    }
}
