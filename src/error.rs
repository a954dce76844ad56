//! Error taxonomy for the prediction pipeline.
//!
//! Translation failures and per-item batch failures are recovered locally
//! and surface as values (`TranslationOutcome`, `BatchItemFailure`), never
//! as `Err`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentimentError {
    /// Input text or threshold rejected before any processing.
    #[error("{0}")]
    Validation(String),

    #[error("Batch too large: received {size} texts, maximum is {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Batch is empty")]
    EmptyBatch,

    /// Classifier/vectorizer not loaded yet.
    #[error("Sentiment engine is not initialized: model artifacts are not loaded")]
    UninitializedEngine,

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SentimentError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SentimentError::Validation(msg.into())
    }

    /// Caller-side errors: bad text, bad threshold, malformed batch.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SentimentError::Validation(_)
                | SentimentError::BatchTooLarge { .. }
                | SentimentError::EmptyBatch
        )
    }
}

impl From<reqwest::Error> for SentimentError {
    fn from(err: reqwest::Error) -> Self {
        SentimentError::Translation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SentimentError>;
