//! Error types for Dayscope

use thiserror::Error;

/// Errors that can occur while reconstructing a day
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid date string: {0}")]
    InvalidDate(String),

    #[error("Invalid UTC offset in minutes: {0}")]
    InvalidOffset(i32),

    #[error("Batch is inconsistent with the requested date: {0}")]
    InconsistentBatch(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
