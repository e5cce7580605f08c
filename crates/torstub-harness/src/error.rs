//! Harness error type.

use thiserror::Error;
use torstub_core::FatalError;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// The stub would abort the host with this message.
    #[error("{0}")]
    Fatal(#[from] FatalError),
    #[error("invalid {what}: '{value}'")]
    InvalidArgument { what: &'static str, value: String },
    #[error("{failed} of {total} checks failed")]
    VerificationFailed { failed: usize, total: usize },
}
