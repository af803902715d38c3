//! Ruleset error types.

use thiserror::Error;

/// Errors raised while loading a ruleset.
#[derive(Debug, Error)]
pub enum Error {
    /// The ruleset document is not valid JSON for the model.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading the ruleset file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The ruleset parsed but is not usable.
    #[error("invalid ruleset: {0}")]
    InvalidRuleset(String),
}
