//! Core error types.
//!
//! Errors only surface while loading schemas and rulesets. Compilation itself
//! never fails: lookups return `None` and internal defects are logged and
//! skipped.

use thiserror::Error;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Ruleset loading error.
    #[error("ruleset error: {0}")]
    Rules(#[from] rulegraph_rules::Error),

    /// Schema document is not valid JSON for the model.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a schema file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Two schemas share a name or alias.
    #[error("duplicate schema: {0}")]
    DuplicateSchema(String),

    /// Two classes in one schema share a name.
    #[error("duplicate class: {0}")]
    DuplicateClass(String),

    /// A base class reference does not resolve.
    #[error("class {class} references unknown base class {base}")]
    UnknownBaseClass { class: String, base: String },

    /// A relationship constraint references an unknown class.
    #[error("relationship {relationship} references unknown constraint class {class}")]
    UnknownConstraintClass { relationship: String, class: String },

    /// A navigation property references an unknown relationship.
    #[error("navigation property {class}.{property} references unknown relationship {relationship}")]
    UnknownRelationship {
        class: String,
        property: String,
        relationship: String,
    },

    /// A class inherits from itself.
    #[error("inheritance cycle through {0}")]
    InheritanceCycle(String),

    /// Any other structural problem.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
