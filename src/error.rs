//! Error types for SCHC rule matching

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Packet parse error: {0}")]
    PacketParse(String),

    #[error("Rule validation error: {0}")]
    RuleValidation(String),

    /// A rule field declares a matching operator whose target value has the
    /// wrong variant (or is missing). Raised while matching and never
    /// downgraded to a plain mismatch.
    #[error("Field {field}: operator {operator} requires a {expected} target value")]
    TargetValueMismatch {
        field: String,
        operator: &'static str,
        expected: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, SchcError>;
