use thiserror::Error;

/// Shared lightweight error type for core primitive operations.
#[derive(Debug, Error)]
pub enum ArgusError {
    /// Invalid caller input or malformed primitive value.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Unknown wire name for an enum-like value.
    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
