use thiserror::Error;

/// Errors returned by strict characteristic parsers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Frame shorter than the mandatory fields.
    #[error("frame too short: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
    /// Flags announce an optional field the frame does not carry.
    #[error("missing optional field: {0}")]
    MissingField(&'static str),
}
