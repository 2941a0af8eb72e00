//! Codec Error Types

use thiserror::Error;

/// Errors raised while encoding commands or decoding replies
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Command argument outside the dialect's legal range; nothing is sent
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    InvalidParameter {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// Truncated, mis-addressed or unrecognized frame
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl CodecError {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        CodecError::Protocol(reason.into())
    }
}
