//! Camera Session Error Types

use ptz_protocol::{CameraEndpoint, CodecError, ReplyErrorCode};
use thiserror::Error;

/// Errors surfaced by [`crate::CameraSession`]. The session never retries.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Command rejected before any I/O
    #[error("Invalid command: {0}")]
    InvalidParameter(CodecError),

    /// Control connection could not be opened or failed mid-write
    #[error("Connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    /// Malformed or unexpected reply
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Camera answered with a VISCA error
    #[error("Camera rejected command: {0}")]
    Rejected(ReplyErrorCode),

    /// Bounded wait exceeded
    #[error("Timeout waiting for camera after {0}ms")]
    Timeout(u64),

    /// Session was closed or its connection is gone
    #[error("Camera session is closed")]
    SessionClosed,
}

impl SessionError {
    pub(crate) fn connection(endpoint: &CameraEndpoint, reason: impl ToString) -> Self {
        SessionError::Connection {
            addr: endpoint.control_addr(),
            reason: reason.to_string(),
        }
    }
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::InvalidParameter { .. } => SessionError::InvalidParameter(err),
            CodecError::Protocol(reason) => SessionError::Protocol(reason),
        }
    }
}
