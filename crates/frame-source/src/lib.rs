//! Frame Source
//!
//! Pulls video from one streaming endpoint on a dedicated capture thread and
//! publishes only the newest decoded frame. Readers poll [`FrameSource::latest_frame`]
//! or watch a [`LatestFrame`] receiver; neither ever blocks the capture loop.
//!
//! Backends:
//! - RTSP through ffmpeg (`rtsp` feature)
//! - Synthetic test pattern, for running without a camera

pub mod frame;
pub mod latest;
pub mod source;
pub mod stream;
pub mod test_pattern;

#[cfg(feature = "rtsp")]
pub mod rtsp;

pub use frame::VideoFrame;
pub use latest::LatestFrame;
pub use source::{FrameSource, SourceState};
pub use stream::{FrameStream, StreamConnector};
pub use test_pattern::TestPatternConnector;

#[cfg(feature = "rtsp")]
pub use rtsp::RtspConnector;

use std::time::Duration;
use thiserror::Error;

/// Capture error types
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open stream: {0}")]
    Open(String),

    /// One frame could not be decoded; the stream itself is still usable
    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    /// No data within the read timeout
    #[error("Stream read timeout")]
    Timeout,

    #[error("Stream unavailable")]
    Unavailable,
}

/// Stream connection settings
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub connect_timeout: Duration,
    /// Upper bound on one blocking read; also bounds how long `stop()` waits
    pub read_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(2),
        }
    }
}
