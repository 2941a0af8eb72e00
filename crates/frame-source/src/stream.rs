//! Stream backend traits

use crate::frame::VideoFrame;
use crate::{CaptureError, StreamConfig};

/// An open video stream, driven from the capture thread only.
pub trait FrameStream {
    /// Block for the next decoded frame.
    ///
    /// - `Ok(None)`: end of stream
    /// - `Err(Timeout)`: nothing arrived within the read timeout; try again
    /// - `Err(Decode)`: one frame was corrupt; the stream is still usable
    /// - any other error: the connection is gone
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CaptureError>;
}

/// Opens streams. Called on the capture thread, so it may block up to the
/// connect timeout.
pub trait StreamConnector: Send + Sync {
    fn connect(&self, url: &str, config: &StreamConfig) -> Result<Box<dyn FrameStream>, CaptureError>;
}
