//! Latest-value cell
//!
//! One writer (the capture loop), any number of readers. Publishing replaces
//! the previous frame; nothing queues. Frames are shared as `Arc`, so a reader
//! holds either the old complete frame or the new complete one.

use crate::frame::VideoFrame;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct LatestFrame {
    latest: Arc<watch::Sender<Option<Arc<VideoFrame>>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(None);
        Self {
            latest: Arc::new(sender),
        }
    }

    pub fn publish(&self, frame: VideoFrame) {
        self.latest.send_replace(Some(Arc::new(frame)));
    }

    pub fn clear(&self) {
        self.latest.send_replace(None);
    }

    /// Non-blocking snapshot of the newest frame
    pub fn get(&self) -> Option<Arc<VideoFrame>> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<VideoFrame>>> {
        self.latest.subscribe()
    }
}

impl Default for LatestFrame {
    fn default() -> Self {
        Self::new()
    }
}
