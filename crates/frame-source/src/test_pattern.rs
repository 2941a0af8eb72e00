//! Synthetic test-pattern stream for running without a camera

use crate::frame::VideoFrame;
use crate::stream::{FrameStream, StreamConnector};
use crate::{CaptureError, StreamConfig};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Produces a scrolling colour gradient at a fixed frame rate
#[derive(Debug, Clone)]
pub struct TestPatternConnector {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for TestPatternConnector {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            fps: 15,
        }
    }
}

impl StreamConnector for TestPatternConnector {
    fn connect(&self, url: &str, _config: &StreamConfig) -> Result<Box<dyn FrameStream>, CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::Open(format!(
                "invalid test pattern size {}x{}",
                self.width, self.height
            )));
        }
        debug!("Test pattern {}x{} @ {}fps standing in for {}", self.width, self.height, self.fps, url);
        Ok(Box::new(TestPatternStream {
            width: self.width,
            height: self.height,
            interval: Duration::from_secs(1) / self.fps.max(1),
            opened: Instant::now(),
            next_due: Instant::now(),
            sequence: 0,
        }))
    }
}

struct TestPatternStream {
    width: u32,
    height: u32,
    interval: Duration,
    opened: Instant,
    next_due: Instant,
    sequence: u64,
}

impl TestPatternStream {
    fn render(&self) -> Vec<u8> {
        let shift = (self.sequence % self.width as u64) as u32 * 4;
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                let r = (((x + shift) % self.width) * 255 / self.width) as u8;
                let g = (y * 255 / self.height) as u8;
                data.extend_from_slice(&[r, g, 128]);
            }
        }
        data
    }
}

impl FrameStream for TestPatternStream {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CaptureError> {
        let now = Instant::now();
        if self.next_due > now {
            thread::sleep(self.next_due - now);
        }
        self.next_due += self.interval;
        self.sequence += 1;

        let frame = VideoFrame::new(
            self.render(),
            self.width,
            self.height,
            self.opened.elapsed().as_nanos() as u64,
            self.sequence,
        );
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_frames_advance() {
        let connector = TestPatternConnector {
            width: 16,
            height: 8,
            fps: 1000,
        };
        let mut stream = connector.connect("test://", &StreamConfig::default()).unwrap();

        let first = stream.next_frame().unwrap().unwrap();
        let second = stream.next_frame().unwrap().unwrap();
        assert_eq!(first.data.len(), 16 * 8 * 3);
        assert_eq!(second.sequence, first.sequence + 1);
        assert_ne!(first.data, second.data);
    }

    #[test]
    fn test_zero_size_rejected() {
        let connector = TestPatternConnector {
            width: 0,
            height: 8,
            fps: 10,
        };
        assert!(matches!(
            connector.connect("test://", &StreamConfig::default()),
            Err(CaptureError::Open(_))
        ));
    }
}
