//! Frame source lifecycle and capture loop

use crate::frame::VideoFrame;
use crate::latest::LatestFrame;
use crate::stream::{FrameStream, StreamConnector};
use crate::{CaptureError, StreamConfig};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace, warn};

/// Lifecycle: `Stopped -> Starting -> Running -> Stopping -> Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceState::Stopped => "stopped",
            SourceState::Starting => "starting",
            SourceState::Running => "running",
            SourceState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// State shared with the capture thread
struct Shared {
    state: watch::Sender<SourceState>,
    latest: LatestFrame,
    stop: AtomicBool,
    live: AtomicBool,
    published: AtomicU64,
    skipped: AtomicU64,
}

impl Shared {
    fn finish(&self) {
        self.live.store(false, Ordering::Release);
        self.state.send_replace(SourceState::Stopped);
    }
}

/// Continuous capture from one stream URL
pub struct FrameSource {
    url: String,
    config: StreamConfig,
    connector: Arc<dyn StreamConnector>,
    shared: Arc<Shared>,
}

impl FrameSource {
    pub fn new(url: impl Into<String>, config: StreamConfig, connector: Arc<dyn StreamConnector>) -> Self {
        let (state, _) = watch::channel(SourceState::Stopped);
        Self {
            url: url.into(),
            config,
            connector,
            shared: Arc::new(Shared {
                state,
                latest: LatestFrame::new(),
                stop: AtomicBool::new(false),
                live: AtomicBool::new(false),
                published: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
            }),
        }
    }

    /// Open the stream and launch the capture thread.
    ///
    /// Resolves once the stream is open (`Running`) or has failed (`Stopped`).
    /// Never retries. Starting an already running source is a no-op; starting
    /// one that is mid-transition fails with [`CaptureError::Unavailable`].
    pub async fn start(&self) -> Result<(), CaptureError> {
        let mut current = SourceState::Stopped;
        let begun = self.shared.state.send_if_modified(|state| {
            current = *state;
            if *state != SourceState::Stopped {
                return false;
            }
            self.shared.stop.store(false, Ordering::Release);
            *state = SourceState::Starting;
            true
        });
        if !begun {
            return match current {
                SourceState::Running => Ok(()),
                _ => Err(CaptureError::Unavailable),
            };
        }

        info!("Starting frame source {}", self.url);
        self.shared.latest.clear();

        let (ready_tx, ready_rx) = oneshot::channel();
        let shared = self.shared.clone();
        let connector = self.connector.clone();
        let url = self.url.clone();
        let config = self.config.clone();
        let spawned = thread::Builder::new()
            .name("frame-capture".into())
            .spawn(move || capture_thread(shared, connector, url, config, ready_tx));

        if let Err(e) = spawned {
            self.shared.finish();
            return Err(CaptureError::Open(format!("capture thread: {}", e)));
        }

        ready_rx.await.unwrap_or(Err(CaptureError::Unavailable))
    }

    /// Ask the capture loop to exit and wait until it has. Works while
    /// `start()` is still connecting; no frame is published after this returns.
    pub async fn stop(&self) {
        let mut state_rx = self.shared.state.subscribe();
        let stopping = self.shared.state.send_if_modified(|state| match state {
            SourceState::Starting | SourceState::Running => {
                self.shared.stop.store(true, Ordering::Release);
                *state = SourceState::Stopping;
                true
            }
            _ => false,
        });
        if stopping {
            info!("Stopping frame source {}", self.url);
        }
        let _ = state_rx.wait_for(|state| *state == SourceState::Stopped).await;
    }

    /// Newest published frame, or `None` before the first one
    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.shared.latest.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<VideoFrame>>> {
        self.shared.latest.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<SourceState> {
        self.shared.state.subscribe()
    }

    pub fn state(&self) -> SourceState {
        *self.shared.state.borrow()
    }

    /// True while the capture loop holds an open stream
    pub fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::Acquire)
    }

    pub fn frames_published(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    pub fn frames_skipped(&self) -> u64 {
        self.shared.skipped.load(Ordering::Relaxed)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
    }
}

fn capture_thread(
    shared: Arc<Shared>,
    connector: Arc<dyn StreamConnector>,
    url: String,
    config: StreamConfig,
    ready: oneshot::Sender<Result<(), CaptureError>>,
) {
    let mut stream = match connector.connect(&url, &config) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Frame source {} failed to open: {}", url, e);
            shared.finish();
            let _ = ready.send(Err(e));
            return;
        }
    };

    let running = shared.state.send_if_modified(|state| {
        if *state != SourceState::Starting {
            return false;
        }
        *state = SourceState::Running;
        true
    });
    if !running {
        debug!("Frame source {} stopped while connecting", url);
        drop(stream);
        shared.finish();
        let _ = ready.send(Err(CaptureError::Unavailable));
        return;
    }

    shared.live.store(true, Ordering::Release);
    info!("Frame source running: {}", url);
    let _ = ready.send(Ok(()));

    run_loop(&shared, stream.as_mut(), &url);

    drop(stream);
    shared.finish();
    info!(
        "Frame source stopped: {} ({} frames, {} skipped)",
        url,
        shared.published.load(Ordering::Relaxed),
        shared.skipped.load(Ordering::Relaxed)
    );
}

fn run_loop(shared: &Shared, stream: &mut dyn FrameStream, url: &str) {
    while !shared.stop.load(Ordering::Acquire) {
        match stream.next_frame() {
            Ok(Some(frame)) => {
                if shared.stop.load(Ordering::Acquire) {
                    break;
                }
                shared.latest.publish(frame);
                shared.published.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {
                info!("Stream {} ended", url);
                break;
            }
            Err(CaptureError::Timeout) => trace!("Stream {} read timeout", url),
            Err(CaptureError::Decode(reason)) => {
                shared.skipped.fetch_add(1, Ordering::Relaxed);
                warn!("Skipping corrupt frame from {}: {}", url, reason);
            }
            Err(e) => {
                warn!("Stream {} dropped: {}", url, e);
                break;
            }
        }
    }
}
