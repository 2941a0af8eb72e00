//! Active camera bookkeeping and switching

use crate::RegistryError;
use camera_session::{CameraSession, SessionSettings};
use frame_source::{FrameSource, StreamConfig, StreamConnector};
use ptz_protocol::CameraEndpoint;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Timeouts handed to every session and frame source the registry builds
#[derive(Debug, Clone, Default)]
pub struct RegistrySettings {
    pub session: SessionSettings,
    pub stream: StreamConfig,
}

/// What `activate` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivateOutcome {
    /// Old camera torn down, new camera running
    Activated,
    /// Index out of range or already active; nothing touched
    Unchanged,
}

struct ActiveCamera {
    index: usize,
    endpoint: CameraEndpoint,
    session: Arc<CameraSession>,
    frames: Arc<FrameSource>,
}

#[derive(Default)]
struct RegistryState {
    endpoints: Vec<CameraEndpoint>,
    active: Option<ActiveCamera>,
}

pub struct CameraRegistry {
    settings: RegistrySettings,
    connector: Arc<dyn StreamConnector>,
    /// Serializes activate/shutdown
    switch: tokio::sync::Mutex<()>,
    state: RwLock<RegistryState>,
}

impl CameraRegistry {
    pub fn new(settings: RegistrySettings, connector: Arc<dyn StreamConnector>) -> Self {
        Self {
            settings,
            connector,
            switch: tokio::sync::Mutex::new(()),
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Build a registry over `endpoints` and bring up the first camera.
    /// A failure to bring it up is logged and leaves no active camera.
    pub async fn open(
        endpoints: Vec<CameraEndpoint>,
        settings: RegistrySettings,
        connector: Arc<dyn StreamConnector>,
    ) -> Self {
        let registry = Self::new(settings, connector);
        registry.load(endpoints);
        registry.activate_first().await;
        registry
    }

    /// Bring up camera 0 if the list has one, logging a failure
    pub async fn activate_first(&self) {
        if self.read().endpoints.is_empty() {
            return;
        }
        if let Err(e) = self.activate(0).await {
            warn!("Initial camera unavailable: {}", e);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the known cameras. The active camera keeps running.
    pub fn load(&self, endpoints: Vec<CameraEndpoint>) {
        debug!("Camera list now has {} entries", endpoints.len());
        self.write().endpoints = endpoints;
    }

    /// Make camera `index` (0-based) the active one.
    ///
    /// Out-of-range and already-active indices are no-ops. Otherwise the current
    /// camera is stopped and closed first, ignoring its failures, then the new
    /// session and preview are built. If that build fails, the error is returned
    /// and no camera is active.
    pub async fn activate(&self, index: usize) -> Result<ActivateOutcome, RegistryError> {
        let _switch = self.switch.lock().await;

        let endpoint = {
            let state = self.read();
            let Some(endpoint) = state.endpoints.get(index).cloned() else {
                debug!("Ignoring switch to unknown camera {}", index + 1);
                return Ok(ActivateOutcome::Unchanged);
            };
            let already_active = state
                .active
                .as_ref()
                .is_some_and(|active| active.index == index && active.endpoint == endpoint);
            if already_active {
                return Ok(ActivateOutcome::Unchanged);
            }
            endpoint
        };

        let outgoing = self.write().active.take();
        if let Some(outgoing) = outgoing {
            teardown(outgoing).await;
        }

        info!("Activating camera {}: {}", index + 1, endpoint);
        match self.build(index, endpoint).await {
            Ok(active) => {
                self.write().active = Some(active);
                Ok(ActivateOutcome::Activated)
            }
            Err(e) => {
                warn!("Camera {} failed to activate: {}", index + 1, e);
                Err(e)
            }
        }
    }

    async fn build(&self, index: usize, endpoint: CameraEndpoint) -> Result<ActiveCamera, RegistryError> {
        let session = CameraSession::connect(endpoint.clone(), self.settings.session.clone()).await?;

        let frames = FrameSource::new(
            endpoint.stream_url(),
            self.settings.stream.clone(),
            self.connector.clone(),
        );
        if let Err(e) = frames.start().await {
            session.close().await;
            return Err(e.into());
        }

        Ok(ActiveCamera {
            index,
            endpoint,
            session: Arc::new(session),
            frames: Arc::new(frames),
        })
    }

    /// Stop and close the active camera. Idempotent.
    pub async fn shutdown(&self) {
        let _switch = self.switch.lock().await;
        let outgoing = self.write().active.take();
        if let Some(outgoing) = outgoing {
            teardown(outgoing).await;
        }
    }

    /// Control session of the active camera
    pub fn session(&self) -> Option<Arc<CameraSession>> {
        self.read().active.as_ref().map(|a| a.session.clone())
    }

    /// Preview source of the active camera
    pub fn frame_source(&self) -> Option<Arc<FrameSource>> {
        self.read().active.as_ref().map(|a| a.frames.clone())
    }

    pub fn active_index(&self) -> Option<usize> {
        self.read().active.as_ref().map(|a| a.index)
    }

    pub fn active_endpoint(&self) -> Option<CameraEndpoint> {
        self.read().active.as_ref().map(|a| a.endpoint.clone())
    }

    pub fn endpoints(&self) -> Vec<CameraEndpoint> {
        self.read().endpoints.clone()
    }
}

/// Best-effort teardown: preview first, then the control connection.
/// Neither step can fail; a dead camera never blocks switching away.
async fn teardown(camera: ActiveCamera) {
    info!("Releasing camera {}: {}", camera.index + 1, camera.endpoint);
    camera.frames.stop().await;
    camera.session.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_session::SessionError;
    use frame_source::{CaptureError, FrameStream, TestPatternConnector};
    use ptz_protocol::{ProtocolVariant, PtzCommand};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, UdpSocket};

    /// Succeeds for the first `ok_calls` connects, fails afterwards
    struct CountingConnector {
        ok_calls: usize,
        calls: AtomicUsize,
    }

    impl CountingConnector {
        fn new(ok_calls: usize) -> Arc<Self> {
            Arc::new(Self {
                ok_calls,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl StreamConnector for CountingConnector {
        fn connect(&self, url: &str, config: &StreamConfig) -> Result<Box<dyn FrameStream>, CaptureError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_calls {
                return Err(CaptureError::Open(format!("{}: connection refused", url)));
            }
            let pattern = TestPatternConnector {
                width: 8,
                height: 4,
                fps: 50,
            };
            pattern.connect(url, config)
        }
    }

    fn settings() -> RegistrySettings {
        RegistrySettings {
            session: SessionSettings {
                connect_timeout: Duration::from_millis(500),
                reply_timeout: Duration::from_millis(200),
            },
            stream: StreamConfig {
                connect_timeout: Duration::from_millis(500),
                read_timeout: Duration::from_millis(100),
            },
        }
    }

    /// Fake camera control port that accepts any number of connections and
    /// swallows whatever is sent
    async fn fake_camera() -> CameraEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 64];
                    while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
                });
            }
        });
        CameraEndpoint::new("127.0.0.1", ProtocolVariant::PtzOptics).with_control_port(port)
    }

    async fn refused_camera() -> CameraEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        CameraEndpoint::new("127.0.0.1", ProtocolVariant::PtzOptics).with_control_port(port)
    }

    #[tokio::test]
    async fn test_open_activates_first_camera() {
        let a = fake_camera().await;
        let registry = CameraRegistry::open(vec![a.clone()], settings(), CountingConnector::new(usize::MAX)).await;

        assert_eq!(registry.active_index(), Some(0));
        assert_eq!(registry.active_endpoint(), Some(a));
        assert!(registry.session().is_some_and(|s| s.is_open()));
        assert!(registry.frame_source().is_some_and(|f| f.is_live()));

        assert_eq!(registry.activate(0).await.unwrap(), ActivateOutcome::Unchanged);
        assert_eq!(registry.activate(5).await.unwrap(), ActivateOutcome::Unchanged);
        assert_eq!(registry.active_index(), Some(0));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_switch_tears_down_previous_camera() {
        let (a, b) = (fake_camera().await, fake_camera().await);
        let registry = CameraRegistry::open(vec![a, b.clone()], settings(), CountingConnector::new(usize::MAX)).await;
        let old_session = registry.session().unwrap();
        let old_frames = registry.frame_source().unwrap();

        assert_eq!(registry.activate(1).await.unwrap(), ActivateOutcome::Activated);
        assert_eq!(registry.active_endpoint(), Some(b));
        assert!(!old_session.is_open());
        assert!(!old_frames.is_live());
        assert!(matches!(
            old_session.send(PtzCommand::StopMove).await,
            Err(SessionError::SessionClosed)
        ));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_control_connect_leaves_no_active_camera() {
        let (a, b) = (fake_camera().await, refused_camera().await);
        let registry = CameraRegistry::open(vec![a, b], settings(), CountingConnector::new(usize::MAX)).await;
        let old_session = registry.session().unwrap();

        let err = registry.activate(1).await.unwrap_err();
        assert!(matches!(err, RegistryError::Session(SessionError::Connection { .. })));
        assert_eq!(registry.active_index(), None);
        assert!(registry.session().is_none());
        assert!(registry.frame_source().is_none());
        assert!(!old_session.is_open());
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_active_camera() {
        let (a, b) = (fake_camera().await, fake_camera().await);
        // first stream (camera A) opens, second (camera B) fails
        let registry = CameraRegistry::open(vec![a, b], settings(), CountingConnector::new(1)).await;
        assert_eq!(registry.active_index(), Some(0));

        let err = registry.activate(1).await.unwrap_err();
        assert!(matches!(err, RegistryError::Capture(CaptureError::Open(_))));
        assert!(registry.session().is_none());
        assert_eq!(registry.active_index(), None);

        // A is not silently revived: retrying it needs a fresh stream, which fails too
        assert!(registry.activate(0).await.is_err());
        assert!(registry.session().is_none());
    }

    #[tokio::test]
    async fn test_reload_with_changed_endpoint_rebuilds() {
        let (a, b) = (fake_camera().await, fake_camera().await);
        let registry = CameraRegistry::open(vec![a], settings(), CountingConnector::new(usize::MAX)).await;

        registry.load(vec![b.clone()]);
        assert_eq!(registry.active_index(), Some(0));
        assert_eq!(registry.activate(0).await.unwrap(), ActivateOutcome::Activated);
        assert_eq!(registry.active_endpoint(), Some(b));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let a = fake_camera().await;
        let registry = CameraRegistry::open(vec![a], settings(), CountingConnector::new(usize::MAX)).await;
        let session = registry.session().unwrap();

        registry.shutdown().await;
        registry.shutdown().await;
        assert!(registry.session().is_none());
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_shutdown_after_interrupted_startup() {
        // a Sony camera that never answers keeps activation waiting
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();
        let registry = CameraRegistry::new(settings(), CountingConnector::new(usize::MAX));
        registry.load(vec![CameraEndpoint::new("127.0.0.1", ProtocolVariant::SonyViscaIp).with_control_port(port)]);

        let interrupted = tokio::time::timeout(Duration::from_millis(50), registry.activate_first()).await;
        assert!(interrupted.is_err());

        registry.shutdown().await;
        assert_eq!(registry.active_index(), None);

        registry.load(vec![fake_camera().await]);
        registry.activate_first().await;
        assert_eq!(registry.active_index(), Some(0));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_with_unreachable_camera() {
        let registry = CameraRegistry::open(vec![refused_camera().await], settings(), CountingConnector::new(usize::MAX)).await;
        assert_eq!(registry.endpoints().len(), 1);
        assert_eq!(registry.active_index(), None);
    }
}
