//! Camera Registry
//!
//! Holds the configured cameras and the one that is currently active. Switching
//! tears down the active control session and preview, then builds both for the
//! new camera; a failed build leaves no active camera.

pub mod config;
pub mod registry;

pub use config::{default_endpoints, load_cameras, parse_cameras, DEFAULT_CAMERA_HOST};
pub use registry::{ActivateOutcome, CameraRegistry, RegistrySettings};

use camera_session::SessionError;
use frame_source::CaptureError;
use thiserror::Error;

/// Registry error types
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Camera session error: {0}")]
    Session(#[from] SessionError),

    #[error("Frame source error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Camera list error: {0}")]
    Config(String),
}
