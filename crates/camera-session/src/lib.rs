//! PTZ Camera Session
//!
//! One persistent control connection per camera. Commands from any number of
//! tasks are serialized onto the wire in submission order; inquiry answers are
//! matched back to the waiting caller by a background reply task.

mod error;
mod link;
mod session;

pub use error::SessionError;
pub use session::{CameraSession, SendOutcome, SessionSettings};
