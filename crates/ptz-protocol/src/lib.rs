//! PTZ Camera Control Protocol
//!
//! Pure encode/decode of VISCA-family pan-tilt-zoom commands and inquiry
//! replies. No I/O happens here: the session crate owns the connection and
//! feeds bytes in and out of this codec.
//!
//! Wire layouts differ per device dialect and are looked up from the
//! [`ProtocolVariant`] table, so adding a dialect never touches session code.

mod command;
mod endpoint;
mod error;
mod reply;
mod variant;

pub use command::{
    decode_command, encode, encode_sequence_reset, FocusDirection, InquiryTopic, PanTiltDirection, PtzCommand,
    ZoomDirection,
};
pub use endpoint::CameraEndpoint;
pub use error::CodecError;
pub use reply::{
    decode_inquiry, decode_reply, InquiryResult, InquiryValue, Reply, ReplyErrorCode, ReplyFrame,
};
pub use variant::{Framing, ProtocolVariant, Transport, VariantSpec};

/// VISCA message constants shared by every dialect
pub mod visca {
    /// Terminator closing every VISCA message
    pub const TERMINATOR: u8 = 0xFF;
    /// Category byte for commands
    pub const COMMAND: u8 = 0x01;
    /// Category byte for inquiries
    pub const INQUIRY: u8 = 0x09;
    /// Reply nibble for an acknowledgement
    pub const REPLY_ACK: u8 = 0x40;
    /// Reply nibble for a completion (or inquiry answer on socket 0)
    pub const REPLY_COMPLETION: u8 = 0x50;
    /// Reply nibble for an error
    pub const REPLY_ERROR: u8 = 0x60;
}
