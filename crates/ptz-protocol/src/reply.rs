//! Reply Parsing
//!
//! Splits a camera reply into acknowledgement, completion or error, and
//! decodes inquiry payloads into typed values.

use crate::command::InquiryTopic;
use crate::error::CodecError;
use crate::variant::{payload_type, ProtocolVariant};
use crate::visca::{REPLY_ACK, REPLY_COMPLETION, REPLY_ERROR, TERMINATOR};
use std::fmt;

/// Error code carried by a VISCA error reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyErrorCode {
    MessageLength,
    Syntax,
    BufferFull,
    Cancelled,
    NoSocket,
    NotExecutable,
    Other(u8),
}

impl From<u8> for ReplyErrorCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => ReplyErrorCode::MessageLength,
            0x02 => ReplyErrorCode::Syntax,
            0x03 => ReplyErrorCode::BufferFull,
            0x04 => ReplyErrorCode::Cancelled,
            0x05 => ReplyErrorCode::NoSocket,
            0x41 => ReplyErrorCode::NotExecutable,
            other => ReplyErrorCode::Other(other),
        }
    }
}

impl fmt::Display for ReplyErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyErrorCode::MessageLength => f.write_str("message length error"),
            ReplyErrorCode::Syntax => f.write_str("syntax error"),
            ReplyErrorCode::BufferFull => f.write_str("command buffer full"),
            ReplyErrorCode::Cancelled => f.write_str("command cancelled"),
            ReplyErrorCode::NoSocket => f.write_str("no socket"),
            ReplyErrorCode::NotExecutable => f.write_str("command not executable"),
            ReplyErrorCode::Other(code) => write!(f, "error {:02X}", code),
        }
    }
}

/// One reply message from the camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack { socket: u8 },
    /// Command finished; on socket 0 the payload answers an inquiry
    Completion { socket: u8, payload: Vec<u8> },
    Error { socket: u8, code: ReplyErrorCode },
    /// Sony control reply (sequence reset acknowledgement)
    Control { payload: Vec<u8> },
}

impl Reply {
    /// Inquiry answers (and inquiry errors) always come back on socket 0
    pub fn answers_inquiry(&self) -> bool {
        matches!(
            self,
            Reply::Completion { socket: 0, .. } | Reply::Error { socket: 0, .. }
        )
    }
}

/// A reply plus the sequence number its framing carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFrame {
    pub sequence: Option<u32>,
    pub reply: Reply,
}

/// Decode one complete reply message
pub fn decode_reply(variant: ProtocolVariant, bytes: &[u8]) -> Result<ReplyFrame, CodecError> {
    let (kind, sequence, payload) = variant.spec().framing.unwrap(bytes)?;

    match kind {
        Some(payload_type::CONTROL_REPLY) => {
            return Ok(ReplyFrame {
                sequence,
                reply: Reply::Control {
                    payload: payload.to_vec(),
                },
            });
        }
        Some(payload_type::REPLY) | None => {}
        Some(other) => {
            return Err(CodecError::protocol(format!(
                "unexpected payload type {:04X}",
                other
            )))
        }
    }

    if payload.len() < 3 {
        return Err(CodecError::protocol(format!(
            "reply truncated: {} bytes",
            payload.len()
        )));
    }
    if payload[0] != variant.reply_header_byte() {
        return Err(CodecError::protocol(format!(
            "unexpected reply address {:02X}",
            payload[0]
        )));
    }
    if payload[payload.len() - 1] != TERMINATOR {
        return Err(CodecError::protocol("reply missing terminator"));
    }

    let status = payload[1];
    let socket = status & 0x0F;
    let body = &payload[2..payload.len() - 1];
    let reply = match status & 0xF0 {
        REPLY_ACK => Reply::Ack { socket },
        REPLY_COMPLETION => Reply::Completion {
            socket,
            payload: body.to_vec(),
        },
        REPLY_ERROR => match body {
            [code] => Reply::Error {
                socket,
                code: ReplyErrorCode::from(*code),
            },
            _ => return Err(CodecError::protocol("error reply without code")),
        },
        other => {
            return Err(CodecError::protocol(format!(
                "unknown reply type {:02X}",
                other
            )))
        }
    };

    Ok(ReplyFrame { sequence, reply })
}

/// Decoded inquiry answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InquiryValue {
    FocusMode { auto: bool },
    ZoomPosition(u16),
    PanTiltPosition { pan: i32, tilt: i32 },
    /// Payload did not match the topic's documented layout
    Unparseable,
}

/// Result of one inquiry round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryResult {
    pub topic: InquiryTopic,
    /// Payload bytes between the reply status byte and the terminator
    pub raw: Vec<u8>,
    pub value: InquiryValue,
}

impl InquiryResult {
    pub fn is_parsed(&self) -> bool {
        self.value != InquiryValue::Unparseable
    }

    pub fn auto_focus(&self) -> Option<bool> {
        match self.value {
            InquiryValue::FocusMode { auto } => Some(auto),
            _ => None,
        }
    }
}

/// Combine low nibbles (0p 0q 0r ...) into an integer; `None` if any high nibble is set.
fn nibbles_to_int(nibbles: &[u8], signed: bool) -> Option<i64> {
    if nibbles.is_empty() || nibbles.iter().any(|n| n & 0xF0 != 0) {
        return None;
    }
    let mut r: i64 = 0;
    for n in nibbles {
        r = (r << 4) + *n as i64;
    }
    if signed && r & (0x8 << (4 * nibbles.len() - 4)) != 0 {
        r -= 0x1 << (4 * nibbles.len());
    }
    Some(r)
}

/// Interpret an inquiry payload for `topic`. Never fails: payloads that do not
/// fit the documented layout come back as [`InquiryValue::Unparseable`].
pub fn decode_inquiry(variant: ProtocolVariant, topic: InquiryTopic, payload: &[u8]) -> InquiryResult {
    let spec = variant.spec();
    let value = match topic {
        InquiryTopic::FocusMode => match payload {
            [mode] if *mode == spec.focus_auto => InquiryValue::FocusMode { auto: true },
            [mode] if *mode == spec.focus_manual => InquiryValue::FocusMode { auto: false },
            _ => InquiryValue::Unparseable,
        },
        InquiryTopic::ZoomPosition if payload.len() == 4 => nibbles_to_int(payload, false)
            .map(|zoom| InquiryValue::ZoomPosition(zoom as u16))
            .unwrap_or(InquiryValue::Unparseable),
        InquiryTopic::PanTiltPosition if payload.len() == spec.pan_position_nibbles + 4 => {
            let (pan, tilt) = payload.split_at(spec.pan_position_nibbles);
            match (nibbles_to_int(pan, true), nibbles_to_int(tilt, true)) {
                (Some(pan), Some(tilt)) => InquiryValue::PanTiltPosition {
                    pan: pan as i32,
                    tilt: tilt as i32,
                },
                _ => InquiryValue::Unparseable,
            }
        }
        _ => InquiryValue::Unparseable,
    };

    InquiryResult {
        topic,
        raw: payload.to_vec(),
        value,
    }
}
