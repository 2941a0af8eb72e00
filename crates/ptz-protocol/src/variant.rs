//! Protocol Variant Definitions
//!
//! Every dialect-specific number lives in a [`VariantSpec`] table. The codec
//! and the session only ever read these tables.

use crate::error::CodecError;
use std::fmt;

/// Supported camera control dialects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProtocolVariant {
    /// PTZOptics VISCA over TCP (raw VISCA, port 5678)
    #[default]
    PtzOptics,
    /// Sony VISCA over IP (UDP, 8-byte header with sequence number, port 52381)
    SonyViscaIp,
}

/// Transport used by the control connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

/// How VISCA payloads are wrapped on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Bare VISCA; messages are delimited by the 0xFF terminator
    Raw,
    /// Sony header: payload type (u16), payload length (u16), sequence (u32)
    SonyHeader,
}

/// Per-dialect wire table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSpec {
    /// Name used in camera lists
    pub name: &'static str,
    pub transport: Transport,
    pub framing: Framing,
    /// Default control port
    pub control_port: u16,
    /// VISCA device address (1 for single-camera IP links)
    pub address: u8,
    pub pan_speed_max: u8,
    pub tilt_speed_max: u8,
    pub preset_min: u8,
    pub preset_max: u8,
    /// Digits used for the pan value in a position inquiry reply
    pub pan_position_nibbles: usize,
    /// Focus-mode inquiry/command byte meaning "auto"
    pub focus_auto: u8,
    /// Focus-mode inquiry/command byte meaning "manual"
    pub focus_manual: u8,
}

const PTZOPTICS: VariantSpec = VariantSpec {
    name: "ptzoptics",
    transport: Transport::Tcp,
    framing: Framing::Raw,
    control_port: 5678,
    address: 1,
    pan_speed_max: 0x18,
    tilt_speed_max: 0x14,
    preset_min: 0,
    preset_max: 127,
    pan_position_nibbles: 4,
    focus_auto: 0x02,
    focus_manual: 0x03,
};

const SONY_VISCA_IP: VariantSpec = VariantSpec {
    name: "sony-visca-ip",
    transport: Transport::Udp,
    framing: Framing::SonyHeader,
    control_port: 52381,
    address: 1,
    pan_speed_max: 0x18,
    tilt_speed_max: 0x17,
    preset_min: 0,
    preset_max: 99,
    pan_position_nibbles: 5,
    focus_auto: 0x02,
    focus_manual: 0x03,
};

impl ProtocolVariant {
    /// All known dialects
    pub const ALL: [ProtocolVariant; 2] = [ProtocolVariant::PtzOptics, ProtocolVariant::SonyViscaIp];

    /// Get the wire table for this dialect
    pub fn spec(&self) -> &'static VariantSpec {
        match self {
            ProtocolVariant::PtzOptics => &PTZOPTICS,
            ProtocolVariant::SonyViscaIp => &SONY_VISCA_IP,
        }
    }

    /// Look up a dialect by the name used in camera lists
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ptzoptics" | "ptz-optics" | "visca-tcp" => Some(ProtocolVariant::PtzOptics),
            "sony-visca-ip" | "sony" | "visca-ip" => Some(ProtocolVariant::SonyViscaIp),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    /// First byte of every message sent to the camera
    pub fn header_byte(&self) -> u8 {
        0x80 | self.spec().address
    }

    /// First byte of every message the camera sends back
    pub fn reply_header_byte(&self) -> u8 {
        0x80 | (self.spec().address << 4)
    }

    /// Whether replies carry a sequence number that must match the request
    pub fn correlates_by_sequence(&self) -> bool {
        self.spec().framing == Framing::SonyHeader
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sony VISCA-over-IP payload types
pub(crate) mod payload_type {
    pub const COMMAND: u16 = 0x0100;
    pub const INQUIRY: u16 = 0x0110;
    pub const REPLY: u16 = 0x0111;
    pub const CONTROL: u16 = 0x0200;
    pub const CONTROL_REPLY: u16 = 0x0201;
}

const SONY_HEADER_LEN: usize = 8;

impl Framing {
    /// Wrap a VISCA payload for the wire
    pub(crate) fn wrap(&self, kind: u16, sequence: u32, payload: Vec<u8>) -> Vec<u8> {
        match self {
            Framing::Raw => payload,
            Framing::SonyHeader => {
                let mut out = Vec::with_capacity(SONY_HEADER_LEN + payload.len());
                out.extend_from_slice(&kind.to_be_bytes());
                out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
                out.extend_from_slice(&sequence.to_be_bytes());
                out.extend_from_slice(&payload);
                out
            }
        }
    }

    /// Strip the wire framing, returning (payload type, sequence, payload)
    pub(crate) fn unwrap<'a>(&self, bytes: &'a [u8]) -> Result<(Option<u16>, Option<u32>, &'a [u8]), CodecError> {
        match self {
            Framing::Raw => Ok((None, None, bytes)),
            Framing::SonyHeader => {
                if bytes.len() < SONY_HEADER_LEN {
                    return Err(CodecError::protocol(format!(
                        "header truncated: {} bytes",
                        bytes.len()
                    )));
                }
                let kind = u16::from_be_bytes([bytes[0], bytes[1]]);
                let len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
                let sequence = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
                let payload = &bytes[SONY_HEADER_LEN..];
                if payload.len() != len {
                    return Err(CodecError::protocol(format!(
                        "payload length {} does not match header {}",
                        payload.len(),
                        len
                    )));
                }
                Ok((Some(kind), Some(sequence), payload))
            }
        }
    }
}
