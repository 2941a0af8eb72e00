//! Camera endpoint identity

use crate::variant::ProtocolVariant;
use std::borrow::Cow;
use std::fmt;
use std::net::Ipv6Addr;

/// RTSP port used for the preview stream
pub const STREAM_PORT: u16 = 554;
/// SD sub-stream path
pub const STREAM_PATH: &str = "/2";

/// One physical camera: its address and the dialect it speaks.
///
/// Immutable once built; the builder methods consume and return a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CameraEndpoint {
    host: String,
    variant: ProtocolVariant,
    control_port: Option<u16>,
}

impl CameraEndpoint {
    pub fn new(host: impl Into<String>, variant: ProtocolVariant) -> Self {
        Self {
            host: host.into().trim().to_string(),
            variant,
            control_port: None,
        }
    }

    /// Override the dialect's default control port
    pub fn with_control_port(mut self, port: u16) -> Self {
        self.control_port = Some(port);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
            .unwrap_or_else(|| self.variant.spec().control_port)
    }

    /// Host as it appears before `:port`; IPv6 literals get brackets
    fn authority_host(&self) -> Cow<'_, str> {
        match self.host.parse::<Ipv6Addr>() {
            Ok(_) => Cow::Owned(format!("[{}]", self.host)),
            Err(_) => Cow::Borrowed(&self.host),
        }
    }

    /// `host:port` of the control connection
    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.authority_host(), self.control_port())
    }

    /// Preview stream URL derived from the camera address
    pub fn stream_url(&self) -> String {
        format!("rtsp://{}:{}{}", self.authority_host(), STREAM_PORT, STREAM_PATH)
    }
}

impl fmt::Display for CameraEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.control_addr(), self.variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        let cam = CameraEndpoint::new(" 192.168.0.126 ", ProtocolVariant::PtzOptics);
        assert_eq!(cam.host(), "192.168.0.126");
        assert_eq!(cam.control_addr(), "192.168.0.126:5678");
        assert_eq!(cam.stream_url(), "rtsp://192.168.0.126:554/2");

        let sony = CameraEndpoint::new("10.0.0.5", ProtocolVariant::SonyViscaIp);
        assert_eq!(sony.control_port(), 52381);
    }

    #[test]
    fn test_port_override() {
        let cam = CameraEndpoint::new("127.0.0.1", ProtocolVariant::PtzOptics).with_control_port(1259);
        assert_eq!(cam.control_addr(), "127.0.0.1:1259");
        assert_eq!(cam.stream_url(), "rtsp://127.0.0.1:554/2");
    }

    #[test]
    fn test_ipv6_host_is_bracketed() {
        let cam = CameraEndpoint::new("fe80::1", ProtocolVariant::PtzOptics);
        assert_eq!(cam.host(), "fe80::1");
        assert_eq!(cam.control_addr(), "[fe80::1]:5678");
        assert_eq!(cam.stream_url(), "rtsp://[fe80::1]:554/2");

        let named = CameraEndpoint::new("cam-1.local", ProtocolVariant::SonyViscaIp);
        assert_eq!(named.control_addr(), "cam-1.local:52381");
    }
}
