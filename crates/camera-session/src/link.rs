//! Control link transport
//!
//! Opens the TCP or UDP connection a dialect calls for and splits it into a
//! write half (owned by the session) and a read half (owned by the reply task).

use crate::error::SessionError;
use ptz_protocol::{CameraEndpoint, Framing, Transport};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::time::timeout;

/// Longest reply we accept before declaring the stream garbage
const MAX_PENDING_BYTES: usize = 256;
const SONY_HEADER_LEN: usize = 8;

pub(crate) enum LinkWriter {
    Tcp(OwnedWriteHalf),
    Udp(Arc<UdpSocket>),
}

pub(crate) enum LinkReader {
    Tcp { half: OwnedReadHalf, buf: Vec<u8> },
    Udp(Arc<UdpSocket>),
}

/// Open the control link for `endpoint` within `connect_timeout`
pub(crate) async fn open(
    endpoint: &CameraEndpoint,
    connect_timeout: Duration,
) -> Result<(LinkReader, LinkWriter), SessionError> {
    let addr = endpoint.control_addr();
    let timed_out = || {
        SessionError::connection(
            endpoint,
            format!("timed out after {}ms", connect_timeout.as_millis()),
        )
    };

    match endpoint.variant().spec().transport {
        Transport::Tcp => {
            let stream = timeout(connect_timeout, TcpStream::connect(&addr))
                .await
                .map_err(|_| timed_out())?
                .map_err(|e| SessionError::connection(endpoint, e))?;
            stream
                .set_nodelay(true)
                .map_err(|e| SessionError::connection(endpoint, e))?;
            let (read, write) = stream.into_split();
            Ok((
                LinkReader::Tcp {
                    half: read,
                    buf: Vec::new(),
                },
                LinkWriter::Tcp(write),
            ))
        }
        Transport::Udp => {
            let remote = timeout(connect_timeout, resolve(&addr))
                .await
                .map_err(|_| timed_out())?
                .map_err(|e| SessionError::connection(endpoint, e))?;
            let local = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
            let socket = UdpSocket::bind(local)
                .await
                .map_err(|e| SessionError::connection(endpoint, e))?;
            socket
                .connect(remote)
                .await
                .map_err(|e| SessionError::connection(endpoint, e))?;
            let socket = Arc::new(socket);
            Ok((LinkReader::Udp(socket.clone()), LinkWriter::Udp(socket)))
        }
    }
}

async fn resolve(addr: &str) -> io::Result<SocketAddr> {
    lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {}", addr)))
}

impl LinkWriter {
    pub(crate) async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            LinkWriter::Tcp(half) => half.write_all(bytes).await,
            LinkWriter::Udp(socket) => socket.send(bytes).await.map(|_| ()),
        }
    }

    pub(crate) async fn shutdown(&mut self) {
        if let LinkWriter::Tcp(half) = self {
            let _ = half.shutdown().await;
        }
    }
}

impl LinkReader {
    /// Next complete message, or `None` once the peer closed the stream
    pub(crate) async fn next_message(&mut self, framing: Framing) -> io::Result<Option<Vec<u8>>> {
        match self {
            LinkReader::Udp(socket) => {
                let mut datagram = vec![0u8; 1500];
                let n = socket.recv(&mut datagram).await?;
                datagram.truncate(n);
                Ok(Some(datagram))
            }
            LinkReader::Tcp { half, buf } => {
                let mut chunk = [0u8; 256];
                loop {
                    if let Some(message) = take_message(buf, framing) {
                        return Ok(Some(message));
                    }
                    if buf.len() > MAX_PENDING_BYTES {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "reply stream lost framing",
                        ));
                    }
                    let n = half.read(&mut chunk).await?;
                    if n == 0 {
                        return Ok(None);
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }
}

/// Split one complete message off the front of `buf`
fn take_message(buf: &mut Vec<u8>, framing: Framing) -> Option<Vec<u8>> {
    let end = match framing {
        Framing::Raw => buf.iter().position(|b| *b == ptz_protocol::visca::TERMINATOR)? + 1,
        Framing::SonyHeader => {
            if buf.len() < SONY_HEADER_LEN {
                return None;
            }
            let len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
            if buf.len() < SONY_HEADER_LEN + len {
                return None;
            }
            SONY_HEADER_LEN + len
        }
    };
    Some(buf.drain(..end).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_raw_messages() {
        let mut buf = vec![0x90, 0x41, 0xFF, 0x90, 0x51, 0xFF, 0x90];
        assert_eq!(take_message(&mut buf, Framing::Raw), Some(vec![0x90, 0x41, 0xFF]));
        assert_eq!(take_message(&mut buf, Framing::Raw), Some(vec![0x90, 0x51, 0xFF]));
        assert_eq!(take_message(&mut buf, Framing::Raw), None);
        assert_eq!(buf, vec![0x90]);
    }

    #[test]
    fn test_take_sony_message_waits_for_payload() {
        let mut buf = vec![0x01, 0x11, 0x00, 0x03, 0, 0, 0, 1, 0x90, 0x41];
        assert_eq!(take_message(&mut buf, Framing::SonyHeader), None);
        buf.push(0xFF);
        assert_eq!(take_message(&mut buf, Framing::SonyHeader).map(|m| m.len()), Some(11));
        assert!(buf.is_empty());
    }
}
