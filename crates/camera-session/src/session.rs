//! Camera Session
//!
//! Owns the control connection to one camera. Commands are written one at a
//! time, in the order callers obtained the write lock; only inquiries wait for
//! an answer. A background task reads every reply the camera sends.

use crate::error::SessionError;
use crate::link::{self, LinkReader, LinkWriter};
use ptz_protocol::{
    decode_inquiry, decode_reply, encode, encode_sequence_reset, CameraEndpoint, InquiryResult,
    InquiryTopic, PtzCommand, Reply, ReplyFrame,
};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, trace, warn};

/// Default timeout for opening the control connection
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;
/// Default timeout for an inquiry round trip
const DEFAULT_REPLY_TIMEOUT_MS: u64 = 1000;

/// Session timeouts
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    /// Bounds every write and every inquiry round trip
    pub reply_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            reply_timeout: Duration::from_millis(DEFAULT_REPLY_TIMEOUT_MS),
        }
    }
}

/// Result of a successful [`CameraSession::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Bytes handed to the transport; no reply awaited
    Sent,
    /// Decoded answer to an inquiry
    Inquiry(InquiryResult),
}

struct WriterState {
    link: Option<LinkWriter>,
    /// Rolling sequence for dialects whose framing carries one
    sequence: u32,
}

struct PendingInquiry {
    sequence: Option<u32>,
    reply_tx: oneshot::Sender<Reply>,
}

/// State shared with the reply task
struct Shared {
    open: AtomicBool,
    pending: Mutex<Option<PendingInquiry>>,
    /// Commands still owed their first reply (ACK or socket-0 error), for
    /// dialects whose replies carry no sequence number
    unanswered: AtomicUsize,
    last_inquiry: Mutex<HashMap<InquiryTopic, InquiryResult>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Shared {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn arm(&self, sequence: Option<u32>) -> oneshot::Receiver<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        *lock(&self.pending) = Some(PendingInquiry { sequence, reply_tx });
        reply_rx
    }

    /// Drop the pending inquiry; its waiter wakes with a closed channel
    fn disarm(&self) {
        lock(&self.pending).take();
    }

    fn mark_broken(&self, endpoint: &CameraEndpoint, reason: &str) {
        if self.open.swap(false, Ordering::AcqRel) {
            warn!("Camera session {} broken: {}", endpoint, reason);
        }
        self.disarm();
    }

    fn expect_command_reply(&self) {
        self.unanswered.fetch_add(1, Ordering::AcqRel);
    }

    /// Charge a reply to the oldest unanswered command, if there is one
    fn settle_command(&self) -> bool {
        self.unanswered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn dispatch(&self, endpoint: &CameraEndpoint, frame: ReplyFrame) {
        // Without sequence numbers a socket-0 error may belong to an earlier command.
        let for_command = frame.sequence.is_none()
            && matches!(frame.reply, Reply::Ack { .. } | Reply::Error { socket: 0, .. })
            && self.settle_command();

        if frame.reply.answers_inquiry() && !for_command {
            let mut pending = lock(&self.pending);
            let matches = pending.as_ref().is_some_and(|p| {
                p.sequence.is_none() || frame.sequence.is_none() || p.sequence == frame.sequence
            });
            if matches {
                if let Some(p) = pending.take() {
                    let _ = p.reply_tx.send(frame.reply);
                }
            } else {
                debug!("{}: unsolicited inquiry reply {:?}", endpoint, frame.reply);
            }
            return;
        }

        match frame.reply {
            Reply::Error { socket, code } => {
                warn!("{}: camera rejected command on socket {}: {}", endpoint, socket, code);
            }
            Reply::Control { payload } => debug!("{}: control reply {}", endpoint, hex(&payload)),
            other => trace!("{}: {:?}", endpoint, other),
        }
    }
}

async fn read_replies(endpoint: CameraEndpoint, mut reader: LinkReader, shared: Arc<Shared>) {
    let variant = endpoint.variant();
    loop {
        match reader.next_message(variant.spec().framing).await {
            Ok(Some(bytes)) => match decode_reply(variant, &bytes) {
                Ok(frame) => shared.dispatch(&endpoint, frame),
                Err(e) => warn!("{}: discarding reply [{}]: {}", endpoint, hex(&bytes), e),
            },
            Ok(None) => {
                shared.mark_broken(&endpoint, "connection closed by camera");
                break;
            }
            Err(e) => {
                shared.mark_broken(&endpoint, &e.to_string());
                break;
            }
        }
    }
}

async fn read_reset_answer(endpoint: &CameraEndpoint, reader: &mut LinkReader) -> io::Result<()> {
    let variant = endpoint.variant();
    loop {
        let Some(bytes) = reader.next_message(variant.spec().framing).await? else {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"));
        };
        match decode_reply(variant, &bytes) {
            Ok(ReplyFrame { reply: Reply::Control { .. }, .. }) => return Ok(()),
            Ok(frame) => trace!("{}: ignoring {:?} before reset answer", endpoint, frame.reply),
            Err(e) => debug!("{}: discarding reply [{}]: {}", endpoint, hex(&bytes), e),
        }
    }
}

async fn await_reset_answer(
    endpoint: &CameraEndpoint,
    reader: &mut LinkReader,
    deadline: Instant,
) -> Result<(), SessionError> {
    match timeout_at(deadline, read_reset_answer(endpoint, reader)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SessionError::connection(endpoint, e)),
        Err(_) => Err(SessionError::connection(endpoint, "no answer to sequence reset")),
    }
}

/// Control session to exactly one camera
pub struct CameraSession {
    endpoint: CameraEndpoint,
    settings: SessionSettings,
    writer: tokio::sync::Mutex<WriterState>,
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl CameraSession {
    /// Open the control connection. Fails with [`SessionError::Connection`] on
    /// refusal or timeout; never retries.
    pub async fn connect(
        endpoint: CameraEndpoint,
        settings: SessionSettings,
    ) -> Result<Self, SessionError> {
        info!("Connecting to camera {}", endpoint);
        let deadline = Instant::now() + settings.connect_timeout;
        let (mut reader, mut writer) = link::open(&endpoint, settings.connect_timeout).await?;

        // Datagram links have no handshake: the reset answer proves a camera is there.
        let mut sequence = 0;
        if let Some(reset) = encode_sequence_reset(endpoint.variant()) {
            writer
                .send(&reset)
                .await
                .map_err(|e| SessionError::connection(&endpoint, e))?;
            await_reset_answer(&endpoint, &mut reader, deadline).await?;
            sequence = 1;
        }

        let shared = Arc::new(Shared {
            open: AtomicBool::new(true),
            pending: Mutex::new(None),
            unanswered: AtomicUsize::new(0),
            last_inquiry: Mutex::new(HashMap::new()),
        });
        let handle = tokio::spawn(read_replies(endpoint.clone(), reader, shared.clone()));

        info!("Camera session open: {}", endpoint);
        Ok(Self {
            endpoint,
            settings,
            writer: tokio::sync::Mutex::new(WriterState {
                link: Some(writer),
                sequence,
            }),
            shared,
            reader: Mutex::new(Some(handle)),
        })
    }

    /// Encode and write one command.
    ///
    /// Motion, zoom, focus, focus-mode and preset commands return as soon as
    /// the bytes are written. Inquiries wait up to the reply timeout.
    pub async fn send(&self, command: PtzCommand) -> Result<SendOutcome, SessionError> {
        if !self.shared.is_open() {
            return Err(SessionError::SessionClosed);
        }

        let variant = self.endpoint.variant();
        let mut writer = self.writer.lock().await;
        if !self.shared.is_open() {
            return Err(SessionError::SessionClosed);
        }

        let sequence = writer.sequence;
        let wire = encode(variant, &command, sequence)?;
        writer.sequence = writer.sequence.wrapping_add(1);

        let reply_rx = if command.is_inquiry() {
            Some(self.shared.arm(variant.correlates_by_sequence().then_some(sequence)))
        } else {
            if !variant.correlates_by_sequence() {
                self.shared.expect_command_reply();
            }
            None
        };

        debug!("{}: {:?} [{}]", self.endpoint, command, hex(&wire));
        let reply_timeout = self.settings.reply_timeout;
        let link = writer.link.as_mut().ok_or(SessionError::SessionClosed)?;
        match timeout(reply_timeout, link.send(&wire)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.shared.mark_broken(&self.endpoint, &e.to_string());
                return Err(SessionError::connection(&self.endpoint, e));
            }
            Err(_) => {
                self.shared.mark_broken(&self.endpoint, "write timed out");
                return Err(SessionError::Timeout(reply_timeout.as_millis() as u64));
            }
        }

        let (PtzCommand::Inquire { topic }, Some(reply_rx)) = (command, reply_rx) else {
            return Ok(SendOutcome::Sent);
        };

        // The write lock stays held until the answer arrives: one inquiry in flight.
        let reply = match timeout(reply_timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(SessionError::SessionClosed),
            Err(_) => {
                self.shared.disarm();
                return Err(SessionError::Timeout(reply_timeout.as_millis() as u64));
            }
        };
        drop(writer);

        match reply {
            Reply::Completion { payload, .. } => {
                let result = decode_inquiry(variant, topic, &payload);
                if result.is_parsed() {
                    lock(&self.shared.last_inquiry).insert(topic, result.clone());
                } else {
                    warn!("{}: unparseable {:?} reply [{}]", self.endpoint, topic, hex(&payload));
                }
                Ok(SendOutcome::Inquiry(result))
            }
            Reply::Error { code, .. } => Err(SessionError::Rejected(code)),
            other => Err(SessionError::Protocol(format!(
                "unexpected inquiry reply {:?}",
                other
            ))),
        }
    }

    /// Ask the camera about `topic`
    pub async fn inquire(&self, topic: InquiryTopic) -> Result<InquiryResult, SessionError> {
        match self.send(PtzCommand::Inquire { topic }).await? {
            SendOutcome::Inquiry(result) => Ok(result),
            SendOutcome::Sent => Err(SessionError::Protocol("inquiry produced no reply".into())),
        }
    }

    /// Most recent successfully decoded answer for `topic`
    pub fn last_inquiry(&self, topic: InquiryTopic) -> Option<InquiryResult> {
        lock(&self.shared.last_inquiry).get(&topic).cloned()
    }

    /// Release the connection. Safe to call repeatedly; never fails.
    pub async fn close(&self) {
        let was_open = self.shared.open.swap(false, Ordering::AcqRel);
        if let Some(handle) = lock(&self.reader).take() {
            handle.abort();
        }
        self.shared.disarm();

        let mut writer = self.writer.lock().await;
        if let Some(mut link) = writer.link.take() {
            link.shutdown().await;
        }
        if was_open {
            info!("Camera session closed: {}", self.endpoint);
        }
    }

    /// False once closed or once the connection failed
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    pub fn endpoint(&self) -> &CameraEndpoint {
        &self.endpoint
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.reader).take() {
            handle.abort();
        }
    }
}
