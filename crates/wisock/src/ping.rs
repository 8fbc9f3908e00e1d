//! ICMPv6 echo on its own path
//!
//! At most one echo session exists at a time. Starting a new one replaces the
//! old one, so a late reply to the previous request that arrives on the same
//! socket id is timed against the newer request. That is the intended policy,
//! not an accident of the bookkeeping.

use core::{fmt, net::Ipv6Addr};

use crate::{SocketId, config::PingSettings, stack::WisunStack};

pub const ECHO_REQUEST: u8 = 128;
pub const ECHO_REPLY: u8 = 129;
pub const ECHO_CODE: u8 = 0;
/// Type, code, checksum, identifier, sequence number
pub const ECHO_HEADER_LEN: usize = 8;
/// Echo requests are sent to port 0
pub const ICMP_PORT: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoHeader {
    pub kind: u8,
    pub code: u8,
    pub identifier: u16,
    pub sequence_number: u16,
}

impl EchoHeader {
    pub fn request(settings: &PingSettings) -> Self {
        Self {
            kind: ECHO_REQUEST,
            code: ECHO_CODE,
            identifier: settings.identifier,
            sequence_number: settings.sequence_number,
        }
    }

    /// The checksum is left zero, the stack fills it in.
    pub fn encode(&self) -> [u8; ECHO_HEADER_LEN] {
        let mut out = [0u8; ECHO_HEADER_LEN];
        out[0] = self.kind;
        out[1] = self.code;
        out[4..6].copy_from_slice(&self.identifier.to_be_bytes());
        out[6..8].copy_from_slice(&self.sequence_number.to_be_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let hdr: &[u8; ECHO_HEADER_LEN] = data.get(..ECHO_HEADER_LEN)?.try_into().ok()?;
        Some(Self {
            kind: hdr[0],
            code: hdr[1],
            identifier: u16::from_be_bytes([hdr[4], hdr[5]]),
            sequence_number: u16::from_be_bytes([hdr[6], hdr[7]]),
        })
    }
}

/// Build a complete echo request of `packet_length` bytes, header included.
///
/// The payload is the configured pattern, repeated and cut to fit. Returns
/// `None` if `packet_length` can't hold the header.
pub fn build_request(settings: &PingSettings, packet_length: u16) -> Option<Vec<u8>> {
    let packet_length = packet_length as usize;
    if packet_length < ECHO_HEADER_LEN {
        return None;
    }

    let mut packet = Vec::with_capacity(packet_length);
    packet.extend_from_slice(&EchoHeader::request(settings).encode());
    if settings.pattern.is_empty() {
        packet.resize(packet_length, 0);
    } else {
        packet.extend(
            settings
                .pattern
                .iter()
                .copied()
                .cycle()
                .take(packet_length - ECHO_HEADER_LEN),
        );
    }
    Some(packet)
}

/// The echo request currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingSession {
    pub id: SocketId,
    pub remote: Ipv6Addr,
    pub sequence_number: u16,
    /// Stack tick count taken right after the request went out
    pub sent_at: u32,
}

impl PingSession {
    /// Time an echo reply against this request.
    ///
    /// The session outlives the reply, so duplicates are timed against the
    /// same send tick.
    pub fn on_reply<S: WisunStack + ?Sized>(
        &self,
        stack: &S,
        source: Ipv6Addr,
        data: &[u8],
    ) -> Result<PingReply, ReplyError> {
        let hdr = EchoHeader::decode(data).ok_or(ReplyError::Truncated { len: data.len() })?;
        if hdr.kind != ECHO_REPLY {
            return Err(ReplyError::UnexpectedType(hdr.kind));
        }

        let ticks = stack.tick_count().wrapping_sub(self.sent_at);
        Ok(PingReply {
            bytes: data.len(),
            source,
            sequence_number: hdr.sequence_number,
            elapsed_ms: stack.tick_to_ms(ticks),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingReply {
    pub bytes: usize,
    pub source: Ipv6Addr,
    pub sequence_number: u16,
    pub elapsed_ms: u32,
}

impl fmt::Display for PingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes from {}: icmp_seq={} time={} ms",
            self.bytes, self.source, self.sequence_number, self.elapsed_ms
        )
    }
}

/// Why an ICMP message on the ping socket was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReplyError {
    Truncated { len: usize },
    UnexpectedType(u8),
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyError::Truncated { len } => write!(f, "truncated ICMP message: {len} bytes"),
            ReplyError::UnexpectedType(kind) => write!(f, "unexpected ICMP message type: {kind}"),
        }
    }
}

/// Single-slot echo bookkeeping.
#[derive(Debug, Default)]
pub struct Correlator {
    session: Option<PingSession>,
}

impl Correlator {
    pub const fn new() -> Self {
        Self { session: None }
    }

    pub fn current(&self) -> Option<&PingSession> {
        self.session.as_ref()
    }

    /// The session in flight, if `id` is its socket.
    pub fn session_for(&self, id: SocketId) -> Option<&PingSession> {
        self.session.as_ref().filter(|s| s.id == id)
    }

    /// Record a new session, handing back the one it replaces.
    pub fn start(&mut self, session: PingSession) -> Option<PingSession> {
        self.session.replace(session)
    }

    pub fn take(&mut self) -> Option<PingSession> {
        self.session.take()
    }
}
