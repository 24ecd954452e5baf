//! Transport endpoints for a media stream.
//!
//! A stream's packets leave through one of three dispatches: raw UDP
//! `sendto`, reliable UDP (recorded by the resender, then `sendto`), or
//! interleaved frames on the RTSP TCP byte stream. The byte stream itself
//! may be a plain TCP connection or an HTTP tunnel.
//!
//! All I/O here is non-blocking; instead of suspending, an operation
//! reports the endpoint and readiness it wants the dispatcher to wait on.

pub mod demux;
pub mod interleaved;
pub mod pool;
pub mod tunnel;

pub use interleaved::{InterleavedSink, TcpInterleavedSink};
pub use pool::{UdpSocketPair, UdpSocketPool};

use serde::Serialize;

/// How a stream's RTP and RTCP packets reach the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransportKind {
    /// Best-effort UDP, no retransmission, no thinning
    RawUdp,

    /// UDP with client acks and selective retransmission
    ReliableUdp,

    /// Both channels interleaved on the RTSP TCP connection
    InterleavedTcp,
}

impl TransportKind {
    /// Short tag used in per-packet trace lines
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::RawUdp => "UDP",
            TransportKind::ReliableUdp => "RUDP",
            TransportKind::InterleavedTcp => "TCP",
        }
    }

    pub fn is_udp_family(&self) -> bool {
        !matches!(self, TransportKind::InterleavedTcp)
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self, TransportKind::InterleavedTcp)
    }
}

/// The endpoint a blocked operation wants the dispatcher to watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    RtpSocket,
    RtcpSocket,
    RtspStream,
    TunnelGet,
    TunnelPost,
}

/// Readiness a blocked operation is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
    ReadWrite,
}

/// Outcome of a stream write.
///
/// `WouldBlock` is the pipeline's only suspension point: the caller parks
/// the task until `wakeup` (overbuffer gating) or until the named endpoint
/// reports the requested readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Packet left (or was fully committed to the transport's buffer)
    Sent { len: usize },

    /// The quality controller judged the packet too stale to send
    Dropped,

    /// Try again later. `endpoint` is `None` when the block came from the
    /// pacing window or session-lock contention rather than a socket.
    WouldBlock {
        endpoint: Option<Endpoint>,
        interest: Interest,
        wakeup: Option<i64>,
    },
}

impl WriteOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, WriteOutcome::Sent { .. })
    }

    pub(crate) fn blocked_on(endpoint: Endpoint, interest: Interest) -> Self {
        WriteOutcome::WouldBlock {
            endpoint: Some(endpoint),
            interest,
            wakeup: None,
        }
    }

    pub(crate) fn parked_until(wakeup: i64) -> Self {
        WriteOutcome::WouldBlock {
            endpoint: None,
            interest: Interest::Write,
            wakeup: Some(wakeup),
        }
    }
}
