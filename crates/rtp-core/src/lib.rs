//! Per-track RTP send pipeline for the rtserve streaming server.
//!
//! Each media track of an RTSP session is represented by an [`stream::RtpStream`]
//! owned by an [`session::RtpSession`]. The stream owns the track's network
//! endpoints, chooses the transport (raw UDP, reliable UDP with selective
//! retransmission, or RTP interleaved on the RTSP TCP connection, optionally
//! carried over an HTTP tunnel), decides when each packet may leave, whether it
//! is still worth sending, how aggressively to thin under congestion, and how
//! to emit and interpret the RTCP control stream attached to the track.

pub mod error;
pub mod modules;
pub mod packet;
pub mod prefs;
pub mod session;
pub mod stream;
pub mod transport;

pub use error::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// RTP synchronization source identifier
pub type RtpSsrc = u32;

/// RTP sequence number
pub type RtpSequenceNumber = u16;

/// RTP timestamp (media clock units)
pub type RtpTimestamp = u32;

/// Identifies one stream within its session
pub type StreamId = u32;

/// Maximum UDP segment we ever hand to a socket in one send
pub const MAX_SEGMENT_SIZE: usize = 1466;

/// Fixed RTP header size assumed by the sender-report payload byte count
pub const RTP_FIXED_HEADER_SIZE: usize = 12;

/// Interval between RTCP sender reports on an active stream
pub const SENDER_REPORT_INTERVAL_MS: i64 = 5_000;
