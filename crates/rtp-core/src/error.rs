use thiserror::Error;

/// Errors produced by the RTP send pipeline.
///
/// Setup rejections carry the exact phrase the RTSP layer echoes back to the
/// client in the error response. Transient I/O ("would block") is not an
/// error: it is reported through
/// [`WriteOutcome`](crate::transport::WriteOutcome) so the dispatcher knows
/// what to wait on.
#[derive(Debug, Error)]
pub enum Error {
    /// Buffer too small for the requested operation
    #[error("buffer too small: required {required} bytes, available {available}")]
    BufferTooSmall {
        required: usize,
        available: usize,
    },

    /// An invalid parameter was supplied
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Malformed or unsupported RTCP data
    #[error("RTCP error: {0}")]
    RtcpError(String),

    /// Client SETUP violated the transport contract; the message is the RTSP
    /// error string sent back to the client
    #[error("{0}")]
    SetupRejected(&'static str),

    /// No UDP port pair could be allocated for the stream
    #[error("out of ports")]
    OutOfPorts,

    /// Multicast socket options could not be applied
    #[error("couldn't setup multicast")]
    MulticastSetup(#[source] std::io::Error),

    /// Another stream is already registered for this RTCP source address
    #[error("RTCP demuxer already has a registration for {addr}:{port}")]
    DemuxerConflict {
        addr: std::net::IpAddr,
        port: u16,
    },

    /// Underlying socket error that is not a would-block condition
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation requires state the stream is not in
    #[error("stream state error: {0}")]
    StreamState(&'static str),
}

/// SETUP rejection phrases, mirrored into RTSP 400-class responses
pub mod setup_msg {
    pub const FILE_NAME_TOO_LONG: &str = "file name too long";
    pub const NO_CLIENT_PORT: &str = "no client port in transport";
    pub const RTP_PORT_MUST_BE_EVEN: &str = "RTP port must be even";
    pub const RTCP_PORT_MUST_BE_CONTIGUOUS: &str = "RTCP port must be one greater than RTP port";
    pub const ALT_DEST_NOT_ALLOWED: &str = "alternate destination not allowed";
}
