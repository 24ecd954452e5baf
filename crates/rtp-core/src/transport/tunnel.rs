//! HTTP tunneling for the RTSP byte stream.
//!
//! Two TCP connections share one logical session keyed by a client-chosen
//! 32-bit cookie. The GET connection carries downstream RTSP and
//! interleaved data in the clear once the server's response header has been
//! consumed; the POST connection carries upstream bytes base64-encoded, so
//! the stream survives caching and filtering HTTP intermediaries that
//! mutate binary bodies.
//!
//! Both connections follow the pipeline's non-blocking contract: a partial
//! send leaves a residual that is re-offered on the next call, and a
//! blocked operation records which connection and readiness to wait on.

use std::io;

use tracing::debug;

use super::{Endpoint, Interest};

/// Capacity of the outbound scratch buffer; base64 output must always fit
pub const SEND_BUFFER_CAPACITY: usize = 4096;

/// Content type negotiated on both tunnel connections
pub const TUNNEL_CONTENT_TYPE: &str = "application/x-rtsp-rtp-interleaved";

/// Identity sent in the tunnel preambles
pub const TUNNEL_USER_AGENT: &str = "rtserve/0.1";

/// A non-blocking byte stream the tunnel runs over.
///
/// Implemented for `tokio::net::TcpStream`; tests drive the tunnel with
/// scripted in-memory endpoints.
pub trait TunnelEndpoint: Send {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl TunnelEndpoint for tokio::net::TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_read(self, buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_write(self, buf)
    }
}

/// Opens tunnel connections on demand: the GET side on first read, the
/// POST side on first send.
pub trait TunnelConnector: Send {
    type Endpoint: TunnelEndpoint;

    fn connect(&mut self) -> io::Result<Self::Endpoint>;
}

/// Connector for real TCP tunnels. The connect itself is blocking (tunnel
/// establishment happens at session setup, before media flows); the
/// resulting stream is non-blocking.
pub struct TcpTunnelConnector {
    addr: std::net::SocketAddr,
}

impl TcpTunnelConnector {
    pub fn new(addr: std::net::SocketAddr) -> Self {
        Self { addr }
    }
}

impl TunnelConnector for TcpTunnelConnector {
    type Endpoint = tokio::net::TcpStream;

    fn connect(&mut self) -> io::Result<tokio::net::TcpStream> {
        let stream = std::net::TcpStream::connect(self.addr)?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        tokio::net::TcpStream::from_std(stream)
    }
}

/// Result of a tunnel send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// The payload is fully on the wire
    Flushed,

    /// The payload is encoded and buffered; the remainder goes out once
    /// the POST connection is writable again
    Buffered,
}

/// Outbound buffer with partial-send resume
struct OutBuf {
    buf: Vec<u8>,
    sent: usize,
}

impl OutBuf {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(SEND_BUFFER_CAPACITY),
            sent: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Offer the unsent slice to `ep` until drained or blocked
    fn flush(&mut self, ep: &mut impl TunnelEndpoint) -> io::Result<()> {
        while self.sent < self.buf.len() {
            match ep.try_write(&self.buf[self.sent..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.sent += n,
                Err(e) => return Err(e),
            }
        }
        self.buf.clear();
        self.sent = 0;
        Ok(())
    }
}

/// Client socket that base64-wraps a bidirectional byte stream over paired
/// GET/POST HTTP connections.
pub struct HttpTunnelSocket<C: TunnelConnector> {
    connector: C,
    url: String,
    cookie: u32,

    get: Option<C::Endpoint>,
    post: Option<C::Endpoint>,

    get_out: OutBuf,
    post_out: OutBuf,

    /// Server response header scan state on the GET connection
    header_done: bool,
    header_buf: Vec<u8>,

    /// Application bytes that arrived in the same read as the header end
    pending: Vec<u8>,

    /// What a blocked caller should wait on
    wait_on: Option<(Endpoint, Interest)>,
}

impl<C: TunnelConnector> HttpTunnelSocket<C> {
    pub fn new(url: impl Into<String>, cookie: u32, connector: C) -> Self {
        Self {
            connector,
            url: url.into(),
            cookie,
            get: None,
            post: None,
            get_out: OutBuf::new(),
            post_out: OutBuf::new(),
            header_done: false,
            header_buf: Vec::new(),
            pending: Vec::new(),
            wait_on: None,
        }
    }

    /// The endpoint and readiness a blocked operation is waiting for
    pub fn wait_on(&self) -> Option<(Endpoint, Interest)> {
        self.wait_on
    }

    fn preamble(&self, method: &str) -> String {
        format!(
            "{} {} HTTP/1.0\r\nX-SessionCookie: {}\r\nAccept: {}\r\nUser-Agent: {}\r\n\r\n",
            method, self.url, self.cookie, TUNNEL_CONTENT_TYPE, TUNNEL_USER_AGENT
        )
    }

    /// Read application bytes from the GET connection.
    ///
    /// Brings the connection up and sends the GET preamble on first call.
    /// No application byte is produced until the first `\r\n\r\n` of the
    /// server's response has been observed; everything after it is the
    /// stream, preserved in order.
    pub fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.wait_on = None;
        if self.get.is_none() {
            debug!(url = %self.url, cookie = self.cookie, "opening tunnel GET connection");
            let ep = self.connector.connect()?;
            self.get = Some(ep);
            let preamble = self.preamble("GET");
            self.get_out.push(preamble.as_bytes());
        }
        let ep = match self.get.as_mut() {
            Some(ep) => ep,
            None => return Err(io::ErrorKind::NotConnected.into()),
        };

        if !self.get_out.is_empty() {
            if let Err(e) = self.get_out.flush(ep) {
                if e.kind() == io::ErrorKind::WouldBlock {
                    self.wait_on = Some((Endpoint::TunnelGet, Interest::Write));
                }
                return Err(e);
            }
        }

        while !self.header_done {
            let mut chunk = [0u8; 1024];
            match ep.try_read(&mut chunk) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    self.header_buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = find_crlf_crlf(&self.header_buf) {
                        // bytes past the blank line are the stream
                        self.pending.extend_from_slice(&self.header_buf[pos + 4..]);
                        self.header_buf.clear();
                        self.header_done = true;
                        debug!("tunnel GET response header consumed");
                    } else if self.header_buf.len() > SEND_BUFFER_CAPACITY {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "tunnel response header exceeds scratch capacity",
                        ));
                    }
                }
                Err(e) => {
                    if e.kind() == io::ErrorKind::WouldBlock {
                        self.wait_on = Some((Endpoint::TunnelGet, Interest::Read));
                    }
                    return Err(e);
                }
            }
        }

        if !self.pending.is_empty() {
            let n = self.pending.len().min(out.len());
            out[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            return Ok(n);
        }

        match ep.try_read(out) {
            Ok(n) => Ok(n),
            Err(e) => {
                if e.kind() == io::ErrorKind::WouldBlock {
                    self.wait_on = Some((Endpoint::TunnelGet, Interest::Read));
                }
                Err(e)
            }
        }
    }

    /// Send application bytes on the POST connection, base64-encoded.
    ///
    /// Brings the connection up and queues the POST preamble on first
    /// call. The payload is encoded only when the outbound buffer is
    /// empty; while a previous payload's residual is pending the call
    /// reports `WouldBlock` and the caller retries with the same payload,
    /// which by then is the residual being flushed.
    pub fn send(&mut self, payload: &[u8]) -> io::Result<SendState> {
        self.wait_on = None;
        let mut just_connected = false;
        if self.post.is_none() {
            debug!(url = %self.url, cookie = self.cookie, "opening tunnel POST connection");
            let ep = self.connector.connect()?;
            self.post = Some(ep);
            let preamble = self.preamble("POST");
            self.post_out.push(preamble.as_bytes());
            just_connected = true;
        }

        let encoded_this_call = if just_connected || self.post_out.is_empty() {
            let encoded = base64::encode(payload);
            if self.post_out.buf.len() + encoded.len() > SEND_BUFFER_CAPACITY {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "encoded payload exceeds tunnel scratch capacity",
                ));
            }
            self.post_out.push(encoded.as_bytes());
            true
        } else {
            false
        };

        let ep = match self.post.as_mut() {
            Some(ep) => ep,
            None => return Err(io::ErrorKind::NotConnected.into()),
        };
        match self.post_out.flush(ep) {
            Ok(()) => Ok(SendState::Flushed),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.wait_on = Some((Endpoint::TunnelPost, Interest::Write));
                if encoded_this_call {
                    Ok(SendState::Buffered)
                } else {
                    Err(e)
                }
            }
            Err(e) => Err(e),
        }
    }
}

/// Interleaved sink running over an HTTP tunnel; this is how an
/// InterleavedTcp stream operates transparently on a tunneled RTSP
/// connection.
pub struct TunnelInterleavedSink<C: TunnelConnector> {
    tunnel: HttpTunnelSocket<C>,
    scratch: Vec<u8>,
}

impl<C: TunnelConnector> TunnelInterleavedSink<C> {
    pub fn new(tunnel: HttpTunnelSocket<C>) -> Self {
        Self {
            tunnel,
            scratch: Vec::new(),
        }
    }

    pub fn tunnel(&mut self) -> &mut HttpTunnelSocket<C> {
        &mut self.tunnel
    }
}

impl<C: TunnelConnector> super::interleaved::InterleavedSink for TunnelInterleavedSink<C> {
    fn try_write_frame(&mut self, channel: u8, payload: &[u8]) -> io::Result<()> {
        if !self.scratch.is_empty() {
            // previous frame still buffered in the tunnel; retry it before
            // accepting anything new
            match self.tunnel.send(&self.scratch) {
                Ok(SendState::Flushed) => self.scratch.clear(),
                Ok(SendState::Buffered) => {
                    self.scratch.clear();
                    return Err(io::ErrorKind::WouldBlock.into());
                }
                Err(e) => return Err(e),
            }
        }

        let mut frame = bytes::BytesMut::new();
        super::interleaved::frame_into(&mut frame, channel, payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        match self.tunnel.send(&frame)? {
            SendState::Flushed => Ok(()),
            SendState::Buffered => {
                // committed into the tunnel's buffer; remember the frame so
                // the retry discipline holds until it drains
                self.scratch = frame.to_vec();
                Ok(())
            }
        }
    }
}

fn find_crlf_crlf(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}
