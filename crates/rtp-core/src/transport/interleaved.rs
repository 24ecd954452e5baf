//! Interleaved framing on the RTSP byte stream.
//!
//! Wire format: `0x24 | channel | length_be16 | payload` (RFC 2326
//! Section 10.12). RTP and RTCP for a TCP stream share the connection,
//! distinguished by channel number; the RTCP channel is always RTP+1.

use std::io;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::Result;

/// Frame marker byte (`'$'`)
pub const INTERLEAVED_MARKER: u8 = 0x24;

/// Framing overhead per packet
pub const INTERLEAVED_HEADER_SIZE: usize = 4;

/// Append one interleaved frame to `buf`
pub fn frame_into(buf: &mut BytesMut, channel: u8, payload: &[u8]) -> Result<()> {
    if payload.len() > u16::MAX as usize {
        return Err(Error::InvalidParameter(format!(
            "interleaved payload of {} bytes exceeds the 16-bit length field",
            payload.len()
        )));
    }
    buf.reserve(INTERLEAVED_HEADER_SIZE + payload.len());
    buf.put_u8(INTERLEAVED_MARKER);
    buf.put_u8(channel);
    buf.put_u16(payload.len() as u16);
    buf.put_slice(payload);
    Ok(())
}

/// Parse one frame from the front of `data`, returning
/// `(channel, payload, bytes_consumed)`, or `None` if more bytes are needed.
pub fn parse_frame(data: &[u8]) -> Result<Option<(u8, &[u8], usize)>> {
    if data.len() < INTERLEAVED_HEADER_SIZE {
        return Ok(None);
    }
    if data[0] != INTERLEAVED_MARKER {
        return Err(Error::InvalidParameter(
            "byte stream not aligned on an interleaved frame".to_string(),
        ));
    }
    let channel = data[1];
    let len = u16::from_be_bytes([data[2], data[3]]) as usize;
    let total = INTERLEAVED_HEADER_SIZE + len;
    if data.len() < total {
        return Ok(None);
    }
    Ok(Some((channel, &data[INTERLEAVED_HEADER_SIZE..total], total)))
}

/// The RTSP byte stream an interleaved stream writes through.
///
/// `try_write_frame` follows the pipeline's non-blocking contract:
/// `Ok(())` means the frame is committed (fully written, or the written
/// prefix plus a buffered remainder that will drain before any later
/// frame). A `WouldBlock` error means the frame was rejected whole and the
/// caller should retry it after write readiness.
pub trait InterleavedSink: Send {
    fn try_write_frame(&mut self, channel: u8, payload: &[u8]) -> io::Result<()>;
}

/// Interleaved sink over a plain RTSP TCP connection
pub struct TcpInterleavedSink {
    stream: tokio::net::TcpStream,
    residual: BytesMut,
}

impl TcpInterleavedSink {
    /// The stream must already be connected; `try_write` needs no
    /// readiness registration, so this type works from synchronous code
    /// running inside a tokio runtime.
    pub fn new(stream: tokio::net::TcpStream) -> Self {
        Self {
            stream,
            residual: BytesMut::new(),
        }
    }

    /// Drain any partially-written frame tail
    fn flush_residual(&mut self) -> io::Result<()> {
        while !self.residual.is_empty() {
            match self.stream.try_write(&self.residual) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.residual.advance(n),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl InterleavedSink for TcpInterleavedSink {
    fn try_write_frame(&mut self, channel: u8, payload: &[u8]) -> io::Result<()> {
        // an earlier frame's tail must hit the wire before a new header may
        self.flush_residual()?;

        let mut frame = BytesMut::with_capacity(INTERLEAVED_HEADER_SIZE + payload.len());
        frame_into(&mut frame, channel, payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let mut written = 0;
        while written < frame.len() {
            match self.stream.try_write(&frame[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if written == 0 {
                        // nothing on the wire yet, reject the frame whole
                        return Err(e);
                    }
                    // header already out: the remainder must go before
                    // anything else, so buffer it and report success
                    self.residual.extend_from_slice(&frame[written..]);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_frame_layout() {
        let mut buf = BytesMut::new();
        frame_into(&mut buf, 0, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
        assert_eq!(&buf[..], &[0x24, 0x00, 0x00, 0x04, 0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_frame_round_trip() {
        let mut buf = BytesMut::new();
        frame_into(&mut buf, 3, b"hello").unwrap();
        frame_into(&mut buf, 4, b"world!").unwrap();

        let (ch, payload, used) = parse_frame(&buf).unwrap().unwrap();
        assert_eq!((ch, payload), (3, &b"hello"[..]));
        let (ch, payload, used2) = parse_frame(&buf[used..]).unwrap().unwrap();
        assert_eq!((ch, payload), (4, &b"world!"[..]));
        assert_eq!(used + used2, buf.len());
    }

    #[test]
    fn test_partial_frame_needs_more() {
        let mut buf = BytesMut::new();
        frame_into(&mut buf, 1, b"abcdef").unwrap();
        assert!(parse_frame(&buf[..3]).unwrap().is_none());
        assert!(parse_frame(&buf[..7]).unwrap().is_none());
    }

    #[test]
    fn test_misaligned_stream_rejected() {
        assert!(parse_frame(&[0x25, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_oversize_payload_rejected() {
        let mut buf = BytesMut::new();
        let payload = vec![0u8; u16::MAX as usize + 1];
        assert!(frame_into(&mut buf, 0, &payload).is_err());
    }

    #[tokio::test]
    async fn test_tcp_sink_writes_framed_bytes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let mut sink = TcpInterleavedSink::new(client);
        sink.try_write_frame(0, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
        sink.try_write_frame(1, b"rtcp").unwrap();

        let mut received = vec![0u8; 16];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(&received[..8], &[0x24, 0x00, 0x00, 0x04, 0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(&received[8..12], &[0x24, 0x01, 0x00, 0x04]);
        assert_eq!(&received[12..], b"rtcp");
    }
}
