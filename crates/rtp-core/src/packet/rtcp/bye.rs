use bytes::{Buf, BufMut, BytesMut};

use super::{put_rtcp_header, RtcpHeader, RtcpPacketType, RTCP_HEADER_SIZE};
use crate::error::Error;
use crate::{Result, RtpSsrc};

/// RTCP Goodbye (BYE) packet
/// Defined in RFC 3550 Section 6.6
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpBye {
    /// Sources leaving the session
    pub ssrcs: Vec<RtpSsrc>,
}

impl RtcpBye {
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self { ssrcs: vec![ssrc] }
    }

    /// Total serialized size, header included
    pub fn wire_size(&self) -> usize {
        RTCP_HEADER_SIZE + self.ssrcs.len() * 4
    }

    /// Append the full packet, common header included
    pub fn put(&self, buf: &mut BytesMut) {
        put_rtcp_header(
            buf,
            self.ssrcs.len() as u8,
            RtcpPacketType::Goodbye,
            self.ssrcs.len() as u16,
        );
        for ssrc in &self.ssrcs {
            buf.put_u32(*ssrc);
        }
    }

    /// Parse from a sub-packet body; `header.count` gives the source count
    pub fn parse(header: &RtcpHeader, body: &[u8]) -> Result<Self> {
        let mut buf = body;
        let needed = header.count as usize * 4;
        if buf.remaining() < needed {
            return Err(Error::BufferTooSmall {
                required: needed,
                available: buf.remaining(),
            });
        }
        let ssrcs = (0..header.count).map(|_| buf.get_u32()).collect();
        Ok(Self { ssrcs })
    }
}
