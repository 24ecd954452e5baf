use bytes::{BufMut, BytesMut};

use super::{put_rtcp_header, RtcpHeader, RtcpPacketType, RTCP_HEADER_SIZE};
use crate::error::Error;
use crate::{Result, RtpSsrc};

/// SDES item type for the canonical endpoint name
pub const SDES_CNAME: u8 = 1;

/// RTCP Source Description (SDES) packet with a single chunk.
/// Defined in RFC 3550 Section 6.5
///
/// The sender-report compound carries one CNAME chunk; inbound SDES packets
/// are parsed for logging and otherwise unused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpSourceDescription {
    pub ssrc: RtpSsrc,
    pub cname: String,
}

impl RtcpSourceDescription {
    pub fn new(ssrc: RtpSsrc, cname: impl Into<String>) -> Self {
        Self {
            ssrc,
            cname: cname.into(),
        }
    }

    /// Chunk body size: ssrc + item header + text + null terminator, padded
    /// to a 32-bit boundary
    fn chunk_len(&self) -> usize {
        let unpadded = 4 + 2 + self.cname.len() + 1;
        (unpadded + 3) & !3
    }

    /// Total serialized size, header included
    pub fn wire_size(&self) -> usize {
        RTCP_HEADER_SIZE + self.chunk_len()
    }

    /// Append the full packet, common header included
    pub fn put(&self, buf: &mut BytesMut) {
        let length_words = (self.chunk_len() / 4) as u16;
        put_rtcp_header(buf, 1, RtcpPacketType::SourceDescription, length_words);
        buf.put_u32(self.ssrc);
        buf.put_u8(SDES_CNAME);
        buf.put_u8(self.cname.len() as u8);
        buf.put_slice(self.cname.as_bytes());
        // null item terminator plus padding to the word boundary
        let written = 4 + 2 + self.cname.len();
        for _ in written..self.chunk_len() {
            buf.put_u8(0);
        }
    }

    /// Parse the first chunk of an SDES body, tolerating items other than
    /// CNAME by skipping them
    pub fn parse(_header: &RtcpHeader, body: &[u8]) -> Result<Self> {
        if body.len() < 4 {
            return Err(Error::BufferTooSmall {
                required: 4,
                available: body.len(),
            });
        }
        let ssrc = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);

        let mut cname = String::new();
        let mut offset = 4;
        while offset + 2 <= body.len() {
            let item_type = body[offset];
            if item_type == 0 {
                break;
            }
            let item_len = body[offset + 1] as usize;
            let text_start = offset + 2;
            if text_start + item_len > body.len() {
                return Err(Error::RtcpError("SDES item overruns chunk".to_string()));
            }
            if item_type == SDES_CNAME {
                cname = String::from_utf8_lossy(&body[text_start..text_start + item_len])
                    .into_owned();
            }
            offset = text_start + item_len;
        }

        Ok(Self { ssrc, cname })
    }
}
