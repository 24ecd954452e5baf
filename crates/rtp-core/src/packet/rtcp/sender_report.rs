use bytes::{Buf, BufMut, BytesMut};

use super::ntp::NtpTimestamp;
use super::report_block::RtcpReportBlock;
use super::{put_rtcp_header, RtcpHeader, RtcpPacketType, RTCP_HEADER_SIZE};
use crate::error::Error;
use crate::{Result, RtpSsrc, RtpTimestamp};

/// RTCP Sender Report (SR) packet
/// Defined in RFC 3550 Section 6.4.1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpSenderReport {
    /// SSRC of the sender
    pub ssrc: RtpSsrc,

    /// Wallclock time this report corresponds to
    pub ntp_timestamp: NtpTimestamp,

    /// RTP timestamp corresponding to the NTP timestamp
    pub rtp_timestamp: RtpTimestamp,

    /// Sender's packet count
    pub packet_count: u32,

    /// Sender's payload octet count
    pub octet_count: u32,

    /// Report blocks about remote sources
    pub report_blocks: Vec<RtcpReportBlock>,
}

impl RtcpSenderReport {
    /// SSRC plus sender info
    const FIXED_BODY_SIZE: usize = 24;

    /// Total serialized size, header included
    pub fn wire_size(&self) -> usize {
        RTCP_HEADER_SIZE + Self::FIXED_BODY_SIZE + self.report_blocks.len() * RtcpReportBlock::SIZE
    }

    /// Append the full packet, common header included
    pub fn put(&self, buf: &mut BytesMut) {
        let length_words = ((self.wire_size() - RTCP_HEADER_SIZE) / 4) as u16;
        put_rtcp_header(
            buf,
            self.report_blocks.len() as u8,
            RtcpPacketType::SenderReport,
            length_words,
        );
        buf.put_u32(self.ssrc);
        buf.put_u32(self.ntp_timestamp.seconds);
        buf.put_u32(self.ntp_timestamp.fraction);
        buf.put_u32(self.rtp_timestamp);
        buf.put_u32(self.packet_count);
        buf.put_u32(self.octet_count);
        for block in &self.report_blocks {
            block.put(buf);
        }
    }

    /// Parse from a sub-packet body; `header.count` gives the block count
    pub fn parse(header: &RtcpHeader, body: &[u8]) -> Result<Self> {
        let mut buf = body;
        if buf.remaining() < Self::FIXED_BODY_SIZE {
            return Err(Error::BufferTooSmall {
                required: Self::FIXED_BODY_SIZE,
                available: buf.remaining(),
            });
        }

        let ssrc = buf.get_u32();
        let ntp_timestamp = NtpTimestamp {
            seconds: buf.get_u32(),
            fraction: buf.get_u32(),
        };
        let rtp_timestamp = buf.get_u32();
        let packet_count = buf.get_u32();
        let octet_count = buf.get_u32();

        let mut report_blocks = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            report_blocks.push(RtcpReportBlock::parse(&mut buf)?);
        }

        Ok(Self {
            ssrc,
            ntp_timestamp,
            rtp_timestamp,
            packet_count,
            octet_count,
            report_blocks,
        })
    }
}
