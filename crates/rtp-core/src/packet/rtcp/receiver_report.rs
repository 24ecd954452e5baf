use bytes::{Buf, BufMut, BytesMut};

use super::report_block::RtcpReportBlock;
use super::{put_rtcp_header, RtcpHeader, RtcpPacketType, RTCP_HEADER_SIZE};
use crate::error::Error;
use crate::{Result, RtpSsrc};

/// RTCP Receiver Report (RR) packet
/// Defined in RFC 3550 Section 6.4.2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpReceiverReport {
    /// SSRC of the reporting receiver
    pub ssrc: RtpSsrc,

    /// Report blocks, one per source the receiver hears
    pub report_blocks: Vec<RtcpReportBlock>,
}

impl RtcpReceiverReport {
    /// Total serialized size, header included
    pub fn wire_size(&self) -> usize {
        RTCP_HEADER_SIZE + 4 + self.report_blocks.len() * RtcpReportBlock::SIZE
    }

    /// Append the full packet, common header included
    pub fn put(&self, buf: &mut BytesMut) {
        let length_words = ((self.wire_size() - RTCP_HEADER_SIZE) / 4) as u16;
        put_rtcp_header(
            buf,
            self.report_blocks.len() as u8,
            RtcpPacketType::ReceiverReport,
            length_words,
        );
        buf.put_u32(self.ssrc);
        for block in &self.report_blocks {
            block.put(buf);
        }
    }

    /// Parse from a sub-packet body; `header.count` gives the block count
    pub fn parse(header: &RtcpHeader, body: &[u8]) -> Result<Self> {
        let mut buf = body;
        if buf.remaining() < 4 {
            return Err(Error::BufferTooSmall {
                required: 4,
                available: buf.remaining(),
            });
        }
        let ssrc = buf.get_u32();

        let mut report_blocks = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            report_blocks.push(RtcpReportBlock::parse(&mut buf)?);
        }

        Ok(Self {
            ssrc,
            report_blocks,
        })
    }

    /// Aggregate fraction lost across all blocks (the clients this server
    /// speaks to send exactly one block per media stream)
    pub fn fraction_lost(&self) -> u32 {
        self.report_blocks
            .iter()
            .map(|b| b.fraction_lost as u32)
            .sum()
    }

    /// Aggregate cumulative packet loss across all blocks
    pub fn cumulative_lost(&self) -> u32 {
        self.report_blocks.iter().map(|b| b.cumulative_lost).sum()
    }

    /// Aggregate interarrival jitter across all blocks
    pub fn cumulative_jitter(&self) -> u32 {
        self.report_blocks.iter().map(|b| b.jitter).sum()
    }
}
