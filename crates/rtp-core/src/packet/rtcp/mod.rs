//! RTCP packet types and the compound-datagram walker.
//!
//! Wire formats follow RFC 3550; the APP sub-types (`qtak` acknowledgement
//! frames, `qtss` receiver telemetry, `qtsi` server info) are the
//! QuickTime-compatible extensions the clients of this server speak.

pub mod ack;
pub mod app;
pub mod bye;
pub mod ntp;
pub mod receiver_report;
pub mod report_block;
pub mod sdes;
pub mod sender_report;
pub mod telemetry;

pub use ack::RtcpAck;
pub use app::RtcpApp;
pub use bye::RtcpBye;
pub use ntp::NtpTimestamp;
pub use receiver_report::RtcpReceiverReport;
pub use report_block::RtcpReportBlock;
pub use sdes::RtcpSourceDescription;
pub use sender_report::RtcpSenderReport;
pub use telemetry::RtcpTelemetry;

use bytes::BufMut;
use bytes::BytesMut;

use crate::error::Error;
use crate::Result;

/// RTCP version (same as RTP, always 2)
pub const RTCP_VERSION: u8 = 2;

/// Size of the common RTCP sub-packet header
pub const RTCP_HEADER_SIZE: usize = 4;

/// RTCP packet types as defined in RFC 3550
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RtcpPacketType {
    /// Sender Report (SR)
    SenderReport = 200,

    /// Receiver Report (RR)
    ReceiverReport = 201,

    /// Source Description (SDES)
    SourceDescription = 202,

    /// Goodbye (BYE)
    Goodbye = 203,

    /// Application-Defined (APP)
    ApplicationDefined = 204,
}

impl RtcpPacketType {
    /// Map a wire byte to a known packet type; unknown types are skipped by
    /// the walker, not treated as malformed.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            200 => Some(RtcpPacketType::SenderReport),
            201 => Some(RtcpPacketType::ReceiverReport),
            202 => Some(RtcpPacketType::SourceDescription),
            203 => Some(RtcpPacketType::Goodbye),
            204 => Some(RtcpPacketType::ApplicationDefined),
            _ => None,
        }
    }
}

/// Common header of one RTCP sub-packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpHeader {
    /// Report count / subtype (5 bits)
    pub count: u8,

    /// Raw packet type byte
    pub packet_type: u8,

    /// Body length in 32-bit words, excluding this header
    pub length_words: u16,
}

impl RtcpHeader {
    /// Parse the common header and validate the version field
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < RTCP_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                required: RTCP_HEADER_SIZE,
                available: data.len(),
            });
        }
        let version = data[0] >> 6;
        if version != RTCP_VERSION {
            return Err(Error::RtcpError(format!("bad RTCP version {}", version)));
        }
        Ok(Self {
            count: data[0] & 0x1f,
            packet_type: data[1],
            length_words: u16::from_be_bytes([data[2], data[3]]),
        })
    }

    /// Body length in bytes
    pub fn body_len(&self) -> usize {
        self.length_words as usize * 4
    }

    /// Total sub-packet length in bytes, header included
    pub fn total_len(&self) -> usize {
        self.body_len() + RTCP_HEADER_SIZE
    }
}

/// Append a common header. `length_words` must already account for the body
/// that follows.
pub fn put_rtcp_header(buf: &mut BytesMut, count: u8, packet_type: RtcpPacketType, length_words: u16) {
    buf.put_u8((RTCP_VERSION << 6) | (count & 0x1f));
    buf.put_u8(packet_type as u8);
    buf.put_u16(length_words);
}

/// One sub-packet yielded while walking a compound datagram
#[derive(Debug, Clone, Copy)]
pub struct RtcpSubPacket<'a> {
    pub header: RtcpHeader,

    /// Body bytes after the common header
    pub body: &'a [u8],

    /// The full sub-packet, header included
    pub raw: &'a [u8],
}

/// Iterator over the sub-packets of a compound RTCP datagram.
///
/// A malformed sub-packet (short header, bad version, or a length field
/// running past the datagram) yields `Err`; the receive path aborts the
/// whole datagram at that point.
pub struct CompoundWalker<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> CompoundWalker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }
}

impl<'a> Iterator for CompoundWalker<'a> {
    type Item = Result<RtcpSubPacket<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = &self.data[self.offset..];
        if remaining.is_empty() {
            return None;
        }

        let header = match RtcpHeader::parse(remaining) {
            Ok(h) => h,
            Err(e) => return Some(Err(e)),
        };
        let total = header.total_len();
        if total > remaining.len() {
            return Some(Err(Error::RtcpError(format!(
                "sub-packet length {} exceeds datagram remainder {}",
                total,
                remaining.len()
            ))));
        }

        let raw = &remaining[..total];
        let body = &raw[RTCP_HEADER_SIZE..];
        self.offset += total;
        Some(Ok(RtcpSubPacket { header, body, raw }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let mut buf = BytesMut::new();
        put_rtcp_header(&mut buf, 3, RtcpPacketType::ReceiverReport, 7);
        let header = RtcpHeader::parse(&buf).unwrap();
        assert_eq!(header.count, 3);
        assert_eq!(header.packet_type, 201);
        assert_eq!(header.length_words, 7);
        assert_eq!(header.body_len(), 28);
    }

    #[test]
    fn test_bad_version_rejected() {
        let data = [0x40, 200, 0, 0];
        assert!(RtcpHeader::parse(&data).is_err());
    }

    #[test]
    fn test_walker_two_packets() {
        let mut buf = BytesMut::new();
        put_rtcp_header(&mut buf, 0, RtcpPacketType::ReceiverReport, 1);
        buf.put_u32(0x1111_2222);
        put_rtcp_header(&mut buf, 0, RtcpPacketType::Goodbye, 1);
        buf.put_u32(0x3333_4444);

        let packets: Vec<_> = CompoundWalker::new(&buf)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].header.packet_type, 201);
        assert_eq!(packets[1].header.packet_type, 203);
        assert_eq!(packets[1].body, &0x3333_4444u32.to_be_bytes());
    }

    #[test]
    fn test_walker_aborts_on_overrun_length() {
        let mut buf = BytesMut::new();
        put_rtcp_header(&mut buf, 0, RtcpPacketType::ReceiverReport, 40);
        buf.put_u32(0);
        let mut walker = CompoundWalker::new(&buf);
        assert!(walker.next().unwrap().is_err());
    }

    #[test]
    fn test_walker_empty_datagram() {
        assert!(CompoundWalker::new(&[]).next().is_none());
    }
}
