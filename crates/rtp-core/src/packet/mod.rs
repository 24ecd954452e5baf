//! Wire-level packet helpers.
//!
//! The send pipeline treats RTP payloads as opaque, but the resender and the
//! sender-report bookkeeping need to peek at a few fixed header fields.

pub mod rtcp;

use crate::{RtpSequenceNumber, RtpSsrc, RtpTimestamp, RTP_FIXED_HEADER_SIZE};

/// Sequence number from a raw RTP packet (bytes 2..4, network order)
pub fn rtp_sequence_number(packet: &[u8]) -> Option<RtpSequenceNumber> {
    if packet.len() < RTP_FIXED_HEADER_SIZE {
        return None;
    }
    Some(u16::from_be_bytes([packet[2], packet[3]]))
}

/// RTP timestamp from a raw RTP packet (bytes 4..8, network order)
pub fn rtp_timestamp(packet: &[u8]) -> Option<RtpTimestamp> {
    if packet.len() < RTP_FIXED_HEADER_SIZE {
        return None;
    }
    Some(u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]))
}

/// SSRC from a raw RTP packet (bytes 8..12, network order)
pub fn rtp_ssrc(packet: &[u8]) -> Option<RtpSsrc> {
    if packet.len() < RTP_FIXED_HEADER_SIZE {
        return None;
    }
    Some(u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]))
}

/// Length in bytes of the RTP header actually present in `packet`,
/// accounting for the CSRC list and a header extension if flagged.
///
/// The sender report's payload byte count subtracts header bytes from the
/// octet total; the fixed `-12` shortcut is only valid when neither CSRCs
/// nor an extension are in use, so the write path measures the real length.
pub fn rtp_header_len(packet: &[u8]) -> Option<usize> {
    if packet.len() < RTP_FIXED_HEADER_SIZE {
        return None;
    }
    let csrc_count = (packet[0] & 0x0f) as usize;
    let mut len = RTP_FIXED_HEADER_SIZE + csrc_count * 4;

    let has_extension = packet[0] & 0x10 != 0;
    if has_extension {
        if packet.len() < len + 4 {
            return None;
        }
        let ext_words = u16::from_be_bytes([packet[len + 2], packet[len + 3]]) as usize;
        len += 4 + ext_words * 4;
    }

    if len > packet.len() {
        return None;
    }
    Some(len)
}
