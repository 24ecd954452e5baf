use bytes::{BufMut, BytesMut};

use super::app::{RtcpApp, APP_NAME_ACK};
use crate::error::Error;
use crate::{Result, RtpSequenceNumber, RtpSsrc};

/// Client acknowledgement frame carried in an RTCP APP packet.
///
/// The body holds a base sequence number followed by a variable-length
/// bitmask of further acknowledgements: mask bit `k` (MSB-first within each
/// big-endian word) acknowledges sequence number `base + k + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpAck {
    pub ssrc: RtpSsrc,

    /// Sequence number acknowledged directly
    pub base_seq: RtpSequenceNumber,

    /// Additional acknowledgements relative to `base_seq`
    pub mask: Vec<u32>,
}

impl RtcpAck {
    pub fn new(ssrc: RtpSsrc, base_seq: RtpSequenceNumber) -> Self {
        Self {
            ssrc,
            base_seq,
            mask: Vec::new(),
        }
    }

    /// Number of usable bits in the mask
    pub fn mask_bits(&self) -> usize {
        self.mask.len() * 32
    }

    /// Whether mask bit `bit` is set (bit 0 acknowledges `base_seq + 1`)
    pub fn is_bit_set(&self, bit: usize) -> bool {
        match self.mask.get(bit / 32) {
            Some(word) => word & (1 << (31 - (bit % 32))) != 0,
            None => false,
        }
    }

    /// Set mask bit `bit`, growing the mask as needed
    pub fn set_bit(&mut self, bit: usize) {
        let word = bit / 32;
        if word >= self.mask.len() {
            self.mask.resize(word + 1, 0);
        }
        self.mask[word] |= 1 << (31 - (bit % 32));
    }

    /// Every sequence number this frame acknowledges, base included
    pub fn acked_sequences(&self) -> impl Iterator<Item = RtpSequenceNumber> + '_ {
        let base = self.base_seq;
        std::iter::once(base).chain((0..self.mask_bits()).filter_map(move |bit| {
            if self.is_bit_set(bit) {
                Some(base.wrapping_add(bit as u16 + 1))
            } else {
                None
            }
        }))
    }

    /// Wrap into an APP packet for transmission
    pub fn to_app(&self) -> RtcpApp {
        let mut data = BytesMut::with_capacity(4 + self.mask.len() * 4);
        data.put_u16(self.base_seq);
        data.put_u16(0); // reserved
        for word in &self.mask {
            data.put_u32(*word);
        }
        RtcpApp::new(self.ssrc, APP_NAME_ACK, data.freeze())
    }

    /// Interpret an APP packet as an ack frame.
    ///
    /// Returns `Ok(None)` when the APP carries a different name; the caller
    /// then tries the other known sub-types.
    pub fn from_app(app: &RtcpApp) -> Result<Option<Self>> {
        if app.name != APP_NAME_ACK {
            return Ok(None);
        }
        if app.data.len() < 4 {
            return Err(Error::BufferTooSmall {
                required: 4,
                available: app.data.len(),
            });
        }
        let base_seq = u16::from_be_bytes([app.data[0], app.data[1]]);
        let mask_bytes = &app.data[4..];
        if mask_bytes.len() % 4 != 0 {
            return Err(Error::RtcpError("ack mask not word-aligned".to_string()));
        }
        let mask = mask_bytes
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Some(Self {
            ssrc: app.ssrc,
            base_seq,
            mask,
        }))
    }
}
