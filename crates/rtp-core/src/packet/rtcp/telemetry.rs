use bytes::{Buf, BufMut, BytesMut};

use super::app::{RtcpApp, APP_NAME_TELEMETRY};
use crate::error::Error;
use crate::{Result, RtpSsrc};

/// Receiver telemetry carried in an RTCP APP packet (`qtss`).
///
/// Fixed field order; all values big-endian. The overbuffer window size is
/// forwarded to the session's pacing window for non-UDP streams, everything
/// else lands in the stream's statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtcpTelemetry {
    pub ssrc: RtpSsrc,
    pub receiver_bit_rate: u32,
    pub avg_late_ms: u16,
    pub percent_lost: u16,
    pub avg_buffer_delay_ms: u16,
    pub getting_better: bool,
    pub getting_worse: bool,
    pub num_eyes: u32,
    pub num_eyes_active: u32,
    pub num_eyes_paused: u32,
    pub total_packets_received: u32,
    pub total_packets_dropped: u16,
    pub total_packets_lost: u16,
    pub client_buffer_fill: u16,
    pub frame_rate: u16,
    pub expected_frame_rate: u16,
    pub audio_dry_count: u16,
    pub overbuffer_window_size: u32,
}

impl RtcpTelemetry {
    /// Serialized body size after the APP ssrc/name preamble
    const BODY_SIZE: usize = 46;

    /// Wrap into an APP packet for transmission
    pub fn to_app(&self) -> RtcpApp {
        let mut data = BytesMut::with_capacity(Self::BODY_SIZE);
        data.put_u32(self.receiver_bit_rate);
        data.put_u16(self.avg_late_ms);
        data.put_u16(self.percent_lost);
        data.put_u16(self.avg_buffer_delay_ms);
        data.put_u16(self.getting_better as u16);
        data.put_u16(self.getting_worse as u16);
        data.put_u32(self.num_eyes);
        data.put_u32(self.num_eyes_active);
        data.put_u32(self.num_eyes_paused);
        data.put_u32(self.total_packets_received);
        data.put_u16(self.total_packets_dropped);
        data.put_u16(self.total_packets_lost);
        data.put_u16(self.client_buffer_fill);
        data.put_u16(self.frame_rate);
        data.put_u16(self.expected_frame_rate);
        data.put_u16(self.audio_dry_count);
        data.put_u32(self.overbuffer_window_size);
        RtcpApp::new(self.ssrc, APP_NAME_TELEMETRY, data.freeze())
    }

    /// Interpret an APP packet as telemetry.
    ///
    /// Returns `Ok(None)` when the APP carries a different name.
    pub fn from_app(app: &RtcpApp) -> Result<Option<Self>> {
        if app.name != APP_NAME_TELEMETRY {
            return Ok(None);
        }
        let mut buf = &app.data[..];
        if buf.remaining() < Self::BODY_SIZE {
            return Err(Error::BufferTooSmall {
                required: Self::BODY_SIZE,
                available: buf.remaining(),
            });
        }

        Ok(Some(Self {
            ssrc: app.ssrc,
            receiver_bit_rate: buf.get_u32(),
            avg_late_ms: buf.get_u16(),
            percent_lost: buf.get_u16(),
            avg_buffer_delay_ms: buf.get_u16(),
            getting_better: buf.get_u16() != 0,
            getting_worse: buf.get_u16() != 0,
            num_eyes: buf.get_u32(),
            num_eyes_active: buf.get_u32(),
            num_eyes_paused: buf.get_u32(),
            total_packets_received: buf.get_u32(),
            total_packets_dropped: buf.get_u16(),
            total_packets_lost: buf.get_u16(),
            client_buffer_fill: buf.get_u16(),
            frame_rate: buf.get_u16(),
            expected_frame_rate: buf.get_u16(),
            audio_dry_count: buf.get_u16(),
            overbuffer_window_size: buf.get_u32(),
        }))
    }
}
