//! Per-stream statistics snapshot.
//!
//! Counters on the send side are updated under the session mutex by the
//! write path; the receive side fills in whatever the client reports
//! through RTCP. `StreamStats` is plain data so instrumentation modules
//! can clone it out without holding the lock.

use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamStats {
    /// RTP packets sent on this stream
    pub packet_count: u64,

    /// RTP bytes sent, headers included
    pub byte_count: u64,

    /// RTP header bytes sent; subtracted from `byte_count` for the sender
    /// report's payload octet count
    pub header_byte_count: u64,

    /// Fraction lost from the latest receiver report
    pub fraction_lost: u32,

    /// Interarrival jitter from the latest receiver report
    pub jitter: u32,

    /// Cumulative loss accepted from receiver reports
    pub total_lost_packets: u32,

    /// Loss delta accepted in the most recent report interval
    pub cur_packets_lost_in_interval: u32,

    /// Packets we sent during the most recent report interval
    pub packet_count_in_interval: u32,

    /// Packets dropped because they aged past the drop-all threshold
    pub stale_packets_dropped: u32,

    /// Ack timeout currently advertised to the client
    pub current_ack_timeout_ms: u32,

    // client telemetry (APP/qtss)
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
}

impl StreamStats {
    /// Payload bytes sent, the octet count a sender report carries
    pub fn payload_byte_count(&self) -> u64 {
        self.byte_count.saturating_sub(self.header_byte_count)
    }
}
