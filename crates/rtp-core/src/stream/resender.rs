//! Selective retransmission for reliable-UDP streams.
//!
//! Sent packets are retained keyed by sequence number until the client
//! acks them or they age past their lifetime. Retransmits fire in
//! sequence-number order on timer expiry with exponential backoff; there
//! is no in-order delivery promise, that is the client jitter buffer's
//! job. All congestion accounting flows through the session's bandwidth
//! tracker.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::trace;

use crate::packet;
use crate::session::bandwidth::BandwidthTracker;
use crate::transport::UdpSocketPair;
use crate::RtpSequenceNumber;

struct ResendEntry {
    seq: RtpSequenceNumber,
    data: Vec<u8>,
    added_at: i64,
    expire_at: i64,
    next_resend_at: i64,
    resend_count: u32,
}

struct ResendDestination {
    pair: Arc<UdpSocketPair>,
    remote: SocketAddr,
}

/// Per-stream retransmit store, engaged only when the transport is
/// reliable UDP
pub struct PacketResender {
    entries: VecDeque<ResendEntry>,
    dest: Option<ResendDestination>,

    /// Armed by the session at PLAY; nothing is retransmitted or acked
    /// before then
    ready: bool,

    expired_count: u64,
    resent_count: u64,
}

impl PacketResender {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            dest: None,
            ready: false,
            expired_count: 0,
            resent_count: 0,
        }
    }

    pub fn set_destination(&mut self, pair: Arc<UdpSocketPair>, remote: SocketAddr) {
        self.dest = Some(ResendDestination { pair, remote });
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Record a copy of a just-sent packet. A non-positive lifetime means
    /// the packet is already stale: it goes out once and is never
    /// retransmitted, so no copy is kept.
    pub fn add_packet(
        &mut self,
        data: &[u8],
        lifetime_ms: i64,
        now: i64,
        tracker: &mut BandwidthTracker,
    ) {
        if lifetime_ms <= 0 {
            return;
        }
        let Some(seq) = packet::rtp_sequence_number(data) else {
            return;
        };
        tracker.fill_window(data.len());
        self.entries.push_back(ResendEntry {
            seq,
            data: data.to_vec(),
            added_at: now,
            expire_at: now + lifetime_ms,
            next_resend_at: now + tracker.retransmit_timeout_ms(),
            resend_count: 0,
        });
    }

    /// The client acknowledged `seq`; drop its record and, for a packet
    /// that was never retransmitted, feed the round trip into the RTT
    /// estimate (a retransmitted packet's ack is ambiguous)
    pub fn ack(&mut self, seq: RtpSequenceNumber, now: i64, tracker: &mut BandwidthTracker) {
        if !self.ready {
            return;
        }
        let pos = self.entries.iter().position(|e| e.seq == seq);
        if let Some(entry) = pos.and_then(|p| self.entries.remove(p)) {
            tracker.empty_window(entry.data.len());
            if entry.resend_count == 0 {
                tracker.add_to_rtt_estimate(now - entry.added_at);
            }
            trace!(seq, "acked");
        }
    }

    /// Retransmit every entry whose timer has expired and discard entries
    /// past their deadline. Returns the number of packets resent.
    pub fn resend_due_entries(&mut self, now: i64, tracker: &mut BandwidthTracker) -> usize {
        if !self.ready {
            return 0;
        }
        let mut resent = 0;
        let mut congested = false;
        let mut i = 0;
        while i < self.entries.len() {
            let entry = &mut self.entries[i];
            if now >= entry.expire_at {
                // too old to be useful, stop carrying it
                tracker.empty_window(entry.data.len());
                self.entries.remove(i);
                self.expired_count += 1;
                continue;
            }
            if now >= entry.next_resend_at {
                if let Some(dest) = &self.dest {
                    // a blocked socket just means the timer fires again
                    let _ = dest.pair.try_send_rtp(dest.remote, &entry.data);
                }
                entry.resend_count += 1;
                let backoff = tracker.retransmit_timeout_ms() << entry.resend_count.min(4);
                entry.next_resend_at = now + backoff.min(bandwidth_max_timeout());
                resent += 1;
                congested = true;
                trace!(seq = entry.seq, count = entry.resend_count, "retransmit");
            }
            i += 1;
        }
        if congested {
            tracker.adjust_window_for_retransmit();
        }
        self.resent_count += resent as u64;
        resent
    }

    /// The congestion window is spent; writes must report would-block
    pub fn is_flow_controlled(&self, tracker: &BandwidthTracker) -> bool {
        tracker.is_flow_controlled()
    }

    /// Whether a record for `seq` is still held
    pub fn contains(&self, seq: RtpSequenceNumber) -> bool {
        self.entries.iter().any(|e| e.seq == seq)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn expired_count(&self) -> u64 {
        self.expired_count
    }

    pub fn resent_count(&self) -> u64 {
        self.resent_count
    }
}

fn bandwidth_max_timeout() -> i64 {
    crate::session::bandwidth::MAX_RETRANSMIT_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtp_packet(seq: u16, len: usize) -> Vec<u8> {
        let mut pkt = vec![0u8; len.max(12)];
        pkt[0] = 0x80;
        pkt[2..4].copy_from_slice(&seq.to_be_bytes());
        pkt
    }

    fn armed_resender() -> (PacketResender, BandwidthTracker) {
        let mut resender = PacketResender::new();
        resender.set_ready(true);
        (resender, BandwidthTracker::new(true))
    }

    #[test]
    fn test_ack_removes_record() {
        let (mut resender, mut tracker) = armed_resender();
        resender.add_packet(&rtp_packet(100, 500), 2000, 1000, &mut tracker);
        assert!(resender.contains(100));
        assert_eq!(tracker.bytes_in_flight(), 500);

        resender.ack(100, 1100, &mut tracker);
        assert!(!resender.contains(100));
        assert_eq!(tracker.bytes_in_flight(), 0);
    }

    #[test]
    fn test_stale_lifetime_not_recorded() {
        let (mut resender, mut tracker) = armed_resender();
        resender.add_packet(&rtp_packet(7, 500), -50, 1000, &mut tracker);
        assert_eq!(resender.len(), 0);
        assert_eq!(tracker.bytes_in_flight(), 0);
    }

    #[test]
    fn test_not_ready_rejects_acks() {
        let (mut resender, mut tracker) = armed_resender();
        resender.add_packet(&rtp_packet(5, 100), 2000, 1000, &mut tracker);
        resender.set_ready(false);
        resender.ack(5, 1100, &mut tracker);
        assert!(resender.contains(5));
    }

    #[test]
    fn test_expired_entries_discarded_not_resent() {
        let (mut resender, mut tracker) = armed_resender();
        resender.add_packet(&rtp_packet(1, 100), 500, 1000, &mut tracker);

        let resent = resender.resend_due_entries(2000, &mut tracker);
        assert_eq!(resent, 0);
        assert_eq!(resender.len(), 0);
        assert_eq!(resender.expired_count(), 1);
        assert_eq!(tracker.bytes_in_flight(), 0);
    }

    #[test]
    fn test_due_entries_resent_with_backoff() {
        let (mut resender, mut tracker) = armed_resender();
        resender.add_packet(&rtp_packet(1, 100), 60_000, 1000, &mut tracker);
        let rto = tracker.retransmit_timeout_ms();

        // nothing due yet
        assert_eq!(resender.resend_due_entries(1000 + rto - 1, &mut tracker), 0);

        // first retransmit fires and the window is punished
        let window_before = tracker.congestion_window();
        assert_eq!(resender.resend_due_entries(1000 + rto, &mut tracker), 1);
        assert!(tracker.congestion_window() <= window_before);
        assert_eq!(resender.resent_count(), 1);
        assert!(resender.contains(1));
    }

    #[test]
    fn test_rtt_sample_only_from_first_transmission() {
        let (mut resender, mut tracker) = armed_resender();
        resender.add_packet(&rtp_packet(1, 100), 60_000, 1000, &mut tracker);
        let rto = tracker.retransmit_timeout_ms();
        resender.resend_due_entries(1000 + rto, &mut tracker);

        // ack after a retransmit must not feed the estimator
        let timeout_before = tracker.recommended_client_ack_timeout();
        resender.ack(1, 1000 + rto + 50, &mut tracker);
        assert_eq!(tracker.recommended_client_ack_timeout(), timeout_before);
        assert!(!resender.contains(1));
    }
}
