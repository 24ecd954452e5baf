//! Congestion state shared between a session's reliable-UDP streams.
//!
//! The tracker keeps a TCP-style congestion window over unacknowledged
//! bytes, an RTT estimate fed by first-transmission acks, and the ack
//! timeout the server recommends to the client in every sender report.

/// Largest datagram the window is grown by in congestion avoidance
const MAX_SEGMENT_SIZE: u32 = crate::MAX_SEGMENT_SIZE as u32;

/// Bounds on the retransmit timeout (ms)
const MIN_RETRANSMIT_TIMEOUT_MS: i64 = 600;
pub(crate) const MAX_RETRANSMIT_TIMEOUT_MS: i64 = 24_000;

/// Bounds on the ack timeout recommended to clients (ms)
const MIN_ACK_TIMEOUT_MS: u32 = 20;
const MAX_ACK_TIMEOUT_MS: u32 = 1_250;

/// Congestion window when slow start is disabled
const NO_SLOW_START_WINDOW: u32 = 24 * MAX_SEGMENT_SIZE;

pub struct BandwidthTracker {
    use_slow_start: bool,

    /// Unacknowledged bytes across the session's streams
    bytes_in_flight: u32,

    congestion_window: u32,
    slow_start_threshold: u32,

    /// Smoothed RTT state, RFC 6298 style fixed-point-free variant
    running_average_ms: i64,
    running_mean_deviation_ms: i64,
    cur_retransmit_timeout_ms: i64,

    /// Becomes true once the first packet enters the window; acks arriving
    /// before that are spurious and rejected
    started: bool,
}

impl BandwidthTracker {
    pub fn new(use_slow_start: bool) -> Self {
        Self {
            use_slow_start,
            bytes_in_flight: 0,
            congestion_window: if use_slow_start {
                2 * MAX_SEGMENT_SIZE
            } else {
                NO_SLOW_START_WINDOW
            },
            slow_start_threshold: NO_SLOW_START_WINDOW,
            running_average_ms: 0,
            running_mean_deviation_ms: 0,
            cur_retransmit_timeout_ms: MIN_RETRANSMIT_TIMEOUT_MS,
            started: false,
        }
    }

    /// A packet copy entered the retransmit window
    pub fn fill_window(&mut self, len: usize) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_add(len as u32);
        self.started = true;
    }

    /// Bytes were acknowledged (or aged out); grow the congestion window
    pub fn empty_window(&mut self, len: usize) {
        let len = len as u32;
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(len);

        if self.congestion_window < self.slow_start_threshold {
            // slow start: window grows by the acked bytes
            self.congestion_window = self.congestion_window.saturating_add(len);
        } else {
            // congestion avoidance: roughly one segment per window's worth
            let growth = (MAX_SEGMENT_SIZE * MAX_SEGMENT_SIZE / self.congestion_window).max(1);
            self.congestion_window = self.congestion_window.saturating_add(growth);
        }
    }

    /// A retransmit fired; halve into slow-start-threshold and back off
    pub fn adjust_window_for_retransmit(&mut self) {
        self.slow_start_threshold = (self.bytes_in_flight / 2).max(2 * MAX_SEGMENT_SIZE);
        self.congestion_window = self.slow_start_threshold;
        self.cur_retransmit_timeout_ms =
            (self.cur_retransmit_timeout_ms * 2).min(MAX_RETRANSMIT_TIMEOUT_MS);
    }

    /// Feed one round-trip sample from a first-transmission ack
    pub fn add_to_rtt_estimate(&mut self, rtt_ms: i64) {
        let rtt_ms = rtt_ms.max(0);
        if self.running_average_ms == 0 {
            self.running_average_ms = rtt_ms;
            self.running_mean_deviation_ms = rtt_ms / 2;
        } else {
            let delta = rtt_ms - self.running_average_ms;
            self.running_average_ms += delta / 8;
            self.running_mean_deviation_ms += (delta.abs() - self.running_mean_deviation_ms) / 4;
        }
        self.cur_retransmit_timeout_ms = (self.running_average_ms
            + 4 * self.running_mean_deviation_ms)
            .clamp(MIN_RETRANSMIT_TIMEOUT_MS, MAX_RETRANSMIT_TIMEOUT_MS);
    }

    /// The window is spent; the stream's write path must report would-block
    /// instead of queueing more
    pub fn is_flow_controlled(&self) -> bool {
        self.bytes_in_flight >= self.congestion_window
    }

    /// Guard against acks arriving across session reuse, before anything
    /// was sent
    pub fn ready_for_ack_processing(&self) -> bool {
        self.started
    }

    /// Ack timeout advertised to the client in the sender report's
    /// server-info block
    pub fn recommended_client_ack_timeout(&self) -> u32 {
        let rtt_based = if self.running_average_ms == 0 {
            MIN_ACK_TIMEOUT_MS as i64 * 5
        } else {
            self.running_average_ms + self.running_mean_deviation_ms
        };
        (rtt_based as u32).clamp(MIN_ACK_TIMEOUT_MS, MAX_ACK_TIMEOUT_MS)
    }

    /// Current retransmit timeout for scheduling resends
    pub fn retransmit_timeout_ms(&self) -> i64 {
        self.cur_retransmit_timeout_ms
    }

    pub fn bytes_in_flight(&self) -> u32 {
        self.bytes_in_flight
    }

    pub fn congestion_window(&self) -> u32 {
        self.congestion_window
    }
}
