//! Pacing window shared by all streams of a session.
//!
//! The window decides whether a packet scheduled for transmission time `T`
//! may leave at wall-clock time `N`. With overbuffering enabled, packets
//! may run ahead of schedule until the window's byte budget is spent; with
//! it disabled, packets leave no earlier than their scheduled time. Either
//! way a blocked caller gets a proposed wakeup no closer than the minimum
//! send interval.

use std::collections::VecDeque;

/// Window size meaning "no byte limit"; interleaved TCP sessions use this
/// so the connection's own backpressure is the only throttle
pub const UNLIMITED_WINDOW: u32 = u32::MAX;

pub struct OverbufferWindow {
    enabled: bool,
    window_size: u32,
    bytes_in_window: u32,

    /// Minimum spacing of proposed wakeups (ms)
    send_interval_ms: i64,

    /// How far ahead of schedule a packet may leave (ms)
    max_send_ahead_ms: i64,

    /// In-flight packets by scheduled transmit time, drained as the clock
    /// passes them
    queued: VecDeque<(i64, u32)>,

    /// Transmit time of the packet most recently admitted through
    /// `check_transmit_time`
    last_checked_transmit_time: i64,

    in_write_burst: bool,
}

impl OverbufferWindow {
    pub fn new(send_interval_ms: i64, max_send_ahead_ms: i64) -> Self {
        Self {
            enabled: true,
            window_size: UNLIMITED_WINDOW,
            bytes_in_window: 0,
            send_interval_ms,
            max_send_ahead_ms,
            queued: VecDeque::new(),
            last_checked_transmit_time: 0,
            in_write_burst: false,
        }
    }

    /// Disabling is sticky for the session: any stream that opts out turns
    /// overbuffering off for all of them
    pub fn turn_off_overbuffering(&mut self) {
        self.enabled = false;
    }

    pub fn overbuffering_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_window_size(&mut self, bytes: u32) {
        self.window_size = bytes;
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    pub fn send_interval(&self) -> i64 {
        self.send_interval_ms
    }

    pub fn bytes_in_window(&self) -> u32 {
        self.bytes_in_window
    }

    /// Decide whether a packet scheduled for `transmit_time` may leave at
    /// `now`. Returns a value `<= now` to mean "go", else the proposed
    /// wakeup, always at least `send_interval` away.
    pub fn check_transmit_time(&mut self, transmit_time: i64, now: i64, len: usize) -> i64 {
        self.last_checked_transmit_time = transmit_time;

        if !self.enabled || self.window_size == 0 {
            // on-time delivery only
            if transmit_time <= now {
                return now;
            }
            return transmit_time.max(now + self.send_interval_ms);
        }

        // never run further ahead of schedule than the send-ahead bound
        if transmit_time - now > self.max_send_ahead_ms {
            return (transmit_time - self.max_send_ahead_ms).max(now + self.send_interval_ms);
        }

        // early packets burn window budget until acked off by the clock
        if transmit_time > now
            && self.window_size != UNLIMITED_WINDOW
            && self.bytes_in_window.saturating_add(len as u32) > self.window_size
        {
            return now + self.send_interval_ms;
        }

        now
    }

    /// Account a sent packet against the window
    pub fn add_packet_to_window(&mut self, len: usize) {
        self.bytes_in_window = self.bytes_in_window.saturating_add(len as u32);
        self.queued
            .push_back((self.last_checked_transmit_time, len as u32));
    }

    /// Credit back every queued packet whose transmit time has passed
    pub fn empty_out_window(&mut self, now: i64) {
        while let Some(&(transmit_time, len)) = self.queued.front() {
            if transmit_time > now {
                break;
            }
            self.bytes_in_window = self.bytes_in_window.saturating_sub(len);
            self.queued.pop_front();
        }
    }

    /// A burst of writes for one frame is about to start
    pub fn mark_beginning_of_write_burst(&mut self) {
        self.in_write_burst = true;
    }

    pub fn in_write_burst(&self) -> bool {
        self.in_write_burst
    }
}
