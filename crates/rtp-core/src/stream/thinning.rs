//! Quality-level control: thinning under congestion, thicking on recovery.
//!
//! The controller watches the current packet delay (now minus scheduled
//! transmit time) at every RTP write and steps the stream's quality level
//! over a finite ladder, with hysteresis and a per-session check interval.
//! Level 0 is full quality; the top level is maximum thinning. The media
//! reader consults the level and skips lower-priority frames before they
//! ever reach `write`.

use super::RtpStream;
use crate::prefs::ServerPrefs;
use crate::session::SessionShared;
use crate::transport::TransportKind;

/// Delay thresholds for one stream, derived from server preferences at
/// PLAY time
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ThinningParams {
    pub drop_all_packets_delay: i64,
    pub thin_all_the_way_delay: i64,
    pub always_thin_delay: i64,
    pub start_thinning_delay: i64,
    pub start_thicking_delay: i64,
    pub thick_all_the_way_delay: i64,
    pub quality_check_interval: i64,
}

/// A delay increase below this between consecutive packets counts as
/// "behind but holding steady", which defers the switch into thinning
const WORSENING_SLACK_MS: i64 = 250;

impl RtpStream {
    /// Derive the thinning thresholds from preferences, shifted by the
    /// client's late tolerance, and reset the session's check interval
    /// state. Runs when the session transitions into PLAY.
    pub(crate) fn set_thinning_params(&mut self, shared: &mut SessionShared) {
        let prefs: &ServerPrefs = &shared.prefs;
        let tolerance_adjust = 1500 - (self.late_tolerance_sec * 1000.0) as i64;

        let drop_all = if self.payload_kind.is_video() {
            prefs.drop_all_video_packets_time_ms
        } else {
            prefs.drop_all_packets_time_ms
        };

        self.thinning = ThinningParams {
            drop_all_packets_delay: drop_all - tolerance_adjust,
            thin_all_the_way_delay: prefs.thin_all_the_way_time_ms - tolerance_adjust,
            always_thin_delay: prefs.always_thin_time_ms - tolerance_adjust,
            start_thinning_delay: prefs.start_thinning_time_ms - tolerance_adjust,
            start_thicking_delay: prefs.start_thicking_time_ms - tolerance_adjust,
            thick_all_the_way_delay: prefs.thick_all_the_way_time_ms,
            quality_check_interval: prefs.quality_check_interval_ms,
        };

        shared.last_quality_check_time = 0;
        shared.last_quality_check_media_time = 0;
        shared.started_thinning = false;
    }

    /// Step the quality level for this packet and decide whether it is
    /// still worth sending. Returns false when the packet is too stale to
    /// transmit, in which case `stale_packets_dropped` has been counted.
    pub(crate) fn update_quality_level(
        &mut self,
        shared: &mut SessionShared,
        transmit_time: i64,
        current_packet_delay: i64,
        now: i64,
    ) -> bool {
        // warm-up packets scheduled before PLAY always go
        if transmit_time <= shared.play_time_ms {
            return true;
        }
        // best-effort UDP is never thinned
        if self.transport == TransportKind::RawUdp {
            return true;
        }

        if shared.last_quality_check_time == 0 {
            shared.last_quality_check_time = now;
            shared.last_quality_check_media_time = transmit_time;
            self.last_current_packet_delay = current_packet_delay;
            return true;
        }

        if !shared.started_thinning {
            // behind but not falling further behind: hold off
            if current_packet_delay > self.thinning.start_thinning_delay
                && current_packet_delay - self.last_current_packet_delay < WORSENING_SLACK_MS
            {
                if current_packet_delay < self.last_current_packet_delay {
                    self.last_current_packet_delay = current_packet_delay;
                }
                return true;
            }
            shared.started_thinning = true;
        }

        if current_packet_delay > self.thinning.thin_all_the_way_delay {
            shared.last_quality_check_time = now;
            shared.last_quality_check_media_time = transmit_time;
            self.last_current_packet_delay = current_packet_delay;

            // at risk of shipping stale packets: thin as hard as possible
            self.set_quality_level(shared, self.num_quality_levels as i32);
            if current_packet_delay > self.thinning.drop_all_packets_delay {
                self.stats.stale_packets_dropped += 1;
                return false;
            }
        }

        if self.num_quality_levels <= 2 {
            // not enough levels for fine tuning
            if current_packet_delay < self.thinning.start_thicking_delay
                && self.quality_level(shared) > 0
            {
                self.set_quality_level(shared, 0);
            }
            return true;
        }

        let interval = self.thinning.quality_check_interval;
        if now - shared.last_quality_check_time > interval
            || transmit_time - shared.last_quality_check_media_time > interval
        {
            let level = self.quality_level(shared);
            let max = self.num_quality_levels as i32;

            if current_packet_delay > self.thinning.always_thin_delay && level < max {
                self.set_quality_level(shared, level + 1);
            } else if current_packet_delay > self.thinning.start_thinning_delay
                && current_packet_delay > self.last_current_packet_delay
            {
                // rising delay thins one step, but only every other check
                if !self.wait_on_level_adjustment && level < max {
                    self.set_quality_level(shared, level + 1);
                    self.wait_on_level_adjustment = true;
                } else {
                    self.wait_on_level_adjustment = false;
                }
            }

            let level = self.quality_level(shared);
            if current_packet_delay < self.thinning.start_thicking_delay
                && level > 0
                && current_packet_delay < self.last_current_packet_delay
            {
                self.set_quality_level(shared, level - 1);
                self.wait_on_level_adjustment = true;
            }

            if current_packet_delay < self.thinning.thick_all_the_way_delay {
                self.set_quality_level(shared, 0);
                self.wait_on_level_adjustment = false;
            }

            self.last_current_packet_delay = current_packet_delay;
            shared.last_quality_check_time = now;
            shared.last_quality_check_media_time = transmit_time;
        }

        true
    }
}
