//! Server preferences consumed by the send pipeline.
//!
//! The preferences file format is owned by the outer server; this module only
//! defines the tunables, their defaults, and a by-name source the loaded file
//! is read through. Unknown keys and unparseable values are logged at warn
//! and the default is kept.

use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Supplies preference values by name. Implemented by the server's
/// preferences file parser; tests use a plain map.
pub trait PrefsSource {
    fn get(&self, key: &str) -> Option<String>;
}

impl PrefsSource for std::collections::HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        std::collections::HashMap::get(self, key).cloned()
    }
}

/// All tunables the pipeline reads, with server defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerPrefs {
    /// Whether reliable UDP may be negotiated at all
    pub reliable_udp_enabled: bool,

    /// Path prefixes under which reliable UDP is allowed
    pub reliable_udp_dirs: Vec<String>,

    /// Whether the congestion window starts in slow start
    pub slow_start_enabled: bool,

    /// Pins every quality level to 0
    pub disable_thinning: bool,

    /// Delay past which non-video packets are dropped outright (ms)
    pub drop_all_packets_time_ms: i64,

    /// Delay past which video packets are dropped outright (ms)
    pub drop_all_video_packets_time_ms: i64,

    /// Delay at which the stream jumps to maximum thinning (ms)
    pub thin_all_the_way_time_ms: i64,

    /// Delay above which every quality check thins one step (ms)
    pub always_thin_time_ms: i64,

    /// Delay at which thinning may begin (ms)
    pub start_thinning_time_ms: i64,

    /// Delay below which thicking may begin (ms)
    pub start_thicking_time_ms: i64,

    /// Delay below which the stream snaps back to full quality (ms)
    pub thick_all_the_way_time_ms: i64,

    /// Minimum spacing between quality-level checks (ms of wall or media time)
    pub quality_check_interval_ms: i64,

    /// Source address advertised in the transport reply; the socket's local
    /// address when unset
    pub transport_src_addr: Option<IpAddr>,

    /// Reject SETUP when the client's RTCP port is not RTP+1
    pub enforce_rtcp_port_contiguity: bool,

    /// Minimum wakeup spacing proposed by the pacing window (ms)
    pub overbuffer_send_interval_ms: i64,

    /// How far ahead of a packet's transmit time overbuffering may run (ms)
    pub max_send_ahead_time_ms: i64,

    /// Per-packet trace toggles
    pub print_rtp: bool,
    pub print_sr: bool,
    pub print_rr: bool,
    pub print_app: bool,
    pub print_ack: bool,
}

impl Default for ServerPrefs {
    fn default() -> Self {
        Self {
            reliable_udp_enabled: true,
            reliable_udp_dirs: vec!["/".to_string()],
            slow_start_enabled: true,
            disable_thinning: false,
            drop_all_packets_time_ms: 2500,
            drop_all_video_packets_time_ms: 1750,
            thin_all_the_way_time_ms: 1500,
            always_thin_time_ms: 750,
            start_thinning_time_ms: 0,
            start_thicking_time_ms: 250,
            thick_all_the_way_time_ms: -2000,
            quality_check_interval_ms: 1000,
            transport_src_addr: None,
            enforce_rtcp_port_contiguity: false,
            overbuffer_send_interval_ms: 50,
            max_send_ahead_time_ms: 25_000,
            print_rtp: false,
            print_sr: false,
            print_rr: false,
            print_app: false,
            print_ack: false,
        }
    }
}

impl ServerPrefs {
    /// Build preferences from a by-name source, keeping defaults for
    /// anything absent or unparseable
    pub fn from_source(source: &dyn PrefsSource) -> Self {
        let mut prefs = Self::default();

        read(source, "reliable_udp_enabled", &mut prefs.reliable_udp_enabled);
        read_list(source, "reliable_udp_dirs", &mut prefs.reliable_udp_dirs);
        read(source, "slow_start_enabled", &mut prefs.slow_start_enabled);
        read(source, "disable_thinning", &mut prefs.disable_thinning);
        read(source, "drop_all_packets_time_ms", &mut prefs.drop_all_packets_time_ms);
        read(source, "drop_all_video_packets_time_ms", &mut prefs.drop_all_video_packets_time_ms);
        read(source, "thin_all_the_way_time_ms", &mut prefs.thin_all_the_way_time_ms);
        read(source, "always_thin_time_ms", &mut prefs.always_thin_time_ms);
        read(source, "start_thinning_time_ms", &mut prefs.start_thinning_time_ms);
        read(source, "start_thicking_time_ms", &mut prefs.start_thicking_time_ms);
        read(source, "thick_all_the_way_time_ms", &mut prefs.thick_all_the_way_time_ms);
        read(source, "quality_check_interval_ms", &mut prefs.quality_check_interval_ms);
        read(source, "enforce_rtcp_port_contiguity", &mut prefs.enforce_rtcp_port_contiguity);
        read(source, "overbuffer_send_interval_ms", &mut prefs.overbuffer_send_interval_ms);
        read(source, "max_send_ahead_time_ms", &mut prefs.max_send_ahead_time_ms);
        read(source, "print_rtp", &mut prefs.print_rtp);
        read(source, "print_sr", &mut prefs.print_sr);
        read(source, "print_rr", &mut prefs.print_rr);
        read(source, "print_app", &mut prefs.print_app);
        read(source, "print_ack", &mut prefs.print_ack);

        if let Some(raw) = source.get("transport_src_addr") {
            match raw.parse::<IpAddr>() {
                Ok(addr) => prefs.transport_src_addr = Some(addr),
                Err(_) => warn!(key = "transport_src_addr", value = %raw, "ignoring unparseable preference"),
            }
        }

        prefs
    }

    /// Whether `path` lies under one of the reliable-UDP-allowed subtrees
    pub fn is_path_inside_reliable_udp_dir(&self, path: &str) -> bool {
        self.reliable_udp_dirs
            .iter()
            .any(|dir| path.starts_with(dir.as_str()))
    }
}

fn read<T: FromStr>(source: &dyn PrefsSource, key: &str, slot: &mut T) {
    if let Some(raw) = source.get(key) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => warn!(key, value = %raw, "ignoring unparseable preference"),
        }
    }
}

fn read_list(source: &dyn PrefsSource, key: &str, slot: &mut Vec<String>) {
    if let Some(raw) = source.get(key) {
        *slot = raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
