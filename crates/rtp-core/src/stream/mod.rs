//! One media track's send pipeline.
//!
//! An [`RtpStream`] owns the track's endpoints and all per-track send
//! state. Every public mutation runs under the owning session's mutex;
//! the session passes its shared state (`SessionShared`) into each call,
//! so the compiler enforces what the lock protects.

pub mod resender;
pub mod setup;
pub mod stats;
pub mod thinning;

pub use setup::{
    RequestedTransport, SetupContext, SetupFlags, SetupReply, SetupRequest, TransportReply,
};
pub use stats::StreamStats;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::BytesMut;
use serde::Serialize;
use tracing::debug;

use crate::error::Error;
use crate::modules::AttrValue;
use crate::packet;
use crate::packet::rtcp::app::{parse_server_info, server_info_app};
use crate::packet::rtcp::{
    CompoundWalker, RtcpAck, RtcpApp, RtcpBye, RtcpPacketType, RtcpReceiverReport,
    RtcpSenderReport, RtcpSourceDescription, RtcpSubPacket, RtcpTelemetry,
};
use crate::session::SessionShared;
use crate::transport::pool::{PoolKey, UdpSocketPool};
use crate::transport::{Endpoint, Interest, TransportKind, UdpSocketPair, WriteOutcome};
use crate::{Result, RtpSsrc, RtpTimestamp, StreamId, SENDER_REPORT_INTERVAL_MS};

use resender::PacketResender;
use thinning::ThinningParams;

/// Media class of a track's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PayloadKind {
    Audio,
    Video,
    Unknown,
}

impl PayloadKind {
    pub fn is_video(&self) -> bool {
        matches!(self, PayloadKind::Video)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Audio => "audio",
            PayloadKind::Video => "video",
            PayloadKind::Unknown => "unknown",
        }
    }
}

/// Whether a write carries RTP media or RTCP control bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Rtp,
    Rtcp,
}

/// Flags accompanying one write call
#[derive(Debug, Clone, Copy)]
pub struct WriteFlags {
    pub kind: PacketKind,

    /// First write of a burst for one media frame
    pub burst_begin: bool,
}

impl WriteFlags {
    pub fn rtp() -> Self {
        Self {
            kind: PacketKind::Rtp,
            burst_begin: false,
        }
    }

    pub fn rtcp() -> Self {
        Self {
            kind: PacketKind::Rtcp,
            burst_begin: false,
        }
    }

    pub fn with_burst_begin(mut self) -> Self {
        self.burst_begin = true;
        self
    }
}

/// A packet with the time the media layer wants it on the wire
#[derive(Debug, Clone, Copy)]
pub struct ScheduledPacket<'a> {
    pub data: &'a [u8],
    pub transmit_time: i64,
}

/// Data echoed into the RTP-Info header of the PLAY response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpInfo {
    pub url: String,
    pub seq: u16,
    pub rtp_time: u32,
}

/// UDP endpoints owned by a stream, released on drop
pub(crate) struct StreamSockets {
    pub pair: Arc<UdpSocketPair>,
    pub pool_key: Option<PoolKey>,
    pub pool: Arc<UdpSocketPool>,
}

/// Per-track RTP send pipeline
pub struct RtpStream {
    // identity
    pub(crate) id: StreamId,
    pub(crate) session_id: u64,
    pub(crate) track_id: u32,
    pub(crate) ssrc: RtpSsrc,
    pub(crate) ssrc_string: String,
    pub(crate) client_ssrc: RtpSsrc,
    pub(crate) payload_kind: PayloadKind,
    pub(crate) payload_name: String,
    pub(crate) stream_url: String,

    // timing
    pub(crate) timescale: u32,
    pub(crate) first_seq_number: u16,
    pub(crate) first_timestamp: RtpTimestamp,
    timing_frozen: bool,
    pub(crate) last_rtp_timestamp: RtpTimestamp,
    pub(crate) stream_start_time_ms: i64,
    pub(crate) last_sender_report_time_ms: i64,

    // transport
    pub(crate) transport: TransportKind,
    pub(crate) sockets: Option<StreamSockets>,
    pub(crate) remote_addr: Option<IpAddr>,
    pub(crate) remote_rtp_port: u16,
    pub(crate) remote_rtcp_port: u16,
    pub(crate) local_rtp_port: u16,
    pub(crate) rtp_channel: u8,
    pub(crate) rtcp_channel: u8,
    pub(crate) is_multicast: bool,
    pub(crate) ttl: u32,
    pub(crate) late_tolerance_sec: f32,
    pub(crate) buffer_delay_sec: f32,

    // quality
    pub(crate) thinning: ThinningParams,
    quality_level: i32,
    pub(crate) num_quality_levels: u32,
    pub(crate) wait_on_level_adjustment: bool,
    pub(crate) last_current_packet_delay: i64,

    // reliable-UDP retransmission
    pub(crate) resender: PacketResender,

    // statistics
    pub(crate) stats: StreamStats,
    last_packet_count: u64,
}

impl RtpStream {
    pub(crate) fn new(
        id: StreamId,
        session_id: u64,
        track_id: u32,
        payload_kind: PayloadKind,
        payload_name: impl Into<String>,
        timescale: u32,
        now: i64,
    ) -> Self {
        let ssrc: RtpSsrc = rand::random();
        Self {
            id,
            session_id,
            track_id,
            ssrc,
            ssrc_string: ssrc.to_string(),
            client_ssrc: 0,
            payload_kind,
            payload_name: payload_name.into(),
            stream_url: String::new(),
            timescale,
            first_seq_number: 0,
            first_timestamp: 0,
            timing_frozen: false,
            last_rtp_timestamp: 0,
            stream_start_time_ms: now,
            last_sender_report_time_ms: 0,
            transport: TransportKind::RawUdp,
            sockets: None,
            remote_addr: None,
            remote_rtp_port: 0,
            remote_rtcp_port: 0,
            local_rtp_port: 0,
            rtp_channel: 0,
            rtcp_channel: 0,
            is_multicast: false,
            ttl: 0,
            late_tolerance_sec: 1.5,
            buffer_delay_sec: 3.0,
            thinning: ThinningParams::default(),
            quality_level: 0,
            num_quality_levels: 1,
            wait_on_level_adjustment: true,
            last_current_packet_delay: 0,
            resender: PacketResender::new(),
            stats: StreamStats::default(),
            last_packet_count: 0,
        }
    }

    // ------------------------------------------------------------------
    // accessors

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn ssrc(&self) -> RtpSsrc {
        self.ssrc
    }

    pub fn ssrc_string(&self) -> &str {
        &self.ssrc_string
    }

    pub fn client_ssrc(&self) -> RtpSsrc {
        self.client_ssrc
    }

    pub fn payload_kind(&self) -> PayloadKind {
        self.payload_kind
    }

    pub fn payload_name(&self) -> &str {
        &self.payload_name
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn timescale(&self) -> u32 {
        self.timescale
    }

    pub fn local_rtp_port(&self) -> u16 {
        self.local_rtp_port
    }

    /// Wall-clock time this stream object was created
    pub fn stream_start_time_ms(&self) -> i64 {
        self.stream_start_time_ms
    }

    pub fn channels(&self) -> (u8, u8) {
        (self.rtp_channel, self.rtcp_channel)
    }

    /// Quality level for the track. Non-UDP transports share one level
    /// per session; raw UDP keeps a per-stream level.
    pub fn quality_level(&self, shared: &SessionShared) -> i32 {
        if self.transport == TransportKind::RawUdp {
            self.quality_level
        } else {
            shared.quality_level
        }
    }

    pub(crate) fn set_quality_level(&mut self, shared: &mut SessionShared, level: i32) {
        let mut level = level.clamp(0, self.num_quality_levels as i32);
        if shared.prefs.disable_thinning {
            level = 0;
        }
        if self.transport == TransportKind::RawUdp {
            self.quality_level = level;
        } else {
            shared.quality_level = level;
        }
    }

    pub fn num_quality_levels(&self) -> u32 {
        self.num_quality_levels
    }

    /// Depth of the thinning ladder, taken from the media file's layout
    pub fn set_num_quality_levels(&mut self, levels: u32) {
        self.num_quality_levels = levels.max(1);
    }

    pub fn buffer_delay_secs(&self) -> f32 {
        self.buffer_delay_sec
    }

    /// Client-reported target buffer depth, updated by the media layer
    pub fn set_buffer_delay_secs(&mut self, secs: f32) {
        self.buffer_delay_sec = secs;
    }

    /// First sequence number of the track; frozen at PLAY
    pub fn set_first_seq_number(&mut self, seq: u16) -> Result<()> {
        if self.timing_frozen {
            return Err(Error::StreamState("stream timing is frozen after PLAY"));
        }
        self.first_seq_number = seq;
        Ok(())
    }

    /// First RTP timestamp of the track; frozen at PLAY
    pub fn set_first_timestamp(&mut self, timestamp: RtpTimestamp) -> Result<()> {
        if self.timing_frozen {
            return Err(Error::StreamState("stream timing is frozen after PLAY"));
        }
        self.first_timestamp = timestamp;
        Ok(())
    }

    pub(crate) fn freeze_timing(&mut self) {
        self.timing_frozen = true;
    }

    /// Data for the RTP-Info header of the PLAY response
    pub fn rtp_info(&self) -> RtpInfo {
        RtpInfo {
            url: self.stream_url.clone(),
            seq: self.first_seq_number,
            rtp_time: self.first_timestamp,
        }
    }

    // ------------------------------------------------------------------
    // write path

    /// Send one packet. Must be called with the session mutex held, which
    /// the owning session's `write` guarantees.
    pub(crate) fn write_packet(
        &mut self,
        shared: &mut SessionShared,
        pkt: &ScheduledPacket<'_>,
        flags: WriteFlags,
        now: i64,
    ) -> Result<WriteOutcome> {
        if pkt.data.is_empty() {
            return Err(Error::InvalidParameter("empty packet".to_string()));
        }
        let current_packet_delay = now - pkt.transmit_time;

        shared.overbuffer.empty_out_window(now);
        shared.update_current_bit_rate(now);

        if flags.burst_begin {
            shared.overbuffer.mark_beginning_of_write_burst();
        }

        match flags.kind {
            PacketKind::Rtcp => {
                // periodic reports go on time when overbuffering is on;
                // with it off, RTCP is paced like everything else
                if !shared.overbuffer.overbuffering_enabled() {
                    let wakeup =
                        shared
                            .overbuffer
                            .check_transmit_time(pkt.transmit_time, now, pkt.data.len());
                    if wakeup > now {
                        return Ok(WriteOutcome::parked_until(wakeup));
                    }
                }

                let outcome = self.send_rtcp_bytes(shared, pkt.data, now)?;
                if outcome.is_sent() {
                    self.log_sender_report(shared, pkt.data);
                }
                Ok(outcome)
            }
            PacketKind::Rtp => {
                let wakeup =
                    shared
                        .overbuffer
                        .check_transmit_time(pkt.transmit_time, now, pkt.data.len());
                if wakeup > now {
                    return Ok(WriteOutcome::parked_until(wakeup));
                }

                if !self.update_quality_level(shared, pkt.transmit_time, current_packet_delay, now)
                {
                    return Ok(WriteOutcome::Dropped);
                }

                let outcome = match self.transport {
                    TransportKind::InterleavedTcp => {
                        self.interleaved_write(shared, self.rtp_channel, pkt.data, now)?
                    }
                    TransportKind::ReliableUdp => {
                        self.reliable_rtp_write(shared, pkt.data, current_packet_delay, now)?
                    }
                    TransportKind::RawUdp => self.udp_rtp_write(pkt.data)?,
                };

                if let WriteOutcome::Sent { len } = outcome {
                    self.log_rtp_packet(shared, pkt.data);

                    shared.overbuffer.add_packet_to_window(len);
                    let quality = self.quality_level(shared);
                    shared.account_sent(len, current_packet_delay, quality, now);

                    if let Some(ts) = packet::rtp_timestamp(pkt.data) {
                        self.last_rtp_timestamp = ts;
                    }
                    self.stats.packet_count += 1;
                    self.stats.byte_count += len as u64;
                    self.stats.header_byte_count +=
                        packet::rtp_header_len(pkt.data).unwrap_or(0) as u64;

                    // piggyback a sender report on a successful send when
                    // one is due
                    if shared.send_rtcp_reports
                        && now > self.last_sender_report_time_ms + SENDER_REPORT_INTERVAL_MS
                    {
                        self.last_sender_report_time_ms = now;
                        // report the scheduled transmission time, which is
                        // what the client needs for synchronization
                        if let Err(e) =
                            self.send_sender_report(shared, pkt.transmit_time, now, false)
                        {
                            debug!(error = %e, "sender report emission failed");
                        }
                    }
                }

                Ok(outcome)
            }
        }
    }

    /// Run retransmissions for this stream if it is reliable
    pub(crate) fn send_retransmits(&mut self, shared: &mut SessionShared, now: i64) {
        if self.transport == TransportKind::ReliableUdp {
            self.resender.resend_due_entries(now, &mut shared.tracker);
        }
    }

    fn udp_rtp_write(&mut self, data: &[u8]) -> Result<WriteOutcome> {
        let (pair, remote) = self.rtp_destination()?;
        match pair.try_send_rtp(remote, data) {
            Ok(len) => Ok(WriteOutcome::Sent { len }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Ok(WriteOutcome::blocked_on(Endpoint::RtpSocket, Interest::Write))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn reliable_rtp_write(
        &mut self,
        shared: &mut SessionShared,
        data: &[u8],
        current_packet_delay: i64,
        now: i64,
    ) -> Result<WriteOutcome> {
        if self.resender.is_flow_controlled(&shared.tracker) {
            return Ok(WriteOutcome::blocked_on(Endpoint::RtpSocket, Interest::Write));
        }

        // lifetime is the span left until this packet goes stale
        let lifetime = self.thinning.drop_all_packets_delay - current_packet_delay;
        self.resender
            .add_packet(data, lifetime, now, &mut shared.tracker);

        let (pair, remote) = self.rtp_destination()?;
        // a blocked send is recovered by the retransmit timer
        let _ = pair.try_send_rtp(remote, data);
        Ok(WriteOutcome::Sent { len: data.len() })
    }

    fn interleaved_write(
        &mut self,
        shared: &mut SessionShared,
        channel: u8,
        data: &[u8],
        now: i64,
    ) -> Result<WriteOutcome> {
        let Some(sink) = shared.rtsp_sink.as_mut() else {
            // no RTSP connection to carry the stream right now
            return Ok(WriteOutcome::blocked_on(Endpoint::RtspStream, Interest::Write));
        };
        match sink.try_write_frame(channel, data) {
            Ok(()) => {
                // over TCP (and especially HTTP tunnels) there may be no
                // RTCP to refresh the session, so any successful write does
                shared.refresh_timeouts(now);
                Ok(WriteOutcome::Sent { len: data.len() })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Ok(WriteOutcome::blocked_on(Endpoint::RtspStream, Interest::Write))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn send_rtcp_bytes(
        &mut self,
        shared: &mut SessionShared,
        data: &[u8],
        now: i64,
    ) -> Result<WriteOutcome> {
        match self.transport {
            TransportKind::InterleavedTcp => {
                self.interleaved_write(shared, self.rtcp_channel, data, now)
            }
            _ => {
                let (pair, remote) = self.rtcp_destination()?;
                match pair.try_send_rtcp(remote, data) {
                    Ok(len) => {
                        shared.refresh_timeouts(now);
                        Ok(WriteOutcome::Sent { len })
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(
                        WriteOutcome::blocked_on(Endpoint::RtcpSocket, Interest::Write),
                    ),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    fn rtp_destination(&self) -> Result<(&UdpSocketPair, SocketAddr)> {
        let sockets = self
            .sockets
            .as_ref()
            .ok_or(Error::StreamState("stream has no UDP sockets"))?;
        let addr = self
            .remote_addr
            .ok_or(Error::StreamState("stream has no remote address"))?;
        Ok((&sockets.pair, SocketAddr::new(addr, self.remote_rtp_port)))
    }

    fn rtcp_destination(&self) -> Result<(&UdpSocketPair, SocketAddr)> {
        let sockets = self
            .sockets
            .as_ref()
            .ok_or(Error::StreamState("stream has no UDP sockets"))?;
        let addr = self
            .remote_addr
            .ok_or(Error::StreamState("stream has no remote address"))?;
        Ok((&sockets.pair, SocketAddr::new(addr, self.remote_rtcp_port)))
    }

    // ------------------------------------------------------------------
    // RTCP emission

    /// Compose and send the sender-report compound: SR, SDES CNAME, the
    /// server-info APP advertising the recommended ack timeout, and
    /// optionally a BYE on teardown.
    ///
    /// Callers hold the session mutex. `in_time` is the media time the
    /// report describes; `now` is the wall clock.
    pub(crate) fn send_sender_report(
        &mut self,
        shared: &mut SessionShared,
        in_time: i64,
        now: i64,
        append_bye: bool,
    ) -> Result<WriteOutcome> {
        let ack_timeout = shared.tracker.recommended_client_ack_timeout();
        self.stats.current_ack_timeout_ms = ack_timeout;

        let report = RtcpSenderReport {
            ssrc: self.ssrc,
            ntp_timestamp: shared
                .ntp_play_time
                .offset_millis(in_time - shared.play_time_ms),
            rtp_timestamp: self.last_rtp_timestamp,
            packet_count: self.stats.packet_count as u32,
            octet_count: self.stats.payload_byte_count() as u32,
            report_blocks: Vec::new(),
        };

        let mut buf = BytesMut::with_capacity(128);
        report.put(&mut buf);
        RtcpSourceDescription::new(self.ssrc, shared.cname.clone()).put(&mut buf);
        server_info_app(self.ssrc, ack_timeout).put(&mut buf);
        if append_bye {
            RtcpBye::new(self.ssrc).put(&mut buf);
        }

        let outcome = self.send_rtcp_bytes(shared, &buf, now)?;
        if outcome.is_sent() {
            self.log_sender_report(shared, &buf);
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // RTCP receive

    /// Walk one inbound compound RTCP datagram and dispatch each
    /// sub-packet. A malformed sub-packet aborts the whole datagram.
    ///
    /// Callers hold the session mutex (the session acquires it with a
    /// try-lock and drops the datagram on contention).
    pub(crate) fn process_rtcp(
        &mut self,
        shared: &mut SessionShared,
        data: &[u8],
        now: i64,
    ) -> Result<()> {
        for sub in CompoundWalker::new(data) {
            let sub = sub?;
            shared.total_rtcp_packets_received += 1;
            shared.total_rtcp_bytes_received += sub.raw.len() as u64;

            match RtcpPacketType::from_u8(sub.header.packet_type) {
                Some(RtcpPacketType::ReceiverReport) => {
                    self.handle_receiver_report(shared, &sub)?;
                }
                Some(RtcpPacketType::ApplicationDefined) => {
                    self.handle_app(shared, &sub, now)?;
                }
                Some(RtcpPacketType::SourceDescription) => {
                    let sdes = RtcpSourceDescription::parse(&sub.header, sub.body)?;
                    debug!(ssrc = sdes.ssrc, cname = %sdes.cname, "received SDES");
                }
                _ => {} // other types are skipped
            }
        }
        Ok(())
    }

    fn handle_receiver_report(
        &mut self,
        shared: &mut SessionShared,
        sub: &RtcpSubPacket<'_>,
    ) -> Result<()> {
        let report = RtcpReceiverReport::parse(&sub.header, sub.body)?;
        self.log_receiver_report(shared, &report);

        self.client_ssrc = report.ssrc;
        self.stats.fraction_lost = report.fraction_lost();
        self.stats.jitter = report.cumulative_jitter();

        let cur_total_lost = report.cumulative_lost();
        let delta_lost = cur_total_lost as i64 - self.stats.total_lost_packets as i64;
        let delta_sent = self.stats.packet_count as i64 - self.last_packet_count as i64;

        // some clients report more loss than we ever sent; ignore the
        // sample rather than corrupting the counters
        if delta_lost <= delta_sent {
            if delta_lost > 0 {
                shared.server.add_packets_lost(delta_lost as u64);
                self.stats.cur_packets_lost_in_interval = delta_lost as u32;
                self.stats.total_lost_packets = cur_total_lost;
            } else {
                // loss went down: out-of-order report, treat as zero delta
                self.stats.cur_packets_lost_in_interval = 0;
            }
            self.stats.packet_count_in_interval = delta_sent as u32;
            self.last_packet_count = self.stats.packet_count;
        }
        Ok(())
    }

    fn handle_app(
        &mut self,
        shared: &mut SessionShared,
        sub: &RtcpSubPacket<'_>,
        now: i64,
    ) -> Result<()> {
        let app = RtcpApp::parse(&sub.header, sub.body)?;

        if let Some(ack) = RtcpAck::from_app(&app)? {
            if self.transport == TransportKind::ReliableUdp {
                // an ack before anything was sent is spurious, likely from
                // a recycled session; abort the datagram
                if !shared.tracker.ready_for_ack_processing() {
                    return Err(Error::StreamState("ack received before first send"));
                }
                self.log_ack(shared, &ack);
                for seq in ack.acked_sequences().collect::<Vec<_>>() {
                    self.resender.ack(seq, now, &mut shared.tracker);
                }
            }
            return Ok(());
        }

        if let Some(telemetry) = RtcpTelemetry::from_app(&app)? {
            self.log_app(shared, &telemetry);

            self.stats.receiver_bit_rate = telemetry.receiver_bit_rate;
            self.stats.avg_late_ms = telemetry.avg_late_ms;
            self.stats.percent_lost = telemetry.percent_lost;
            self.stats.avg_buffer_delay_ms = telemetry.avg_buffer_delay_ms;
            self.stats.getting_better = telemetry.getting_better;
            self.stats.getting_worse = telemetry.getting_worse;
            self.stats.num_eyes = telemetry.num_eyes;
            self.stats.num_eyes_active = telemetry.num_eyes_active;
            self.stats.num_eyes_paused = telemetry.num_eyes_paused;
            self.stats.total_packets_received = telemetry.total_packets_received;
            self.stats.total_packets_dropped = telemetry.total_packets_dropped;
            self.stats.total_packets_lost = telemetry.total_packets_lost;
            self.stats.client_buffer_fill = telemetry.client_buffer_fill;
            self.stats.frame_rate = telemetry.frame_rate;
            self.stats.expected_frame_rate = telemetry.expected_frame_rate;
            self.stats.audio_dry_count = telemetry.audio_dry_count;

            // the client steers the pacing window for non-UDP transports
            if self.transport != TransportKind::RawUdp {
                shared
                    .overbuffer
                    .set_window_size(telemetry.overbuffer_window_size);
            }
            return Ok(());
        }

        // an APP we don't speak, e.g. our own server-info reflected back
        if parse_server_info(&app).is_err() {
            debug!(name = %app.name_str(), "skipping unknown APP packet");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // per-packet trace lines

    fn media_seconds(&self, timestamp: u32) -> f32 {
        if self.timescale > 0 && timestamp >= self.first_timestamp {
            (timestamp - self.first_timestamp) as f32 / self.timescale as f32
        } else {
            0.0
        }
    }

    fn log_rtp_packet(&self, shared: &SessionShared, data: &[u8]) {
        if !shared.prefs.print_rtp {
            return;
        }
        let seq = packet::rtp_sequence_number(data).unwrap_or(0);
        let timestamp = packet::rtp_timestamp(data).unwrap_or(0);
        debug!(
            session = self.session_id,
            transport = self.transport.as_str(),
            payload = %self.payload_name,
            kind = self.payload_kind.as_str(),
            seq,
            timestamp,
            ts_secs = self.media_seconds(timestamp) as f64,
            len = data.len(),
            "send RTP"
        );
    }

    fn log_sender_report(&self, shared: &SessionShared, data: &[u8]) {
        if !shared.prefs.print_sr {
            return;
        }
        if let Some(Ok(sub)) = CompoundWalker::new(data).next() {
            if let Ok(sr) = RtcpSenderReport::parse(&sub.header, sub.body) {
                debug!(
                    session = self.session_id,
                    transport = self.transport.as_str(),
                    ssrc = sr.ssrc,
                    rtp_timestamp = sr.rtp_timestamp,
                    packets = sr.packet_count,
                    bytes = sr.octet_count,
                    ts_secs = self.media_seconds(sr.rtp_timestamp) as f64,
                    "send SR"
                );
            }
        }
    }

    fn log_receiver_report(&self, shared: &SessionShared, report: &RtcpReceiverReport) {
        if !shared.prefs.print_rr {
            return;
        }
        debug!(
            session = self.session_id,
            ssrc = report.ssrc,
            fraction_lost = report.fraction_lost(),
            cumulative_lost = report.cumulative_lost(),
            jitter = report.cumulative_jitter(),
            "recv RR"
        );
    }

    fn log_app(&self, shared: &SessionShared, telemetry: &RtcpTelemetry) {
        if !shared.prefs.print_app {
            return;
        }
        debug!(
            session = self.session_id,
            receiver_bit_rate = telemetry.receiver_bit_rate,
            avg_late_ms = telemetry.avg_late_ms,
            percent_lost = telemetry.percent_lost,
            buffer_fill = telemetry.client_buffer_fill,
            "recv APP"
        );
    }

    fn log_ack(&self, shared: &SessionShared, ack: &RtcpAck) {
        if !shared.prefs.print_ack {
            return;
        }
        debug!(
            session = self.session_id,
            base_seq = ack.base_seq,
            mask_bits = ack.mask_bits(),
            "recv ACK"
        );
    }

    // ------------------------------------------------------------------
    // instrumentation

    /// Look up one instrumentation attribute by its descriptor name
    pub fn attribute(&self, shared: &SessionShared, name: &str) -> Option<AttrValue> {
        let value = match name {
            "track_id" => AttrValue::U32(self.track_id),
            "ssrc" => AttrValue::U32(self.ssrc),
            "client_ssrc" => AttrValue::U32(self.client_ssrc),
            "payload_name" => AttrValue::Str(self.payload_name.clone()),
            "payload_kind" => AttrValue::Str(self.payload_kind.as_str().to_string()),
            "stream_url" => AttrValue::Str(self.stream_url.clone()),
            "transport" => AttrValue::Str(self.transport.as_str().to_string()),
            "first_seq_number" => AttrValue::U16(self.first_seq_number),
            "first_timestamp" => AttrValue::U32(self.first_timestamp),
            "timescale" => AttrValue::U32(self.timescale),
            "quality_level" => AttrValue::I32(self.quality_level(shared)),
            "num_quality_levels" => AttrValue::U32(self.num_quality_levels),
            "buffer_delay_secs" => AttrValue::F32(self.buffer_delay_sec),
            "packet_count" => AttrValue::U64(self.stats.packet_count),
            "byte_count" => AttrValue::U64(self.stats.byte_count),
            "fraction_lost" => AttrValue::U32(self.stats.fraction_lost),
            "total_lost_packets" => AttrValue::U32(self.stats.total_lost_packets),
            "jitter" => AttrValue::U32(self.stats.jitter),
            "receiver_bit_rate" => AttrValue::U32(self.stats.receiver_bit_rate),
            "avg_late_ms" => AttrValue::U16(self.stats.avg_late_ms),
            "percent_lost" => AttrValue::U16(self.stats.percent_lost),
            "avg_buffer_delay_ms" => AttrValue::U16(self.stats.avg_buffer_delay_ms),
            "getting_better" => AttrValue::Bool(self.stats.getting_better),
            "getting_worse" => AttrValue::Bool(self.stats.getting_worse),
            "num_eyes" => AttrValue::U32(self.stats.num_eyes),
            "num_eyes_active" => AttrValue::U32(self.stats.num_eyes_active),
            "num_eyes_paused" => AttrValue::U32(self.stats.num_eyes_paused),
            "total_packets_received" => AttrValue::U32(self.stats.total_packets_received),
            "total_packets_dropped" => AttrValue::U16(self.stats.total_packets_dropped),
            "total_packets_lost" => AttrValue::U16(self.stats.total_packets_lost),
            "client_buffer_fill" => AttrValue::U16(self.stats.client_buffer_fill),
            "frame_rate" => AttrValue::U16(self.stats.frame_rate),
            "expected_frame_rate" => AttrValue::U16(self.stats.expected_frame_rate),
            "audio_dry_count" => AttrValue::U16(self.stats.audio_dry_count),
            "stale_packets_dropped" => AttrValue::U32(self.stats.stale_packets_dropped),
            "current_ack_timeout_ms" => AttrValue::U32(self.stats.current_ack_timeout_ms),
            "server_rtp_port" => AttrValue::U16(self.local_rtp_port),
            "client_rtp_port" => AttrValue::U16(self.remote_rtp_port),
            "is_tcp" => AttrValue::Bool(self.transport.is_tcp()),
            "is_multicast" => AttrValue::Bool(self.is_multicast),
            "ttl" => AttrValue::U32(self.ttl),
            _ => return None,
        };
        Some(value)
    }
}

impl Drop for RtpStream {
    fn drop(&mut self) {
        if let Some(sockets) = &self.sockets {
            if let Some(addr) = self.remote_addr {
                sockets.pair.demux.unregister(addr, self.remote_rtcp_port);
            }
            if let Some(key) = &sockets.pool_key {
                sockets.pool.release(key);
            }
        }
    }
}
