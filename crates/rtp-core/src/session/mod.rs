//! The RTP session: owner of its streams and of everything they share.
//!
//! A session is one client's set of media tracks. All per-stream mutable
//! state sits behind the single session mutex; the write path takes it
//! with a try-lock and reports would-block on contention, and the RTCP
//! receive path takes it with a try-lock and drops the datagram instead
//! of waiting (the caller already holds the demuxer lock, and the lock
//! order is demuxer before session).

pub mod bandwidth;
pub mod overbuffer;

pub use bandwidth::BandwidthTracker;
pub use overbuffer::OverbufferWindow;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::error::Error;
use crate::modules::{ModuleRegistry, RtcpProcessContext};
use crate::packet::rtcp::NtpTimestamp;
use crate::prefs::ServerPrefs;
use crate::stream::{
    PacketKind, PayloadKind, RtpInfo, RtpStream, ScheduledPacket, SetupContext, SetupFlags,
    SetupReply, SetupRequest, StreamStats, WriteFlags,
};
use crate::transport::{InterleavedSink, Interest, TransportKind, WriteOutcome};
use crate::{Result, StreamId};

/// Idle spans after which the reaper may destroy a session
pub const SESSION_IDLE_TIMEOUT_MS: i64 = 120_000;
pub const RTSP_IDLE_TIMEOUT_MS: i64 = 180_000;

/// Server-wide counters shared by every session, updated without any lock
#[derive(Debug, Default)]
pub struct ServerTotals {
    rtp_bytes: AtomicU64,
    rtp_packets: AtomicU64,
    rtp_packets_lost: AtomicU64,
    late_ms: AtomicI64,
    quality_steps: AtomicI64,
}

impl ServerTotals {
    pub fn record_sent(&self, len: usize, delay_ms: i64, quality: i32) {
        self.rtp_bytes.fetch_add(len as u64, Ordering::Relaxed);
        self.rtp_packets.fetch_add(1, Ordering::Relaxed);
        self.late_ms.fetch_add(delay_ms, Ordering::Relaxed);
        self.quality_steps.fetch_add(quality as i64, Ordering::Relaxed);
    }

    pub fn add_packets_lost(&self, count: u64) {
        self.rtp_packets_lost.fetch_add(count, Ordering::Relaxed);
    }

    pub fn rtp_bytes(&self) -> u64 {
        self.rtp_bytes.load(Ordering::Relaxed)
    }

    pub fn rtp_packets(&self) -> u64 {
        self.rtp_packets.load(Ordering::Relaxed)
    }

    pub fn rtp_packets_lost(&self) -> u64 {
        self.rtp_packets_lost.load(Ordering::Relaxed)
    }

    pub fn accumulated_late_ms(&self) -> i64 {
        self.late_ms.load(Ordering::Relaxed)
    }

    pub fn accumulated_quality_steps(&self) -> i64 {
        self.quality_steps.load(Ordering::Relaxed)
    }
}

/// Idle timer refreshed by any successful I/O
#[derive(Debug, Clone, Copy)]
pub struct IdleTimeout {
    last_refresh_ms: i64,
    interval_ms: i64,
}

impl IdleTimeout {
    pub fn new(interval_ms: i64) -> Self {
        Self {
            last_refresh_ms: 0,
            interval_ms,
        }
    }

    pub fn refresh(&mut self, now: i64) {
        self.last_refresh_ms = now;
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.last_refresh_ms != 0 && now - self.last_refresh_ms > self.interval_ms
    }
}

/// Session state every stream works against, protected by the session
/// mutex together with the streams themselves
pub struct SessionShared {
    pub(crate) prefs: Arc<ServerPrefs>,
    pub(crate) server: Arc<ServerTotals>,

    pub(crate) overbuffer: OverbufferWindow,
    pub(crate) tracker: BandwidthTracker,

    /// Quality level shared by all non-UDP streams of the session
    pub(crate) quality_level: i32,
    pub(crate) last_quality_check_time: i64,
    pub(crate) last_quality_check_media_time: i64,
    pub(crate) started_thinning: bool,

    pub(crate) playing: bool,
    pub(crate) play_time_ms: i64,
    pub(crate) ntp_play_time: NtpTimestamp,
    pub(crate) send_rtcp_reports: bool,

    /// The RTSP connection's byte stream for interleaved transports
    pub(crate) rtsp_sink: Option<Box<dyn InterleavedSink>>,
    next_channel: u8,
    pub(crate) all_tracks_interleaved: bool,

    /// CNAME carried in every sender report's SDES chunk
    pub(crate) cname: String,

    // send accounting
    pub(crate) packets_sent: u64,
    pub(crate) bytes_sent: u64,
    bitrate_window_start_ms: i64,
    bytes_in_bitrate_window: u64,
    pub(crate) current_bit_rate: u32,

    session_timeout: IdleTimeout,
    rtsp_timeout: IdleTimeout,

    pub(crate) total_rtcp_packets_received: u64,
    pub(crate) total_rtcp_bytes_received: u64,
}

impl SessionShared {
    fn new(prefs: Arc<ServerPrefs>, server: Arc<ServerTotals>) -> Self {
        let cname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "rtserve".to_string());
        Self {
            overbuffer: OverbufferWindow::new(
                prefs.overbuffer_send_interval_ms,
                prefs.max_send_ahead_time_ms,
            ),
            tracker: BandwidthTracker::new(prefs.slow_start_enabled),
            quality_level: 0,
            last_quality_check_time: 0,
            last_quality_check_media_time: 0,
            started_thinning: false,
            playing: false,
            play_time_ms: 0,
            ntp_play_time: NtpTimestamp::default(),
            send_rtcp_reports: true,
            rtsp_sink: None,
            next_channel: 0,
            all_tracks_interleaved: true,
            cname,
            packets_sent: 0,
            bytes_sent: 0,
            bitrate_window_start_ms: 0,
            bytes_in_bitrate_window: 0,
            current_bit_rate: 0,
            session_timeout: IdleTimeout::new(SESSION_IDLE_TIMEOUT_MS),
            rtsp_timeout: IdleTimeout::new(RTSP_IDLE_TIMEOUT_MS),
            total_rtcp_packets_received: 0,
            total_rtcp_bytes_received: 0,
            prefs,
            server,
        }
    }

    /// Two consecutive channel numbers for an interleaved stream; the
    /// RTCP channel is always RTP+1
    pub(crate) fn allocate_channel_pair(&mut self) -> (u8, u8) {
        let rtp = self.next_channel;
        self.next_channel = self.next_channel.wrapping_add(2);
        (rtp, rtp + 1)
    }

    /// Any successful outbound datagram or interleaved write keeps both
    /// the RTP session and its RTSP session alive
    pub(crate) fn refresh_timeouts(&mut self, now: i64) {
        self.session_timeout.refresh(now);
        self.rtsp_timeout.refresh(now);
    }

    pub(crate) fn account_sent(&mut self, len: usize, delay_ms: i64, quality: i32, now: i64) {
        self.packets_sent += 1;
        self.bytes_sent += len as u64;
        self.bytes_in_bitrate_window += len as u64;
        self.server.record_sent(len, delay_ms, quality);
        self.refresh_timeouts(now);
    }

    /// Roll the one-second bitrate window forward
    pub(crate) fn update_current_bit_rate(&mut self, now: i64) {
        if self.bitrate_window_start_ms == 0 {
            self.bitrate_window_start_ms = now;
            return;
        }
        let elapsed = now - self.bitrate_window_start_ms;
        if elapsed >= 1000 {
            self.current_bit_rate =
                (self.bytes_in_bitrate_window * 8 * 1000 / elapsed as u64) as u32;
            self.bytes_in_bitrate_window = 0;
            self.bitrate_window_start_ms = now;
        }
    }

    pub fn overbuffer(&self) -> &OverbufferWindow {
        &self.overbuffer
    }

    pub fn bandwidth_tracker(&self) -> &BandwidthTracker {
        &self.tracker
    }

    pub fn current_bit_rate(&self) -> u32 {
        self.current_bit_rate
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn all_tracks_interleaved(&self) -> bool {
        self.all_tracks_interleaved
    }

    pub fn rtcp_packets_received(&self) -> u64 {
        self.total_rtcp_packets_received
    }

    pub fn rtcp_bytes_received(&self) -> u64 {
        self.total_rtcp_bytes_received
    }

    pub fn cname(&self) -> &str {
        &self.cname
    }
}

struct SessionInner {
    shared: SessionShared,
    streams: Vec<RtpStream>,
}

/// One client's RTP session
pub struct RtpSession {
    id: u64,
    inner: Mutex<SessionInner>,
}

impl RtpSession {
    pub fn new(id: u64, prefs: Arc<ServerPrefs>, server: Arc<ServerTotals>) -> Self {
        Self {
            id,
            inner: Mutex::new(SessionInner {
                shared: SessionShared::new(prefs, server),
                streams: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Create a stream for one media track with a fresh SSRC
    pub fn add_stream(
        &self,
        track_id: u32,
        payload_kind: PayloadKind,
        payload_name: impl Into<String>,
        timescale: u32,
        now: i64,
    ) -> StreamId {
        let mut inner = self.inner.lock();
        let id = inner.streams.len() as StreamId;
        inner.streams.push(RtpStream::new(
            id,
            self.id,
            track_id,
            payload_kind,
            payload_name,
            timescale,
            now,
        ));
        id
    }

    /// Configure a stream's transport from a parsed SETUP request
    pub fn setup_stream(
        &self,
        stream_id: StreamId,
        req: &SetupRequest,
        flags: SetupFlags,
        ctx: &SetupContext<'_>,
    ) -> Result<SetupReply> {
        let inner = &mut *self.inner.lock();
        let SessionInner { shared, streams } = inner;
        let stream = streams
            .get_mut(stream_id as usize)
            .ok_or_else(|| Error::InvalidParameter(format!("unknown stream {stream_id}")))?;
        stream.setup(shared, req, flags, ctx)
    }

    /// Attach the RTSP connection's byte stream for interleaved writes
    pub fn set_rtsp_sink(&self, sink: Box<dyn InterleavedSink>) {
        self.inner.lock().shared.rtsp_sink = Some(sink);
    }

    /// Transition into PLAY: fix the time base, freeze per-stream timing,
    /// derive thinning thresholds, and arm the resenders
    pub fn play(&self, now: i64, send_rtcp_reports: bool) {
        let inner = &mut *self.inner.lock();
        let SessionInner { shared, streams } = inner;

        shared.playing = true;
        shared.play_time_ms = now;
        shared.ntp_play_time = NtpTimestamp::from_unix_millis(now);
        shared.send_rtcp_reports = send_rtcp_reports;

        for stream in streams.iter_mut() {
            stream.set_thinning_params(shared);
            stream.freeze_timing();
            stream.resender.set_ready(true);
        }
        info!(session = self.id, play_time = now, "session playing");
    }

    /// Send one packet on a stream.
    ///
    /// Takes the session mutex with a try-lock; contention is reported as
    /// would-block so the dispatcher reschedules instead of stalling a
    /// worker thread.
    pub fn write(
        &self,
        stream_id: StreamId,
        pkt: &ScheduledPacket<'_>,
        flags: WriteFlags,
        now: i64,
    ) -> Result<WriteOutcome> {
        let Some(mut guard) = self.inner.try_lock() else {
            return Ok(WriteOutcome::WouldBlock {
                endpoint: None,
                interest: Interest::Write,
                wakeup: None,
            });
        };
        let inner = &mut *guard;
        let SessionInner { shared, streams } = inner;

        // every write tick doubles as the retransmit timer for the
        // session's reliable streams
        if flags.kind == PacketKind::Rtp
            && streams
                .iter()
                .any(|s| s.transport_kind() == TransportKind::ReliableUdp)
        {
            for stream in streams.iter_mut() {
                stream.send_retransmits(shared, now);
            }
        }

        let stream = streams
            .get_mut(stream_id as usize)
            .ok_or_else(|| Error::InvalidParameter(format!("unknown stream {stream_id}")))?;
        stream.write_packet(shared, pkt, flags, now)
    }

    /// Run due retransmissions for every reliable stream; the dispatcher
    /// calls this from its timer as well
    pub fn send_retransmits(&self, now: i64) {
        let inner = &mut *self.inner.lock();
        let SessionInner { shared, streams } = inner;
        for stream in streams.iter_mut() {
            stream.send_retransmits(shared, now);
        }
    }

    /// Feed one inbound RTCP datagram to a stream.
    ///
    /// The caller arrives holding the UDP demuxer lock; blocking on the
    /// session here could deadlock against the write path, so contention
    /// silently drops the datagram. Timeouts are refreshed regardless of
    /// packet validity.
    pub fn process_rtcp(
        &self,
        stream_id: StreamId,
        data: &[u8],
        now: i64,
        registry: &ModuleRegistry,
    ) {
        let Some(mut guard) = self.inner.try_lock() else {
            trace!(session = self.id, "RTCP dropped on session lock contention");
            return;
        };
        Self::process_rtcp_locked(self.id, &mut guard, stream_id, data, now, registry);
    }

    /// Route one interleaved frame received on the RTSP connection.
    /// Frames on a stream's RTP channel are ignored; frames on its RTCP
    /// channel feed the regular RTCP path.
    pub fn process_interleaved(
        &self,
        channel: u8,
        data: &[u8],
        now: i64,
        registry: &ModuleRegistry,
    ) {
        let Some(mut guard) = self.inner.try_lock() else {
            trace!(session = self.id, "interleaved RTCP dropped on session lock contention");
            return;
        };
        let target = guard.streams.iter().find_map(|s| {
            let (rtp, rtcp) = s.channels();
            if s.transport_kind().is_tcp() && channel == rtcp {
                Some(Ok(s.id()))
            } else if s.transport_kind().is_tcp() && channel == rtp {
                Some(Err(())) // inbound RTP is not consumed by the server
            } else {
                None
            }
        });
        match target {
            Some(Ok(stream_id)) => {
                Self::process_rtcp_locked(self.id, &mut guard, stream_id, data, now, registry);
            }
            Some(Err(())) | None => {}
        }
    }

    fn process_rtcp_locked(
        session_id: u64,
        inner: &mut SessionInner,
        stream_id: StreamId,
        data: &[u8],
        now: i64,
        registry: &ModuleRegistry,
    ) {
        inner.shared.refresh_timeouts(now);
        let SessionInner { shared, streams } = inner;
        let Some(stream) = streams.get_mut(stream_id as usize) else {
            return;
        };
        match stream.process_rtcp(shared, data, now) {
            Ok(()) => {
                let stream = &streams[stream_id as usize];
                registry.dispatch_rtcp(&RtcpProcessContext {
                    session_id,
                    stream,
                    shared,
                    packet: data,
                });
            }
            Err(e) => debug!(session = session_id, error = %e, "aborted malformed RTCP datagram"),
        }
    }

    /// Final sender reports with BYE appended, sent at teardown while the
    /// session still owns its sockets
    pub fn teardown(&self, now: i64) {
        let inner = &mut *self.inner.lock();
        let SessionInner { shared, streams } = inner;
        for stream in streams.iter_mut() {
            if let Err(e) = stream.send_sender_report(shared, now, now, true) {
                debug!(session = self.id, error = %e, "teardown BYE not sent");
            }
        }
        info!(session = self.id, "session teardown");
    }

    /// Snapshot one stream's statistics
    pub fn stream_stats(&self, stream_id: StreamId) -> Option<StreamStats> {
        self.inner
            .lock()
            .streams
            .get(stream_id as usize)
            .map(|s| s.stats().clone())
    }

    /// Current quality level of a stream (the session's shared level for
    /// non-UDP transports)
    pub fn quality_level(&self, stream_id: StreamId) -> Option<i32> {
        let inner = self.inner.lock();
        inner
            .streams
            .get(stream_id as usize)
            .map(|s| s.quality_level(&inner.shared))
    }

    /// RTP-Info data for the PLAY response
    pub fn rtp_info(&self, stream_id: StreamId) -> Option<RtpInfo> {
        self.inner
            .lock()
            .streams
            .get(stream_id as usize)
            .map(|s| s.rtp_info())
    }

    /// Typed instrumentation attribute for one stream
    pub fn stream_attribute(
        &self,
        stream_id: StreamId,
        name: &str,
    ) -> Option<crate::modules::AttrValue> {
        let inner = self.inner.lock();
        inner
            .streams
            .get(stream_id as usize)
            .and_then(|s| s.attribute(&inner.shared, name))
    }

    pub fn overbuffering_enabled(&self) -> bool {
        self.inner.lock().shared.overbuffer.overbuffering_enabled()
    }

    pub fn is_timed_out(&self, now: i64) -> bool {
        self.inner.lock().shared.session_timeout.is_expired(now)
    }

    /// Read access to one stream under the session mutex
    pub fn with_stream<R>(&self, stream_id: StreamId, f: impl FnOnce(&RtpStream) -> R) -> Option<R> {
        self.inner.lock().streams.get(stream_id as usize).map(f)
    }

    /// Mutate one stream under the session mutex; used by the RTSP layer
    /// to fill in track configuration before PLAY
    pub fn with_stream_mut<R>(
        &self,
        stream_id: StreamId,
        f: impl FnOnce(&mut RtpStream) -> R,
    ) -> Option<R> {
        self.inner.lock().streams.get_mut(stream_id as usize).map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::RequestedTransport;
    use crate::transport::pool::UdpSocketPool;
    use std::net::IpAddr;

    fn localhost() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    /// Bind a client-side socket pair with an even base port
    fn bind_client_pair() -> (std::net::UdpSocket, std::net::UdpSocket, u16, u16) {
        for _ in 0..40 {
            let rtp = std::net::UdpSocket::bind((localhost(), 0)).unwrap();
            let port = rtp.local_addr().unwrap().port();
            if port & 1 != 0 || port == u16::MAX {
                continue;
            }
            if let Ok(rtcp) = std::net::UdpSocket::bind((localhost(), port + 1)) {
                return (rtp, rtcp, port, port + 1);
            }
        }
        panic!("no even client port pair found");
    }

    fn scenario_prefs() -> ServerPrefs {
        ServerPrefs {
            start_thinning_time_ms: 1000,
            always_thin_time_ms: 2000,
            thin_all_the_way_time_ms: 5000,
            drop_all_packets_time_ms: 10_000,
            drop_all_video_packets_time_ms: 10_000,
            start_thicking_time_ms: 800,
            thick_all_the_way_time_ms: 250,
            quality_check_interval_ms: 1000,
            ..Default::default()
        }
    }

    fn new_session(prefs: ServerPrefs) -> (Arc<RtpSession>, Arc<ServerTotals>) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let server = Arc::new(ServerTotals::default());
        let session = Arc::new(RtpSession::new(7, Arc::new(prefs), server.clone()));
        (session, server)
    }

    fn setup_request(transport: RequestedTransport, rtp_port: u16, rtcp_port: u16) -> SetupRequest {
        SetupRequest {
            file_name: "/movie.mp4/trackID=1".to_string(),
            file_path: "/movie.mp4".to_string(),
            late_tolerance_sec: None,
            transport,
            dest_addr: None,
            client_rtp_port: rtp_port,
            client_rtcp_port: rtcp_port,
            source_addr: None,
            ttl: 0,
            dynamic_rate: None,
        }
    }

    fn setup_udp_stream(
        session: &RtpSession,
        pool: &Arc<UdpSocketPool>,
        transport: RequestedTransport,
    ) -> (StreamId, std::net::UdpSocket, std::net::UdpSocket) {
        let (client_rtp, client_rtcp, rtp_port, rtcp_port) = bind_client_pair();
        let stream_id = session.add_stream(1, PayloadKind::Video, "H264", 90_000, 0);
        let local = [localhost()];
        let ctx = SetupContext {
            client_addr: localhost(),
            rtsp_local_addr: localhost(),
            local_addrs: &local,
            pool,
        };
        session
            .setup_stream(
                stream_id,
                &setup_request(transport, rtp_port, rtcp_port),
                SetupFlags::default(),
                &ctx,
            )
            .unwrap();
        (stream_id, client_rtp, client_rtcp)
    }

    fn rtp_packet(seq: u16, timestamp: u32, len: usize) -> Vec<u8> {
        let mut pkt = vec![0u8; len.max(12)];
        pkt[0] = 0x80;
        pkt[2..4].copy_from_slice(&seq.to_be_bytes());
        pkt[4..8].copy_from_slice(&timestamp.to_be_bytes());
        pkt
    }

    // ------------------------------------------------------------------
    // SETUP validation

    #[tokio::test]
    async fn test_setup_rejects_odd_rtp_port() {
        let (session, _) = new_session(ServerPrefs::default());
        let pool = Arc::new(UdpSocketPool::new());
        let stream_id = session.add_stream(1, PayloadKind::Audio, "AAC", 44_100, 0);
        let local = [localhost()];
        let ctx = SetupContext {
            client_addr: localhost(),
            rtsp_local_addr: localhost(),
            local_addrs: &local,
            pool: &pool,
        };

        let err = session
            .setup_stream(
                stream_id,
                &setup_request(RequestedTransport::Udp, 5001, 5002),
                SetupFlags::default(),
                &ctx,
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "RTP port must be even");

        session
            .setup_stream(
                stream_id,
                &setup_request(RequestedTransport::Udp, 5000, 5001),
                SetupFlags::default(),
                &ctx,
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_setup_rejects_zero_ports_and_alt_dest() {
        let (session, _) = new_session(ServerPrefs::default());
        let pool = Arc::new(UdpSocketPool::new());
        let stream_id = session.add_stream(1, PayloadKind::Audio, "AAC", 44_100, 0);
        let local = [localhost()];
        let ctx = SetupContext {
            client_addr: localhost(),
            rtsp_local_addr: localhost(),
            local_addrs: &local,
            pool: &pool,
        };

        let err = session
            .setup_stream(
                stream_id,
                &setup_request(RequestedTransport::Udp, 5000, 0),
                SetupFlags::default(),
                &ctx,
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "no client port in transport");

        let mut req = setup_request(RequestedTransport::Udp, 5000, 5001);
        req.dest_addr = Some("192.0.2.99".parse().unwrap());
        let err = session
            .setup_stream(stream_id, &req, SetupFlags::default(), &ctx)
            .unwrap_err();
        assert_eq!(err.to_string(), "alternate destination not allowed");
    }

    #[tokio::test]
    async fn test_reliable_udp_downgrades_outside_allowlist() {
        let prefs = ServerPrefs {
            reliable_udp_dirs: vec!["/vod".to_string()],
            ..Default::default()
        };
        let (session, _) = new_session(prefs);
        let pool = Arc::new(UdpSocketPool::new());
        let (stream_id, _rtp, _rtcp) =
            setup_udp_stream(&session, &pool, RequestedTransport::ReliableUdp);

        let kind = session
            .with_stream(stream_id, |s| s.transport_kind())
            .unwrap();
        assert_eq!(kind, TransportKind::RawUdp);
    }

    #[tokio::test]
    async fn test_reliable_udp_honored_inside_allowlist() {
        let (session, _) = new_session(ServerPrefs::default());
        let pool = Arc::new(UdpSocketPool::new());
        let (stream_id, _rtp, _rtcp) =
            setup_udp_stream(&session, &pool, RequestedTransport::ReliableUdp);

        let kind = session
            .with_stream(stream_id, |s| s.transport_kind())
            .unwrap();
        assert_eq!(kind, TransportKind::ReliableUdp);
    }

    #[tokio::test]
    async fn test_multicast_destination_gets_dedicated_sockets() {
        use crate::modules::AttrValue;

        let (session, _) = new_session(ServerPrefs::default());
        let pool = Arc::new(UdpSocketPool::new());
        let stream_id = session.add_stream(1, PayloadKind::Video, "H264", 90_000, 0);
        let local = [localhost()];
        let ctx = SetupContext {
            client_addr: localhost(),
            rtsp_local_addr: localhost(),
            local_addrs: &local,
            pool: &pool,
        };

        let mut req = setup_request(RequestedTransport::Udp, 5000, 5001);
        req.dest_addr = Some("239.10.20.30".parse().unwrap());
        req.ttl = 16;
        let flags = SetupFlags {
            allow_destination: true,
            ..Default::default()
        };
        session.setup_stream(stream_id, &req, flags, &ctx).unwrap();

        // a dedicated pair, never entered into the shared pool
        assert_eq!(pool.shared_pair_count(), 0);
        assert_eq!(
            session.stream_attribute(stream_id, "is_multicast"),
            Some(AttrValue::Bool(true))
        );
        assert_eq!(
            session.stream_attribute(stream_id, "ttl"),
            Some(AttrValue::U32(16))
        );
    }

    #[tokio::test]
    async fn test_tcp_setup_allocates_contiguous_channels() {
        let (session, _) = new_session(ServerPrefs::default());
        let pool = Arc::new(UdpSocketPool::new());
        let local = [localhost()];
        let ctx = SetupContext {
            client_addr: localhost(),
            rtsp_local_addr: localhost(),
            local_addrs: &local,
            pool: &pool,
        };

        let a = session.add_stream(1, PayloadKind::Video, "H264", 90_000, 0);
        let b = session.add_stream(2, PayloadKind::Audio, "AAC", 44_100, 0);

        let reply_a = session
            .setup_stream(
                a,
                &setup_request(RequestedTransport::Tcp, 0, 0),
                SetupFlags::default(),
                &ctx,
            )
            .unwrap();
        let reply_b = session
            .setup_stream(
                b,
                &setup_request(RequestedTransport::Tcp, 0, 0),
                SetupFlags::default(),
                &ctx,
            )
            .unwrap();

        assert_eq!(
            reply_a.transport,
            crate::stream::TransportReply::Interleaved {
                rtp_channel: 0,
                rtcp_channel: 1
            }
        );
        assert_eq!(
            reply_b.transport,
            crate::stream::TransportReply::Interleaved {
                rtp_channel: 2,
                rtcp_channel: 3
            }
        );
        // TCP backpressure is the only throttle
        let window = session
            .inner
            .lock()
            .shared
            .overbuffer
            .window_size();
        assert_eq!(window, u32::MAX);
    }

    // ------------------------------------------------------------------
    // thinning escalation (scenario 1)

    #[tokio::test]
    async fn test_thinning_escalation_ladder() {
        let (session, _) = new_session(scenario_prefs());
        let pool = Arc::new(UdpSocketPool::new());
        let (stream_id, _rtp, _rtcp) =
            setup_udp_stream(&session, &pool, RequestedTransport::ReliableUdp);
        session
            .with_stream_mut(stream_id, |s| s.set_num_quality_levels(5))
            .unwrap();

        let play_time = 1_000_000;
        session.play(play_time, false);

        let delays = [500i64, 1500, 2500, 6000, 12_000];
        let expected_levels = [0, 0, 1, 5, 5];
        let mut outcomes = Vec::new();
        for (i, delay) in delays.iter().enumerate() {
            let now = play_time + 2000 * (i as i64 + 1);
            let data = rtp_packet(100 + i as u16, 90_000 * i as u32, 200);
            let pkt = ScheduledPacket {
                data: &data,
                transmit_time: now - delay,
            };
            let outcome = session
                .write(stream_id, &pkt, WriteFlags::rtp(), now)
                .unwrap();
            outcomes.push(outcome);
            assert_eq!(
                session.quality_level(stream_id).unwrap(),
                expected_levels[i],
                "level after delay {delay}"
            );
        }

        // the four timely packets went out, the stale one was dropped
        for outcome in &outcomes[..4] {
            assert!(outcome.is_sent());
        }
        assert_eq!(outcomes[4], WriteOutcome::Dropped);

        let stats = session.stream_stats(stream_id).unwrap();
        assert_eq!(stats.stale_packets_dropped, 1);
        assert_eq!(stats.packet_count, 4);
        assert_eq!(stats.byte_count, 4 * 200);
    }

    #[tokio::test]
    async fn test_disable_thinning_pins_level_zero() {
        let prefs = ServerPrefs {
            disable_thinning: true,
            ..scenario_prefs()
        };
        let (session, _) = new_session(prefs);
        let pool = Arc::new(UdpSocketPool::new());
        let (stream_id, _rtp, _rtcp) =
            setup_udp_stream(&session, &pool, RequestedTransport::ReliableUdp);
        session
            .with_stream_mut(stream_id, |s| s.set_num_quality_levels(5))
            .unwrap();

        let play_time = 1_000_000;
        session.play(play_time, false);

        for i in 0..5i64 {
            let now = play_time + 2000 * (i + 1);
            let data = rtp_packet(10 + i as u16, 0, 200);
            let pkt = ScheduledPacket {
                data: &data,
                transmit_time: now - 6000,
            };
            let _ = session.write(stream_id, &pkt, WriteFlags::rtp(), now).unwrap();
            assert_eq!(session.quality_level(stream_id).unwrap(), 0);
        }
    }

    // ------------------------------------------------------------------
    // sender report cadence (P4)

    #[tokio::test]
    async fn test_sender_report_cadence_and_content() {
        let (session, _) = new_session(ServerPrefs::default());
        let pool = Arc::new(UdpSocketPool::new());
        let (stream_id, _client_rtp, client_rtcp) =
            setup_udp_stream(&session, &pool, RequestedTransport::Udp);
        client_rtcp
            .set_read_timeout(Some(std::time::Duration::from_millis(400)))
            .unwrap();

        let play_time = 1_000_000;
        session.play(play_time, true);
        let ssrc = session.with_stream(stream_id, |s| s.ssrc()).unwrap();

        let send_at = |now: i64, seq: u16| {
            let data = rtp_packet(seq, 1234, 100);
            let pkt = ScheduledPacket {
                data: &data,
                transmit_time: now,
            };
            session
                .write(stream_id, &pkt, WriteFlags::rtp(), now)
                .unwrap()
        };

        // the first successful send carries an SR with it
        assert!(send_at(play_time + 10, 1).is_sent());
        let mut buf = [0u8; 512];
        let len = client_rtcp.recv(&mut buf).unwrap();
        let subs: Vec<_> = crate::packet::rtcp::CompoundWalker::new(&buf[..len])
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(subs[0].header.packet_type, 200);
        let sr = crate::packet::rtcp::RtcpSenderReport::parse(&subs[0].header, subs[0].body)
            .unwrap();
        assert_eq!(sr.ssrc, ssrc);
        assert_eq!(sr.packet_count, 1);
        assert_eq!(sr.rtp_timestamp, 1234);
        // SDES then the server-info APP ride in the same compound
        assert_eq!(subs[1].header.packet_type, 202);
        assert_eq!(subs[2].header.packet_type, 204);

        // a send one second later is inside the report interval
        assert!(send_at(play_time + 1010, 2).is_sent());
        assert!(client_rtcp.recv(&mut buf).is_err());

        // and one past the interval emits the next report
        assert!(send_at(play_time + 10 + 5001, 3).is_sent());
        let len = client_rtcp.recv(&mut buf).unwrap();
        assert!(len > 0);
    }

    // ------------------------------------------------------------------
    // receiver report guard (scenario 5)

    #[tokio::test]
    async fn test_spurious_loss_sample_ignored() {
        let (session, server) = new_session(ServerPrefs::default());
        let pool = Arc::new(UdpSocketPool::new());
        let (stream_id, _rtp, _rtcp) = setup_udp_stream(&session, &pool, RequestedTransport::Udp);
        let registry = ModuleRegistry::builder().build();

        let play_time = 1_000_000;
        session.play(play_time, false);

        // 100 packets on the wire
        for seq in 0..100u16 {
            let data = rtp_packet(seq, 0, 100);
            let pkt = ScheduledPacket {
                data: &data,
                transmit_time: play_time + seq as i64,
            };
            assert!(session
                .write(stream_id, &pkt, WriteFlags::rtp(), play_time + seq as i64)
                .unwrap()
                .is_sent());
        }

        let rr = |lost: u32| {
            let mut buf = bytes::BytesMut::new();
            crate::packet::rtcp::RtcpReceiverReport {
                ssrc: 0xc11e_0001,
                report_blocks: vec![crate::packet::rtcp::RtcpReportBlock {
                    ssrc: 1,
                    fraction_lost: 0,
                    cumulative_lost: lost,
                    highest_seq: 100,
                    jitter: 5,
                    last_sr: 0,
                    delay_since_last_sr: 0,
                }],
            }
            .put(&mut buf);
            buf
        };

        // a client claiming 150 lost out of 100 sent is lying
        session.process_rtcp(stream_id, &rr(150), play_time + 200, &registry);
        assert_eq!(server.rtp_packets_lost(), 0);
        let stats = session.stream_stats(stream_id).unwrap();
        assert_eq!(stats.total_lost_packets, 0);

        // a plausible report is accepted
        session.process_rtcp(stream_id, &rr(40), play_time + 300, &registry);
        assert_eq!(server.rtp_packets_lost(), 40);
        let stats = session.stream_stats(stream_id).unwrap();
        assert_eq!(stats.total_lost_packets, 40);
        assert_eq!(stats.cur_packets_lost_in_interval, 40);
        assert_eq!(stats.packet_count_in_interval, 100);

        // the client SSRC is learned from the report
        let client_ssrc = session.with_stream(stream_id, |s| s.client_ssrc()).unwrap();
        assert_eq!(client_ssrc, 0xc11e_0001);
    }

    // ------------------------------------------------------------------
    // ack mask (scenario 6, P3)

    #[tokio::test]
    async fn test_ack_mask_clears_resender_records() {
        let (session, _) = new_session(scenario_prefs());
        let pool = Arc::new(UdpSocketPool::new());
        let (stream_id, _rtp, _rtcp) =
            setup_udp_stream(&session, &pool, RequestedTransport::ReliableUdp);
        let registry = ModuleRegistry::builder().build();

        let play_time = 1_000_000;
        session.play(play_time, false);

        for seq in 42..50u16 {
            let data = rtp_packet(seq, 0, 120);
            let now = play_time + (seq as i64 - 41) * 10;
            let pkt = ScheduledPacket {
                data: &data,
                transmit_time: now,
            };
            assert!(session
                .write(stream_id, &pkt, WriteFlags::rtp(), now)
                .unwrap()
                .is_sent());
        }
        for seq in 42..50u16 {
            assert!(session
                .with_stream(stream_id, |s| s.resender.contains(seq))
                .unwrap());
        }

        let mut ack = crate::packet::rtcp::RtcpAck::new(1, 42);
        ack.set_bit(0);
        ack.set_bit(2);
        ack.set_bit(5);
        let mut buf = bytes::BytesMut::new();
        ack.to_app().put(&mut buf);

        session.process_rtcp(stream_id, &buf, play_time + 500, &registry);

        for seq in [42u16, 43, 45, 48] {
            assert!(
                !session
                    .with_stream(stream_id, |s| s.resender.contains(seq))
                    .unwrap(),
                "seq {seq} should have been acked"
            );
        }
        for seq in [44u16, 46, 47, 49] {
            assert!(session
                .with_stream(stream_id, |s| s.resender.contains(seq))
                .unwrap());
        }
    }

    #[tokio::test]
    async fn test_ack_before_first_send_skips_modules() {
        struct Counter(std::sync::atomic::AtomicUsize);
        impl crate::modules::RtcpProcessModule for Counter {
            fn on_rtcp(&self, _ctx: &RtcpProcessContext<'_>) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let (session, _) = new_session(ServerPrefs::default());
        let pool = Arc::new(UdpSocketPool::new());
        let (stream_id, _rtp, _rtcp) =
            setup_udp_stream(&session, &pool, RequestedTransport::ReliableUdp);

        let counter = Arc::new(Counter(std::sync::atomic::AtomicUsize::new(0)));
        let registry = ModuleRegistry::builder()
            .register_rtcp(counter.clone())
            .build();

        session.play(1_000_000, false);

        // nothing has been sent, so this ack is spurious
        let mut buf = bytes::BytesMut::new();
        crate::packet::rtcp::RtcpAck::new(1, 42).to_app().put(&mut buf);
        session.process_rtcp(stream_id, &buf, 1_000_100, &registry);
        assert_eq!(counter.0.load(Ordering::Relaxed), 0);

        // a benign report does reach the modules
        let mut rr = bytes::BytesMut::new();
        crate::packet::rtcp::RtcpReceiverReport {
            ssrc: 5,
            report_blocks: vec![],
        }
        .put(&mut rr);
        session.process_rtcp(stream_id, &rr, 1_000_200, &registry);
        assert_eq!(counter.0.load(Ordering::Relaxed), 1);
    }

    // ------------------------------------------------------------------
    // telemetry (APP/qtss)

    #[tokio::test]
    async fn test_telemetry_updates_stats_and_overbuffer() {
        let (session, _) = new_session(ServerPrefs::default());
        let pool = Arc::new(UdpSocketPool::new());
        let (stream_id, _rtp, _rtcp) =
            setup_udp_stream(&session, &pool, RequestedTransport::ReliableUdp);
        let registry = ModuleRegistry::builder().build();
        session.play(1_000_000, false);

        let telemetry = crate::packet::rtcp::RtcpTelemetry {
            ssrc: 9,
            receiver_bit_rate: 256_000,
            avg_late_ms: 80,
            percent_lost: 2,
            avg_buffer_delay_ms: 1500,
            getting_better: true,
            num_eyes: 1,
            total_packets_received: 500,
            client_buffer_fill: 65,
            frame_rate: 24,
            expected_frame_rate: 30,
            overbuffer_window_size: 98_304,
            ..Default::default()
        };
        let mut buf = bytes::BytesMut::new();
        telemetry.to_app().put(&mut buf);
        session.process_rtcp(stream_id, &buf, 1_000_500, &registry);

        let stats = session.stream_stats(stream_id).unwrap();
        assert_eq!(stats.receiver_bit_rate, 256_000);
        assert_eq!(stats.avg_late_ms, 80);
        assert_eq!(stats.client_buffer_fill, 65);
        assert!(stats.getting_better);

        // the client steers the pacing window on non-UDP transports
        let window = session.inner.lock().shared.overbuffer.window_size();
        assert_eq!(window, 98_304);
    }

    // ------------------------------------------------------------------
    // flow control and lock discipline

    #[tokio::test]
    async fn test_flow_control_reports_would_block() {
        let (session, _) = new_session(scenario_prefs());
        let pool = Arc::new(UdpSocketPool::new());
        let (stream_id, _rtp, _rtcp) =
            setup_udp_stream(&session, &pool, RequestedTransport::ReliableUdp);
        let play_time = 1_000_000;
        session.play(play_time, false);

        // the slow-start window holds two segments; the third recorded
        // packet overfills it and the fourth write must block
        let mut sent = 0;
        let mut blocked = false;
        for seq in 0..6u16 {
            let data = rtp_packet(seq, 0, 1400);
            let now = play_time + seq as i64;
            let pkt = ScheduledPacket {
                data: &data,
                transmit_time: now,
            };
            match session.write(stream_id, &pkt, WriteFlags::rtp(), now).unwrap() {
                WriteOutcome::Sent { .. } => sent += 1,
                WriteOutcome::WouldBlock { endpoint, interest, .. } => {
                    assert_eq!(endpoint, Some(crate::transport::Endpoint::RtpSocket));
                    assert_eq!(interest, Interest::Write);
                    blocked = true;
                    break;
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert!(blocked, "flow control never engaged after {sent} sends");
        assert!(sent >= 2);
    }

    #[tokio::test]
    async fn test_rtcp_dropped_on_lock_contention() {
        let (session, _) = new_session(ServerPrefs::default());
        let pool = Arc::new(UdpSocketPool::new());
        let (stream_id, _rtp, _rtcp) = setup_udp_stream(&session, &pool, RequestedTransport::Udp);
        let registry = ModuleRegistry::builder().build();

        let mut rr = bytes::BytesMut::new();
        crate::packet::rtcp::RtcpReceiverReport {
            ssrc: 0x600d_babe,
            report_blocks: vec![],
        }
        .put(&mut rr);

        {
            let _guard = session.inner.lock();
            // the receive path must not deadlock; it drops the packet
            session.process_rtcp(stream_id, &rr, 2_000_000, &registry);
        }
        let client_ssrc = session.with_stream(stream_id, |s| s.client_ssrc()).unwrap();
        assert_eq!(client_ssrc, 0, "contended datagram must be dropped");

        // without contention the same datagram lands
        session.process_rtcp(stream_id, &rr, 2_000_100, &registry);
        let client_ssrc = session.with_stream(stream_id, |s| s.client_ssrc()).unwrap();
        assert_eq!(client_ssrc, 0x600d_babe);
    }

    // ------------------------------------------------------------------
    // RTCP pacing policy

    #[tokio::test]
    async fn test_rtcp_gated_only_when_overbuffering_disabled() {
        // raw UDP disables overbuffering, so RTCP is paced
        let (session, _) = new_session(ServerPrefs::default());
        let pool = Arc::new(UdpSocketPool::new());
        let (stream_id, _rtp, _rtcp) = setup_udp_stream(&session, &pool, RequestedTransport::Udp);
        session.play(1_000_000, false);
        assert!(!session.overbuffering_enabled());

        let data = [0x80u8, 200, 0, 1, 0, 0, 0, 1];
        let pkt = ScheduledPacket {
            data: &data,
            transmit_time: 1_005_000,
        };
        let outcome = session
            .write(stream_id, &pkt, WriteFlags::rtcp(), 1_000_100)
            .unwrap();
        match outcome {
            WriteOutcome::WouldBlock { wakeup, .. } => {
                assert_eq!(wakeup, Some(1_005_000));
            }
            other => panic!("expected a parked RTCP write, got {other:?}"),
        }

        // reliable UDP keeps overbuffering on, so periodic reports bypass
        // the gate and go on time
        let (session, _) = new_session(ServerPrefs::default());
        let (stream_id, _rtp, _rtcp) =
            setup_udp_stream(&session, &pool, RequestedTransport::ReliableUdp);
        session.play(1_000_000, false);
        assert!(session.overbuffering_enabled());
        let outcome = session
            .write(stream_id, &pkt, WriteFlags::rtcp(), 1_000_100)
            .unwrap();
        assert!(outcome.is_sent());
    }

    // ------------------------------------------------------------------
    // interleaved transport (scenario 3, P6)

    /// Sink that records the exact bytes put on the RTSP byte stream
    struct CaptureSink(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl InterleavedSink for CaptureSink {
        fn try_write_frame(&mut self, channel: u8, payload: &[u8]) -> std::io::Result<()> {
            let mut buf = self.0.lock();
            buf.push(0x24);
            buf.push(channel);
            buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
            buf.extend_from_slice(payload);
            Ok(())
        }
    }

    fn tcp_session_with_capture() -> (Arc<RtpSession>, StreamId, Arc<parking_lot::Mutex<Vec<u8>>>)
    {
        let (session, _) = new_session(ServerPrefs::default());
        let pool = Arc::new(UdpSocketPool::new());
        let stream_id = session.add_stream(1, PayloadKind::Video, "H264", 90_000, 0);
        let local = [localhost()];
        let ctx = SetupContext {
            client_addr: localhost(),
            rtsp_local_addr: localhost(),
            local_addrs: &local,
            pool: &pool,
        };
        session
            .setup_stream(
                stream_id,
                &setup_request(RequestedTransport::Tcp, 0, 0),
                SetupFlags::default(),
                &ctx,
            )
            .unwrap();

        let captured = Arc::new(parking_lot::Mutex::new(Vec::new()));
        session.set_rtsp_sink(Box::new(CaptureSink(captured.clone())));
        (session, stream_id, captured)
    }

    #[tokio::test]
    async fn test_interleaved_rtp_framing_on_the_wire() {
        let (session, stream_id, captured) = tcp_session_with_capture();
        let play_time = 1_000_000;
        session.play(play_time, false);

        let data = [0xde, 0xad, 0xbe, 0xef];
        let pkt = ScheduledPacket {
            data: &data,
            transmit_time: play_time,
        };
        let outcome = session
            .write(stream_id, &pkt, WriteFlags::rtp().with_burst_begin(), play_time + 10)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Sent { len: 4 });
        assert!(session.inner.lock().shared.overbuffer.in_write_burst());

        let wire = captured.lock().clone();
        assert_eq!(wire, vec![0x24, 0x00, 0x00, 0x04, 0xde, 0xad, 0xbe, 0xef]);

        let stats = session.stream_stats(stream_id).unwrap();
        assert_eq!(stats.packet_count, 1);
        assert_eq!(stats.byte_count, 4);
    }

    #[tokio::test]
    async fn test_every_interleaved_byte_is_framed() {
        let (session, stream_id, captured) = tcp_session_with_capture();
        let play_time = 1_000_000;
        session.play(play_time, false);

        for i in 0..5u16 {
            let data = rtp_packet(i, 0, 64 + i as usize);
            let pkt = ScheduledPacket {
                data: &data,
                transmit_time: play_time,
            };
            assert!(session
                .write(stream_id, &pkt, WriteFlags::rtp(), play_time + 10)
                .unwrap()
                .is_sent());
        }

        // the byte stream parses back as exactly five frames on channel 0
        let wire = captured.lock().clone();
        let mut offset = 0;
        let mut frames = 0;
        while offset < wire.len() {
            let (channel, payload, used) =
                crate::transport::interleaved::parse_frame(&wire[offset..])
                    .unwrap()
                    .expect("complete frame");
            assert_eq!(channel, 0);
            assert_eq!(payload.len(), 64 + frames as usize);
            offset += used;
            frames += 1;
        }
        assert_eq!(frames, 5);
        assert_eq!(offset, wire.len());
    }

    #[tokio::test]
    async fn test_teardown_appends_bye_on_rtcp_channel() {
        let (session, stream_id, captured) = tcp_session_with_capture();
        let play_time = 1_000_000;
        session.play(play_time, false);

        // one packet so the report has something to describe
        let data = rtp_packet(1, 500, 64);
        let pkt = ScheduledPacket {
            data: &data,
            transmit_time: play_time,
        };
        assert!(session
            .write(stream_id, &pkt, WriteFlags::rtp(), play_time + 10)
            .unwrap()
            .is_sent());
        captured.lock().clear();

        session.teardown(play_time + 50);

        let wire = captured.lock().clone();
        let (channel, payload, _) = crate::transport::interleaved::parse_frame(&wire)
            .unwrap()
            .expect("teardown frame");
        assert_eq!(channel, 1, "teardown report goes out on the RTCP channel");

        let types: Vec<u8> = crate::packet::rtcp::CompoundWalker::new(payload)
            .map(|sub| sub.unwrap().header.packet_type)
            .collect();
        assert_eq!(types, vec![200, 202, 204, 203], "SR, SDES, APP, BYE");
        assert_eq!(session.stream_stats(stream_id).unwrap().packet_count, 1);
    }

    // ------------------------------------------------------------------
    // instrumentation attributes

    #[tokio::test]
    async fn test_stream_attributes_reflect_state() {
        use crate::modules::AttrValue;

        let (session, _) = new_session(ServerPrefs::default());
        let pool = Arc::new(UdpSocketPool::new());
        let (stream_id, _rtp, _rtcp) =
            setup_udp_stream(&session, &pool, RequestedTransport::ReliableUdp);

        assert_eq!(
            session.stream_attribute(stream_id, "transport"),
            Some(AttrValue::Str("RUDP".to_string()))
        );
        assert_eq!(
            session.stream_attribute(stream_id, "payload_kind"),
            Some(AttrValue::Str("video".to_string()))
        );
        assert_eq!(
            session.stream_attribute(stream_id, "quality_level"),
            Some(AttrValue::I32(0))
        );
        assert_eq!(session.stream_attribute(stream_id, "bogus"), None);

        // every descriptor in the table resolves to a value
        for desc in crate::modules::STREAM_ATTRIBUTES {
            assert!(
                session.stream_attribute(stream_id, desc.name).is_some(),
                "attribute {} missing",
                desc.name
            );
        }
    }

    // ------------------------------------------------------------------
    // timing freeze (I3)

    #[tokio::test]
    async fn test_first_timing_frozen_at_play() {
        let (session, _) = new_session(ServerPrefs::default());
        session.add_stream(1, PayloadKind::Audio, "AAC", 44_100, 0);

        session
            .with_stream_mut(0, |s| s.set_first_seq_number(500))
            .unwrap()
            .unwrap();
        session
            .with_stream_mut(0, |s| s.set_first_timestamp(1_000_000))
            .unwrap()
            .unwrap();

        session.play(1_000_000, false);

        let err = session
            .with_stream_mut(0, |s| s.set_first_seq_number(501))
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, Error::StreamState(_)));

        let info = session.rtp_info(0).unwrap();
        assert_eq!(info.seq, 500);
        assert_eq!(info.rtp_time, 1_000_000);
    }
}
