//! Stream setup from a parsed RTSP SETUP request.
//!
//! Transport negotiation, port validation, socket allocation, and demuxer
//! registration. Rejections carry the exact phrase the RTSP layer echoes
//! to the client; the session keeps running after any of them.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tracing::info;

use super::{RtpStream, StreamSockets};
use crate::error::{setup_msg, Error};
use crate::session::bandwidth::BandwidthTracker;
use crate::session::overbuffer::UNLIMITED_WINDOW;
use crate::session::SessionShared;
use crate::transport::demux::StreamBinding;
use crate::transport::pool::{PoolKey, UdpSocketPool};
use crate::transport::TransportKind;
use crate::{Result, RtpSsrc};

/// Longest stream URL a SETUP may carry
pub const MAX_STREAM_URL_LEN: usize = 256;

/// Transport family the client asked for in its Transport header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedTransport {
    Udp,
    ReliableUdp,
    Tcp,
}

/// The SETUP request fields this pipeline consumes
#[derive(Debug, Clone)]
pub struct SetupRequest {
    /// Track URL, recorded on the stream
    pub file_name: String,

    /// Path used for the reliable-UDP allowlist check
    pub file_path: String,

    /// From the x-RTP-Options header; 1.5 s when absent
    pub late_tolerance_sec: Option<f32>,

    pub transport: RequestedTransport,

    /// Alternate destination, honored only when the caller allows it
    pub dest_addr: Option<IpAddr>,

    pub client_rtp_port: u16,
    pub client_rtcp_port: u16,

    /// Client-specified source interface
    pub source_addr: Option<IpAddr>,

    /// TTL for multicast destinations
    pub ttl: u32,

    /// x-Dynamic-Rate header: `Some(0)` disables overbuffering
    pub dynamic_rate: Option<i32>,
}

/// Policy flags the caller (the module that adds the stream) supplies
#[derive(Debug, Clone, Copy, Default)]
pub struct SetupFlags {
    /// Downgrade any reliable-UDP request to raw UDP
    pub force_udp_transport: bool,

    /// Permit the request's alternate destination address
    pub allow_destination: bool,

    /// Skip congestion-window slow start
    pub dont_use_slow_start: bool,
}

/// Server-side facts the setup needs about the RTSP connection
pub struct SetupContext<'a> {
    /// Remote address of the RTSP connection
    pub client_addr: IpAddr,

    /// Local address of the RTSP connection
    pub rtsp_local_addr: IpAddr,

    /// Every interface the server is bound on
    pub local_addrs: &'a [IpAddr],

    pub pool: &'a Arc<UdpSocketPool>,
}

/// What the RTSP layer echoes into its Transport response header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportReply {
    Udp {
        source_addr: IpAddr,
        server_rtp_port: u16,
        server_rtcp_port: u16,
    },
    Interleaved {
        rtp_channel: u8,
        rtcp_channel: u8,
    },
}

/// Successful SETUP result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupReply {
    pub transport: TransportReply,
    pub ssrc: RtpSsrc,

    /// SSRC pre-rendered as a decimal string for the Transport header
    pub ssrc_string: String,
}

impl RtpStream {
    pub(crate) fn setup(
        &mut self,
        shared: &mut SessionShared,
        req: &SetupRequest,
        flags: SetupFlags,
        ctx: &SetupContext<'_>,
    ) -> Result<SetupReply> {
        if req.file_name.len() > MAX_STREAM_URL_LEN {
            return Err(Error::SetupRejected(setup_msg::FILE_NAME_TOO_LONG));
        }
        self.stream_url = req.file_name.clone();
        self.late_tolerance_sec = req.late_tolerance_sec.unwrap_or(1.5);

        // transport negotiation: reliable UDP only when the server allows
        // it, the path is inside the allowlist, and no one forced raw UDP
        let mut transport = match req.transport {
            RequestedTransport::Udp => TransportKind::RawUdp,
            RequestedTransport::ReliableUdp => TransportKind::ReliableUdp,
            RequestedTransport::Tcp => TransportKind::InterleavedTcp,
        };
        if transport == TransportKind::ReliableUdp
            && (!shared.prefs.reliable_udp_enabled
                || !shared.prefs.is_path_inside_reliable_udp_dir(&req.file_path)
                || flags.force_udp_transport)
        {
            transport = TransportKind::RawUdp;
        }
        self.transport = transport;

        // overbuffering: on for RUDP and TCP unless the client opted out,
        // never for raw UDP; one stream opting out disables the session
        let enable_overbuffer = match transport {
            TransportKind::RawUdp => false,
            _ => req.dynamic_rate != Some(0),
        };
        if !enable_overbuffer {
            shared.overbuffer.turn_off_overbuffering();
        }

        if transport == TransportKind::InterleavedTcp {
            // TCP's own backpressure is the only throttle
            shared.overbuffer.set_window_size(UNLIMITED_WINDOW);
            let (rtp_channel, rtcp_channel) = shared.allocate_channel_pair();
            self.rtp_channel = rtp_channel;
            self.rtcp_channel = rtcp_channel;
            info!(
                session = self.session_id,
                track = self.track_id,
                rtp_channel,
                "stream setup interleaved"
            );
            return Ok(SetupReply {
                transport: TransportReply::Interleaved {
                    rtp_channel,
                    rtcp_channel,
                },
                ssrc: self.ssrc,
                ssrc_string: self.ssrc_string.clone(),
            });
        }

        // this track is not interleaved, which changes how the session
        // schedules packets
        shared.all_tracks_interleaved = false;

        let mut remote_addr = ctx.client_addr;
        if let Some(dest) = req.dest_addr {
            // redirecting media elsewhere is open to abuse, so the caller
            // must have sanctioned it
            if !flags.allow_destination {
                return Err(Error::SetupRejected(setup_msg::ALT_DEST_NOT_ALLOWED));
            }
            remote_addr = dest;
        }

        if req.client_rtp_port == 0 || req.client_rtcp_port == 0 {
            return Err(Error::SetupRejected(setup_msg::NO_CLIENT_PORT));
        }
        if req.client_rtp_port & 1 != 0 {
            return Err(Error::SetupRejected(setup_msg::RTP_PORT_MUST_BE_EVEN));
        }
        if shared.prefs.enforce_rtcp_port_contiguity
            && req.client_rtcp_port != req.client_rtp_port + 1
        {
            return Err(Error::SetupRejected(setup_msg::RTCP_PORT_MUST_BE_CONTIGUOUS));
        }

        // source interface: the client's choice if it is one of ours, else
        // the interface the RTSP connection came in on
        let mut source_addr = ctx.rtsp_local_addr;
        if let Some(src) = req.source_addr {
            if ctx.local_addrs.contains(&src) {
                source_addr = src;
            }
        }

        // multicast destinations need socket options of their own, so they
        // get a dedicated pair instead of a pooled one
        let (pair, pool_key) = if remote_addr.is_multicast() {
            self.is_multicast = true;
            self.ttl = req.ttl;
            (ctx.pool.create_dedicated(source_addr, req.ttl)?, None)
        } else {
            let key = PoolKey {
                source: source_addr,
                remote: remote_addr,
                remote_rtcp_port: req.client_rtcp_port,
            };
            (ctx.pool.checkout_shared(key)?, Some(key))
        };

        if transport == TransportKind::ReliableUdp {
            let use_slow_start = !flags.dont_use_slow_start && shared.prefs.slow_start_enabled;
            shared.tracker = BandwidthTracker::new(use_slow_start);
            self.resender.set_destination(
                pair.clone(),
                SocketAddr::new(remote_addr, req.client_rtp_port),
            );
        }

        self.remote_addr = Some(remote_addr);
        self.remote_rtp_port = req.client_rtp_port;
        self.remote_rtcp_port = req.client_rtcp_port;
        self.local_rtp_port = pair.rtp_port();

        // route this client's RTCP to us
        if let Err(e) = pair.demux.register(
            remote_addr,
            req.client_rtcp_port,
            StreamBinding {
                session_id: self.session_id,
                stream_id: self.id,
            },
        ) {
            if let Some(key) = &pool_key {
                ctx.pool.release(key);
            }
            self.sockets = None;
            self.remote_addr = None;
            return Err(e);
        }

        self.sockets = Some(StreamSockets {
            pair,
            pool_key,
            pool: ctx.pool.clone(),
        });

        let advertised_source = shared.prefs.transport_src_addr.unwrap_or(source_addr);
        info!(
            session = self.session_id,
            track = self.track_id,
            transport = self.transport.as_str(),
            %remote_addr,
            rtp_port = req.client_rtp_port,
            server_rtp_port = self.local_rtp_port,
            "stream setup"
        );

        Ok(SetupReply {
            transport: TransportReply::Udp {
                source_addr: advertised_source,
                server_rtp_port: self.local_rtp_port,
                server_rtcp_port: self.local_rtp_port + 1,
            },
            ssrc: self.ssrc,
            ssrc_string: self.ssrc_string.clone(),
        })
    }
}
