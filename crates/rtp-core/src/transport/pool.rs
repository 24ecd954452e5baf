//! UDP socket pairs and the pool that shares them across streams.
//!
//! Each pair binds two consecutive ports, the RTP port even, the RTCP port
//! one above it. Unicast streams share a pair keyed by
//! `(source, remote, remote_rtcp_port)`; multicast streams get a dedicated
//! pair so TTL can differ per stream. Pairs are reference counted and
//! unbound when the last stream releases them.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tracing::debug;

use super::demux::RtcpDemuxer;
use crate::error::Error;
use crate::Result;

/// Attempts made to find a free even/odd port pair before giving up
const BIND_ATTEMPTS: usize = 40;

/// One RTP/RTCP socket pair bound to consecutive ports
pub struct UdpSocketPair {
    rtp: UdpSocket,
    rtcp: UdpSocket,
    local_addr: IpAddr,
    rtp_port: u16,

    /// Demuxer attached to the RTCP socket; inbound control traffic is
    /// routed to streams through it
    pub demux: RtcpDemuxer,
}

impl UdpSocketPair {
    /// Bind a new pair on `source`. `multicast_ttl` additionally applies
    /// unicast and multicast TTL to both sockets (set before the sockets
    /// enter non-blocking mode).
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(source: IpAddr, multicast_ttl: Option<u32>) -> Result<Self> {
        for _ in 0..BIND_ATTEMPTS {
            let rtp_std = match std::net::UdpSocket::bind((source, 0)) {
                Ok(s) => s,
                Err(_) => continue,
            };
            let rtp_port = rtp_std.local_addr()?.port();
            if rtp_port & 1 != 0 || rtp_port == u16::MAX {
                continue;
            }
            let rtcp_std = match std::net::UdpSocket::bind((source, rtp_port + 1)) {
                Ok(s) => s,
                Err(_) => continue,
            };

            if let Some(ttl) = multicast_ttl {
                for sock in [&rtp_std, &rtcp_std] {
                    sock.set_ttl(ttl).map_err(Error::MulticastSetup)?;
                    sock.set_multicast_ttl_v4(ttl).map_err(Error::MulticastSetup)?;
                }
            }

            rtp_std.set_nonblocking(true)?;
            rtcp_std.set_nonblocking(true)?;
            let pair = Self {
                rtp: UdpSocket::from_std(rtp_std)?,
                rtcp: UdpSocket::from_std(rtcp_std)?,
                local_addr: source,
                rtp_port,
                demux: RtcpDemuxer::new(),
            };
            debug!(%source, rtp_port, "bound UDP socket pair");
            return Ok(pair);
        }
        Err(Error::OutOfPorts)
    }

    pub fn local_addr(&self) -> IpAddr {
        self.local_addr
    }

    pub fn rtp_port(&self) -> u16 {
        self.rtp_port
    }

    pub fn rtcp_port(&self) -> u16 {
        self.rtp_port + 1
    }

    /// Non-blocking send on the RTP socket
    pub fn try_send_rtp(&self, remote: SocketAddr, data: &[u8]) -> std::io::Result<usize> {
        self.rtp.try_send_to(data, remote)
    }

    /// Non-blocking send on the RTCP socket
    pub fn try_send_rtcp(&self, remote: SocketAddr, data: &[u8]) -> std::io::Result<usize> {
        self.rtcp.try_send_to(data, remote)
    }

    /// Non-blocking receive on the RTCP socket, for the server's demux
    /// driver
    pub fn try_recv_rtcp(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.rtcp.try_recv_from(buf)
    }
}

/// Key under which unicast pairs are shared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub source: IpAddr,
    pub remote: IpAddr,
    pub remote_rtcp_port: u16,
}

struct PoolEntry {
    pair: Arc<UdpSocketPair>,
    refs: u32,
}

/// Shares UDP socket pairs between the streams of co-located clients
#[derive(Default)]
pub struct UdpSocketPool {
    entries: Mutex<HashMap<PoolKey, PoolEntry>>,
}

impl UdpSocketPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out the shared pair for `key`, binding one if none exists
    pub fn checkout_shared(&self, key: PoolKey) -> Result<Arc<UdpSocketPair>> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&key) {
            entry.refs += 1;
            return Ok(entry.pair.clone());
        }
        let pair = Arc::new(UdpSocketPair::bind(key.source, None)?);
        entries.insert(
            key,
            PoolEntry {
                pair: pair.clone(),
                refs: 1,
            },
        );
        Ok(pair)
    }

    /// Bind a dedicated (unshared) pair, used for multicast destinations
    pub fn create_dedicated(&self, source: IpAddr, ttl: u32) -> Result<Arc<UdpSocketPair>> {
        Ok(Arc::new(UdpSocketPair::bind(source, Some(ttl))?))
    }

    /// Drop one reference to the shared pair for `key`
    pub fn release(&self, key: &PoolKey) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(key);
            }
        }
    }

    pub fn shared_pair_count(&self) -> usize {
        self.entries.lock().len()
    }
}
