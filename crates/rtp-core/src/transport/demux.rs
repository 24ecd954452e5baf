//! RTCP source demultiplexing.
//!
//! Inbound datagrams on a shared RTCP socket are routed to the stream that
//! registered the sender's `(address, port)`. The registration value is a
//! plain identifier pair rather than a reference: the session owns its
//! streams, and the server's receive driver resolves the identifier while
//! holding only the demuxer lock (lock order: demuxer before session).

use std::collections::HashMap;
use std::net::IpAddr;

use parking_lot::Mutex;

use crate::error::Error;
use crate::{Result, StreamId};

/// Identifies a stream within the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamBinding {
    pub session_id: u64,
    pub stream_id: StreamId,
}

/// Routes RTCP datagrams arriving on one shared socket
#[derive(Default)]
pub struct RtcpDemuxer {
    bindings: Mutex<HashMap<(IpAddr, u16), StreamBinding>>,
}

impl RtcpDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream for a remote RTCP source. A conflicting
    /// registration aborts SETUP.
    pub fn register(&self, addr: IpAddr, port: u16, binding: StreamBinding) -> Result<()> {
        let mut bindings = self.bindings.lock();
        if bindings.contains_key(&(addr, port)) {
            return Err(Error::DemuxerConflict { addr, port });
        }
        bindings.insert((addr, port), binding);
        Ok(())
    }

    /// Remove a registration; called from stream teardown
    pub fn unregister(&self, addr: IpAddr, port: u16) {
        self.bindings.lock().remove(&(addr, port));
    }

    /// Look up the stream registered for a datagram's source
    pub fn lookup(&self, addr: IpAddr, port: u16) -> Option<StreamBinding> {
        self.bindings.lock().get(&(addr, port)).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.lock().len()
    }
}
