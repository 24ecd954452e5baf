//! Pluggable RTCP processing and the instrumentation attribute table.
//!
//! Modules register at server startup; the registry is immutable
//! afterwards, so dispatching on the RTCP hot path needs no
//! synchronization. The attribute descriptor table is likewise built once
//! and read-only: it tells operational tooling which per-stream values
//! exist and how to type them, and
//! [`RtpStream::attribute`](crate::stream::RtpStream::attribute) serves
//! the values themselves.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::session::SessionShared;
use crate::stream::RtpStream;

/// Wire/display type of one instrumentation attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Bool,
    U16,
    U32,
    U64,
    I32,
    F32,
    Str,
}

/// A typed instrumentation value read from a stream
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    U16(u16),
    U32(u32),
    U64(u64),
    I32(i32),
    F32(f32),
    Str(String),
}

/// Descriptor for one per-stream attribute
#[derive(Debug, Clone, Copy)]
pub struct AttrDescriptor {
    pub name: &'static str,
    pub kind: AttrKind,
}

/// Every per-stream attribute exposed to instrumentation, in stable order
pub static STREAM_ATTRIBUTES: &[AttrDescriptor] = &[
    AttrDescriptor { name: "track_id", kind: AttrKind::U32 },
    AttrDescriptor { name: "ssrc", kind: AttrKind::U32 },
    AttrDescriptor { name: "client_ssrc", kind: AttrKind::U32 },
    AttrDescriptor { name: "payload_name", kind: AttrKind::Str },
    AttrDescriptor { name: "payload_kind", kind: AttrKind::Str },
    AttrDescriptor { name: "stream_url", kind: AttrKind::Str },
    AttrDescriptor { name: "transport", kind: AttrKind::Str },
    AttrDescriptor { name: "first_seq_number", kind: AttrKind::U16 },
    AttrDescriptor { name: "first_timestamp", kind: AttrKind::U32 },
    AttrDescriptor { name: "timescale", kind: AttrKind::U32 },
    AttrDescriptor { name: "quality_level", kind: AttrKind::I32 },
    AttrDescriptor { name: "num_quality_levels", kind: AttrKind::U32 },
    AttrDescriptor { name: "buffer_delay_secs", kind: AttrKind::F32 },
    AttrDescriptor { name: "packet_count", kind: AttrKind::U64 },
    AttrDescriptor { name: "byte_count", kind: AttrKind::U64 },
    AttrDescriptor { name: "fraction_lost", kind: AttrKind::U32 },
    AttrDescriptor { name: "total_lost_packets", kind: AttrKind::U32 },
    AttrDescriptor { name: "jitter", kind: AttrKind::U32 },
    AttrDescriptor { name: "receiver_bit_rate", kind: AttrKind::U32 },
    AttrDescriptor { name: "avg_late_ms", kind: AttrKind::U16 },
    AttrDescriptor { name: "percent_lost", kind: AttrKind::U16 },
    AttrDescriptor { name: "avg_buffer_delay_ms", kind: AttrKind::U16 },
    AttrDescriptor { name: "getting_better", kind: AttrKind::Bool },
    AttrDescriptor { name: "getting_worse", kind: AttrKind::Bool },
    AttrDescriptor { name: "num_eyes", kind: AttrKind::U32 },
    AttrDescriptor { name: "num_eyes_active", kind: AttrKind::U32 },
    AttrDescriptor { name: "num_eyes_paused", kind: AttrKind::U32 },
    AttrDescriptor { name: "total_packets_received", kind: AttrKind::U32 },
    AttrDescriptor { name: "total_packets_dropped", kind: AttrKind::U16 },
    AttrDescriptor { name: "total_packets_lost", kind: AttrKind::U16 },
    AttrDescriptor { name: "client_buffer_fill", kind: AttrKind::U16 },
    AttrDescriptor { name: "frame_rate", kind: AttrKind::U16 },
    AttrDescriptor { name: "expected_frame_rate", kind: AttrKind::U16 },
    AttrDescriptor { name: "audio_dry_count", kind: AttrKind::U16 },
    AttrDescriptor { name: "stale_packets_dropped", kind: AttrKind::U32 },
    AttrDescriptor { name: "current_ack_timeout_ms", kind: AttrKind::U32 },
    AttrDescriptor { name: "server_rtp_port", kind: AttrKind::U16 },
    AttrDescriptor { name: "client_rtp_port", kind: AttrKind::U16 },
    AttrDescriptor { name: "is_tcp", kind: AttrKind::Bool },
    AttrDescriptor { name: "is_multicast", kind: AttrKind::Bool },
    AttrDescriptor { name: "ttl", kind: AttrKind::U32 },
];

static ATTRIBUTE_INDEX: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    STREAM_ATTRIBUTES
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name, i))
        .collect()
});

/// Look up an attribute descriptor by name
pub fn attribute_descriptor(name: &str) -> Option<&'static AttrDescriptor> {
    ATTRIBUTE_INDEX.get(name).map(|&i| &STREAM_ATTRIBUTES[i])
}

/// Everything an RTCP-process module sees for one parsed datagram. The
/// session mutex is held for the duration of the callback.
pub struct RtcpProcessContext<'a> {
    pub session_id: u64,
    pub stream: &'a RtpStream,
    pub shared: &'a SessionShared,

    /// The raw compound datagram as received
    pub packet: &'a [u8],
}

/// Callback invoked after every successfully parsed RTCP compound
pub trait RtcpProcessModule: Send + Sync {
    fn on_rtcp(&self, ctx: &RtcpProcessContext<'_>);
}

/// Registry of pluggable callbacks, frozen after startup
#[derive(Default)]
pub struct ModuleRegistry {
    rtcp_modules: Vec<Arc<dyn RtcpProcessModule>>,
}

impl ModuleRegistry {
    pub fn builder() -> ModuleRegistryBuilder {
        ModuleRegistryBuilder {
            rtcp_modules: Vec::new(),
        }
    }

    /// Invoke every registered RTCP module in registration order
    pub fn dispatch_rtcp(&self, ctx: &RtcpProcessContext<'_>) {
        for module in &self.rtcp_modules {
            module.on_rtcp(ctx);
        }
    }

    pub fn rtcp_module_count(&self) -> usize {
        self.rtcp_modules.len()
    }
}

pub struct ModuleRegistryBuilder {
    rtcp_modules: Vec<Arc<dyn RtcpProcessModule>>,
}

impl ModuleRegistryBuilder {
    pub fn register_rtcp<M: RtcpProcessModule + 'static>(mut self, module: Arc<M>) -> Self {
        self.rtcp_modules.push(module);
        self
    }

    pub fn build(self) -> ModuleRegistry {
        ModuleRegistry {
            rtcp_modules: self.rtcp_modules,
        }
    }
}
