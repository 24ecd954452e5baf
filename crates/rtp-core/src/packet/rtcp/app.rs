use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{put_rtcp_header, RtcpHeader, RtcpPacketType, RTCP_HEADER_SIZE};
use crate::error::Error;
use crate::{Result, RtpSsrc};

/// Name of the client acknowledgement APP frame
pub const APP_NAME_ACK: [u8; 4] = *b"qtak";

/// Name of the client telemetry APP frame
pub const APP_NAME_TELEMETRY: [u8; 4] = *b"qtss";

/// Name of the server-info APP frame appended to sender reports
pub const APP_NAME_SERVER_INFO: [u8; 4] = *b"qtsi";

/// RTCP Application-Defined (APP) packet
/// Defined in RFC 3550 Section 6.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpApp {
    /// Subtype bits from the common header
    pub subtype: u8,

    /// SSRC/CSRC identifier
    pub ssrc: RtpSsrc,

    /// Name (4 ASCII characters)
    pub name: [u8; 4],

    /// Application-dependent data, already padded to a word boundary
    pub data: Bytes,
}

impl RtcpApp {
    pub fn new(ssrc: RtpSsrc, name: [u8; 4], data: Bytes) -> Self {
        Self {
            subtype: 0,
            ssrc,
            name,
            data,
        }
    }

    /// Padding needed to bring the data to a word boundary
    fn pad_len(&self) -> usize {
        (4 - self.data.len() % 4) % 4
    }

    /// Total serialized size, header included
    pub fn wire_size(&self) -> usize {
        RTCP_HEADER_SIZE + 8 + self.data.len() + self.pad_len()
    }

    /// Append the full packet, common header included
    pub fn put(&self, buf: &mut BytesMut) {
        let length_words = ((self.wire_size() - RTCP_HEADER_SIZE) / 4) as u16;
        put_rtcp_header(buf, self.subtype, RtcpPacketType::ApplicationDefined, length_words);
        buf.put_u32(self.ssrc);
        buf.put_slice(&self.name);
        buf.put_slice(&self.data);
        for _ in 0..self.pad_len() {
            buf.put_u8(0);
        }
    }

    /// Parse from a sub-packet body
    pub fn parse(header: &RtcpHeader, body: &[u8]) -> Result<Self> {
        let mut buf = body;
        if buf.remaining() < 8 {
            return Err(Error::BufferTooSmall {
                required: 8,
                available: buf.remaining(),
            });
        }

        let ssrc = buf.get_u32();
        let mut name = [0u8; 4];
        buf.copy_to_slice(&mut name);
        let data = Bytes::copy_from_slice(buf);

        Ok(Self {
            subtype: header.count,
            ssrc,
            name,
            data,
        })
    }

    /// Name as a lossy string, for logging
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Build the server-info APP frame advertising the recommended client
/// ack timeout, appended to every sender report on a reliable-UDP stream.
pub fn server_info_app(ssrc: RtpSsrc, ack_timeout_ms: u32) -> RtcpApp {
    let mut data = BytesMut::with_capacity(4);
    data.put_u32(ack_timeout_ms);
    RtcpApp::new(ssrc, APP_NAME_SERVER_INFO, data.freeze())
}

/// Read the ack timeout back out of a server-info APP frame
pub fn parse_server_info(app: &RtcpApp) -> Result<u32> {
    if app.name != APP_NAME_SERVER_INFO {
        return Err(Error::RtcpError(format!(
            "not a server-info APP: {}",
            app.name_str()
        )));
    }
    if app.data.len() < 4 {
        return Err(Error::BufferTooSmall {
            required: 4,
            available: app.data.len(),
        });
    }
    Ok(u32::from_be_bytes([
        app.data[0],
        app.data[1],
        app.data[2],
        app.data[3],
    ]))
}
