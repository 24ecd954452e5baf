use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// NTP timestamp representation (64 bits)
/// As defined in RFC 3550
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpTimestamp {
    /// Seconds since January 1, 1900
    pub seconds: u32,

    /// Fraction of a second
    pub fraction: u32,
}

/// NTP epoch starts 70 years before the UNIX epoch
const NTP_TO_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

impl NtpTimestamp {
    /// Create a new NTP timestamp from the current system time
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));
        Self::from_unix_millis(now.as_millis() as i64)
    }

    /// Create an NTP timestamp from milliseconds since the UNIX epoch
    pub fn from_unix_millis(millis: i64) -> Self {
        let millis = millis.max(0) as u64;
        let seconds = millis / 1000 + NTP_TO_UNIX_OFFSET_SECS;
        let fraction = (((millis % 1000) << 32) / 1000) as u32;
        Self {
            seconds: seconds as u32,
            fraction,
        }
    }

    /// Convert to the packed 64-bit wire representation
    pub fn as_u64(&self) -> u64 {
        (self.seconds as u64) << 32 | (self.fraction as u64)
    }

    /// Convert from the packed 64-bit wire representation
    pub fn from_u64(value: u64) -> Self {
        Self {
            seconds: (value >> 32) as u32,
            fraction: value as u32,
        }
    }

    /// Middle 32 bits, used as the `last SR` reference in report blocks
    pub fn middle_32(&self) -> u32 {
        ((self.seconds & 0x0000_ffff) << 16) | ((self.fraction & 0xffff_0000) >> 16)
    }

    /// Offset this timestamp by a span of milliseconds.
    ///
    /// Used by the sender report to project the session's NTP play time
    /// forward to a packet's scheduled transmission time.
    pub fn offset_millis(&self, millis: i64) -> Self {
        Self::from_u64(self.as_u64().wrapping_add(millis_to_fixed(millis) as u64))
    }
}

/// Convert a millisecond span into 32.32 fixed-point seconds
pub fn millis_to_fixed(millis: i64) -> i64 {
    let negative = millis < 0;
    let ms = millis.unsigned_abs();
    let fixed = (((ms / 1000) << 32) | (((ms % 1000) << 32) / 1000)) as i64;
    if negative {
        -fixed
    } else {
        fixed
    }
}
