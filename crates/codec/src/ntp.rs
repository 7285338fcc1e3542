use std::time::{SystemTime, UNIX_EPOCH};

/// 64-bit NTP short-format timestamp: upper 32 bits seconds since the NTP
/// epoch (1900-01-01), lower 32 bits the fractional second.
///
/// Carried end-to-end for reporting; the receiver never uses it to order
/// packets (the sequence number alone decides order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtpTimestamp(pub u64);

const UNIX_TO_NTP_EPOCH_SECS: u64 = 2_208_988_800;

impl NtpTimestamp {
    pub fn now() -> Self {
        let since_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        let secs = since_unix.as_secs() + UNIX_TO_NTP_EPOCH_SECS;
        let frac = ((since_unix.subsec_nanos() as u64) << 32) / 1_000_000_000;
        Self((secs << 32) | frac)
    }

    pub fn seconds(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn fraction(&self) -> u32 {
        self.0 as u32
    }

    /// The middle 32 bits, as carried in the RTP-style wire header
    /// (RFC 3550 ts field convention): low 16 bits of the seconds field
    /// concatenated with the high 16 bits of the fraction.
    ///
    /// ```
    /// use rist_codec::ntp::NtpTimestamp;
    ///
    /// let ts = NtpTimestamp(0x0000_0001_8000_0000);
    /// assert_eq!(ts.truncate_mid32(), 0x0001_8000);
    /// ```
    pub fn truncate_mid32(&self) -> u32 {
        ((self.0 >> 16) & 0xFFFF_FFFF) as u32
    }
}

impl From<u64> for NtpTimestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
