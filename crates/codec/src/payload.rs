use bytes::{Buf, BufMut, BytesMut};

use crate::Error;

/// One contiguous run of missing sequences: `[base, base+count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NackEntry {
    pub base: u16,
    pub count: u16,
}

/// 0x01 NACK-range: a list of `[base:16, count:16]` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NackRange {
    pub entries: Vec<NackEntry>,
}

impl NackRange {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.entries.len() * 4);
        for entry in &self.entries {
            buf.put_u16(entry.base);
            buf.put_u16(entry.count);
        }
    }

    /// # Test
    ///
    /// ```
    /// use rist_codec::payload::{NackEntry, NackRange};
    /// use bytes::BytesMut;
    ///
    /// let range = NackRange { entries: vec![NackEntry { base: 42, count: 1 }] };
    /// let mut buf = BytesMut::new();
    /// range.encode(&mut buf);
    ///
    /// assert_eq!(NackRange::decode(&buf).unwrap(), range);
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() % 4 != 0 {
            return Err(Error::Truncated);
        }

        let mut buf = bytes;
        let mut entries = Vec::with_capacity(bytes.len() / 4);
        while buf.has_remaining() {
            let base = buf.get_u16();
            let count = buf.get_u16();
            entries.push(NackEntry { base, count });
        }

        Ok(Self { entries })
    }
}

/// 0x02 NACK-bitmask: `base:32` plus a 128-bit mask, one bit per sequence
/// starting at `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NackBitmask {
    pub base: u32,
    pub mask: u128,
}

impl NackBitmask {
    pub const ENCODED_LEN: usize = 4 + 16;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(Self::ENCODED_LEN);
        buf.put_u32(self.base);
        buf.put_u128(self.mask);
    }

    /// # Test
    ///
    /// ```
    /// use rist_codec::payload::NackBitmask;
    /// use bytes::BytesMut;
    ///
    /// let mask = NackBitmask { base: 1000, mask: 0b1011 };
    /// let mut buf = BytesMut::new();
    /// mask.encode(&mut buf);
    ///
    /// assert_eq!(NackBitmask::decode(&buf).unwrap(), mask);
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(Error::Truncated);
        }

        let mut buf = bytes;
        let base = buf.get_u32();
        let mask = buf.get_u128();
        Ok(Self { base, mask })
    }

    /// Sequences set in the mask, as absolute sequence numbers.
    pub fn sequences(&self) -> impl Iterator<Item = u32> + '_ {
        (0..128u32).filter_map(move |bit| {
            if self.mask & (1u128 << bit) != 0 {
                Some(self.base.wrapping_add(bit))
            } else {
                None
            }
        })
    }
}

/// 0x03 receiver report: cumulative reception quality, RTCP-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverReport {
    pub received: u32,
    pub lost: u32,
    pub jitter: u32,
    /// Last SR timestamp (middle-32 NTP) echoed back, 0 if none seen yet.
    pub lsr: u32,
    /// Delay since last SR, in units of 1/65536 second.
    pub dlsr: u32,
}

impl ReceiverReport {
    pub const ENCODED_LEN: usize = 20;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(Self::ENCODED_LEN);
        buf.put_u32(self.received);
        buf.put_u32(self.lost);
        buf.put_u32(self.jitter);
        buf.put_u32(self.lsr);
        buf.put_u32(self.dlsr);
    }

    /// # Test
    ///
    /// ```
    /// use rist_codec::payload::ReceiverReport;
    /// use bytes::BytesMut;
    ///
    /// let rr = ReceiverReport { received: 900, lost: 2, jitter: 5, lsr: 0, dlsr: 0 };
    /// let mut buf = BytesMut::new();
    /// rr.encode(&mut buf);
    ///
    /// assert_eq!(ReceiverReport::decode(&buf).unwrap(), rr);
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(Error::Truncated);
        }

        let mut buf = bytes;
        Ok(Self {
            received: buf.get_u32(),
            lost: buf.get_u32(),
            jitter: buf.get_u32(),
            lsr: buf.get_u32(),
            dlsr: buf.get_u32(),
        })
    }
}

/// 0x04 keep-alive: canonical endpoint name plus a capability bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAlive {
    pub cname: String,
    pub capabilities: u32,
}

pub const CNAME_MAX_LEN: usize = 128;

impl KeepAlive {
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), Error> {
        if self.cname.len() > CNAME_MAX_LEN {
            return Err(Error::Truncated);
        }

        buf.reserve(1 + self.cname.len() + 4);
        buf.put_u8(self.cname.len() as u8);
        buf.extend_from_slice(self.cname.as_bytes());
        buf.put_u32(self.capabilities);
        Ok(())
    }

    /// # Test
    ///
    /// ```
    /// use rist_codec::payload::KeepAlive;
    /// use bytes::BytesMut;
    ///
    /// let ka = KeepAlive { cname: "sender-01".into(), capabilities: 0b11 };
    /// let mut buf = BytesMut::new();
    /// ka.encode(&mut buf).unwrap();
    ///
    /// assert_eq!(KeepAlive::decode(&buf).unwrap(), ka);
    /// ```
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Err(Error::Truncated);
        }

        let len = bytes[0] as usize;
        if len > CNAME_MAX_LEN || bytes.len() < 1 + len + 4 {
            return Err(Error::Truncated);
        }

        let cname = std::str::from_utf8(&bytes[1..1 + len])
            .map_err(|_| Error::Truncated)?
            .to_owned();

        let mut rest = &bytes[1 + len..1 + len + 4];
        let capabilities = rest.get_u32();

        Ok(Self { cname, capabilities })
    }
}

/// 0x05 out-of-band: opaque application payload, unsequenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Oob<'a> {
    pub bytes: &'a [u8],
}

impl<'a> Oob<'a> {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(self.bytes);
    }

    pub fn decode(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}
