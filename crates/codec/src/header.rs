use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::Error;

pub const VERSION: u8 = 1;

/// GRE-style envelope length: 4-byte control word + 8-byte port/flow fields.
pub const GRE_HEADER_LEN: usize = 12;

/// Compact RTP-style header stamped on data packets only.
pub const RTP_HEADER_LEN: usize = 12;

const FLAG_ENCRYPTED: u8 = 0b0001;
const FLAG_COMPRESSED: u8 = 0b0010;
const FLAG_RESERVED_MASK: u8 = 0b1100;

/// Which profile a context was configured for.
///
/// `Simple` carries bare RTP-over-UDP data packets with no GRE envelope,
/// no OOB, no keep-alives, no compression. `Main` wraps every packet in
/// the GRE-style envelope and enables the full payload-type set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    Simple,
    #[default]
    Main,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PayloadType {
    Data = 0x00,
    NackRange = 0x01,
    NackBitmask = 0x02,
    ReceiverReport = 0x03,
    KeepAlive = 0x04,
    Oob = 0x05,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub encrypted: bool,
    pub compressed: bool,
}

impl Flags {
    fn to_bits(self) -> u8 {
        (self.encrypted as u8 * FLAG_ENCRYPTED) | (self.compressed as u8 * FLAG_COMPRESSED)
    }

    fn from_bits(bits: u8) -> Result<Self, Error> {
        if bits & FLAG_RESERVED_MASK != 0 {
            return Err(Error::ReservedBitsSet);
        }

        Ok(Self {
            encrypted: bits & FLAG_ENCRYPTED != 0,
            compressed: bits & FLAG_COMPRESSED != 0,
        })
    }
}

/// The GRE-style envelope carried in front of every packet in the `main`
/// profile (absent entirely in `simple`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreHeader {
    pub flags: Flags,
    pub payload_type: PayloadType,
    /// Length, in bytes, of everything following this 12-byte header.
    pub length: u16,
    pub virt_src_port: u16,
    pub virt_dst_port: u16,
    pub flow_id: u32,
}

impl GreHeader {
    /// # Test
    ///
    /// ```
    /// use rist_codec::header::{Flags, GreHeader, PayloadType};
    /// use bytes::BytesMut;
    ///
    /// let header = GreHeader {
    ///     flags: Flags { encrypted: true, compressed: false },
    ///     payload_type: PayloadType::Data,
    ///     length: 24,
    ///     virt_src_port: 9001,
    ///     virt_dst_port: 9002,
    ///     flow_id: 0xdead_beef,
    /// };
    ///
    /// let mut buf = BytesMut::new();
    /// header.encode(&mut buf);
    ///
    /// let decoded = GreHeader::decode(&buf).unwrap();
    /// assert_eq!(decoded, header);
    /// ```
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(GRE_HEADER_LEN);
        buf.put_u8((VERSION << 4) | self.flags.to_bits());
        buf.put_u8(self.payload_type.into());
        buf.put_u16(self.length);
        buf.put_u16(self.virt_src_port);
        buf.put_u16(self.virt_dst_port);
        buf.put_u32(self.flow_id);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < GRE_HEADER_LEN {
            return Err(Error::Truncated);
        }

        let mut buf = bytes;
        let control = buf.get_u8();
        if control >> 4 != VERSION {
            return Err(Error::ReservedBitsSet);
        }

        let flags = Flags::from_bits(control & 0x0F)?;
        let payload_type =
            PayloadType::try_from(buf.get_u8()).map_err(|e| Error::UnknownPayloadType(e.number))?;
        let length = buf.get_u16();
        let virt_src_port = buf.get_u16();
        let virt_dst_port = buf.get_u16();
        let flow_id = buf.get_u32();

        Ok(Self {
            flags,
            payload_type,
            length,
            virt_src_port,
            virt_dst_port,
            flow_id,
        })
    }
}

/// Compact RTP-style header stamped only on data packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    /// Middle-32 NTP timestamp, see [`crate::ntp::NtpTimestamp::truncate_mid32`].
    pub timestamp: u32,
    /// SSRC; equal to the owning flow's `flow_id`.
    pub ssrc: u32,
}

impl RtpHeader {
    /// # Test
    ///
    /// ```
    /// use rist_codec::header::RtpHeader;
    /// use bytes::BytesMut;
    ///
    /// let header = RtpHeader {
    ///     marker: true,
    ///     payload_type: 33,
    ///     sequence: 42,
    ///     timestamp: 0x1234_5678,
    ///     ssrc: 0xdead_beef,
    /// };
    ///
    /// let mut buf = BytesMut::new();
    /// header.encode(&mut buf);
    ///
    /// let decoded = RtpHeader::decode(&buf).unwrap();
    /// assert_eq!(decoded, header);
    /// ```
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(RTP_HEADER_LEN);

        let v_p_x_cc: u8 = 0b1000_0000;
        buf.put_u8(v_p_x_cc);
        buf.put_u8(((self.marker as u8) << 7) | (self.payload_type & 0x7F));
        buf.put_u16(self.sequence);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < RTP_HEADER_LEN {
            return Err(Error::Truncated);
        }

        let mut buf = bytes;
        let v_p_x_cc = buf.get_u8();
        if v_p_x_cc != 0b1000_0000 {
            return Err(Error::ReservedBitsSet);
        }

        let m_pt = buf.get_u8();
        let marker = m_pt & 0x80 != 0;
        let payload_type = m_pt & 0x7F;
        let sequence = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        Ok(Self {
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reserved_version() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0xF0, 0x00, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(GreHeader::decode(&buf), Err(Error::ReservedBitsSet)));
    }

    #[test]
    fn rejects_truncated_gre_header() {
        let buf = [0u8; 4];
        assert!(matches!(GreHeader::decode(&buf), Err(Error::Truncated)));
    }

    #[test]
    fn rejects_unknown_payload_type() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[(VERSION << 4), 0xFF, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            GreHeader::decode(&buf),
            Err(Error::UnknownPayloadType(0xFF))
        ));
    }
}
