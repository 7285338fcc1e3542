use bytes::BytesMut;
use rist_codec::crypto::{KeySize, apply_keystream, derive_key};
use rist_codec::header::{Flags, GreHeader, PayloadType, RtpHeader};
use rist_codec::payload::{NackBitmask, NackEntry, NackRange};

#[test]
fn data_packet_round_trips_through_gre_and_rtp_headers() {
    let gre = GreHeader {
        flags: Flags::default(),
        payload_type: PayloadType::Data,
        length: (rist_codec::header::RTP_HEADER_LEN + 4) as u16,
        virt_src_port: 1000,
        virt_dst_port: 2000,
        flow_id: 7,
    };

    let rtp = RtpHeader {
        marker: true,
        payload_type: 33,
        sequence: 100,
        timestamp: 555,
        ssrc: 7,
    };

    let mut wire = BytesMut::new();
    gre.encode(&mut wire);
    rtp.encode(&mut wire);
    wire.extend_from_slice(b"data");

    let decoded_gre = GreHeader::decode(&wire).unwrap();
    assert_eq!(decoded_gre, gre);

    let rest = &wire[rist_codec::header::GRE_HEADER_LEN..];
    let decoded_rtp = RtpHeader::decode(rest).unwrap();
    assert_eq!(decoded_rtp, rtp);

    let body = &rest[rist_codec::header::RTP_HEADER_LEN..];
    assert_eq!(body, b"data");
}

#[test]
fn encrypted_payload_decrypts_back_to_plaintext() {
    let key = derive_key(b"correct-horse-battery-staple", &[9u8; 16], KeySize::Aes256);
    let mut data = b"mpeg-ts payload goes here".to_vec();
    let original = data.clone();

    apply_keystream(&key, &[9u8; 16], 42, 1000, &mut data).unwrap();
    assert_ne!(data, original);

    apply_keystream(&key, &[9u8; 16], 42, 1000, &mut data).unwrap();
    assert_eq!(data, original);
}

#[test]
fn nack_range_and_bitmask_round_trip() {
    let range = NackRange {
        entries: vec![NackEntry { base: 100, count: 8 }, NackEntry { base: 200, count: 1 }],
    };
    let mut buf = BytesMut::new();
    range.encode(&mut buf);
    assert_eq!(NackRange::decode(&buf).unwrap(), range);

    let bitmask = NackBitmask { base: 1000, mask: 0b1010_1010 };
    let mut buf = BytesMut::new();
    bitmask.encode(&mut buf);
    let decoded = NackBitmask::decode(&buf).unwrap();
    assert_eq!(decoded, bitmask);
    assert_eq!(decoded.sequences().collect::<Vec<_>>(), vec![1001, 1003, 1005, 1007]);
}
