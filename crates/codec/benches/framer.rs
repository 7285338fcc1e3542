use bytes::BytesMut;
use criterion::{Criterion, criterion_group, criterion_main};
use rist_codec::header::{Flags, GreHeader, PayloadType, RtpHeader};

fn encode_decode(c: &mut Criterion) {
    let gre = GreHeader {
        flags: Flags { encrypted: true, compressed: true },
        payload_type: PayloadType::Data,
        length: 1200,
        virt_src_port: 9001,
        virt_dst_port: 9002,
        flow_id: 0xdead_beef,
    };

    let rtp = RtpHeader {
        marker: false,
        payload_type: 33,
        sequence: 4242,
        timestamp: 0x1234_5678,
        ssrc: 0xdead_beef,
    };

    c.bench_function("gre_header_round_trip", |b| {
        b.iter(|| {
            let mut buf = BytesMut::new();
            gre.encode(&mut buf);
            GreHeader::decode(&buf).unwrap()
        })
    });

    c.bench_function("rtp_header_round_trip", |b| {
        b.iter(|| {
            let mut buf = BytesMut::new();
            rtp.encode(&mut buf);
            RtpHeader::decode(&buf).unwrap()
        })
    });
}

criterion_group!(benches, encode_decode);
criterion_main!(benches);
