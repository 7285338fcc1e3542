use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use codec::header::{Flags, GreHeader, PayloadType, Profile, RtpHeader};
use codec::header::{GRE_HEADER_LEN, RTP_HEADER_LEN};
use rist_core::config::PeerConfig;
use rist_core::flow::FlowId;
use rist_core::peer::PeerId;
use rist_core::{Handlers, ReceiverContext, ReceiverOptions};

#[derive(Default, Clone)]
struct RecordingHandlers {
    delivered: Arc<Mutex<Vec<(FlowId, Vec<u8>)>>>,
    disconnects: Arc<Mutex<Vec<PeerId>>>,
}

impl Handlers for RecordingHandlers {
    fn on_data(&self, flow: FlowId, data: &[u8]) {
        self.delivered.lock().unwrap().push((flow, data.to_vec()));
    }

    fn on_disconnect(&self, peer: PeerId) {
        self.disconnects.lock().unwrap().push(peer);
    }
}

fn fast_peer_config() -> PeerConfig {
    PeerConfig {
        recovery_length_min: 0,
        ..PeerConfig::default()
    }
}

fn frame_data(flow_id: u32, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut rtp_buf = BytesMut::new();
    RtpHeader {
        marker: false,
        payload_type: 33,
        sequence,
        timestamp: 0,
        ssrc: flow_id,
    }
    .encode(&mut rtp_buf);
    rtp_buf.extend_from_slice(payload);

    let mut out = BytesMut::new();
    GreHeader {
        flags: Flags::default(),
        payload_type: PayloadType::Data,
        length: rtp_buf.len() as u16,
        virt_src_port: 0,
        virt_dst_port: 5000,
        flow_id,
    }
    .encode(&mut out);
    out.extend_from_slice(&rtp_buf);
    out.to_vec()
}

#[test]
fn clean_path_delivers_every_sequence_exactly_once() {
    let handlers = RecordingHandlers::default();
    let mut receiver = ReceiverContext::new(ReceiverOptions {
        handler: handlers.clone(),
        reorder_window: 256,
        profile: Profile::Main,
    });

    let remote: SocketAddr = "127.0.0.1:4000".parse().unwrap();
    let local: SocketAddr = "127.0.0.1:5000".parse().unwrap();
    receiver
        .register_peer(remote, local, fast_peer_config())
        .unwrap();

    for seq in 0..50u16 {
        let datagram = frame_data(1, seq, &[seq as u8]);
        receiver.on_datagram(remote, local, &datagram).unwrap();
    }

    for _ in 0..100 {
        receiver.tick();
    }

    let delivered = handlers.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 50);
    for (i, (flow, data)) in delivered.iter().enumerate() {
        assert_eq!(*flow, 1);
        assert_eq!(data[0], i as u8);
    }
}

#[test]
fn duplicate_datagram_is_delivered_once() {
    let handlers = RecordingHandlers::default();
    let mut receiver = ReceiverContext::new(ReceiverOptions {
        handler: handlers.clone(),
        reorder_window: 64,
        profile: Profile::Main,
    });

    let remote: SocketAddr = "127.0.0.1:4001".parse().unwrap();
    let local: SocketAddr = "127.0.0.1:5000".parse().unwrap();
    receiver
        .register_peer(remote, local, fast_peer_config())
        .unwrap();

    let datagram = frame_data(1, 0, b"x");
    receiver.on_datagram(remote, local, &datagram).unwrap();
    receiver.on_datagram(remote, local, &datagram).unwrap();

    for _ in 0..10 {
        receiver.tick();
    }

    assert_eq!(handlers.delivered.lock().unwrap().len(), 1);
}

#[test]
fn reordered_window_still_delivers_in_order() {
    let handlers = RecordingHandlers::default();
    let mut receiver = ReceiverContext::new(ReceiverOptions {
        handler: handlers.clone(),
        reorder_window: 64,
        profile: Profile::Main,
    });

    let remote: SocketAddr = "127.0.0.1:4002".parse().unwrap();
    let local: SocketAddr = "127.0.0.1:5000".parse().unwrap();
    receiver
        .register_peer(remote, local, fast_peer_config())
        .unwrap();

    for &seq in &[3u16, 1, 0, 2, 4, 5, 7, 6] {
        let datagram = frame_data(9, seq, &[seq as u8]);
        receiver.on_datagram(remote, local, &datagram).unwrap();
    }

    for _ in 0..10 {
        receiver.tick();
    }

    let delivered = handlers.delivered.lock().unwrap();
    let sequence: Vec<u8> = delivered.iter().map(|(_, d)| d[0]).collect();
    assert_eq!(sequence, vec![0, 1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn _header_lens_are_consistent_with_codec_constants() {
    assert_eq!(GRE_HEADER_LEN, 12);
    assert_eq!(RTP_HEADER_LEN, 12);
}
