use codec::header::Profile;
use rist_core::config::PeerConfig;
use rist_core::{Handlers, SenderContext, SenderOptions};

#[derive(Clone, Default)]
struct NoopHandlers;

impl Handlers for NoopHandlers {}

#[test]
fn enqueue_frames_and_stores_retransmit_copy() {
    let mut sender = SenderContext::new(SenderOptions {
        handler: NoopHandlers,
        ring_capacity: 1024,
        profile: Profile::Main,
    });

    let remote = "127.0.0.1:4000".parse().unwrap();
    let local = "127.0.0.1:5000".parse().unwrap();
    let peer = sender.add_peer(remote, local, PeerConfig::default()).unwrap();
    sender.assign_flow(1, vec![peer]);

    let out = sender.enqueue(1, b"hello").unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].peer, peer);
    assert!(!out[0].bytes.is_empty());
}

#[test]
fn nack_retransmits_unexpired_slot_once() {
    let mut sender = SenderContext::new(SenderOptions {
        handler: NoopHandlers,
        ring_capacity: 1024,
        profile: Profile::Main,
    });

    let remote = "127.0.0.1:4001".parse().unwrap();
    let local = "127.0.0.1:5000".parse().unwrap();
    let peer = sender.add_peer(remote, local, PeerConfig::default()).unwrap();
    sender.assign_flow(2, vec![peer]);

    sender.enqueue(2, b"payload").unwrap();

    let retransmits = sender.handle_nack(peer, &[0]);
    assert_eq!(retransmits.len(), 1);
    assert_eq!(retransmits[0].peer, peer);
}

#[test]
fn enqueue_fails_fast_when_flow_unassigned() {
    let mut sender = SenderContext::new(SenderOptions {
        handler: NoopHandlers,
        ring_capacity: 64,
        profile: Profile::Main,
    });

    let err = sender.enqueue(99, b"x").unwrap_err();
    assert!(matches!(err, rist_core::Error::NotStarted));
}
