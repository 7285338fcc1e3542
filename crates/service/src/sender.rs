//! Sender context: retransmit ring, bitrate pacer, buffer-bloat control
//! retransmission.

use std::sync::Arc;

use bytes::BytesMut;
use codec::header::{Flags, GreHeader, PayloadType, Profile, RtpHeader, GRE_HEADER_LEN};
use codec::ntp::NtpTimestamp;
use codec::{compression, crypto};

use crate::config::PeerConfig;
use crate::peer::{Peer, PeerId, PeerKey, PeerState};
use crate::retransmit::{PacketSlot, RetransmitRing, TokenBucket};
use crate::table::{Table, Timer};
use crate::{Error, Handlers};

pub struct SenderOptions<H> {
    pub handler: H,
    pub ring_capacity: usize,
    pub profile: Profile,
}

struct FlowState {
    next_seq: u32,
    peers: Vec<PeerId>,
}

pub struct SenderContext<H> {
    peers: Table<PeerId, Peer>,
    flows: Table<u32, FlowState>,
    rings: Table<PeerId, RetransmitRing>,
    buckets: Table<PeerId, TokenBucket>,
    next_peer_id: u32,
    ring_capacity: usize,
    profile: Profile,
    timer: Timer,
    handler: Arc<H>,
}

/// A frame ready to be written to a UDP socket.
pub struct Outbound {
    pub peer: PeerId,
    pub bytes: Vec<u8>,
}

impl<H> SenderContext<H>
where
    H: Handlers,
{
    pub fn new(options: SenderOptions<H>) -> Self {
        Self {
            peers: Table::default(),
            flows: Table::default(),
            rings: Table::default(),
            buckets: Table::default(),
            next_peer_id: 0,
            ring_capacity: options.ring_capacity,
            profile: options.profile,
            timer: Timer::default(),
            handler: Arc::new(options.handler),
        }
    }

    pub fn add_peer(&mut self, remote: std::net::SocketAddr, local: std::net::SocketAddr, config: PeerConfig) -> Result<PeerId, Error> {
        config.validate()?;

        let id = PeerId(self.next_peer_id);
        self.next_peer_id += 1;

        let mut salt = [0u8; 16];
        rand::Rng::fill(&mut rand::rng(), &mut salt);

        let bitrate = config.recovery_maxbitrate;
        self.buckets.insert(id, TokenBucket::new(bitrate));
        self.rings.insert(id, RetransmitRing::new(self.ring_capacity));
        self.peers
            .insert(id, Peer::new(id, PeerKey { remote, local }, config, salt));

        Ok(id)
    }

    pub fn assign_flow(&mut self, flow_id: u32, peers: Vec<PeerId>) {
        self.flows.insert(
            flow_id,
            FlowState {
                next_seq: 0,
                peers,
            },
        );
    }

    /// Stamps, frames, and (logically) transmits `data` on every
    /// authenticated peer assigned to `flow_id`. Returns the wire frames
    /// the caller's socket loop should actually write.
    pub fn enqueue(&mut self, flow_id: u32, data: &[u8]) -> Result<Vec<Outbound>, Error> {
        let now_tick = self.timer.get();

        let (sequence, peer_ids) = {
            let flow = self.flows.get_mut(&flow_id).ok_or(Error::NotStarted)?;
            let seq = flow.next_seq;
            flow.next_seq = flow.next_seq.wrapping_add(1);
            (seq, flow.peers.clone())
        };

        let mut out = Vec::with_capacity(peer_ids.len());
        for peer_id in peer_ids {
            let Some(peer) = self.peers.get(&peer_id) else { continue };
            if peer.state == PeerState::Dead {
                continue;
            }
            if peer.congestion.originals_paused(now_tick) {
                continue;
            }

            let wire = self.frame_data(peer_id, flow_id, sequence, data)?;

            let bucket = self.buckets.get_mut(&peer_id).unwrap();
            if !bucket.try_consume(wire.len()) {
                continue;
            }

            if let Some(ring) = self.rings.get_mut(&peer_id) {
                let peer = self.peers.get(&peer_id).unwrap();
                ring.insert(PacketSlot {
                    sequence,
                    wire_bytes: wire.clone(),
                    sent_tick: now_tick,
                    retry_count: 0,
                    deadline_tick: now_tick + peer.config.recovery_length_max as u64,
                });
            }

            out.push(Outbound { peer: peer_id, bytes: wire });
        }

        if out.is_empty() {
            return Err(Error::WouldBlock);
        }

        Ok(out)
    }

    fn frame_data(&self, peer_id: PeerId, flow_id: u32, sequence: u32, data: &[u8]) -> Result<Vec<u8>, Error> {
        let peer = self.peers.get(&peer_id).ok_or(Error::PeerDead)?;

        let mut body = BytesMut::new();
        let rtp = RtpHeader {
            marker: false,
            payload_type: 33,
            sequence: sequence as u16,
            timestamp: NtpTimestamp::now().truncate_mid32(),
            ssrc: flow_id,
        };
        rtp.encode(&mut body);
        body.extend_from_slice(data);

        // Bare RTP-over-UDP: no envelope, no compression, no encryption.
        if self.profile == Profile::Simple {
            return Ok(body.to_vec());
        }

        let mut payload = body.to_vec();
        let mut flags = Flags::default();

        if let Some((key, salt)) = self.key_material(peer) {
            let compressed = compression::compress(&payload);
            if compressed.len() < payload.len() {
                payload = compressed;
                flags.compressed = true;
            }
            crypto::apply_keystream(&key, &salt, flow_id, sequence, &mut payload)
                .map_err(|_| Error::DecryptFailed)?;
            flags.encrypted = true;
        }

        let header = GreHeader {
            flags,
            payload_type: PayloadType::Data,
            length: payload.len() as u16,
            virt_src_port: 0,
            virt_dst_port: peer.config.gre_dst_port,
            flow_id,
        };

        let mut out = BytesMut::with_capacity(GRE_HEADER_LEN + payload.len());
        header.encode(&mut out);
        out.extend_from_slice(&payload);

        Ok(out.to_vec())
    }

    fn key_material(&self, peer: &Peer) -> Option<(Vec<u8>, [u8; 16])> {
        if peer.config.secret.is_empty() {
            return None;
        }
        let size = match peer.config.key_size {
            crate::config::KeySize::None => return None,
            crate::config::KeySize::Aes128 => crypto::KeySize::Aes128,
            crate::config::KeySize::Aes256 => crypto::KeySize::Aes256,
        };
        Some((crypto::derive_key(peer.config.secret.as_bytes(), &peer.salt, size), peer.salt))
    }

    /// Handles an inbound NACK: queues matching, unexpired slots for
    /// retransmission (ahead of any new originals) and drains as much of the
    /// queue as the bitrate pacer currently allows.
    pub fn handle_nack(&mut self, peer_id: PeerId, sequences: &[u32]) -> Vec<Outbound> {
        let now_tick = self.timer.get();
        let mut out = Vec::new();

        let Some(peer) = self.peers.get_mut(&peer_id) else { return out };
        if peer.congestion.retransmits_paused {
            return out;
        }
        let rtt_ticks = peer.rtt.smoothed_ms() as u64;

        let Some(ring) = self.rings.get_mut(&peer_id) else { return out };
        let mut eligible = Vec::new();
        for &seq in sequences {
            let Some(slot) = ring.get_mut(seq) else { continue };
            if now_tick >= slot.deadline_tick {
                continue;
            }
            if now_tick.saturating_sub(slot.sent_tick) < rtt_ticks && slot.retry_count > 0 {
                continue;
            }
            eligible.push(seq);
        }

        if let Some(bucket) = self.buckets.get_mut(&peer_id) {
            for seq in eligible {
                bucket.queue_retransmit(seq);
            }
        }

        self.drain_retransmits(peer_id, now_tick, &mut out);
        out
    }

    /// Pops queued retransmit sequences and sends as many as the token
    /// bucket currently affords, re-queuing the rest for the next tick.
    fn drain_retransmits(&mut self, peer_id: PeerId, now_tick: u64, out: &mut Vec<Outbound>) {
        loop {
            let Some(seq) = self.buckets.get_mut(&peer_id).and_then(|b| b.next_retransmit()) else {
                break;
            };

            let Some(slot) = self.rings.get_mut(&peer_id).and_then(|r| r.get_mut(seq)) else {
                continue;
            };
            if now_tick >= slot.deadline_tick {
                continue;
            }

            let wire_len = slot.wire_bytes.len();
            let wire_bytes = slot.wire_bytes.clone();

            let Some(bucket) = self.buckets.get_mut(&peer_id) else { break };
            if !bucket.try_consume(wire_len) {
                bucket.queue_retransmit(seq);
                break;
            }

            if let Some(slot) = self.rings.get_mut(&peer_id).and_then(|r| r.get_mut(seq)) {
                slot.sent_tick = now_tick;
                slot.retry_count += 1;
            }

            out.push(Outbound { peer: peer_id, bytes: wire_bytes });
        }
    }

    /// Advances timing, refills pacers, expires rings, drains any backlogged
    /// retransmits the pacer can now afford, and re-evaluates buffer-bloat
    /// state for every peer.
    pub fn tick(&mut self, elapsed_ms: u64) -> Vec<Outbound> {
        let now_tick = self.timer.add();

        for (_, bucket) in self.buckets.iter_mut() {
            bucket.refill(elapsed_ms);
        }

        for (_, ring) in self.rings.iter_mut() {
            ring.evict_expired(now_tick);
        }

        let mut out = Vec::new();
        let peer_ids: Vec<PeerId> = self.peers.keys().copied().collect();
        for id in peer_ids {
            self.drain_retransmits(id, now_tick, &mut out);
        }

        for (&id, peer) in self.peers.iter_mut() {
            let smoothed = peer.rtt.smoothed_ms();
            peer.congestion.update(
                peer.config.buffer_bloat_mode,
                smoothed,
                peer.config.buffer_bloat_limit,
                peer.config.buffer_bloat_hard_limit,
                now_tick,
            );
            if peer.state != PeerState::Dead && peer.is_stale(now_tick, 1) {
                peer.state = PeerState::Dead;
                self.handler.on_disconnect(id);
            }
        }

        out
    }

    pub fn sample_rtt(&mut self, peer_id: PeerId, sample_ms: f64) {
        if let Some(peer) = self.peers.get_mut(&peer_id) {
            peer.rtt.sample(sample_ms);
        }
    }
}
