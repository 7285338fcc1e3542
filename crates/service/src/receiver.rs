//! Receiver context: dispatches inbound datagrams to the reorder/NACK
//! engine, the peer state machine, and the OOB queue.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use codec::header::{Flags, GreHeader, PayloadType, Profile, RtpHeader, GRE_HEADER_LEN};
use codec::payload::{KeepAlive, NackBitmask, NackEntry, NackRange, Oob, ReceiverReport};
use codec::{compression, crypto};

use crate::config::PeerConfig;
use crate::flow::{FlowCounters, FlowId};
use crate::oob::OobQueue;
use crate::peer::{Peer, PeerId, PeerKey, PeerState};
use crate::reorder::{PlaceOutcome, ReorderRing};
use crate::table::{Table, Timer};
use crate::{Error, Handlers};

const TICK_MS: u64 = 1;
const MAX_UDP_PAYLOAD: usize = 65_000;

struct FlowEntry {
    counters: FlowCounters,
    ring: ReorderRing,
    last_peer: PeerId,
    recovery_length_min_ticks: u64,
}

pub struct ReceiverOptions<H> {
    pub handler: H,
    pub reorder_window: u32,
    pub profile: Profile,
}

pub struct ReceiverContext<H> {
    peers: Table<PeerId, Peer>,
    peer_keys: Table<PeerKey, PeerId>,
    flows: Table<FlowId, FlowEntry>,
    oob: Table<PeerId, OobQueue>,
    next_peer_id: u32,
    timer: Timer,
    reorder_window: u32,
    profile: Profile,
    handler: Arc<H>,
}

impl<H> ReceiverContext<H>
where
    H: Handlers,
{
    pub fn new(options: ReceiverOptions<H>) -> Self {
        Self {
            peers: Table::default(),
            peer_keys: Table::default(),
            flows: Table::default(),
            oob: Table::default(),
            next_peer_id: 0,
            timer: Timer::default(),
            reorder_window: options.reorder_window,
            profile: options.profile,
            handler: Arc::new(options.handler),
        }
    }

    pub fn register_peer(&mut self, remote: SocketAddr, local: SocketAddr, config: PeerConfig) -> Result<PeerId, Error> {
        config.validate()?;

        let key = PeerKey { remote, local };
        if let Some(&id) = self.peer_keys.get(&key) {
            return Ok(id);
        }

        let id = PeerId(self.next_peer_id);
        self.next_peer_id += 1;

        let mut salt = [0u8; 16];
        rand::Rng::fill(&mut rand::rng(), &mut salt);

        self.peers.insert(id, Peer::new(id, key, config, salt));
        self.peer_keys.insert(key, id);
        self.oob.insert(id, OobQueue::default());

        Ok(id)
    }

    fn peer_key_material(&self, id: PeerId) -> Option<(Vec<u8>, [u8; 16])> {
        let peer = self.peers.get(&id)?;
        if peer.config.secret.is_empty() {
            return None;
        }
        let key = crypto::derive_key(
            peer.config.secret.as_bytes(),
            &peer.salt,
            match peer.config.key_size {
                crate::config::KeySize::None => return None,
                crate::config::KeySize::Aes128 => crypto::KeySize::Aes128,
                crate::config::KeySize::Aes256 => crypto::KeySize::Aes256,
            },
        );
        Some((key, peer.salt))
    }

    /// Processes one inbound datagram from `remote` on local socket `local`.
    pub fn on_datagram(&mut self, remote: SocketAddr, local: SocketAddr, bytes: &[u8]) -> Result<(), Error> {
        let key = PeerKey { remote, local };
        let peer_id = *self.peer_keys.get(&key).ok_or(Error::Unauthorized)?;

        let now_tick = self.timer.get();
        if let Some(peer) = self.peers.get(&peer_id) {
            peer.touch(now_tick);
        }
        if let Some(peer) = self.peers.get_mut(&peer_id) {
            if peer.state == PeerState::Idle {
                peer.state = PeerState::Handshaking;
            }
        }

        match self.profile {
            // Bare RTP-over-UDP: no envelope, no control payloads, no
            // compression or encryption. The flow id rides in the RTP ssrc.
            Profile::Simple => {
                let rtp = RtpHeader::decode(bytes)?;
                self.handle_data(peer_id, rtp.ssrc, bytes)?;
            }
            Profile::Main => self.on_main_datagram(peer_id, bytes)?,
        }

        if let Some(peer) = self.peers.get_mut(&peer_id) {
            if peer.state == PeerState::Handshaking && self.handler.on_auth(peer_id, remote) {
                peer.state = PeerState::Authenticated;
            }
        }

        Ok(())
    }

    fn on_main_datagram(&mut self, peer_id: PeerId, bytes: &[u8]) -> Result<(), Error> {
        let header = GreHeader::decode(bytes)?;
        let rest = &bytes[codec::header::GRE_HEADER_LEN..];
        if rest.len() < header.length as usize {
            return Err(Error::MalformedPacket);
        }
        let body = &rest[..header.length as usize];

        let plaintext = self.unwrap_payload(peer_id, &header.flags, header.flow_id, body)?;

        match header.payload_type {
            PayloadType::Data => self.handle_data(peer_id, header.flow_id, &plaintext)?,
            // These are messages this end itself emits (see `build_nack_frame`
            // / `build_receiver_report`); a bare receiver context has no
            // `SenderContext` to route them to, so it bubbles them up to the
            // handler instead of silently decoding and dropping them.
            PayloadType::NackRange => {
                let sequences: Vec<u32> = NackRange::decode(&plaintext)?
                    .entries
                    .iter()
                    .flat_map(|e| (0..e.count).map(move |i| (e.base as u32).wrapping_add(i as u32)))
                    .collect();
                self.handler.on_nack(peer_id, &sequences);
            }
            PayloadType::NackBitmask => {
                let sequences: Vec<u32> = NackBitmask::decode(&plaintext)?.sequences().collect();
                self.handler.on_nack(peer_id, &sequences);
            }
            PayloadType::ReceiverReport => {
                let report = ReceiverReport::decode(&plaintext)?;
                self.handler.on_receiver_report(peer_id, &report);
            }
            PayloadType::KeepAlive => self.handle_keepalive(peer_id, &plaintext)?,
            PayloadType::Oob => self.handle_oob(peer_id, Oob::decode(&plaintext)),
        }

        Ok(())
    }

    fn unwrap_payload(&mut self, peer_id: PeerId, flags: &Flags, flow_id: FlowId, body: &[u8]) -> Result<Vec<u8>, Error> {
        let mut data = body.to_vec();

        if flags.encrypted {
            let Some((key, salt)) = self.peer_key_material(peer_id) else {
                return Err(Error::Unauthorized);
            };

            // Sequence is only known for data packets; control payloads use 0,
            // matching the sender's framing of non-data traffic.
            let sequence = 0;
            if crypto::apply_keystream(&key, &salt, flow_id, sequence, &mut data).is_err() {
                if let Some(peer) = self.peers.get_mut(&peer_id) {
                    if peer.on_decrypt_failure() {
                        peer.state = PeerState::Dead;
                        self.handler.on_disconnect(peer_id);
                    }
                }
                return Err(Error::DecryptFailed);
            }
        }

        if flags.compressed {
            data = compression::decompress(&data, MAX_UDP_PAYLOAD).map_err(Error::from)?;
        }

        Ok(data)
    }

    fn handle_data(&mut self, peer_id: PeerId, flow_id: FlowId, plaintext: &[u8]) -> Result<(), Error> {
        let rtp = RtpHeader::decode(plaintext)?;
        let payload = plaintext[codec::header::RTP_HEADER_LEN..].to_vec();

        let now_tick = self.timer.get();
        let window = self.reorder_window;

        let entry = self.flows.entry(flow_id).or_insert_with(|| FlowEntry {
            counters: FlowCounters::default(),
            ring: ReorderRing::new(window),
            last_peer: peer_id,
            recovery_length_min_ticks: 50,
        });
        entry.last_peer = peer_id;

        let rtt_min_ticks = self
            .peers
            .get(&peer_id)
            .map(|p| p.config.recovery_rtt_min as u64)
            .unwrap_or(10);

        entry.recovery_length_min_ticks = self
            .peers
            .get(&peer_id)
            .map(|p| p.config.recovery_length_min as u64)
            .unwrap_or(50);

        let outcome = entry.ring.place(rtp.sequence as u32, payload, now_tick, rtt_min_ticks);
        match outcome {
            PlaceOutcome::Placed => {
                entry.counters.received += 1;
            }
            PlaceOutcome::Recovered | PlaceOutcome::FilledLateSlot => {
                entry.counters.received += 1;
                entry.counters.recovered += 1;
            }
            PlaceOutcome::Duplicate => {}
            PlaceOutcome::LateDrop => {}
            PlaceOutcome::FlowReset { .. } => {
                entry.counters.lost += 1;
            }
        }

        if let Some(peer) = self.peers.get_mut(&peer_id) {
            peer.state = PeerState::Active;
            peer.stats.received = entry.counters.received;
            peer.stats.recovered = entry.counters.recovered;
            peer.stats.lost = entry.counters.lost;
            peer.stats.rtt_smoothed_ms = peer.rtt.smoothed_ms() as u32;
        }

        let recovery_length_min_ticks = self
            .peers
            .get(&peer_id)
            .map(|p| p.config.recovery_length_min as u64)
            .unwrap_or(50);

        let handler = Arc::clone(&self.handler);
        entry
            .ring
            .release_ready(now_tick, recovery_length_min_ticks, |_seq, data| {
                handler.on_data(flow_id, &data);
            });

        Ok(())
    }

    fn handle_keepalive(&mut self, peer_id: PeerId, plaintext: &[u8]) -> Result<(), Error> {
        let ka = KeepAlive::decode(plaintext)?;
        if let Some(peer) = self.peers.get_mut(&peer_id) {
            peer.cname = ka.cname;
            if peer.state == PeerState::Authenticated {
                peer.state = PeerState::Active;
            }
        }
        Ok(())
    }

    fn handle_oob(&mut self, peer_id: PeerId, oob: Oob<'_>) {
        self.handler.on_oob(peer_id, oob.bytes);
        if let Some(queue) = self.oob.get_mut(&peer_id) {
            queue.push(oob.bytes.to_vec());
        }
    }

    /// Advances the tick counter and runs liveness + NACK scheduling,
    /// returning the wire-ready NACK datagrams the socket loop should send.
    pub fn tick(&mut self) -> Vec<NackOutbound> {
        let now_tick = self.timer.add();

        // First pass: drain due NACKs and release ready slots while `flows`
        // is mutably borrowed. Frame building needs `&self.peers`, which
        // can't overlap that borrow, so just collect what's due here.
        let handler = Arc::clone(&self.handler);
        let mut due_nacks: Vec<(PeerId, FlowId, Vec<u32>)> = Vec::new();
        for (&flow_id, entry) in self.flows.iter_mut() {
            let due = entry.ring.due_nacks(now_tick);
            if !due.is_empty() {
                due_nacks.push((entry.last_peer, flow_id, due));
            }

            entry
                .ring
                .release_ready(now_tick, entry.recovery_length_min_ticks, |_seq, data| {
                    handler.on_data(flow_id, &data);
                });
        }

        // Second pass: the `flows` borrow above has ended, so peers and
        // flows can each be touched freely now. `Simple` has no envelope to
        // carry a NACK in and no recovery loop, so due NACKs are left
        // un-rearmed; they just age out whenever the gap is naturally
        // resolved or the ring wraps past them.
        let mut outbound = Vec::new();
        if self.profile == Profile::Main {
            for (peer_id, flow_id, sequences) in due_nacks {
                if let Some(frame) = self.build_nack_frame(peer_id, flow_id, &sequences) {
                    outbound.push(frame);
                }

                let (rtt_max_ticks, max_retries) = self
                    .peers
                    .get(&peer_id)
                    .map(|p| (p.config.recovery_rtt_max as u64, p.config.max_retries))
                    .unwrap_or((500, 8));

                if let Some(entry) = self.flows.get_mut(&flow_id) {
                    for seq in sequences {
                        entry.ring.rearm_or_lose(seq, rtt_max_ticks, now_tick, max_retries);
                    }
                }
            }
        }

        let mut dead = Vec::new();
        for (&id, peer) in self.peers.iter_mut() {
            if peer.state != PeerState::Dead && peer.is_stale(now_tick, TICK_MS) {
                peer.state = PeerState::Dead;
                dead.push(id);
            }
        }
        for id in dead {
            self.handler.on_disconnect(id);
        }

        outbound
    }

    /// Frames `sequences` as a NACK-range or NACK-bitmask payload, whichever
    /// is denser, and wraps it for transmission back to the sending peer.
    fn build_nack_frame(&self, peer_id: PeerId, flow_id: FlowId, sequences: &[u32]) -> Option<NackOutbound> {
        let peer = self.peers.get(&peer_id)?;
        let (payload_type, mut payload) = coalesce_nack(sequences);

        let mut flags = Flags::default();
        if let Some((key, salt)) = self.peer_key_material(peer_id) {
            let compressed = compression::compress(&payload);
            if compressed.len() < payload.len() {
                payload = compressed;
                flags.compressed = true;
            }
            if crypto::apply_keystream(&key, &salt, flow_id, 0, &mut payload).is_ok() {
                flags.encrypted = true;
            }
        }

        let header = GreHeader {
            flags,
            payload_type,
            length: payload.len() as u16,
            virt_src_port: 0,
            virt_dst_port: peer.config.gre_dst_port,
            flow_id,
        };

        let mut out = BytesMut::with_capacity(GRE_HEADER_LEN + payload.len());
        header.encode(&mut out);
        out.extend_from_slice(&payload);

        Some(NackOutbound { remote: peer.key.remote, bytes: out.to_vec() })
    }

    /// Frames a receiver report summarizing `peer_id`'s reception quality
    /// so far, for periodic transmission back to the sender.
    pub fn build_receiver_report(&self, peer_id: PeerId) -> Option<NackOutbound> {
        if self.profile == Profile::Simple {
            return None;
        }
        let peer = self.peers.get(&peer_id)?;
        let rr = ReceiverReport {
            received: peer.stats.received as u32,
            lost: peer.stats.lost as u32,
            jitter: 0,
            lsr: 0,
            dlsr: 0,
        };

        let mut body = BytesMut::new();
        rr.encode(&mut body);
        let mut payload = body.to_vec();

        let mut flags = Flags::default();
        if let Some((key, salt)) = self.peer_key_material(peer_id) {
            if crypto::apply_keystream(&key, &salt, 0, 0, &mut payload).is_ok() {
                flags.encrypted = true;
            }
        }

        let header = GreHeader {
            flags,
            payload_type: PayloadType::ReceiverReport,
            length: payload.len() as u16,
            virt_src_port: 0,
            virt_dst_port: peer.config.gre_dst_port,
            flow_id: 0,
        };

        let mut out = BytesMut::with_capacity(GRE_HEADER_LEN + payload.len());
        header.encode(&mut out);
        out.extend_from_slice(&payload);

        Some(NackOutbound { remote: peer.key.remote, bytes: out.to_vec() })
    }

    pub fn peer_state(&self, id: PeerId) -> Option<PeerState> {
        self.peers.get(&id).map(|p| p.state)
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.keys().copied()
    }

    pub fn report_stats(&self) {
        for (&id, peer) in self.peers.iter() {
            self.handler.on_stats(id, &peer.stats);
        }
    }

    pub fn flow_counters(&self, flow_id: FlowId) -> Option<FlowCounters> {
        self.flows.get(&flow_id).map(|f| f.counters)
    }
}

/// A framed control datagram ready to be sent back to a peer.
#[derive(Debug, Clone)]
pub struct NackOutbound {
    pub remote: SocketAddr,
    pub bytes: Vec<u8>,
}

/// Picks NACK-bitmask over NACK-range once the missing sequences cover at
/// least half of a 128-wide window; otherwise emits contiguous ranges.
fn coalesce_nack(sequences: &[u32]) -> (PayloadType, Vec<u8>) {
    let mut seqs = sequences.to_vec();
    seqs.sort_unstable();
    seqs.dedup();

    let base = seqs[0];
    let span = seqs.last().copied().unwrap_or(base).wrapping_sub(base) as u64 + 1;

    if span <= 128 && (seqs.len() as f64 / span as f64) >= 0.5 {
        let mut mask: u128 = 0;
        for &s in &seqs {
            let bit = s.wrapping_sub(base);
            if bit < 128 {
                mask |= 1u128 << bit;
            }
        }
        let mut buf = BytesMut::new();
        NackBitmask { base, mask }.encode(&mut buf);
        (PayloadType::NackBitmask, buf.to_vec())
    } else {
        let mut entries = Vec::new();
        let mut i = 0;
        while i < seqs.len() {
            let start = seqs[i];
            let mut count: u16 = 1;
            while i + 1 < seqs.len() && seqs[i + 1] == seqs[i].wrapping_add(1) && count < u16::MAX {
                count += 1;
                i += 1;
            }
            entries.push(NackEntry { base: start as u16, count });
            i += 1;
        }
        let mut buf = BytesMut::new();
        NackRange { entries }.encode(&mut buf);
        (PayloadType::NackRange, buf.to_vec())
    }
}
