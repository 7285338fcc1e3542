use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{BufferBloatMode, PeerConfig};

/// Dense index into the owning context's peer table. Resolves the
/// peer/context cyclic reference: the peer never holds a strong reference
/// back to its context, callers look the peer up through the context by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

/// Composite lookup key for an inbound datagram's originating peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub remote: SocketAddr,
    pub local: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Idle,
    Handshaking,
    Authenticated,
    Active,
    Dead,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PeerStats {
    pub received: u64,
    pub recovered: u64,
    pub lost: u64,
    pub reordered: u64,
    pub rtt_smoothed_ms: u32,
}

/// Smoothed RTT estimate, EWMA with alpha = 1/8, clamped to the peer's
/// configured bounds.
#[derive(Debug)]
pub struct RttEstimator {
    smoothed_ms: f64,
    min_ms: u32,
    max_ms: u32,
}

impl RttEstimator {
    pub fn new(min_ms: u32, max_ms: u32) -> Self {
        Self {
            smoothed_ms: min_ms as f64,
            min_ms,
            max_ms,
        }
    }

    /// ```
    /// use rist_core::peer::RttEstimator;
    ///
    /// let mut rtt = RttEstimator::new(10, 500);
    /// rtt.sample(100.0);
    /// assert!(rtt.smoothed_ms() > 10.0);
    /// ```
    pub fn sample(&mut self, sample_ms: f64) {
        const ALPHA: f64 = 1.0 / 8.0;
        self.smoothed_ms = (1.0 - ALPHA) * self.smoothed_ms + ALPHA * sample_ms;
        self.smoothed_ms = self.smoothed_ms.clamp(self.min_ms as f64, self.max_ms as f64);
    }

    pub fn smoothed_ms(&self) -> f64 {
        self.smoothed_ms
    }
}

/// Congestion / buffer-bloat state derived from the RTT estimate.
#[derive(Debug, Default)]
pub struct CongestionState {
    pub retransmits_paused: bool,
    pub originals_paused_until_ms: u64,
}

impl CongestionState {
    /// Re-evaluates pause state from the current smoothed RTT.
    pub fn update(&mut self, mode: BufferBloatMode, smoothed_rtt_ms: f64, limit_ms: u32, hard_limit_ms: u32, now_ms: u64) {
        match mode {
            BufferBloatMode::Off => {
                self.retransmits_paused = false;
                self.originals_paused_until_ms = 0;
            }
            BufferBloatMode::Normal => {
                let low_water = limit_ms as f64 * 0.5;
                if smoothed_rtt_ms > limit_ms as f64 {
                    self.retransmits_paused = true;
                } else if smoothed_rtt_ms < low_water {
                    self.retransmits_paused = false;
                }
            }
            BufferBloatMode::Aggressive => {
                let low_water = limit_ms as f64 * 0.5;
                if smoothed_rtt_ms > limit_ms as f64 {
                    self.retransmits_paused = true;
                } else if smoothed_rtt_ms < low_water {
                    self.retransmits_paused = false;
                }

                if smoothed_rtt_ms > hard_limit_ms as f64 {
                    self.originals_paused_until_ms = now_ms + smoothed_rtt_ms as u64;
                }
            }
        }
    }

    pub fn originals_paused(&self, now_ms: u64) -> bool {
        now_ms < self.originals_paused_until_ms
    }
}

pub struct Peer {
    pub id: PeerId,
    pub key: PeerKey,
    pub config: PeerConfig,
    pub state: PeerState,
    pub cname: String,
    pub rtt: RttEstimator,
    pub congestion: CongestionState,
    pub last_inbound_tick: AtomicU64,
    pub last_keepalive_tick: u64,
    pub decrypt_failures: u32,
    pub stats: PeerStats,
    /// 16-byte salt carried in the wire header, mixed into the crypto nonce.
    pub salt: [u8; 16],
}

impl Peer {
    pub fn new(id: PeerId, key: PeerKey, config: PeerConfig, salt: [u8; 16]) -> Self {
        let rtt = RttEstimator::new(config.recovery_rtt_min, config.recovery_rtt_max);
        Self {
            id,
            key,
            state: PeerState::Idle,
            cname: String::new(),
            rtt,
            congestion: CongestionState::default(),
            last_inbound_tick: AtomicU64::new(0),
            last_keepalive_tick: 0,
            decrypt_failures: 0,
            stats: PeerStats::default(),
            salt,
            config,
        }
    }

    pub fn touch(&self, tick: u64) {
        self.last_inbound_tick.store(tick, Ordering::Relaxed);
    }

    pub fn last_inbound_tick(&self) -> u64 {
        self.last_inbound_tick.load(Ordering::Relaxed)
    }

    /// Any state transitions to dead after `session_timeout` ms of silence.
    pub fn is_stale(&self, now_tick: u64, tick_ms: u64) -> bool {
        let elapsed_ms = now_tick.saturating_sub(self.last_inbound_tick()) * tick_ms;
        elapsed_ms >= self.config.session_timeout_ms
    }

    pub fn on_decrypt_failure(&mut self) -> bool {
        self.decrypt_failures += 1;
        self.decrypt_failures >= 3
    }
}
