//! Sender-side retransmit ring and bitrate pacer.

use std::collections::VecDeque;

/// One in-flight packet, indexed by `sequence mod capacity`.
#[derive(Debug, Clone)]
pub struct PacketSlot {
    pub sequence: u32,
    pub wire_bytes: Vec<u8>,
    pub sent_tick: u64,
    pub retry_count: u8,
    pub deadline_tick: u64,
}

/// Ring buffer of in-flight packets for one peer. Eviction on wrap is the
/// sole source of unrecoverable loss on the sender side.
pub struct RetransmitRing {
    slots: Vec<Option<PacketSlot>>,
    capacity: usize,
    evicted: u64,
}

impl RetransmitRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    fn index(&self, sequence: u32) -> usize {
        (sequence as usize) % self.capacity
    }

    /// Inserts a newly transmitted packet, evicting whatever occupied the
    /// slot regardless of its retry state.
    pub fn insert(&mut self, slot: PacketSlot) {
        let idx = self.index(slot.sequence);
        if self.slots[idx].is_some() {
            self.evicted += 1;
        }
        self.slots[idx] = Some(slot);
    }

    pub fn get(&self, sequence: u32) -> Option<&PacketSlot> {
        self.slots[self.index(sequence)]
            .as_ref()
            .filter(|s| s.sequence == sequence)
    }

    pub fn get_mut(&mut self, sequence: u32) -> Option<&mut PacketSlot> {
        let idx = self.index(sequence);
        self.slots[idx]
            .as_mut()
            .filter(|s| s.sequence == sequence)
    }

    pub fn evict_expired(&mut self, now_tick: u64) {
        for slot in self.slots.iter_mut() {
            if let Some(s) = slot {
                if now_tick >= s.deadline_tick {
                    *slot = None;
                    self.evicted += 1;
                }
            }
        }
    }

    pub fn evicted_count(&self) -> u64 {
        self.evicted
    }
}

/// Token bucket refilled at `bps` bits per second; retransmits are drained
/// from a priority queue ahead of new originals.
pub struct TokenBucket {
    bps: u32,
    tokens: f64,
    capacity: f64,
    retransmit_queue: VecDeque<u32>,
}

impl TokenBucket {
    pub fn new(bps: u32) -> Self {
        let capacity = (bps as f64 / 8.0).max(1500.0);
        Self {
            bps,
            tokens: capacity,
            capacity,
            retransmit_queue: VecDeque::new(),
        }
    }

    pub fn refill(&mut self, elapsed_ms: u64) {
        let added = self.bps as f64 / 8.0 * (elapsed_ms as f64 / 1000.0);
        self.tokens = (self.tokens + added).min(self.capacity);
    }

    pub fn queue_retransmit(&mut self, sequence: u32) {
        self.retransmit_queue.push_back(sequence);
    }

    pub fn next_retransmit(&mut self) -> Option<u32> {
        self.retransmit_queue.pop_front()
    }

    /// Returns `true` and debits the bucket if `size_bytes` can be sent now.
    pub fn try_consume(&mut self, size_bytes: usize) -> bool {
        if self.tokens >= size_bytes as f64 {
            self.tokens -= size_bytes as f64;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_bumps_counter_on_wrap() {
        let mut ring = RetransmitRing::new(4);
        for seq in 0..4 {
            ring.insert(PacketSlot {
                sequence: seq,
                wire_bytes: vec![],
                sent_tick: 0,
                retry_count: 0,
                deadline_tick: 1000,
            });
        }
        assert_eq!(ring.evicted_count(), 0);

        ring.insert(PacketSlot {
            sequence: 4,
            wire_bytes: vec![],
            sent_tick: 0,
            retry_count: 0,
            deadline_tick: 1000,
        });
        assert_eq!(ring.evicted_count(), 1);
    }

    #[test]
    fn token_bucket_refill_and_consume() {
        let mut bucket = TokenBucket::new(8_000);
        assert!(bucket.try_consume(500));
        bucket.refill(1000);
        assert!(bucket.tokens > 0.0);
    }
}
