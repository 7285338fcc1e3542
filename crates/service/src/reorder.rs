//! Receiver-side reorder/jitter buffer and NACK scheduler.

use std::collections::BTreeMap;

use rand::Rng;

use crate::seq::signed_distance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Pending,
    Held,
    Lost,
}

#[derive(Debug, Clone, Default)]
pub struct ReorderSlot {
    pub state_: Option<SlotState>,
    pub payload: Option<Vec<u8>>,
    pub first_missing_tick: u64,
    pub nack_sent_count: u8,
    pub next_nack_tick: u64,
    /// Interval used for the most recently scheduled NACK on this slot;
    /// doubled (capped at rtt_max) on each re-arm.
    pub interval_ticks: u64,
    pub arrival_tick: u64,
}

impl ReorderSlot {
    pub fn state(&self) -> SlotState {
        self.state_.unwrap_or(SlotState::Empty)
    }

    fn reset(&mut self) {
        *self = ReorderSlot::default();
    }
}

/// Ring indexed by `sequence mod capacity`; sequences below `cursor` are
/// delivered or permanently lost and no longer addressable.
pub struct ReorderRing {
    slots: Vec<ReorderSlot>,
    capacity: u32,
    pub cursor: u32,
    pub high_water: u32,
    pub initialized: bool,
    /// Coalesced pending sequences awaiting their nack-due tick.
    nack_wheel: BTreeMap<u64, Vec<u32>>,
}

impl ReorderRing {
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: vec![ReorderSlot::default(); capacity.max(1) as usize],
            capacity: capacity.max(1),
            cursor: 0,
            high_water: 0,
            initialized: false,
            nack_wheel: BTreeMap::new(),
        }
    }

    fn index(&self, sequence: u32) -> usize {
        (sequence % self.capacity) as usize
    }

    /// Places an arriving packet. Returns `true` if it should enter the
    /// delivery pipeline (i.e. it was not a late/duplicate arrival).
    pub fn place(&mut self, sequence: u32, payload: Vec<u8>, now_tick: u64, rtt_min_ticks: u64) -> PlaceOutcome {
        if !self.initialized {
            self.cursor = sequence;
            self.high_water = sequence;
            self.initialized = true;
        }

        let d = signed_distance(self.cursor, sequence);

        if d < 0 {
            let idx = self.index(sequence);
            let slot = &mut self.slots[idx];
            if slot.state() == SlotState::Pending && slot.payload.is_none() {
                slot.payload = Some(payload);
                slot.state_ = Some(SlotState::Held);
                slot.arrival_tick = now_tick;
                return PlaceOutcome::FilledLateSlot;
            }
            return PlaceOutcome::LateDrop;
        }

        if d as u64 >= self.capacity as u64 {
            let old_cursor = self.cursor;
            self.fast_forward(sequence);
            return PlaceOutcome::FlowReset { skipped_from: old_cursor };
        }

        let idx = self.index(sequence);
        if self.slots[idx].state() == SlotState::Held {
            return PlaceOutcome::Duplicate;
        }
        let was_pending = self.slots[idx].state() == SlotState::Pending;

        // Mark intervening empty slots pending, due for a NACK at rtt_min.
        if signed_distance(self.high_water, sequence) > 0 {
            let mut s = self.high_water.wrapping_add(1);
            while s != sequence {
                let i = self.index(s);
                if self.slots[i].state() == SlotState::Empty {
                    self.slots[i].state_ = Some(SlotState::Pending);
                    self.slots[i].first_missing_tick = now_tick;
                    self.schedule_nack(s, rtt_min_ticks, now_tick + rtt_min_ticks);
                }
                s = s.wrapping_add(1);
            }
            self.high_water = sequence;
        }

        self.slots[idx].payload = Some(payload);
        self.slots[idx].state_ = Some(SlotState::Held);
        self.slots[idx].arrival_tick = now_tick;
        self.unschedule_nack(sequence);

        if was_pending {
            PlaceOutcome::Recovered
        } else {
            PlaceOutcome::Placed
        }
    }

    fn fast_forward(&mut self, to: u32) {
        let mut s = self.cursor;
        while s != to {
            let i = self.index(s);
            self.slots[i].state_ = Some(SlotState::Lost);
            s = s.wrapping_add(1);
        }
        self.cursor = to;
        self.high_water = to;
    }

    fn schedule_nack(&mut self, sequence: u32, interval_ticks: u64, due_tick: u64) {
        let slot = &mut self.slots[self.index(sequence)];
        slot.interval_ticks = interval_ticks;
        slot.next_nack_tick = due_tick;
        self.nack_wheel.entry(due_tick).or_default().push(sequence);
    }

    fn unschedule_nack(&mut self, sequence: u32) {
        let due = self.slots[self.index(sequence)].next_nack_tick;
        if let Some(bucket) = self.nack_wheel.get_mut(&due) {
            bucket.retain(|&s| s != sequence);
        }
    }

    /// Pops every sequence whose NACK is due at or before `now_tick`, still
    /// pending (not filled in the meantime).
    pub fn due_nacks(&mut self, now_tick: u64) -> Vec<u32> {
        let due_ticks: Vec<u64> = self
            .nack_wheel
            .range(..=now_tick)
            .map(|(&t, _)| t)
            .collect();

        let mut due = Vec::new();
        for tick in due_ticks {
            if let Some(seqs) = self.nack_wheel.remove(&tick) {
                for s in seqs {
                    if self.slots[self.index(s)].state() == SlotState::Pending {
                        due.push(s);
                    }
                }
            }
        }
        due
    }

    /// Re-arms a sequence's NACK at `min(2*previous_interval, rtt_max)` with
    /// +/-12.5% jitter. Marks `Lost` once `max_retries` NACKs have been sent.
    pub fn rearm_or_lose(&mut self, sequence: u32, rtt_max_ticks: u64, now_tick: u64, max_retries: u8) -> bool {
        let idx = self.index(sequence);
        let slot = &mut self.slots[idx];
        slot.nack_sent_count += 1;
        if slot.nack_sent_count >= max_retries {
            slot.state_ = Some(SlotState::Lost);
            return false;
        }

        let base = slot.interval_ticks.max(1).saturating_mul(2).min(rtt_max_ticks.max(1));
        slot.interval_ticks = base;
        let due = now_tick + jittered_ticks(base);
        slot.next_nack_tick = due;
        self.nack_wheel.entry(due).or_default().push(sequence);
        true
    }

    /// Releases delivered-in-order sequences whose deadline has expired (or
    /// which are already held at the cursor), invoking `deliver` for each.
    pub fn release_ready(&mut self, now_tick: u64, recovery_length_min_ticks: u64, mut deliver: impl FnMut(u32, Vec<u8>)) {
        loop {
            let idx = self.index(self.cursor);
            match self.slots[idx].state() {
                SlotState::Held => {
                    let deadline = self.slots[idx].arrival_tick + recovery_length_min_ticks;
                    if now_tick >= deadline {
                        let payload = self.slots[idx].payload.take().unwrap_or_default();
                        self.slots[idx].reset();
                        deliver(self.cursor, payload);
                        self.cursor = self.cursor.wrapping_add(1);
                    } else {
                        break;
                    }
                }
                SlotState::Lost => {
                    self.slots[idx].reset();
                    self.cursor = self.cursor.wrapping_add(1);
                }
                _ => break,
            }
        }
    }
}

/// Applies +/-12.5% jitter to a backoff interval.
fn jittered_ticks(base_ticks: u64) -> u64 {
    let jitter = rand::rng().random_range(-0.125..=0.125);
    ((base_ticks as f64) * (1.0 + jitter)).round().max(1.0) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOutcome {
    Placed,
    /// A fill that landed on a slot previously marked `Pending` (awaiting a
    /// NACKed retransmit), counted toward the recovered-loss stat.
    Recovered,
    Duplicate,
    LateDrop,
    FilledLateSlot,
    FlowReset { skipped_from: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_sequential_arrival_releases_in_order() {
        let mut ring = ReorderRing::new(64);
        let mut delivered = Vec::new();
        for seq in 0..8 {
            ring.place(seq, vec![seq as u8], 0, 5);
        }
        ring.release_ready(1000, 0, |s, p| delivered.push((s, p)));
        assert_eq!(delivered.len(), 8);
        assert_eq!(delivered[0].0, 0);
        assert_eq!(delivered[7].0, 7);
    }

    #[test]
    fn gap_blocks_release_until_filled() {
        let mut ring = ReorderRing::new(64);
        ring.place(0, vec![0], 0, 5);
        ring.place(2, vec![2], 0, 5);

        let mut delivered = Vec::new();
        ring.release_ready(1000, 0, |s, p| delivered.push((s, p)));
        assert_eq!(delivered.len(), 1);

        ring.place(1, vec![1], 0, 5);
        ring.release_ready(1000, 0, |s, p| delivered.push((s, p)));
        assert_eq!(delivered.len(), 3);
    }

    #[test]
    fn duplicate_arrival_is_rejected() {
        let mut ring = ReorderRing::new(64);
        assert_eq!(ring.place(5, vec![5], 0, 5), PlaceOutcome::Placed);
        assert_eq!(ring.place(5, vec![5], 0, 5), PlaceOutcome::Duplicate);
    }

    #[test]
    fn fill_of_pending_gap_is_recovered_not_placed() {
        let mut ring = ReorderRing::new(64);
        assert_eq!(ring.place(0, vec![0], 0, 5), PlaceOutcome::Placed);
        assert_eq!(ring.place(2, vec![2], 0, 5), PlaceOutcome::Placed);
        assert_eq!(ring.place(1, vec![1], 0, 5), PlaceOutcome::Recovered);
    }

    #[test]
    fn ring_survives_many_wraps_without_stalling() {
        let mut ring = ReorderRing::new(8);
        let mut delivered = Vec::new();
        for seq in 0..999u32 {
            ring.place(seq, vec![], seq as u64, 5);
            ring.release_ready(seq as u64 + 1, 0, |s, p| delivered.push((s, p)));
        }
        assert_eq!(delivered.len(), 999);
        assert_eq!(delivered.last().unwrap().0, 998);
    }

    #[test]
    fn due_nack_re_arms_with_backoff_then_gives_up() {
        let mut ring = ReorderRing::new(64);
        ring.place(0, vec![0], 0, 5);
        ring.place(2, vec![2], 0, 5);

        let due = ring.due_nacks(5);
        assert_eq!(due, vec![1]);

        for _ in 0..7 {
            assert!(ring.rearm_or_lose(1, 500, 5, 8));
        }
        assert!(!ring.rearm_or_lose(1, 500, 5, 8));
        assert_eq!(ring.slots[ring.index(1)].state(), SlotState::Lost);
    }
}
