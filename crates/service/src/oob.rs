//! Out-of-band auxiliary channel: unsequenced, unretransmitted,
//! ordered per peer.

use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 1024;

pub struct OobQueue {
    blocks: VecDeque<Vec<u8>>,
    capacity: usize,
    pub dropped: u64,
}

impl OobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: VecDeque::with_capacity(capacity.min(256)),
            capacity,
            dropped: 0,
        }
    }

    /// ```
    /// use rist_core::oob::OobQueue;
    ///
    /// let mut q = OobQueue::new(2);
    /// q.push(vec![1]);
    /// q.push(vec![2]);
    /// q.push(vec![3]);
    ///
    /// assert_eq!(q.dropped, 1);
    /// assert_eq!(q.pop(), Some(vec![2]));
    /// assert_eq!(q.pop(), Some(vec![3]));
    /// ```
    pub fn push(&mut self, block: Vec<u8>) {
        if self.blocks.len() >= self.capacity {
            self.blocks.pop_front();
            self.dropped += 1;
        }
        self.blocks.push_back(block);
    }

    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.blocks.pop_front()
    }
}

impl Default for OobQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
