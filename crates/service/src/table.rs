use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::{HashMap, HashMapExt};

const DEFAULT_CAPACITY: usize = 64;

/// A `HashMap` pre-sized to avoid the reallocation churn a default-built map
/// would otherwise pay as peers and flows are registered.
pub struct Table<K, V>(HashMap<K, V>);

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self(HashMap::with_capacity(DEFAULT_CAPACITY))
    }
}

impl<K, V> Deref for Table<K, V> {
    type Target = HashMap<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<K, V> DerefMut for Table<K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// A monotonic tick counter, advanced externally by the owning event loop.
///
/// ```
/// use rist_core::table::Timer;
///
/// let timer = Timer::default();
/// assert_eq!(timer.get(), 0);
/// assert_eq!(timer.add(), 1);
/// assert_eq!(timer.get(), 1);
/// ```
#[derive(Default)]
pub struct Timer(AtomicU64);

impl Timer {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn add(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}
