/*! Statistics of relayed messages
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Struct for various counters
#[derive(Clone, Default)]
pub struct Stats {
    /// Counters of handled messages
    pub counters: Arc<Counters>,
}

impl Stats {
    /// New Stats object
    pub fn new() -> Self {
        Default::default()
    }
}

#[derive(Default)]
/// Struct for counting messages handled by a relay
pub struct Counters {
    /// Messages forwarded to the next relay
    forwarded: AtomicU64,
    /// Messages delivered to a user
    delivered: AtomicU64,
    /// Messages that failed to be peeled or passed on
    failed: AtomicU64,
}

impl Counters {
    /// Add 1 to forwarded counter
    pub fn increase_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Add 1 to delivered counter
    pub fn increase_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Add 1 to failed counter
    pub fn increase_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get forwarded counter
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Get delivered counter
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Get failed counter
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
