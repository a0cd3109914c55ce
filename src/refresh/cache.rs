//! Published prefix snapshot.
//!
//! Readers clone the current `Arc` under a read lock; the refresher swaps in a
//! new `Arc` under the write lock. Neither side holds the lock across I/O, so a
//! read never waits on a fetch.

use parking_lot::RwLock;
use std::net::IpAddr;
use std::sync::Arc;

use crate::types::{NetworkPrefix, PrefixSnapshot};

#[derive(Debug, Default)]
pub struct PrefixCache {
    current: RwLock<PrefixSnapshot>,
}

impl PrefixCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the most recently published snapshot.
    #[inline]
    pub fn current(&self) -> PrefixSnapshot {
        self.current.read().clone()
    }

    /// Replaces the published snapshot wholesale.
    pub fn publish(&self, prefixes: Vec<NetworkPrefix>) {
        let next = Arc::new(prefixes);
        *self.current.write() = next;
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Returns true if `addr` falls inside any published prefix.
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.current().iter().any(|prefix| prefix.contains(addr))
    }
}
