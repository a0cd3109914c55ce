//! Shared value types.

use ipnetwork::IpNetwork;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// One CIDR block from the provider feed.
pub type NetworkPrefix = IpNetwork;

/// The complete set of prefixes from one successful fetch.
///
/// Published snapshots are never mutated; a refresh replaces the whole `Arc`.
pub type PrefixSnapshot = Arc<Vec<NetworkPrefix>>;

/// Milliseconds since the UNIX epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
