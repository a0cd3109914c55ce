//! Refresh outcome reporting.

use crate::types::now_ms;

/// Statistics from one successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshStats {
    /// Number of prefixes published
    pub prefixes_refreshed: usize,
    /// Duration of the fetch in milliseconds
    pub duration_ms: u64,
    /// Timestamp of refresh
    pub timestamp: u64,
}

/// Running record of refresh attempts.
///
/// Failed refreshes never touch the published snapshot, so this is the only
/// place an upstream outage becomes visible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStatus {
    /// Time of the last successful refresh (ms since UNIX epoch)
    pub last_success_at: Option<u64>,
    /// Message of the most recent failure
    pub last_error: Option<String>,
    /// Time of the most recent failure
    pub last_error_at: Option<u64>,
    /// Failures since the last success
    pub consecutive_failures: u32,
    pub successful_refreshes: u64,
    pub failed_refreshes: u64,
}

impl RefreshStatus {
    pub(crate) fn record_success(&mut self, stats: &RefreshStats) {
        self.last_success_at = Some(stats.timestamp);
        self.consecutive_failures = 0;
        self.successful_refreshes += 1;
    }

    pub(crate) fn record_failure(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
        self.last_error_at = Some(now_ms());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.failed_refreshes += 1;
    }

    /// True once at least one refresh has succeeded.
    pub fn is_seeded(&self) -> bool {
        self.last_success_at.is_some()
    }
}
