//! Scheduled prefix refresh - background task for periodic feed polling.
//!
//! The scheduler owns the only write path into a [`PrefixCache`]. It runs as a
//! single Tokio task for the lifetime of the component:
//!
//! 1. **Seeding**: one fetch right after start. A failure here leaves the cache
//!    empty and is not retried until the first regular tick.
//! 2. **Steady**: one fetch per interval tick. Success replaces the snapshot,
//!    failure keeps the previous one.
//! 3. **Terminated**: the shared cancellation token fired. The ticker is
//!    dropped and no further fetches happen.
//!
//! # Failure Policy
//!
//! A failed refresh never empties the cache. Stale prefixes are preferable to
//! none: an upstream outage must not turn every trusted proxy into an
//! untrusted client. Failures are logged and recorded in [`RefreshStatus`].

use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{RefreshConfig, DEFAULT_INTERVAL};
use crate::error::FetchError;
use crate::fetcher::PrefixFetcher;
use crate::refresh::{PrefixCache, RefreshStats, RefreshStatus};
use crate::types::now_ms;

/// Lifecycle of the refresh loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefresherState {
    /// Constructed, not started
    Uninitialized,
    /// Performing the initial fetch
    Seeding,
    /// Polling on every interval tick
    Steady,
    /// Cancelled; cannot be restarted
    Terminated,
}

/// Configuration for the scheduled refresh service.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between refresh operations
    pub refresh_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_INTERVAL,
        }
    }
}

impl SchedulerConfig {
    /// The interval actually used; zero falls back to the default.
    pub fn effective_interval(&self) -> Duration {
        if self.refresh_interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            self.refresh_interval
        }
    }
}

impl From<&RefreshConfig> for SchedulerConfig {
    fn from(config: &RefreshConfig) -> Self {
        Self {
            refresh_interval: config.effective_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RefreshKind {
    Initial,
    Scheduled,
}

impl std::fmt::Display for RefreshKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshKind::Initial => write!(f, "Initial"),
            RefreshKind::Scheduled => write!(f, "Scheduled"),
        }
    }
}

/// Scheduler for periodic prefix refresh from the provider feed.
pub struct RefreshScheduler {
    /// Feed source
    fetcher: Arc<dyn PrefixFetcher>,
    /// Published snapshot, shared with readers
    cache: Arc<PrefixCache>,
    /// Scheduler configuration
    config: SchedulerConfig,
    /// Outcome of refresh attempts so far
    status: Arc<RwLock<RefreshStatus>>,
    /// Current lifecycle state, observable through `subscribe`
    state: watch::Sender<RefresherState>,
}

impl RefreshScheduler {
    /// Creates a new refresh scheduler.
    ///
    /// # Arguments
    /// - `fetcher`: source of prefix lists
    /// - `cache`: snapshot the scheduler publishes into; readers keep their own handle
    /// - `config`: refresh interval
    ///
    /// # Example
    /// ```rust,no_run
    /// use std::sync::Arc;
    /// use tokio_util::sync::CancellationToken;
    /// use wedos_ip::{HttpFetcher, PrefixCache, RefreshScheduler, SchedulerConfig};
    ///
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let fetcher = Arc::new(HttpFetcher::new("https://ips.wedos.global/ips.txt", None)?);
    /// let cache = Arc::new(PrefixCache::new());
    /// let scheduler = Arc::new(RefreshScheduler::new(fetcher, cache.clone(), SchedulerConfig::default()));
    ///
    /// let cancel = CancellationToken::new();
    /// tokio::spawn(scheduler.clone().start(cancel.clone()));
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        fetcher: Arc<dyn PrefixFetcher>,
        cache: Arc<PrefixCache>,
        config: SchedulerConfig,
    ) -> Self {
        let (state, _) = watch::channel(RefresherState::Uninitialized);
        Self {
            fetcher,
            cache,
            config,
            status: Arc::new(RwLock::new(RefreshStatus::default())),
            state,
        }
    }

    pub fn cache(&self) -> &Arc<PrefixCache> {
        &self.cache
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> RefresherState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions, e.g. to wait until seeding has finished.
    pub fn subscribe(&self) -> watch::Receiver<RefresherState> {
        self.state.subscribe()
    }

    pub fn status(&self) -> RefreshStatus {
        self.status.read().clone()
    }

    /// Timestamp of the last successful refresh, if any.
    pub fn last_refresh(&self) -> Option<u64> {
        self.status.read().last_success_at
    }

    /// Runs the refresh loop until `cancel` fires.
    ///
    /// Should be spawned as a tokio task. A scheduler runs at most once: calling
    /// `start` on a scheduler that has already left `Uninitialized` returns
    /// immediately.
    pub async fn start(self: Arc<Self>, cancel: CancellationToken) {
        let claimed = self.state.send_if_modified(|state| {
            if *state == RefresherState::Uninitialized {
                *state = RefresherState::Seeding;
                true
            } else {
                false
            }
        });
        if !claimed {
            warn!("Prefix refresh already started, ignoring second start");
            return;
        }

        let period = self.config.effective_interval();
        info!(
            "Starting prefix refresh with {}-second interval",
            period.as_secs()
        );

        // First tick one period from now, independent of how long seeding takes.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.do_refresh(&cancel, RefreshKind::Initial).await;

        if !cancel.is_cancelled() {
            self.state.send_replace(RefresherState::Steady);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.do_refresh(&cancel, RefreshKind::Scheduled).await;
                    }
                }
            }
        }

        drop(ticker);
        self.state.send_replace(RefresherState::Terminated);
        info!("Prefix refresh stopped");
    }

    /// Executes one refresh cycle, logging the outcome.
    ///
    /// Errors are recorded but never stop the scheduler. Cancellation is the
    /// normal shutdown path and is not counted as a failure.
    async fn do_refresh(&self, cancel: &CancellationToken, kind: RefreshKind) {
        match self.refresh_once(cancel).await {
            Ok(stats) => {
                info!(
                    "{} refresh completed: {} prefixes in {}ms",
                    kind, stats.prefixes_refreshed, stats.duration_ms
                );
                self.status.write().record_success(&stats);
            }
            Err(e) if e.is_cancelled() => {
                debug!("{} refresh cancelled", kind);
            }
            Err(e) => {
                warn!(
                    "{} refresh failed, keeping {} cached prefixes: {}",
                    kind,
                    self.cache.len(),
                    e
                );
                self.status.write().record_failure(&e.to_string());
            }
        }
    }

    /// Fetches outside any lock, then swaps the snapshot in one step.
    ///
    /// The fetch is raced against `cancel` so that shutdown does not wait on a
    /// slow or hung upstream.
    async fn refresh_once(&self, cancel: &CancellationToken) -> Result<RefreshStats, FetchError> {
        let start = Instant::now();

        let prefixes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = self.fetcher.fetch(cancel) => result?,
        };

        let prefixes_refreshed = prefixes.len();
        self.cache.publish(prefixes);

        Ok(RefreshStats {
            prefixes_refreshed,
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp: now_ms(),
        })
    }
}
