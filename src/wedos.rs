//! WEDOS Global IP range source.
//!
//! Provides the prefixes published at `https://ips.wedos.global/ips.txt`,
//! refreshed in the background for as long as the host's context lives.

use log::{info, warn};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Dispenser, RefreshConfig};
use crate::error::{ConfigError, ProvisionError};
use crate::fetcher::{HttpFetcher, PrefixFetcher};
use crate::host::{
    BlockUnmarshaler, IpRangeSource, IpSourceModule, Module, ModuleInfo, Provisioner,
    RequestContext,
};
use crate::refresh::{
    PrefixCache, RefreshScheduler, RefreshStatus, RefresherState, SchedulerConfig,
};
use crate::types::PrefixSnapshot;

pub const MODULE_ID: &str = "http.ip_sources.wedos";

/// Published list of WEDOS Global prefixes.
pub const WEDOS_IPS_URL: &str = "https://ips.wedos.global/ips.txt";

/// IP range source backed by the WEDOS Global prefix list.
///
/// The cache belongs to the instance, so independent instances never share
/// state. Until the first successful fetch the range list is empty.
pub struct WedosIpRange {
    config: RefreshConfig,
    source_url: String,
    /// Replaces the HTTP fetcher when set
    fetcher: Option<Arc<dyn PrefixFetcher>>,
    cache: Arc<PrefixCache>,
    scheduler: Option<Arc<RefreshScheduler>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WedosIpRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WedosIpRange")
            .field("config", &self.config)
            .field("source_url", &self.source_url)
            .field("prefixes", &self.cache.len())
            .field("state", &self.state())
            .finish()
    }
}

impl Default for WedosIpRange {
    fn default() -> Self {
        Self::new()
    }
}

impl WedosIpRange {
    pub fn new() -> Self {
        Self::with_config(RefreshConfig::default())
    }

    pub fn with_config(config: RefreshConfig) -> Self {
        Self {
            config,
            source_url: WEDOS_IPS_URL.to_string(),
            fetcher: None,
            cache: Arc::new(PrefixCache::new()),
            scheduler: None,
            task: None,
        }
    }

    /// Fetch from a mirror instead of the public list.
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }

    /// Use a custom fetcher. The configured timeout only applies to the
    /// built-in HTTP fetcher.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn PrefixFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Current snapshot, independent of any request.
    pub fn prefixes(&self) -> PrefixSnapshot {
        self.cache.current()
    }

    /// Returns true if `addr` lies in a known WEDOS prefix.
    pub fn is_trusted(&self, addr: IpAddr) -> bool {
        self.cache.contains(addr)
    }

    pub fn state(&self) -> RefresherState {
        self.scheduler
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(RefresherState::Uninitialized)
    }

    pub fn status(&self) -> RefreshStatus {
        self.scheduler
            .as_ref()
            .map(|s| s.status())
            .unwrap_or_default()
    }

    /// Lifecycle transitions of the background task; `None` before provisioning.
    pub fn subscribe(&self) -> Option<watch::Receiver<RefresherState>> {
        self.scheduler.as_ref().map(|s| s.subscribe())
    }

    /// Waits for the background task to exit after the host cancelled its context.
    pub async fn wait_terminated(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("{} refresh task ended abnormally: {}", MODULE_ID, e);
            }
        }
    }
}

impl Module for WedosIpRange {
    fn module_info() -> ModuleInfo {
        ModuleInfo {
            id: MODULE_ID,
            new: new_module,
        }
    }
}

fn new_module() -> Box<dyn IpSourceModule> {
    Box::new(WedosIpRange::new())
}

impl Provisioner for WedosIpRange {
    /// Validates the configuration and spawns the refresh task.
    ///
    /// Must be called from within a Tokio runtime. The task seeds the cache,
    /// then refreshes every interval until `ctx` is cancelled.
    fn provision(&mut self, ctx: CancellationToken) -> Result<(), ProvisionError> {
        if self.scheduler.is_some() {
            return Err(ProvisionError::AlreadyProvisioned);
        }
        self.config.validate()?;

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ProvisionError::NoRuntime)?;

        let fetcher: Arc<dyn PrefixFetcher> = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(
                HttpFetcher::new(self.source_url.clone(), self.config.effective_timeout())
                    .map_err(ProvisionError::Client)?,
            ),
        };

        let scheduler = Arc::new(RefreshScheduler::new(
            fetcher,
            Arc::clone(&self.cache),
            SchedulerConfig::from(&self.config),
        ));

        info!(
            "Provisioned {} (source: {}, interval: {:?}, timeout: {:?})",
            MODULE_ID,
            self.source_url,
            self.config.effective_interval(),
            self.config.effective_timeout()
        );

        self.task = Some(runtime.spawn(Arc::clone(&scheduler).start(ctx)));
        self.scheduler = Some(scheduler);
        Ok(())
    }
}

impl BlockUnmarshaler for WedosIpRange {
    /// ```text
    /// wedos {
    ///     interval <duration>
    ///     timeout <duration>
    /// }
    /// ```
    fn unmarshal_block(&mut self, d: &mut Dispenser) -> Result<(), ConfigError> {
        self.config.unmarshal_block(d)
    }
}

impl IpRangeSource for WedosIpRange {
    fn get_ip_ranges(&self, _request: &RequestContext) -> PrefixSnapshot {
        self.cache.current()
    }
}
