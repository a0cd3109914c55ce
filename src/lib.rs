//! # WEDOS IP Source
//!
//! Keeps the WEDOS Global prefix list in memory for trusted-proxy decisions.
//!
//! A [`WedosIpRange`] is provisioned with a host-owned cancellation token. It
//! spawns one background task that seeds the cache and then refreshes it on a
//! fixed interval. Readers call [`IpRangeSource::get_ip_ranges`] from any
//! thread and always get a complete snapshot: either the one from the last
//! successful fetch or an empty one if no fetch has succeeded yet.

pub mod cidr;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod host;
pub mod refresh;
pub mod types;
pub mod wedos;

pub use cidr::parse_cidr;
pub use config::{parse_duration, Dispenser, RefreshConfig, DEFAULT_INTERVAL};
pub use error::{CidrError, ConfigError, FetchError, ProvisionError};
pub use fetcher::{parse_prefix_list, HttpFetcher, PrefixFetcher, PrefixScanner};
pub use host::{
    BlockUnmarshaler, IpRangeSource, IpSourceModule, Module, ModuleInfo, Provisioner,
    RequestContext,
};
pub use refresh::{
    PrefixCache, RefreshScheduler, RefreshStats, RefreshStatus, RefresherState, SchedulerConfig,
};
pub use types::{now_ms, NetworkPrefix, PrefixSnapshot};
pub use wedos::{WedosIpRange, MODULE_ID, WEDOS_IPS_URL};
