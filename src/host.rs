//! Contract between an IP range source and the host that embeds it.
//!
//! The host instantiates a module from its [`ModuleInfo`], fills its
//! configuration from a directive block, provisions it once with the
//! host-owned cancellation token, and then queries it on every trust decision.

use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

use crate::config::Dispenser;
use crate::error::{ConfigError, ProvisionError};
use crate::types::PrefixSnapshot;

/// Registration record for a module.
#[derive(Clone, Copy)]
pub struct ModuleInfo {
    /// Fully qualified module ID, e.g. `http.ip_sources.wedos`
    pub id: &'static str,
    /// Constructs a fresh, unprovisioned instance
    pub new: fn() -> Box<dyn IpSourceModule>,
}

impl ModuleInfo {
    /// Last label of the ID, used as the directive name.
    pub fn name(&self) -> &'static str {
        self.id.rsplit('.').next().unwrap_or(self.id)
    }
}

impl std::fmt::Debug for ModuleInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInfo").field("id", &self.id).finish()
    }
}

pub trait Module {
    fn module_info() -> ModuleInfo
    where
        Self: Sized;
}

/// Lifecycle hook invoked once at startup.
///
/// `ctx` is cancelled by the host on teardown; implementations must stop all
/// background work when it fires.
pub trait Provisioner {
    fn provision(&mut self, ctx: CancellationToken) -> Result<(), ProvisionError>;
}

/// Populates configuration from a directive block.
pub trait BlockUnmarshaler {
    fn unmarshal_block(&mut self, d: &mut Dispenser) -> Result<(), ConfigError>;
}

/// Per-request data available to a range source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub remote_addr: Option<SocketAddr>,
}

impl RequestContext {
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr: Some(remote_addr),
        }
    }
}

/// Supplies the prefixes whose traffic is trusted as coming from a proxy.
///
/// Called on the request path; must not block.
pub trait IpRangeSource: Send + Sync {
    fn get_ip_ranges(&self, request: &RequestContext) -> PrefixSnapshot;
}

/// Everything the host requires of an IP range source module.
pub trait IpSourceModule: Provisioner + BlockUnmarshaler + IpRangeSource {}

impl<T> IpSourceModule for T where T: Provisioner + BlockUnmarshaler + IpRangeSource {}
