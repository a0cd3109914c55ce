//! Prefix refresh - background polling and the published snapshot.
//!
//! - **Cache** (PrefixCache): the snapshot readers query on every trust decision
//! - **Scheduler** (RefreshScheduler): periodic background task (1-hour default)
//!   and the only writer of the cache

pub mod cache;
pub mod scheduler;
pub mod status;

pub use cache::PrefixCache;
pub use scheduler::{RefreshScheduler, RefresherState, SchedulerConfig};
pub use status::{RefreshStats, RefreshStatus};
