//! Meta-storages: storages that hold no data and forward to others.
//!
//! - [`Fallback`]: first backend with the key answers; writes are ignored
//! - [`Replicator`]: round-robin reads, broadcast writes
//! - [`Cache`]: cache-aside reads over a `source`, writes to `storage`
//!
//! None of them own their backends. Backends are named in configuration
//! and resolved through the registry at first use.

use std::sync::Arc;

use cairn_context::KindRegistry;
use cairn_store::Result;

mod cache;
mod fallback;
mod replicator;

pub use cache::Cache;
pub use fallback::Fallback;
pub use replicator::Replicator;

/// Register `meta.fallback`, `meta.replicator` and `meta.cache`.
pub fn register_kinds(kinds: &mut KindRegistry) -> Result<()> {
    kinds.register("meta.fallback", |config| {
        Ok(Arc::new(Fallback::from_config(config)?))
    })?;
    kinds.register("meta.replicator", |config| {
        Ok(Arc::new(Replicator::from_config(config)?))
    })?;
    kinds.register("meta.cache", |config| {
        Ok(Arc::new(Cache::from_config(config)?))
    })?;
    Ok(())
}
