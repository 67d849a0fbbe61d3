//! Client-driven replication over a list of storages.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cairn_context::{ComponentConfig, StorageRef};
use cairn_store::{Key, Result, Storage, Value};
use tracing::warn;

/// Spreads reads round-robin and broadcasts writes.
///
/// A write goes to every backend in declared order and stops at the first
/// failure. Backends written before the failure keep the new value: there is
/// no rollback, and a retry of the same write converges.
pub struct Replicator {
    name: String,
    storages: Vec<StorageRef>,
    next: AtomicUsize,
}

impl Replicator {
    pub fn new(name: impl Into<String>, storages: Vec<StorageRef>) -> Self {
        Self {
            name: name.into(),
            storages,
            next: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: ComponentConfig) -> Result<Self> {
        let storages = config.references("storages")?;
        Ok(Self::new(config.name(), storages))
    }
}

#[async_trait]
impl Storage for Replicator {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        if self.storages.is_empty() {
            return Ok(None);
        }
        let turn = self.next.fetch_add(1, Ordering::Relaxed) % self.storages.len();
        self.storages[turn].get().await?.get(key).await
    }

    async fn set(&self, key: &Key, value: Option<Value>) -> Result<()> {
        for (i, reference) in self.storages.iter().enumerate() {
            let written = match reference.get().await {
                Ok(storage) => storage.set(key, value.clone()).await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                warn!(
                    storage = %self.name,
                    backend = %reference.name(),
                    key = %key,
                    applied = i,
                    error = %e,
                    "replication aborted"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}
