//! Cache-aside reads in front of a slower source.

use std::any::Any;

use async_trait::async_trait;
use cairn_context::{ComponentConfig, StorageRef};
use cairn_store::{Key, Result, Storage, Value};
use tracing::{debug, warn};

/// Reads `storage` first and falls back to `source`, remembering what it
/// found. Writes go to `storage` only.
///
/// Failing to populate `storage` after a miss never fails the read.
pub struct Cache {
    name: String,
    storage: StorageRef,
    source: StorageRef,
}

impl Cache {
    pub fn new(name: impl Into<String>, storage: StorageRef, source: StorageRef) -> Self {
        Self {
            name: name.into(),
            storage,
            source,
        }
    }

    pub fn from_config(config: ComponentConfig) -> Result<Self> {
        let storage = config.reference("storage")?;
        let source = config.reference("source")?;
        Ok(Self::new(config.name(), storage, source))
    }
}

#[async_trait]
impl Storage for Cache {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        let storage = self.storage.get().await?;
        if let Some(value) = storage.get(key).await? {
            return Ok(Some(value));
        }
        let Some(value) = self.source.get().await?.get(key).await? else {
            return Ok(None);
        };
        debug!(storage = %self.name, key = %key, "cache miss, populating");
        if let Err(e) = storage.set(key, Some(value.clone())).await {
            warn!(storage = %self.name, key = %key, error = %e, "cache write-back failed");
        }
        Ok(Some(value))
    }

    async fn set(&self, key: &Key, value: Option<Value>) -> Result<()> {
        self.storage.get().await?.set(key, value).await
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{context, Counting};
    use cairn_store::{Key, Value};
    use serde_json::json;

    #[tokio::test]
    async fn miss_populates_then_hits() {
        let ctx = context(json!({
            "cache": {"kind": "meta.cache", "storage": "fast", "source": "slow"},
            "fast": {"kind": "counting"},
            "slow": {"kind": "counting"},
        }));
        let cache = ctx.resolve("cache").await.unwrap();
        let fast = ctx.resolve("fast").await.unwrap();
        let slow = ctx.resolve("slow").await.unwrap();
        let key = Key::from("k");
        slow.set(&key, Some(Value::from("v"))).await.unwrap();

        assert_eq!(cache.get(&key).await.unwrap(), Some(Value::from("v")));
        assert_eq!(Counting::of(&slow).gets(), 1);
        assert_eq!(fast.get(&key).await.unwrap(), Some(Value::from("v")));

        assert_eq!(cache.get(&key).await.unwrap(), Some(Value::from("v")));
        assert_eq!(Counting::of(&slow).gets(), 1);
    }

    #[tokio::test]
    async fn absent_everywhere_is_absent() {
        let ctx = context(json!({
            "cache": {"kind": "meta.cache", "storage": "fast", "source": "slow"},
            "fast": {"kind": "counting"},
            "slow": {"kind": "counting"},
        }));
        let cache = ctx.resolve("cache").await.unwrap();
        assert_eq!(cache.get(&Key::from("k")).await.unwrap(), None);
        assert_eq!(Counting::of(&ctx.resolve("fast").await.unwrap()).sets(), 0);
    }

    #[tokio::test]
    async fn write_back_failure_is_swallowed() {
        let ctx = context(json!({
            "cache": {"kind": "meta.cache", "storage": "fast", "source": "slow"},
            "fast": {"kind": "counting", "fail_writes": true},
            "slow": {"kind": "counting"},
        }));
        let cache = ctx.resolve("cache").await.unwrap();
        let slow = ctx.resolve("slow").await.unwrap();
        let key = Key::from("k");
        slow.set(&key, Some(Value::from(7))).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(Value::from(7)));
    }

    #[tokio::test]
    async fn set_never_reaches_source() {
        let ctx = context(json!({
            "cache": {"kind": "meta.cache", "storage": "fast", "source": "slow"},
            "fast": {"kind": "counting"},
            "slow": {"kind": "counting"},
        }));
        let cache = ctx.resolve("cache").await.unwrap();
        let key = Key::from("k");
        cache.set(&key, Some(Value::from(1))).await.unwrap();
        let slow = ctx.resolve("slow").await.unwrap();
        assert_eq!(Counting::of(&slow).sets(), 0);
        assert_eq!(slow.get(&key).await.unwrap(), None);
        assert_eq!(cache.get(&key).await.unwrap(), Some(Value::from(1)));
    }
}
