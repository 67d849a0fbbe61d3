//! Read redundancy over an ordered list of storages.

use std::any::Any;

use async_trait::async_trait;
use cairn_context::{ComponentConfig, StorageRef};
use cairn_store::{Key, Result, Storage, Value};
use tracing::debug;

/// Reads from the first backend that has the key.
///
/// Writes are ignored: a fallback models read redundancy, not write
/// distribution. Write to the backends directly.
pub struct Fallback {
    name: String,
    storages: Vec<StorageRef>,
}

impl Fallback {
    pub fn new(name: impl Into<String>, storages: Vec<StorageRef>) -> Self {
        Self {
            name: name.into(),
            storages,
        }
    }

    /// Build from a declaration with a `storages` list.
    pub fn from_config(config: ComponentConfig) -> Result<Self> {
        let storages = config.references("storages")?;
        Ok(Self::new(config.name(), storages))
    }
}

#[async_trait]
impl Storage for Fallback {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        for reference in &self.storages {
            let storage = reference.get().await?;
            if let Some(value) = storage.get(key).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    async fn set(&self, key: &Key, _value: Option<Value>) -> Result<()> {
        debug!(storage = %self.name, key = %key, "fallback ignores writes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{context, Counting};
    use cairn_store::{Key, Value};
    use serde_json::json;

    #[tokio::test]
    async fn first_present_wins() {
        let ctx = context(json!({
            "a": {"kind": "counting"},
            "b": {"kind": "counting"},
            "fb": {"kind": "meta.fallback", "storages": ["a", "b"]},
        }));
        let a = ctx.resolve("a").await.unwrap();
        let b = ctx.resolve("b").await.unwrap();
        let fb = ctx.resolve("fb").await.unwrap();
        let key = Key::from("k");

        assert_eq!(fb.get(&key).await.unwrap(), None);

        b.set(&key, Some(Value::from("from b"))).await.unwrap();
        assert_eq!(fb.get(&key).await.unwrap(), Some(Value::from("from b")));

        a.set(&key, Some(Value::from("from a"))).await.unwrap();
        let reads_of_b = Counting::of(&b).gets();
        assert_eq!(fb.get(&key).await.unwrap(), Some(Value::from("from a")));
        assert_eq!(Counting::of(&b).gets(), reads_of_b);
    }

    #[tokio::test]
    async fn writes_are_ignored() {
        let ctx = context(json!({
            "a": {"kind": "counting"},
            "fb": {"kind": "meta.fallback", "storages": ["a"]},
        }));
        let fb = ctx.resolve("fb").await.unwrap();
        fb.set(&Key::from("k"), Some(Value::from(1))).await.unwrap();
        assert_eq!(fb.get(&Key::from("k")).await.unwrap(), None);
        assert_eq!(Counting::of(&ctx.resolve("a").await.unwrap()).sets(), 0);
    }

    #[tokio::test]
    async fn missing_storages_option_is_a_config_error() {
        let ctx = context(json!({"fb": {"kind": "meta.fallback"}}));
        let err = ctx.resolve("fb").await.err().unwrap();
        assert_eq!(err.kind(), cairn_store::ErrorKind::Config);
    }
}
