//! In-memory storage.
//!
//! Values are kept decoded, so no formatter applies. Handy as a cache tier
//! and as a test backend.

use std::any::Any;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Key, KeyPath, Result, Storage, Value};

/// A storage backed by a `HashMap` behind an async `RwLock`.
pub struct MemoryStorage {
    name: String,
    data: RwLock<HashMap<KeyPath, Value>>,
}

impl MemoryStorage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Snapshot of the stored keys, sorted.
    pub async fn keys(&self) -> Vec<KeyPath> {
        let mut keys: Vec<_> = self.data.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        let path = self.raw_key(key)?;
        Ok(self.data.read().await.get(&path).cloned())
    }

    async fn set(&self, key: &Key, value: Option<Value>) -> Result<()> {
        let path = self.raw_key(key)?;
        let mut data = self.data.write().await;
        match value {
            Some(value) => {
                data.insert(path, value);
            }
            None => {
                data.remove(&path);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[tokio::test]
    async fn set_get_delete() {
        let storage = MemoryStorage::new("mem");
        let key = Key::from("a/b");
        assert_eq!(storage.get(&key).await.unwrap(), None);

        storage.set(&key, Some(Value::from(1))).await.unwrap();
        assert_eq!(storage.get(&key).await.unwrap(), Some(Value::from(1)));
        // Equivalent spellings address the same entry.
        assert_eq!(
            storage.get(&Key::from(("a", "b"))).await.unwrap(),
            Some(Value::from(1))
        );

        storage.set(&key, None).await.unwrap();
        assert!(storage.is_empty().await);
        // Deleting twice is fine.
        storage.set(&key, None).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_keys_are_rejected() {
        let storage = MemoryStorage::new("mem");
        let err = storage.get(&Key::from("../x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[tokio::test]
    async fn generic_copy_and_move() {
        let a = MemoryStorage::new("a");
        let b = MemoryStorage::new("b");
        let src = Key::from("src");
        let dst = Key::from("dst");

        assert!(!a.copy(&src, &b, &dst).await.unwrap());
        assert!(b.is_empty().await);

        a.set(&src, Some(Value::from("v"))).await.unwrap();
        assert!(a.copy(&src, &b, &dst).await.unwrap());
        assert_eq!(b.get(&dst).await.unwrap(), Some(Value::from("v")));
        assert_eq!(a.len().await, 1);

        assert!(a.move_to(&src, &b, &Key::from("moved")).await.unwrap());
        assert!(a.is_empty().await);
        assert_eq!(b.keys().await.len(), 2);
    }

    #[tokio::test]
    async fn optional_capabilities_are_absent() {
        let storage = MemoryStorage::new("mem");
        assert!(storage.fields().is_none());
        assert!(storage.nested(&Key::from("x")).is_err());
        let err = storage
            .open(&Key::from("x"), crate::OpenMode::Read)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
