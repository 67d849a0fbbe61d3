//! Field-partial access layered over any storage.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Error, FieldAccess, Key, KeyPath, OpenMode, Result, Storage, StreamHandle, Value};

/// Wraps a storage holding map-shaped values and adds [`FieldAccess`].
///
/// Whole-value operations go straight to the inner storage, so `set(key,
/// None)` still deletes. `as_any` forwards too: same-kind fast paths of the
/// inner storage keep working through the wrapper.
pub struct FieldStorage<S: Storage> {
    inner: S,
}

impl<S: Storage> FieldStorage<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    async fn load_map(&self, key: &Key) -> Result<Option<BTreeMap<String, Value>>> {
        match self.inner.get(key).await? {
            None => Ok(None),
            Some(Value::Map(map)) => Ok(Some(map)),
            Some(other) => Err(Error::usage(format!(
                "field access on {} value at {}",
                other.type_name(),
                key
            ))),
        }
    }
}

#[async_trait]
impl<S: Storage> Storage for FieldStorage<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }

    fn raw_key(&self, key: &Key) -> Result<KeyPath> {
        self.inner.raw_key(key)
    }

    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn stop(&self) -> Result<()> {
        self.inner.stop().await
    }

    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &Key, value: Option<Value>) -> Result<()> {
        self.inner.set(key, value).await
    }

    async fn copy(&self, key: &Key, dest: &dyn Storage, dest_key: &Key) -> Result<bool> {
        self.inner.copy(key, dest, dest_key).await
    }

    async fn move_to(&self, key: &Key, dest: &dyn Storage, dest_key: &Key) -> Result<bool> {
        self.inner.move_to(key, dest, dest_key).await
    }

    async fn open(&self, key: &Key, mode: OpenMode) -> Result<Box<dyn StreamHandle>> {
        self.inner.open(key, mode).await
    }

    fn nested(&self, key: &Key) -> Result<Arc<dyn Storage>> {
        self.inner.nested(key)
    }

    fn fields(&self) -> Option<&dyn FieldAccess> {
        Some(self)
    }
}

#[async_trait]
impl<S: Storage> FieldAccess for FieldStorage<S> {
    async fn get_field(&self, key: &Key, field: &str) -> Result<Option<Value>> {
        Ok(self
            .load_map(key)
            .await?
            .and_then(|mut map| map.remove(field)))
    }

    async fn get_fields(&self, key: &Key, fields: &[&str]) -> Result<Option<Value>> {
        let Some(mut map) = self.load_map(key).await? else {
            return Ok(None);
        };
        let projected = fields
            .iter()
            .filter_map(|field| map.remove_entry(*field))
            .collect::<BTreeMap<_, _>>();
        Ok(Some(Value::Map(projected)))
    }

    async fn set_field(&self, key: &Key, field: &str, value: Option<Value>) -> Result<()> {
        let mut map = self.load_map(key).await?.unwrap_or_default();
        match value {
            Some(value) => {
                map.insert(field.to_string(), value);
            }
            None => {
                map.remove(field);
            }
        }
        self.inner.set(key, Some(Value::Map(map))).await
    }

    async fn set_fields(&self, key: &Key, value: Value, fields: &[&str]) -> Result<()> {
        let mut payload = match value {
            Value::Map(payload) => payload,
            other => {
                return Err(Error::usage(format!(
                    "set_fields needs a map, got {}",
                    other.type_name()
                )))
            }
        };
        let mut map = self.load_map(key).await?.unwrap_or_default();
        for field in fields {
            if let Some((name, v)) = payload.remove_entry(*field) {
                map.insert(name, v);
            }
        }
        self.inner.set(key, Some(Value::Map(map))).await
    }
}
