//! Non-owning, lazily resolved references between components.

use std::fmt;
use std::sync::{Arc, Weak};

use cairn_store::{Result, Storage};
use parking_lot::Mutex;

use crate::ContextRef;

/// A reference to another component by name.
///
/// Nothing is resolved until [`get`](StorageRef::get) is first awaited. The
/// resolved storage is cached as a weak pointer: the registry keeps
/// ownership, and a reference never keeps a stopped component alive.
pub struct StorageRef {
    name: String,
    context: ContextRef,
    cached: Mutex<Option<Weak<dyn Storage>>>,
}

impl StorageRef {
    pub fn new(name: impl Into<String>, context: ContextRef) -> Self {
        Self {
            name: name.into(),
            context,
            cached: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve through the registry, or reuse the previous resolution.
    pub async fn get(&self) -> Result<Arc<dyn Storage>> {
        let cached = self.cached.lock().as_ref().and_then(Weak::upgrade);
        if let Some(storage) = cached {
            return Ok(storage);
        }
        let storage = self.context.resolve(&self.name).await?;
        *self.cached.lock() = Some(Arc::downgrade(&storage));
        Ok(storage)
    }
}

impl fmt::Debug for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StorageRef").field(&self.name).finish()
    }
}
