//! The storage contract every backend and combinator implements.

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Error, Key, KeyPath, Result, Value};

/// An asynchronous key-value storage.
///
/// A missing key is `Ok(None)` from [`get`](Storage::get), never an error.
/// Writing `None` deletes.
///
/// # Object Safety
///
/// This trait is object-safe; storages are shared as `Arc<dyn Storage>`.
///
/// # Example
///
/// ```rust
/// use cairn_store::{Key, MemoryStorage, Storage, Value};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let storage = MemoryStorage::new("mem");
/// let key = Key::from(("tenant", "42"));
/// storage.set(&key, Some(Value::from("hello"))).await.unwrap();
/// assert_eq!(storage.get(&key).await.unwrap(), Some(Value::from("hello")));
///
/// storage.set(&key, None).await.unwrap();
/// assert_eq!(storage.get(&key).await.unwrap(), None);
/// # }
/// ```
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// The component name this storage was declared under.
    fn name(&self) -> &str;

    /// Downcasting hook, used for same-kind fast paths.
    fn as_any(&self) -> &dyn Any;

    /// Validate and normalize a key.
    fn raw_key(&self, key: &Key) -> Result<KeyPath> {
        key.normalize()
    }

    /// Called once after construction, before first use.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Called once at shutdown.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Read a value.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Nothing is stored under the key.
    /// * `Ok(Some(value))` - The decoded value.
    /// * `Err(Error)` - The key is invalid or the backend failed.
    async fn get(&self, key: &Key) -> Result<Option<Value>>;

    /// Write a value, or delete it with `None`.
    async fn set(&self, key: &Key, value: Option<Value>) -> Result<()>;

    /// Copy `key` to `dest_key` in `dest`.
    ///
    /// Returns `false` without touching `dest` when `key` is absent.
    async fn copy(&self, key: &Key, dest: &dyn Storage, dest_key: &Key) -> Result<bool> {
        match self.get(key).await? {
            Some(value) => {
                dest.set(dest_key, Some(value)).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Copy, then delete the source.
    async fn move_to(&self, key: &Key, dest: &dyn Storage, dest_key: &Key) -> Result<bool> {
        if !self.copy(key, dest, dest_key).await? {
            return Ok(false);
        }
        self.set(key, None).await?;
        Ok(true)
    }

    /// Open a chunked stream over the raw stored bytes.
    async fn open(&self, key: &Key, mode: OpenMode) -> Result<Box<dyn StreamHandle>> {
        let _ = (key, mode);
        Err(Error::unsupported(self.name(), "open"))
    }

    /// A view of this storage scoped under `key`.
    fn nested(&self, key: &Key) -> Result<Arc<dyn Storage>> {
        let _ = key;
        Err(Error::unsupported(self.name(), "nested views"))
    }

    /// Partial read/write of structured values, when supported.
    fn fields(&self) -> Option<&dyn FieldAccess> {
        None
    }
}

/// Field-partial access to map-shaped values.
///
/// Every operation reads the whole stored value and, for writes, stores the
/// whole merged value back. Concurrent writers to one key are not serialized.
#[async_trait]
pub trait FieldAccess: Send + Sync {
    /// Project a single field. `None` if the key or the field is absent.
    async fn get_field(&self, key: &Key, field: &str) -> Result<Option<Value>>;

    /// Project the listed fields that are present into a new map.
    async fn get_fields(&self, key: &Key, fields: &[&str]) -> Result<Option<Value>>;

    /// Set one field, keeping the others. `None` removes the field.
    async fn set_field(&self, key: &Key, field: &str, value: Option<Value>) -> Result<()>;

    /// Merge the listed fields of `value` into the stored map.
    ///
    /// Fields of `value` that are not listed are dropped; listed fields
    /// missing from `value` are left as stored.
    async fn set_fields(&self, key: &Key, value: Value, fields: &[&str]) -> Result<()>;
}

/// How a stream is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Truncate or create.
    Write,
    Append,
}

impl OpenMode {
    pub fn is_write(&self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" | "rb" => Ok(OpenMode::Read),
            "w" | "wb" => Ok(OpenMode::Write),
            "a" | "ab" => Ok(OpenMode::Append),
            other => Err(Error::usage(format!("unknown open mode: {:?}", other))),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpenMode::Read => "rb",
            OpenMode::Write => "wb",
            OpenMode::Append => "ab",
        })
    }
}

/// A scoped, chunked stream over one stored object.
///
/// Dropping the handle releases the underlying resource, whether the caller
/// finished, failed, or was cancelled mid-operation. [`close`](StreamHandle::close)
/// additionally flushes and reports errors.
#[async_trait]
pub trait StreamHandle: Send {
    /// Read up to `max` bytes. `None` at end of stream.
    async fn read_chunk(&mut self, max: usize) -> Result<Option<Vec<u8>>>;

    async fn write_chunk(&mut self, data: &[u8]) -> Result<()>;

    /// Flush and release. Further calls fail with a usage error.
    async fn close(&mut self) -> Result<()>;
}

/// Drain a stream into memory.
pub async fn read_to_end(handle: &mut dyn StreamHandle, chunk_size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(chunk) = handle.read_chunk(chunk_size.max(1)).await? {
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_modes_parse() {
        assert_eq!("rb".parse::<OpenMode>().unwrap(), OpenMode::Read);
        assert_eq!("w".parse::<OpenMode>().unwrap(), OpenMode::Write);
        assert_eq!("ab".parse::<OpenMode>().unwrap(), OpenMode::Append);
        assert!("x+".parse::<OpenMode>().is_err());
        assert!(OpenMode::Append.is_write());
        assert_eq!(OpenMode::Read.to_string(), "rb");
    }
}
