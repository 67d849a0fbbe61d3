//! Path-like handles into a filesystem storage.

use std::fmt;
use std::ops::Div;
use std::path::PathBuf;

use cairn_store::{Key, KeyPath, OpenMode, Result, Storage, Value};

use crate::{FileHandle, FileSystemStorage};

/// A key in a [`FileSystemStorage`] that composes like a path.
///
/// ```rust,no_run
/// # use cairn_fs_store::FileSystemStorage;
/// # fn demo(storage: &FileSystemStorage) -> cairn_store::Result<()> {
/// let dir = storage.path("1")?;
/// let file = &dir / "2";
/// assert_eq!(file.parent(), Some(dir));
/// # Ok(())
/// # }
/// ```
///
/// Segments added with `/` are checked when the path is used, so an
/// escaping segment fails at [`open`](StoragePath::open) rather than at
/// composition.
#[derive(Clone)]
pub struct StoragePath {
    storage: FileSystemStorage,
    segments: Vec<String>,
}

impl StoragePath {
    pub(crate) fn new(storage: FileSystemStorage, key: KeyPath) -> Self {
        Self {
            storage,
            segments: key.segments().to_vec(),
        }
    }

    pub fn storage(&self) -> &FileSystemStorage {
        &self.storage
    }

    pub fn key(&self) -> Key {
        Key::Seq(self.segments.iter().map(|s| Key::from(s.as_str())).collect())
    }

    /// The path one level up. A top-level key's parent is the storage
    /// root; the root itself has none.
    pub fn parent(&self) -> Option<StoragePath> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            storage: self.storage.clone(),
            segments: rest.to_vec(),
        })
    }

    /// True for the storage root, which names a directory and no value.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn to_path_buf(&self) -> Result<PathBuf> {
        if self.is_root() {
            return Ok(self.storage.root().to_path_buf());
        }
        self.storage.file_path(&self.key())
    }

    pub async fn open(&self, mode: OpenMode) -> Result<FileHandle> {
        self.storage.open_file(&self.key(), mode).await
    }

    pub async fn read(&self) -> Result<Option<Value>> {
        self.storage.get(&self.key()).await
    }

    pub async fn write(&self, value: Option<Value>) -> Result<()> {
        self.storage.set(&self.key(), value).await
    }

    fn joined(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(segment.split('/').filter(|s| !s.is_empty()).map(str::to_string));
        Self {
            storage: self.storage.clone(),
            segments,
        }
    }
}

impl Div<&str> for &StoragePath {
    type Output = StoragePath;

    fn div(self, segment: &str) -> StoragePath {
        self.joined(segment)
    }
}

impl Div<&str> for StoragePath {
    type Output = StoragePath;

    fn div(self, segment: &str) -> StoragePath {
        self.joined(segment)
    }
}

impl PartialEq for StoragePath {
    fn eq(&self, other: &Self) -> bool {
        self.storage == other.storage && self.segments == other.segments
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl fmt::Debug for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoragePath")
            .field("storage", &self.storage.name())
            .field("key", &self.to_string())
            .finish()
    }
}
