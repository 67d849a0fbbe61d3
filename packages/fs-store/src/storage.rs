//! One file per key under a root directory.

use std::any::Any;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cairn_config::ConfigError;
use cairn_context::ComponentConfig;
use cairn_store::format::{decode_bytes, encode_bytes};
use cairn_store::{
    default_registry, Error, Formatter, FormatterRegistry, Key, KeyPath, OpenMode, Result,
    Storage, StreamHandle, Value,
};
use tracing::{debug, info};

use crate::handle::FileHandle;
use crate::path::StoragePath;
use crate::pool::BlockingPool;
use crate::quota::{DiskSpace, Quota, SpaceProbe};
use crate::shard;

/// A storage keeping each value in its own file, named by the key's path
/// under `root`.
///
/// Values go through the configured formatter, which must produce bytes.
/// Reading a key that names a directory yields `None`; deleting it removes
/// the whole tree.
///
/// Cloning is cheap and shares everything. Nested views share the quota
/// queue and the blocking pool with the storage they come from.
#[derive(Clone)]
pub struct FileSystemStorage {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    root: PathBuf,
    // Root of the top-level storage; nested views keep it.
    origin: PathBuf,
    // Hashed views keep the parent's root and shard `prefix/key`.
    prefix: Option<KeyPath>,
    formatter: Arc<dyn Formatter>,
    hash_levels: usize,
    quota: Arc<Quota>,
    pool: BlockingPool,
}

/// Configures a [`FileSystemStorage`].
pub struct FileSystemBuilder {
    name: String,
    root: PathBuf,
    format: String,
    formatters: Option<Arc<FormatterRegistry>>,
    limit_free_space: Option<u64>,
    executor: Option<usize>,
    hash_levels: usize,
    probe: Arc<dyn SpaceProbe>,
}

impl FileSystemBuilder {
    /// Formatter spec, e.g. `json` or `str:bnewline`. Identity by default.
    pub fn format(mut self, spec: impl Into<String>) -> Self {
        self.format = spec.into();
        self
    }

    /// Registry to resolve the format against instead of the default one.
    pub fn formatters(mut self, formatters: Arc<FormatterRegistry>) -> Self {
        self.formatters = Some(formatters);
        self
    }

    /// Writes wait while fewer than `bytes` would stay free.
    pub fn limit_free_space(mut self, bytes: u64) -> Self {
        self.limit_free_space = Some(bytes);
        self
    }

    /// Run at most `width` blocking filesystem calls at once.
    pub fn executor(mut self, width: usize) -> Self {
        self.executor = Some(width);
        self
    }

    /// Shard keys under `levels` directories derived from their hash.
    pub fn hashed(mut self, levels: usize) -> Self {
        self.hash_levels = levels;
        self
    }

    /// Replace the free-space measurement.
    pub fn probe(mut self, probe: Arc<dyn SpaceProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Read `path`, `format`, `limit_free_space`, `executor` and
    /// `hash_levels` from a component declaration.
    pub fn from_config(config: &ComponentConfig) -> Result<Self> {
        let options = config.extractor();
        let root = options
            .get_path("path")?
            .ok_or_else(|| ConfigError::MissingOption {
                component: config.name().to_string(),
                option: "path".to_string(),
            })?;
        let mut builder =
            FileSystemStorage::builder(config.name(), root).formatters(config.formatters().clone());
        if let Some(format) = options.get_str("format")? {
            builder = builder.format(format);
        }
        if let Some(limit) = options.get_size("limit_free_space")? {
            builder = builder.limit_free_space(limit);
        }
        if let Some(width) = options.get_int("executor")? {
            let width = usize::try_from(width)
                .ok()
                .filter(|w| *w > 0)
                .ok_or_else(|| ConfigError::Coercion {
                    path: "executor".to_string(),
                    expected: "positive integer",
                    found: width.to_string(),
                })?;
            builder = builder.executor(width);
        }
        if let Some(levels) = options.get_int("hash_levels")? {
            let levels = usize::try_from(levels)
                .map_err(|_| levels_error(&levels.to_string()))?;
            builder = builder.hashed(levels);
        }
        Ok(builder)
    }

    pub fn build(self) -> Result<FileSystemStorage> {
        if self.hash_levels > shard::MAX_LEVELS {
            return Err(levels_error(&self.hash_levels.to_string()).into());
        }
        let formatter = match &self.formatters {
            Some(registry) => registry.get(&self.format)?,
            None => default_registry().get(&self.format)?,
        };
        let quota = Arc::new(Quota::new(self.limit_free_space, self.probe));
        Ok(FileSystemStorage {
            inner: Arc::new(Inner {
                name: self.name,
                origin: self.root.clone(),
                root: self.root,
                prefix: None,
                formatter,
                hash_levels: self.hash_levels,
                quota,
                pool: BlockingPool::new(self.executor),
            }),
        })
    }
}

fn levels_error(found: &str) -> ConfigError {
    ConfigError::Coercion {
        path: "hash_levels".to_string(),
        expected: "integer between 0 and 32",
        found: found.to_string(),
    }
}

impl FileSystemStorage {
    pub fn builder(name: impl Into<String>, root: impl Into<PathBuf>) -> FileSystemBuilder {
        FileSystemBuilder {
            name: name.into(),
            root: root.into(),
            format: String::new(),
            formatters: None,
            limit_free_space: None,
            executor: None,
            hash_levels: 0,
            probe: Arc::new(DiskSpace),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn formatter(&self) -> &Arc<dyn Formatter> {
        &self.inner.formatter
    }

    pub fn limit_free_space(&self) -> Option<u64> {
        self.inner.quota.limit()
    }

    /// Writers currently waiting for free space.
    pub fn waiting(&self) -> usize {
        self.inner.quota.waiting()
    }

    /// Bytes available on the disk holding the root.
    pub async fn free_space(&self) -> Result<u64> {
        self.inner
            .quota
            .available(&self.inner.root, &self.inner.pool)
            .await
            .map_err(|e| Error::io(&self.inner.name, "measuring free space", e))
    }

    /// A composable path handle for `key`.
    pub fn path(&self, key: impl Into<Key>) -> Result<StoragePath> {
        let key = key.into().normalize()?;
        Ok(StoragePath::new(self.clone(), key))
    }

    /// Where `key` lives on disk.
    pub fn file_path(&self, key: &Key) -> Result<PathBuf> {
        Ok(self.raw_key(key)?.to_path(&self.inner.root))
    }

    /// Open `key` as a concrete [`FileHandle`].
    pub async fn open_file(&self, key: &Key, mode: OpenMode) -> Result<FileHandle> {
        let path = self.file_path(key)?;
        if mode.is_write() {
            self.admit(0).await?;
        }
        FileHandle::open(&self.inner.name, path, mode, self.inner.quota.clone()).await
    }

    async fn admit(&self, size: u64) -> Result<()> {
        self.inner
            .quota
            .admit(&self.inner.root, size, &self.inner.pool)
            .await
            .map_err(|e| Error::io(&self.inner.name, "measuring free space", e))
    }

    async fn blocking<F, T>(&self, doing: String, f: F) -> Result<T>
    where
        F: FnOnce() -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner
            .pool
            .run(f)
            .await
            .map_err(|e| Error::io(&self.inner.name, doing, e))
    }

    async fn write(&self, key: KeyPath, value: Value) -> Result<()> {
        let bytes = encode_bytes(self.inner.formatter.as_ref(), value)?;
        self.admit(bytes.len() as u64).await?;
        let path = key.to_path(&self.inner.root);
        debug!(storage = %self.inner.name, path = %path.display(), size = bytes.len(), "writing");
        let written = self
            .blocking(format!("writing {}", key), move || write_file(&path, &bytes))
            .await;
        self.inner.quota.wake_next();
        written
    }

    async fn delete(&self, key: KeyPath) -> Result<()> {
        let path = key.to_path(&self.inner.root);
        let root = self.inner.root.clone();
        debug!(storage = %self.inner.name, path = %path.display(), "deleting");
        let removed = self
            .blocking(format!("deleting {}", key), move || remove_path(&root, &path))
            .await;
        self.inner.quota.wake_next();
        removed.map(|_| ())
    }

    /// `dest` when it is a filesystem storage over the same tree with the
    /// same formatter, so bytes can move without decoding.
    fn same_tree<'a>(&self, dest: &'a dyn Storage) -> Option<&'a FileSystemStorage> {
        dest.as_any()
            .downcast_ref::<FileSystemStorage>()
            .filter(|other| {
                other.inner.origin == self.inner.origin
                    && other.inner.formatter.name() == self.inner.formatter.name()
            })
    }

    async fn copy_through(&self, key: &Key, dest: &dyn Storage, dest_key: &Key) -> Result<bool> {
        match self.get(key).await? {
            Some(value) => {
                dest.set(dest_key, Some(value)).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl Storage for FileSystemStorage {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    /// The root-relative path a key is stored at, shard prefix included.
    fn raw_key(&self, key: &Key) -> Result<KeyPath> {
        let path = key.normalize()?;
        let path = match &self.inner.prefix {
            Some(prefix) => prefix.join(&path),
            None => path,
        };
        Ok(shard::shard(&path, self.inner.hash_levels))
    }

    async fn init(&self) -> Result<()> {
        let root = self.inner.root.clone();
        self.blocking(format!("creating {}", root.display()), {
            let root = root.clone();
            move || fs::create_dir_all(&root)
        })
        .await?;
        info!(storage = %self.inner.name, root = %root.display(), "filesystem storage ready");
        Ok(())
    }

    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        let key = self.raw_key(key)?;
        let path = key.to_path(&self.inner.root);
        debug!(storage = %self.inner.name, path = %path.display(), "reading");
        let bytes = self
            .blocking(format!("reading {}", key), move || read_file(&path))
            .await?;
        bytes
            .map(|bytes| decode_bytes(self.inner.formatter.as_ref(), bytes))
            .transpose()
    }

    async fn set(&self, key: &Key, value: Option<Value>) -> Result<()> {
        let key = self.raw_key(key)?;
        match value {
            Some(value) => self.write(key, value).await,
            None => self.delete(key).await,
        }
    }

    async fn copy(&self, key: &Key, dest: &dyn Storage, dest_key: &Key) -> Result<bool> {
        let Some(other) = self.same_tree(dest) else {
            return self.copy_through(key, dest, dest_key).await;
        };
        let src = self.file_path(key)?;
        let dst = other.file_path(dest_key)?;

        let size = {
            let src = src.clone();
            self.blocking(format!("inspecting {}", src.display()), move || {
                file_size(&src)
            })
            .await?
        };
        let Some(size) = size else {
            return Ok(false);
        };
        if src == dst {
            return Ok(true);
        }
        other.admit(size).await?;
        debug!(storage = %self.inner.name, from = %src.display(), to = %dst.display(), "copying");
        let copied = other
            .blocking(format!("copying {}", src.display()), move || {
                copy_file(&src, &dst)
            })
            .await;
        other.inner.quota.wake_next();
        copied
    }

    async fn move_to(&self, key: &Key, dest: &dyn Storage, dest_key: &Key) -> Result<bool> {
        let Some(other) = self.same_tree(dest) else {
            if !self.copy_through(key, dest, dest_key).await? {
                return Ok(false);
            }
            self.set(key, None).await?;
            return Ok(true);
        };
        let src = self.file_path(key)?;
        let dst = other.file_path(dest_key)?;
        if src == dst {
            let size = self
                .blocking(format!("inspecting {}", src.display()), move || {
                    file_size(&src)
                })
                .await?;
            return Ok(size.is_some());
        }
        let root = self.inner.root.clone();
        debug!(storage = %self.inner.name, from = %src.display(), to = %dst.display(), "renaming");
        let moved = self
            .blocking(format!("renaming {}", src.display()), move || {
                rename_file(&root, &src, &dst)
            })
            .await;
        self.inner.quota.wake_next();
        moved
    }

    async fn open(&self, key: &Key, mode: OpenMode) -> Result<Box<dyn StreamHandle>> {
        Ok(Box::new(self.open_file(key, mode).await?))
    }

    /// A view of the keys under `key`.
    ///
    /// Plain storages root the view at the sub-directory. Hashed storages
    /// keep the parent's root and shard the joined key, so `view.get("k")`
    /// and `parent.get("sub/k")` reach the same file.
    fn nested(&self, key: &Key) -> Result<Arc<dyn Storage>> {
        let sub = key.normalize()?;
        let (root, prefix) = if self.inner.hash_levels > 0 {
            let prefix = match &self.inner.prefix {
                Some(prefix) => prefix.join(&sub),
                None => sub.clone(),
            };
            (self.inner.root.clone(), Some(prefix))
        } else {
            (sub.to_path(&self.inner.root), None)
        };
        Ok(Arc::new(FileSystemStorage {
            inner: Arc::new(Inner {
                name: format!("{}/{}", self.inner.name, sub),
                root,
                prefix,
                origin: self.inner.origin.clone(),
                formatter: self.inner.formatter.clone(),
                hash_levels: self.inner.hash_levels,
                quota: self.inner.quota.clone(),
                pool: self.inner.pool.clone(),
            }),
        }))
    }
}

impl fmt::Debug for FileSystemStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemStorage")
            .field("name", &self.inner.name)
            .field("root", &self.inner.root)
            .field("format", &self.inner.formatter.name())
            .field("hash_levels", &self.inner.hash_levels)
            .finish()
    }
}

impl PartialEq for FileSystemStorage {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Build a filesystem storage from its declaration, with field access when
/// `fields` is set. Hashed storages shard two levels deep unless
/// `hash_levels` says otherwise.
pub(crate) fn from_config(config: ComponentConfig, hashed: bool) -> Result<Arc<dyn Storage>> {
    let mut builder = FileSystemBuilder::from_config(&config)?;
    if hashed && config.extractor().get("hash_levels").is_none() {
        builder = builder.hashed(shard::DEFAULT_LEVELS);
    }
    let storage = builder.build()?;
    let storage: Arc<dyn Storage> = if config.extractor().get_bool("fields")?.unwrap_or(false) {
        Arc::new(cairn_store::FieldStorage::new(storage))
    } else {
        Arc::new(storage)
    };
    Ok(storage)
}

// A missing file, a missing parent, or a file standing where a directory
// should be all mean the key is absent.
fn is_absent(path: &Path, e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || path.ancestors().skip(1).any(Path::is_file)
}

fn read_file(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if is_absent(path, &e) || path.is_dir() => Ok(None),
        Err(e) => Err(e),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut attempts = 0;
    loop {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::write(path, bytes) {
            // A concurrent delete pruned the parent between the two calls.
            Err(e) if e.kind() == io::ErrorKind::NotFound && attempts < 3 => attempts += 1,
            other => return other,
        }
    }
}

fn file_size(path: &Path) -> io::Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        Ok(_) => Ok(None),
        Err(e) if is_absent(path, &e) => Ok(None),
        Err(e) => Err(e),
    }
}

fn copy_file(src: &Path, dst: &Path) -> io::Result<bool> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::copy(src, dst) {
        Ok(_) => Ok(true),
        Err(e) if is_absent(src, &e) && !src.exists() => Ok(false),
        Err(e) => Err(e),
    }
}

fn rename_file(root: &Path, src: &Path, dst: &Path) -> io::Result<bool> {
    if file_size(src)?.is_none() {
        return Ok(false);
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(src, dst)?;
    prune_empty_parents(root, src);
    Ok(true)
}

fn remove_path(root: &Path, path: &Path) -> io::Result<bool> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if is_absent(path, &e) => return Ok(false),
        Err(e) => return Err(e),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    prune_empty_parents(root, path);
    Ok(true)
}

/// Remove directories left empty above `path`, stopping below `root`.
fn prune_empty_parents(root: &Path, path: &Path) {
    for dir in path.ancestors().skip(1) {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        if fs::remove_dir(dir).is_err() {
            break;
        }
    }
}
