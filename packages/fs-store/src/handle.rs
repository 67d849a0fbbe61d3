//! Chunked streams over stored files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cairn_store::{Error, OpenMode, Result, StreamHandle};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::quota::Quota;

/// An open file inside a [`FileSystemStorage`](crate::FileSystemStorage).
///
/// Dropping the handle closes the file and, after a write, lets the next
/// quota waiter re-check. [`close`](StreamHandle::close) also flushes and
/// reports the error, if any.
#[derive(Debug)]
pub struct FileHandle {
    storage: String,
    path: PathBuf,
    mode: OpenMode,
    file: Option<File>,
    written: bool,
    quota: Arc<Quota>,
}

impl FileHandle {
    pub(crate) async fn open(
        storage: &str,
        path: PathBuf,
        mode: OpenMode,
        quota: Arc<Quota>,
    ) -> Result<Self> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::Append => options.append(true).create(true),
        };
        if mode.is_write() {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::io(storage, format!("creating {}", parent.display()), e))?;
            }
        }
        let file = options
            .open(&path)
            .await
            .map_err(|e| Error::io(storage, format!("opening {} ({})", path.display(), mode), e))?;
        debug!(storage, path = %path.display(), %mode, "opened");
        Ok(Self {
            storage: storage.to_string(),
            path,
            mode,
            file: Some(file),
            written: false,
            quota,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }
}

fn closed(path: &Path) -> Error {
    Error::usage(format!("{} is closed", path.display()))
}

#[async_trait]
impl StreamHandle for FileHandle {
    async fn read_chunk(&mut self, max: usize) -> Result<Option<Vec<u8>>> {
        if self.mode.is_write() {
            return Err(Error::usage(format!(
                "{} is open for writing",
                self.path.display()
            )));
        }
        let file = self.file.as_mut().ok_or_else(|| closed(&self.path))?;
        let mut buf = vec![0; max.max(1)];
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| Error::io(&self.storage, format!("reading {}", self.path.display()), e))?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        if !self.mode.is_write() {
            return Err(Error::usage(format!(
                "{} is open for reading",
                self.path.display()
            )));
        }
        let file = self.file.as_mut().ok_or_else(|| closed(&self.path))?;
        file.write_all(data)
            .await
            .map_err(|e| Error::io(&self.storage, format!("writing {}", self.path.display()), e))?;
        self.written = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut file = self.file.take().ok_or_else(|| closed(&self.path))?;
        let flushed = if self.mode.is_write() {
            file.flush()
                .await
                .map_err(|e| Error::io(&self.storage, format!("flushing {}", self.path.display()), e))
        } else {
            Ok(())
        };
        drop(file);
        if self.written {
            self.quota.wake_next();
        }
        flushed
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        // Closed without `close`: the bytes are written all the same.
        if self.file.is_some() && self.written {
            debug!(storage = %self.storage, path = %self.path.display(), "dropped open write handle");
            self.quota.wake_next();
        }
    }
}
