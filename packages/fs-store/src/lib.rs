//! Filesystem storage for Cairn.
//!
//! [`FileSystemStorage`] keeps one file per key under a root directory.
//! On top of the plain layout it offers:
//!
//! - free-space backpressure: with `limit_free_space`, writes queue in FIFO
//!   order until enough space is available
//! - hash sharding (`fs.hash`): keys are spread over directories named by
//!   their SHA-256
//! - chunked streams ([`FileHandle`]) and path composition ([`StoragePath`])
//! - nested views that share the quota queue and the blocking pool
//!
//! Component options: `path` (required), `format`, `limit_free_space`,
//! `executor`, `hash_levels`, `fields`.

use cairn_context::KindRegistry;
use cairn_store::Result;

mod handle;
mod path;
mod pool;
mod quota;
mod shard;
mod storage;

pub use handle::FileHandle;
pub use path::StoragePath;
pub use quota::{DiskSpace, SpaceProbe};
pub use storage::{FileSystemBuilder, FileSystemStorage};

/// Register `fs` and `fs.hash`.
pub fn register_kinds(kinds: &mut KindRegistry) -> Result<()> {
    kinds.register("fs", |config| storage::from_config(config, false))?;
    kinds.register("fs.hash", |config| storage::from_config(config, true))?;
    Ok(())
}
