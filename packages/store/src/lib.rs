//! The storage contract for Cairn.
//!
//! This crate defines what every storage looks like:
//!
//! - [`Key`] and [`KeyPath`]: caller keys and their validated form
//! - [`Value`]: what a storage holds
//! - [`Storage`]: the async get/set/copy/move/open contract
//! - [`FieldAccess`] and [`FieldStorage`]: partial reads and writes of map values
//! - [`Formatter`] and [`FormatterRegistry`]: the encode/decode stage
//! - [`MemoryStorage`]: a trivial backend
//!
//! Absent is `Ok(None)`; errors are reserved for configuration problems,
//! caller mistakes and backend faults (see [`ErrorKind`]).

mod error;
mod fields;
pub mod format;
mod key;
mod memory;
mod storage;
mod value;

pub use error::{Error, ErrorKind, Result};
pub use fields::FieldStorage;
pub use format::{default_registry, AsIs, ChainFormatter, Formatter, FormatterRegistry};
pub use key::{Key, KeyPath};
pub use memory::MemoryStorage;
pub use storage::{read_to_end, FieldAccess, OpenMode, Storage, StreamHandle};
pub use value::Value;
