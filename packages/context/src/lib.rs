//! Component registry for Cairn.
//!
//! A [`Context`] owns every storage declared in a configuration tree.
//! Components refer to each other by dotted name through [`StorageRef`]s,
//! which resolve lazily and never own their target.

mod component;
mod context;
mod reference;

pub use component::{ComponentConfig, Factory, KindRegistry};
pub use context::{Context, ContextRef, State};
pub use reference::StorageRef;
