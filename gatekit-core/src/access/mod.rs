//! The proxy access document and the registry that owns it on disk.

mod document;
mod registry;

pub use document::{AccessClientEntry, AccessConfigDocument};
pub use registry::AccessConfigRegistry;
