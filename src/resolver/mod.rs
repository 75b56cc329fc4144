//! Variant selection: the build-time condition tree and the runtime resolver it is flattened into.

pub(crate) mod build;
pub mod cache;
pub mod runtime;
