//! Source documents: a small owned node tree and its XML loader.

pub mod node;
pub mod xml;
