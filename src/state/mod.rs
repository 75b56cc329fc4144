//! Render-state snapshot consumed by condition evaluation and pass setup.

pub mod modes;
pub mod shadervar;
