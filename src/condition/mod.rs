//! Condition normalization, interning and evaluation.

pub(crate) mod check;
pub mod constants;
pub mod evaluator;
pub mod logic3;
pub(crate) mod operand;
pub(crate) mod valueset;
pub(crate) mod variables;
