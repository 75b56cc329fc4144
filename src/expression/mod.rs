//! Condition expression language: text such as `vars.x.int == 3 && vars.normalmap.texture`.

pub(crate) mod ast;
pub mod error;
pub(crate) mod lexer;
pub(crate) mod parser;
