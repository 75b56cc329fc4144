pub(crate) mod bits;
pub mod error;
pub(crate) mod hash;
pub mod ids;
pub(crate) mod intern;
