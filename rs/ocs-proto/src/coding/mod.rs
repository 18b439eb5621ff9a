//! The low-level encoding used on the wire.
//!
//! You should not need this module directly; see [crate] for the message types.

mod decode;
mod encode;
mod varint;

pub use decode::*;
pub use encode::*;
pub use varint::*;
