mod format;
mod frame;
mod id;
mod packet;
mod time;
mod value;

pub use format::*;
pub use frame::*;
pub use id::*;
pub use packet::*;
pub use time::*;
pub use value::*;
