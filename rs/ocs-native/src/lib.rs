//! Helper library for native streaming applications.
//!
//! Carries [`ocs_client`] sessions over TCP, framing each packet with a varint length.
//!
//! See [`ClientConfig`] for connecting to hosts and [`ServerConfig`] for accepting sessions.

mod client;
mod framing;
mod log;
mod server;

pub use client::*;
pub use framing::*;
pub use log::*;
pub use server::*;

// Re-export these crates.
pub use ocs_client;
pub use ocs_proto;
