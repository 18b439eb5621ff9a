//! # ocs-client: Cloud streaming session client
//!
//! `ocs-client` connects an application to a streaming host and keeps the input of every
//! member of a multicast session in sync, built on top of [`ocs_proto`].
//!
//! ## Overview
//!
//! - **[Client]**: The session controller; connect, play, switch subgroups and send input.
//! - **[PendingBatch]**: Local input accumulated between two send cycles.
//! - **[MemberTable]**: The latest input of every remote member, with per-frame edge queries.
//! - **[DecodeOrchestrator]**: Sequences video samples into an external [VideoDecoder].
//! - **[MessageConsumer]**: Notifications polled by the application's frame loop.
//!
//! The network is abstracted by a [Transport]; see [transport::memory] for an in-process one.
mod batch;
mod client;
mod config;
mod decode;
mod error;
mod id;
mod media;
mod queue;
mod stats;
mod table;
mod ticker;

pub mod runtime;
pub mod transport;

pub use batch::*;
pub use client::*;
pub use config::*;
pub use decode::*;
pub use error::*;
pub use id::*;
pub use media::*;
pub use queue::*;
pub use stats::*;
pub use table::*;
pub use ticker::*;
pub use transport::{PacketReceiver, PacketSender, Target, Transport};

// export the protocol version in use
pub use ocs_proto;
