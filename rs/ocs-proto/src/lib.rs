//! # ocs-proto: wire protocol for cloud-rendered streaming
//!
//! The host renders a scene and streams encoded audio and video to a thin client,
//! while every participant ("member") streams its input back to the host.
//! This crate defines the bytes exchanged on that connection; it performs no I/O.
//!
//! ## Packets
//!
//! Every [Packet] starts with a [PacketKind] tag so the receiver can demultiplex:
//! - [Control]: session signalling (hello, welcome, play, subgroup, bye).
//! - [VideoSample]: an encoded video sample for the external decoder.
//! - [AudioPacket]: PCM audio for the external player.
//! - [InputBatch]: the [InputFrame]s of one send cycle, sharing a [Timestamp].
//!
//! ## Input
//!
//! Each [InputFrame] addresses a (member, [DeviceId], [ControlId]) key and carries one
//! [InputValue] variant. The variant tag travels with every record and unknown tags are rejected.

mod model;

pub mod coding;

pub use model::*;
