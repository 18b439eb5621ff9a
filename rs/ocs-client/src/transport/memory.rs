//! An in-process transport, pairing clients with a scripted host over channels.

use anyhow::Context;
use bytes::Bytes;
use ocs_proto::Packet;
use ocs_proto::coding::{Decode, Encode};
use tokio::sync::mpsc;

use super::{PacketReceiver, PacketSender, Target, Transport};
use crate::SessionConfig;

/// Create a transport and the host that accepts its sessions.
pub fn pair() -> (MemoryTransport, MemoryHost) {
	let (tx, rx) = mpsc::unbounded_channel();
	(MemoryTransport { incoming: tx }, MemoryHost { incoming: rx })
}

#[derive(Clone)]
pub struct MemoryTransport {
	incoming: mpsc::UnboundedSender<MemoryConnection>,
}

impl Transport for MemoryTransport {
	type Sender = MemorySender;
	type Receiver = MemoryReceiver;

	async fn open(&self, target: &Target, config: &SessionConfig) -> anyhow::Result<(MemorySender, MemoryReceiver)> {
		let (client_tx, host_rx) = mpsc::unbounded_channel();
		let (host_tx, client_rx) = mpsc::unbounded_channel();

		let connection = MemoryConnection {
			target: target.clone(),
			config: config.clone(),
			sender: MemorySender(host_tx),
			receiver: MemoryReceiver(host_rx),
		};

		self.incoming
			.send(connection)
			.ok()
			.context("connection refused")?;

		Ok((MemorySender(client_tx), MemoryReceiver(client_rx)))
	}
}

/// Accepts the sessions opened through a [MemoryTransport].
pub struct MemoryHost {
	incoming: mpsc::UnboundedReceiver<MemoryConnection>,
}

impl MemoryHost {
	pub async fn accept(&mut self) -> Option<MemoryConnection> {
		self.incoming.recv().await
	}
}

/// The host side of one session.
pub struct MemoryConnection {
	pub target: Target,
	pub config: SessionConfig,
	pub sender: MemorySender,
	pub receiver: MemoryReceiver,
}

impl MemoryConnection {
	pub async fn send_packet(&mut self, packet: &Packet) -> anyhow::Result<()> {
		self.sender.send(packet.encode_bytes()).await
	}

	/// The next packet from the client, or None once it hung up.
	pub async fn recv_packet(&mut self) -> anyhow::Result<Option<Packet>> {
		let Some(mut bytes) = self.receiver.recv().await? else {
			return Ok(None);
		};

		Ok(Some(Packet::decode(&mut bytes)?))
	}
}

pub struct MemorySender(mpsc::UnboundedSender<Bytes>);

impl PacketSender for MemorySender {
	async fn send(&mut self, packet: Bytes) -> anyhow::Result<()> {
		self.0.send(packet).ok().context("connection closed")
	}
}

pub struct MemoryReceiver(mpsc::UnboundedReceiver<Bytes>);

impl PacketReceiver for MemoryReceiver {
	async fn recv(&mut self) -> anyhow::Result<Option<Bytes>> {
		Ok(self.0.recv().await)
	}
}
