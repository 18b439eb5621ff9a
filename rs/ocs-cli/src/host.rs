use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::Args;
use ocs_native::{Accepted, FramedReceiver, FramedSender, TcpServer};
use ocs_proto::coding::{Decode, Encode};
use ocs_proto::{Control, InputBatch, Packet, Subgroup, VideoFormat};
use parking_lot::Mutex;
use slab::Slab;
use tokio::sync::mpsc;

#[derive(Args, Clone, Debug)]
pub struct HostArgs {
	/// Advertise a video stream with the given codec, ex. `hvc1`.
	#[arg(long)]
	pub video_codec: Option<String>,

	#[arg(long, default_value_t = 1920)]
	pub video_width: u32,

	#[arg(long, default_value_t = 1080)]
	pub video_height: u32,

	/// The number of packets queued per peer before dropping.
	#[arg(long, default_value_t = 256)]
	pub peer_buffer: usize,
}

impl Default for HostArgs {
	fn default() -> Self {
		Self {
			video_codec: None,
			video_width: 1920,
			video_height: 1080,
			peer_buffer: 256,
		}
	}
}

impl HostArgs {
	fn welcome(&self) -> Control {
		let video = self.video_codec.clone().map(|codec| VideoFormat {
			codec,
			width: self.video_width,
			height: self.video_height,
			flipped: false,
			description: None,
		});

		Control::Welcome { video, audio: None }
	}
}

pub async fn host(config: ocs_native::ServerConfig, args: HostArgs) -> anyhow::Result<()> {
	let server = config.init().await?;
	let host = Host::new(args);

	tokio::select! {
		res = host.run(server) => res,
		_ = tokio::signal::ctrl_c() => Ok(()),
	}
}

struct Peer {
	member: String,
	subgroup: Subgroup,

	// The epoch of the peer's last subgroup change, stamped on everything forwarded to it.
	epoch: u64,

	// Only joined peers send and receive input.
	joined: bool,
	outgoing: mpsc::Sender<Bytes>,
}

impl Peer {
	fn send(&self, packet: Bytes) {
		match self.outgoing.try_send(packet) {
			Ok(()) => {}
			Err(mpsc::error::TrySendError::Full(_)) => {
				tracing::debug!(member = %self.member, "peer is behind, dropping packet");
			}
			// A closed peer is removed by its own task.
			Err(mpsc::error::TrySendError::Closed(_)) => {}
		}
	}
}

/// Answers handshakes and reflects input batches to the other members of the same subgroup.
#[derive(Clone)]
pub struct Host {
	welcome: Arc<Packet>,
	buffer: usize,
	peers: Arc<Mutex<Slab<Peer>>>,
}

impl Host {
	pub fn new(args: HostArgs) -> Self {
		Self {
			welcome: Arc::new(Packet::Control(args.welcome())),
			buffer: args.peer_buffer.max(1),
			peers: Default::default(),
		}
	}

	pub async fn run(&self, server: TcpServer) -> anyhow::Result<()> {
		let mut id = 0u64;

		loop {
			let accepted = server.accept().await?;
			id += 1;

			let host = self.clone();
			tokio::spawn(async move { host.serve(id, accepted).await });
		}
	}

	#[tracing::instrument("peer", skip_all, fields(id = id, addr = %accepted.addr))]
	async fn serve(self, id: u64, accepted: Accepted) {
		match self.serve_peer(accepted.sender, accepted.receiver).await {
			Ok(()) => tracing::info!(peers = self.peer_count(), "peer left"),
			Err(err) => tracing::warn!(?err, "peer failed"),
		}
	}

	async fn serve_peer(&self, sender: FramedSender, mut receiver: FramedReceiver) -> anyhow::Result<()> {
		let (member, subgroup) = match recv(&mut receiver).await?.context("closed before hello")? {
			Packet::Control(Control::Hello {
				member,
				subgroup,
				config,
			}) => {
				tracing::info!(%member, %subgroup, %config, "hello");
				(member, subgroup)
			}
			packet => anyhow::bail!("expected hello, got {:?}", packet.kind()),
		};

		let (outgoing, outgoing_rx) = mpsc::channel(self.buffer);
		outgoing.try_send(self.welcome.encode_bytes())?;

		let key = self.peers.lock().insert(Peer {
			member,
			subgroup,
			epoch: 0,
			joined: false,
			outgoing,
		});

		let res = tokio::select! {
			res = Self::run_send(sender, outgoing_rx) => res,
			res = self.run_recv(key, receiver) => res,
		};

		self.peers.lock().remove(key);
		res
	}

	async fn run_send(mut sender: FramedSender, mut outgoing: mpsc::Receiver<Bytes>) -> anyhow::Result<()> {
		while let Some(packet) = outgoing.recv().await {
			sender.write(packet).await?;
		}

		Ok(())
	}

	async fn run_recv(&self, key: usize, mut receiver: FramedReceiver) -> anyhow::Result<()> {
		while let Some(packet) = recv(&mut receiver).await? {
			match packet {
				Packet::Input(batch) => self.reflect(key, batch),
				Packet::Control(Control::Subgroup { subgroup, epoch }) => {
					if let Some(peer) = self.peers.lock().get_mut(key) {
						tracing::debug!(member = %peer.member, from = %peer.subgroup, to = %subgroup, epoch, "changed subgroup");
						peer.subgroup = subgroup;
						peer.epoch = epoch;
					}
				}
				Packet::Control(control @ (Control::Join | Control::Leave)) => {
					if let Some(peer) = self.peers.lock().get_mut(key) {
						peer.joined = control == Control::Join;
						tracing::info!(member = %peer.member, joined = peer.joined, "membership changed");
					}
				}
				Packet::Control(Control::Bye { reason }) => {
					tracing::debug!(%reason, "bye");
					return Ok(());
				}
				packet => tracing::debug!(kind = ?packet.kind(), "ignoring packet"),
			}
		}

		Ok(())
	}

	// Forward a batch from a joined peer to every other joined peer in its subgroup.
	fn reflect(&self, key: usize, mut batch: InputBatch) {
		let peers = self.peers.lock();
		let Some(origin) = peers.get(key) else {
			return;
		};

		if !origin.joined {
			tracing::trace!(member = %origin.member, "dropping input from a peer that hasn't joined");
			return;
		}

		if batch.subgroup != origin.subgroup || batch.epoch != origin.epoch {
			tracing::trace!(expected = %origin.subgroup, got = %batch.subgroup, epoch = batch.epoch, "dropping input for old subgroup");
			return;
		}

		for (other, peer) in peers.iter() {
			if other == key || !peer.joined || peer.subgroup != batch.subgroup {
				continue;
			}

			// Each recipient checks the epoch against its own subgroup changes.
			batch.epoch = peer.epoch;
			peer.send(Packet::Input(batch.clone()).encode_bytes());
		}
	}

	/// The number of peers past the handshake.
	pub fn peer_count(&self) -> usize {
		self.peers.lock().len()
	}
}

async fn recv(receiver: &mut FramedReceiver) -> anyhow::Result<Option<Packet>> {
	let Some(mut bytes) = receiver.read().await? else {
		return Ok(None);
	};

	Ok(Some(Packet::decode(&mut bytes)?))
}
