use std::net::SocketAddr;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::{DEFAULT_MAX_PACKET_SIZE, FramedReceiver, FramedSender};

/// Settings used to accept sessions.
#[derive(Parser, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
	/// Listen for TCP connections on the given address.
	#[arg(id = "bind", long = "bind", env = "OCS_BIND", default_value = "[::]:7777")]
	pub bind: SocketAddr,

	/// Disable Nagle's algorithm on accepted connections.
	#[arg(
		id = "tcp-nodelay",
		long = "tcp-nodelay",
		env = "OCS_TCP_NODELAY",
		default_value_t = true,
		action = clap::ArgAction::Set
	)]
	pub nodelay: bool,

	/// The largest packet sent or received, in bytes.
	#[arg(
		id = "max-packet-size",
		long = "max-packet-size",
		env = "OCS_MAX_PACKET_SIZE",
		default_value_t = DEFAULT_MAX_PACKET_SIZE
	)]
	pub max_packet_size: usize,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			bind: SocketAddr::from(([0u16; 8], 7777)),
			nodelay: true,
			max_packet_size: DEFAULT_MAX_PACKET_SIZE,
		}
	}
}

impl ServerConfig {
	pub async fn init(self) -> anyhow::Result<TcpServer> {
		anyhow::ensure!(self.max_packet_size > 0, "max packet size must be positive");

		let listener = TcpListener::bind(self.bind).await?;
		tracing::info!(addr = %listener.local_addr()?, "listening");

		Ok(TcpServer { listener, config: self })
	}
}

/// One session accepted by a [TcpServer].
pub struct Accepted {
	pub addr: SocketAddr,
	pub sender: FramedSender,
	pub receiver: FramedReceiver,
}

/// Accepts sessions over TCP.
pub struct TcpServer {
	listener: TcpListener,
	config: ServerConfig,
}

impl TcpServer {
	pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
		Ok(self.listener.local_addr()?)
	}

	/// Wait for the next session.
	pub async fn accept(&self) -> anyhow::Result<Accepted> {
		let (stream, addr) = self.listener.accept().await?;
		stream.set_nodelay(self.config.nodelay)?;

		let (reader, writer) = stream.into_split();
		let max = self.config.max_packet_size;

		Ok(Accepted {
			addr,
			sender: FramedSender::new(writer, max),
			receiver: FramedReceiver::new(reader, max),
		})
	}
}
