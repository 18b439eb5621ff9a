use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ocs_client::{SessionConfig, Target, Transport};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::{DEFAULT_MAX_PACKET_SIZE, FramedReceiver, FramedSender};

/// Transport settings used to reach a host.
#[derive(Parser, Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClientConfig {
	/// How long to wait for the TCP connection.
	#[arg(
		id = "tcp-connect-timeout",
		long = "tcp-connect-timeout",
		env = "OCS_TCP_CONNECT_TIMEOUT",
		default_value = "5s",
		value_parser = humantime::parse_duration
	)]
	#[serde(with = "humantime_serde")]
	pub connect_timeout: Duration,

	/// Disable Nagle's algorithm; input is latency sensitive.
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

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			connect_timeout: Duration::from_secs(5),
			nodelay: true,
			max_packet_size: DEFAULT_MAX_PACKET_SIZE,
		}
	}
}

impl ClientConfig {
	pub fn init(self) -> anyhow::Result<TcpTransport> {
		anyhow::ensure!(self.max_packet_size > 0, "max packet size must be positive");
		Ok(TcpTransport { config: self })
	}
}

/// Opens sessions over TCP.
#[derive(Clone, Debug)]
pub struct TcpTransport {
	config: ClientConfig,
}

impl TcpTransport {
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}
}

impl Transport for TcpTransport {
	type Sender = FramedSender;
	type Receiver = FramedReceiver;

	async fn open(&self, target: &Target, config: &SessionConfig) -> anyhow::Result<(FramedSender, FramedReceiver)> {
		// The session options travel in the handshake.
		tracing::debug!(%target, options = %config.to_json(), "opening tcp connection");

		let connect = TcpStream::connect(target.to_string());
		let stream = tokio::time::timeout(self.config.connect_timeout, connect)
			.await
			.context("connect timeout")?
			.with_context(|| format!("failed to connect to {target}"))?;

		stream.set_nodelay(self.config.nodelay)?;
		tracing::debug!(local = ?stream.local_addr().ok(), "tcp connected");

		let (reader, writer) = stream.into_split();
		let max = self.config.max_packet_size;

		Ok((FramedSender::new(writer, max), FramedReceiver::new(reader, max)))
	}
}
