//! The network seam: a transport opens a packet channel to a host.

pub mod memory;

use std::fmt;
use std::future::Future;

use bytes::Bytes;
use url::Host;

use crate::{Error, SessionConfig};

/// A validated host and port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
	pub host: Host,
	pub port: u16,
}

impl Target {
	/// Validate an address (a domain, an IPv4 or a bracketed IPv6 address) and a port.
	pub fn new(address: &str, port: u16) -> Result<Self, Error> {
		let host = Host::parse(address.trim()).map_err(|_| Error::InvalidAddress(address.to_string()))?;

		if port == 0 {
			return Err(Error::InvalidPort(port));
		}

		Ok(Self { host, port })
	}
}

impl fmt::Display for Target {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.host, self.port)
	}
}

/// Opens sessions to a host.
pub trait Transport: Send + Sync + 'static {
	type Sender: PacketSender;
	type Receiver: PacketReceiver;

	/// Connect to `target`, forwarding the session options (ex. the license) as needed.
	fn open(
		&self,
		target: &Target,
		config: &SessionConfig,
	) -> impl Future<Output = anyhow::Result<(Self::Sender, Self::Receiver)>> + Send;
}

/// The sending half of a session; each call is one whole packet.
pub trait PacketSender: Send + 'static {
	fn send(&mut self, packet: Bytes) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// The receiving half of a session.
pub trait PacketReceiver: Send + 'static {
	/// The next whole packet, or None once the host has closed the session.
	fn recv(&mut self) -> impl Future<Output = anyhow::Result<Option<Bytes>>> + Send;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_target() {
		let target = Target::new("host", 7777).unwrap();
		assert_eq!(target.to_string(), "host:7777");

		let target = Target::new("[::1]", 443).unwrap();
		assert_eq!(target.to_string(), "[::1]:443");

		let target = Target::new("10.0.0.1", 80).unwrap();
		assert_eq!(target.host, Host::<String>::Ipv4([10, 0, 0, 1].into()));
	}

	#[test]
	fn test_target_invalid() {
		assert!(matches!(Target::new("", 7777), Err(Error::InvalidAddress(_))));
		assert!(matches!(Target::new("bad host", 7777), Err(Error::InvalidAddress(_))));
		assert!(matches!(Target::new("[::1", 7777), Err(Error::InvalidAddress(_))));
		assert!(matches!(Target::new("host", 0), Err(Error::InvalidPort(0))));
	}
}
