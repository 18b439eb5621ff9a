use std::io;

use bytes::{Buf, Bytes, BytesMut};
use ocs_client::{PacketReceiver, PacketSender};
use ocs_proto::coding::{Decode, DecodeError, Encode, VarInt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// The largest packet accepted by default, in bytes.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 4 * 1024 * 1024;

/// Writes length-prefixed packets to a stream.
pub struct FramedSender<S = OwnedWriteHalf> {
	stream: S,
	buffer: BytesMut,
	max_packet_size: usize,
}

impl<S: AsyncWrite + Unpin + Send + 'static> FramedSender<S> {
	pub fn new(stream: S, max_packet_size: usize) -> Self {
		Self {
			stream,
			buffer: Default::default(),
			max_packet_size,
		}
	}

	/// Write one whole packet.
	pub async fn write(&mut self, packet: Bytes) -> anyhow::Result<()> {
		if packet.len() > self.max_packet_size {
			anyhow::bail!("packet too large: {} > {}", packet.len(), self.max_packet_size);
		}

		let size = VarInt::try_from(packet.len())?;
		size.encode(&mut self.buffer);
		self.buffer.extend_from_slice(&packet);

		self.stream.write_all_buf(&mut self.buffer).await?;
		Ok(())
	}

	/// Flush and close the stream.
	pub async fn finish(&mut self) -> anyhow::Result<()> {
		self.stream.shutdown().await?;
		Ok(())
	}
}

impl<S: AsyncWrite + Unpin + Send + 'static> PacketSender for FramedSender<S> {
	async fn send(&mut self, packet: Bytes) -> anyhow::Result<()> {
		self.write(packet).await
	}
}

/// Reads length-prefixed packets from a stream.
pub struct FramedReceiver<S = OwnedReadHalf> {
	stream: S,
	buffer: BytesMut,
	max_packet_size: usize,
}

impl<S: AsyncRead + Unpin + Send + 'static> FramedReceiver<S> {
	pub fn new(stream: S, max_packet_size: usize) -> Self {
		Self {
			stream,
			buffer: Default::default(),
			max_packet_size,
		}
	}

	/// Read the next whole packet, or None if the stream was closed between packets.
	pub async fn read(&mut self) -> anyhow::Result<Option<Bytes>> {
		loop {
			if let Some(packet) = self.split()? {
				return Ok(Some(packet));
			}

			if self.stream.read_buf(&mut self.buffer).await? == 0 {
				if self.buffer.is_empty() {
					return Ok(None);
				}

				// Stream closed while we still need more data
				anyhow::bail!("truncated packet: {} bytes left over", self.buffer.len());
			}
		}
	}

	// Remove a packet from the buffer if it was fully received.
	fn split(&mut self) -> anyhow::Result<Option<Bytes>> {
		let mut cursor = io::Cursor::new(&self.buffer[..]);
		let size = match VarInt::decode(&mut cursor) {
			Ok(size) => size.into_inner(),
			Err(DecodeError::Short) => return Ok(None),
			Err(err) => return Err(err.into()),
		};

		let size = usize::try_from(size)?;
		if size > self.max_packet_size {
			anyhow::bail!("packet too large: {} > {}", size, self.max_packet_size);
		}

		let header = cursor.position() as usize;
		if self.buffer.len() < header + size {
			self.buffer.reserve(header + size - self.buffer.len());
			return Ok(None);
		}

		self.buffer.advance(header);
		Ok(Some(self.buffer.split_to(size).freeze()))
	}
}

impl<S: AsyncRead + Unpin + Send + 'static> PacketReceiver for FramedReceiver<S> {
	async fn recv(&mut self) -> anyhow::Result<Option<Bytes>> {
		self.read().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_framing() {
		let (client, host) = tokio::io::duplex(64);
		let mut sender = FramedSender::new(client, 1024);
		let mut receiver = FramedReceiver::new(host, 1024);

		// Larger than the pipe, so it arrives in pieces.
		let large = Bytes::from(vec![7u8; 300]);

		let writer = tokio::spawn(async move {
			sender.write(Bytes::from_static(b"hello")).await.unwrap();
			sender.write(Bytes::new()).await.unwrap();
			sender.write(large).await.unwrap();
			sender.finish().await.unwrap();
		});

		assert_eq!(receiver.read().await.unwrap().unwrap(), "hello");
		assert_eq!(receiver.read().await.unwrap().unwrap(), "");
		assert_eq!(receiver.read().await.unwrap().unwrap().len(), 300);
		assert!(receiver.read().await.unwrap().is_none());

		writer.await.unwrap();
	}

	#[tokio::test]
	async fn test_too_large() {
		let (client, host) = tokio::io::duplex(1024);
		let mut sender = FramedSender::new(client, 8);
		assert!(sender.write(Bytes::from_static(b"too large")).await.is_err());

		// The receiver enforces its own limit.
		let mut sender = FramedSender::new(sender.stream, 64);
		let mut receiver = FramedReceiver::new(host, 8);
		sender.write(Bytes::from_static(b"too large")).await.unwrap();
		assert!(receiver.read().await.is_err());
	}

	#[tokio::test]
	async fn test_truncated() {
		let (mut client, host) = tokio::io::duplex(64);
		let mut receiver = FramedReceiver::new(host, 64);

		// A header promising 5 bytes, followed by 2.
		client.write_all(&[5, 1, 2]).await.unwrap();
		drop(client);

		assert!(receiver.read().await.is_err());
	}
}
