//! Counters for data the client drops on purpose.
//!
//! Stale and out-of-order data is expected under network jitter, so it is only counted here,
//! never reported as an error.

use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};

/// Thread-safe counters shared by every part of a client.
#[derive(Clone, Default)]
pub struct ClientStats {
	bytes_sent: Arc<AtomicU64>,
	bytes_received: Arc<AtomicU64>,
	batches_sent: Arc<AtomicU64>,
	batches_applied: Arc<AtomicU64>,
	frames_applied: Arc<AtomicU64>,
	stale_frames: Arc<AtomicU64>,
	stale_subgroup: Arc<AtomicU64>,
	stale_decodes: Arc<AtomicU64>,
	media_dropped: Arc<AtomicU64>,
	messages_dropped: Arc<AtomicU64>,
	packets_dropped: Arc<AtomicU64>,
	decode_failures: Arc<AtomicU64>,
}

/// A point in time copy of [ClientStats].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
	pub bytes_sent: u64,
	pub bytes_received: u64,
	pub batches_sent: u64,
	pub batches_applied: u64,
	pub frames_applied: u64,
	/// Frames older than the stored value for their key.
	pub stale_frames: u64,
	/// Batches or samples tagged with a subgroup we no longer target.
	pub stale_subgroup: u64,
	/// Decode callbacks that arrived after their session or subgroup changed.
	pub stale_decodes: u64,
	/// Media dropped because the decoder or player fell behind.
	pub media_dropped: u64,
	/// Messages evicted from a full queue.
	pub messages_dropped: u64,
	/// Outgoing packets dropped because the transport fell behind.
	pub packets_dropped: u64,
	pub decode_failures: u64,
}

impl ClientStats {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_bytes_sent(&self, bytes: u64) {
		self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
	}

	pub fn record_bytes_received(&self, bytes: u64) {
		self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
	}

	pub fn inc_batches_sent(&self) {
		self.batches_sent.fetch_add(1, Ordering::Relaxed);
	}

	pub fn inc_batches_applied(&self) {
		self.batches_applied.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_frames_applied(&self, frames: u64) {
		self.frames_applied.fetch_add(frames, Ordering::Relaxed);
	}

	pub fn record_stale_frames(&self, frames: u64) {
		self.stale_frames.fetch_add(frames, Ordering::Relaxed);
	}

	pub fn inc_stale_subgroup(&self) {
		self.stale_subgroup.fetch_add(1, Ordering::Relaxed);
	}

	pub fn inc_stale_decodes(&self) {
		self.stale_decodes.fetch_add(1, Ordering::Relaxed);
	}

	pub fn inc_media_dropped(&self) {
		self.media_dropped.fetch_add(1, Ordering::Relaxed);
	}

	pub fn inc_messages_dropped(&self) {
		self.messages_dropped.fetch_add(1, Ordering::Relaxed);
	}

	pub fn inc_packets_dropped(&self) {
		self.packets_dropped.fetch_add(1, Ordering::Relaxed);
	}

	pub fn inc_decode_failures(&self) {
		self.decode_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> StatsSnapshot {
		StatsSnapshot {
			bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
			bytes_received: self.bytes_received.load(Ordering::Relaxed),
			batches_sent: self.batches_sent.load(Ordering::Relaxed),
			batches_applied: self.batches_applied.load(Ordering::Relaxed),
			frames_applied: self.frames_applied.load(Ordering::Relaxed),
			stale_frames: self.stale_frames.load(Ordering::Relaxed),
			stale_subgroup: self.stale_subgroup.load(Ordering::Relaxed),
			stale_decodes: self.stale_decodes.load(Ordering::Relaxed),
			media_dropped: self.media_dropped.load(Ordering::Relaxed),
			messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
			packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
			decode_failures: self.decode_failures.load(Ordering::Relaxed),
		}
	}
}
