use crate::coding::{Decode, DecodeError, Encode};

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timestamp overflow")]
pub struct TimestampOverflow;

/// A signed 64-bit timestamp in microseconds.
///
/// One timestamp is shared by every input frame accumulated in a send cycle,
/// so a receiver can treat the whole batch as a single instant.
/// This is NOT guaranteed to be a wall clock time; only ordering matters.
#[derive(Clone, Default, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp(i64);

impl Timestamp {
	pub const ZERO: Self = Self(0);
	pub const MAX: Self = Self(i64::MAX);
	pub const MIN: Self = Self(i64::MIN);

	pub const fn from_micros(micros: i64) -> Self {
		Self(micros)
	}

	pub const fn from_millis(millis: i64) -> Result<Self, TimestampOverflow> {
		match millis.checked_mul(1_000) {
			Some(micros) => Ok(Self(micros)),
			None => Err(TimestampOverflow),
		}
	}

	pub const fn as_micros(self) -> i64 {
		self.0
	}

	pub const fn as_millis(self) -> i64 {
		self.0 / 1_000
	}

	pub const fn checked_add_micros(self, micros: i64) -> Result<Self, TimestampOverflow> {
		match self.0.checked_add(micros) {
			Some(value) => Ok(Self(value)),
			None => Err(TimestampOverflow),
		}
	}

	/// Return the next timestamp strictly after `self`, saturating at [Self::MAX].
	pub const fn next(self) -> Self {
		Self(self.0.saturating_add(1))
	}

	pub const fn max(self, other: Self) -> Self {
		if self.0 > other.0 { self } else { other }
	}

	pub fn now() -> Self {
		// We use tokio so it can be stubbed for testing.
		tokio::time::Instant::now().into()
	}
}

impl From<i64> for Timestamp {
	fn from(micros: i64) -> Self {
		Self(micros)
	}
}

impl From<Timestamp> for i64 {
	fn from(time: Timestamp) -> Self {
		time.0
	}
}

impl std::fmt::Debug for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}µs", self.0)
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.0.fmt(f)
	}
}

// There's no zero Instant, so we need to use a reference point.
static TIME_ANCHOR: LazyLock<(std::time::Instant, SystemTime)> =
	LazyLock::new(|| (std::time::Instant::now(), SystemTime::now()));

impl From<std::time::Instant> for Timestamp {
	fn from(instant: std::time::Instant) -> Self {
		let (anchor_instant, anchor_system) = *TIME_ANCHOR;

		// Convert the instant to a SystemTime.
		let system = match instant.checked_duration_since(anchor_instant) {
			Some(forward) => anchor_system + forward,
			None => anchor_system - anchor_instant.duration_since(instant),
		};

		let micros = match system.duration_since(UNIX_EPOCH) {
			Ok(since) => i64::try_from(since.as_micros()).unwrap_or(i64::MAX),
			Err(before) => i64::try_from(before.duration().as_micros()).map_or(i64::MIN, |micros| -micros),
		};

		Self(micros)
	}
}

impl From<tokio::time::Instant> for Timestamp {
	fn from(instant: tokio::time::Instant) -> Self {
		instant.into_std().into()
	}
}

impl Decode for Timestamp {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self(i64::decode(r)?))
	}
}

impl Encode for Timestamp {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.0.encode(w)
	}
}
