use std::fmt;

use crate::coding::{Decode, DecodeError, Encode};

/// The value was too large to fit in a [VarInt].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("value too large for varint encoding")]
pub struct BoundsExceeded;

/// An integer less than 2^62, encoded in 1, 2, 4 or 8 bytes.
///
/// The two most significant bits of the first byte hold the length, as in QUIC.
#[derive(Default, Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VarInt(u64);

impl VarInt {
	/// The largest representable value.
	pub const MAX: Self = Self((1 << 62) - 1);

	pub const ZERO: Self = Self(0);

	pub const fn from_u32(x: u32) -> Self {
		Self(x as u64)
	}

	pub const fn from_u64(x: u64) -> Option<Self> {
		if x <= Self::MAX.0 { Some(Self(x)) } else { None }
	}

	pub const fn from_u128(x: u128) -> Option<Self> {
		if x <= Self::MAX.0 as u128 {
			Some(Self(x as u64))
		} else {
			None
		}
	}

	pub const fn into_inner(self) -> u64 {
		self.0
	}

	/// The number of bytes this value occupies on the wire.
	pub const fn size(self) -> usize {
		match self.0 {
			0..=0x3f => 1,
			0x40..=0x3fff => 2,
			0x4000..=0x3fff_ffff => 4,
			_ => 8,
		}
	}
}

impl From<u8> for VarInt {
	fn from(x: u8) -> Self {
		Self(x.into())
	}
}

impl From<u32> for VarInt {
	fn from(x: u32) -> Self {
		Self::from_u32(x)
	}
}

impl TryFrom<u64> for VarInt {
	type Error = BoundsExceeded;

	fn try_from(x: u64) -> Result<Self, BoundsExceeded> {
		Self::from_u64(x).ok_or(BoundsExceeded)
	}
}

impl TryFrom<usize> for VarInt {
	type Error = BoundsExceeded;

	fn try_from(x: usize) -> Result<Self, BoundsExceeded> {
		Self::try_from(x as u64)
	}
}

impl From<VarInt> for u64 {
	fn from(x: VarInt) -> Self {
		x.0
	}
}

impl fmt::Debug for VarInt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl fmt::Display for VarInt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl Decode for VarInt {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		if !r.has_remaining() {
			return Err(DecodeError::Short);
		}

		let first = r.chunk()[0];
		let size = 1usize << (first >> 6);
		if r.remaining() < size {
			return Err(DecodeError::Short);
		}

		let value = match size {
			1 => u64::from(r.get_u8() & 0x3f),
			2 => u64::from(r.get_u16() & 0x3fff),
			4 => u64::from(r.get_u32() & 0x3fff_ffff),
			_ => r.get_u64() & 0x3fff_ffff_ffff_ffff,
		};

		Ok(Self(value))
	}
}

impl Encode for VarInt {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		let x = self.0;
		match self.size() {
			1 => w.put_u8(x as u8),
			2 => w.put_u16((0b01 << 14) | x as u16),
			4 => w.put_u32((0b10 << 30) | x as u32),
			_ => w.put_u64((0b11 << 62) | x),
		}
	}
}

impl Encode for u64 {
	/// Encode a varint, panicking if the value is 2^62 or larger.
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		VarInt::try_from(*self).expect("varint too large").encode(w);
	}
}

impl Encode for usize {
	/// Encode a varint, panicking if the value is 2^62 or larger.
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		VarInt::try_from(*self).expect("varint too large").encode(w);
	}
}
