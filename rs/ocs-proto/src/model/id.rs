use std::fmt;

use crate::coding::{Decode, DecodeError, Encode};

/// A device or control id outside of the protocol range (0-255).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("id out of range: {0}")]
pub struct InvalidId(pub i64);

// Conversions from an id or a u8 can't fail.
impl From<std::convert::Infallible> for InvalidId {
	fn from(never: std::convert::Infallible) -> Self {
		match never {}
	}
}

macro_rules! small_id {
	($(#[$doc:meta])* $name:ident) => {
		$(#[$doc])*
		#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
		#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
		pub struct $name(pub u8);

		impl $name {
			pub const fn get(self) -> u8 {
				self.0
			}
		}

		impl From<u8> for $name {
			fn from(id: u8) -> Self {
				Self(id)
			}
		}

		impl From<$name> for u8 {
			fn from(id: $name) -> Self {
				id.0
			}
		}

		impl TryFrom<i32> for $name {
			type Error = InvalidId;

			fn try_from(id: i32) -> Result<Self, InvalidId> {
				u8::try_from(id).map(Self).map_err(|_| InvalidId(id.into()))
			}
		}

		impl TryFrom<u32> for $name {
			type Error = InvalidId;

			fn try_from(id: u32) -> Result<Self, InvalidId> {
				u8::try_from(id).map(Self).map_err(|_| InvalidId(id.into()))
			}
		}

		impl TryFrom<i64> for $name {
			type Error = InvalidId;

			fn try_from(id: i64) -> Result<Self, InvalidId> {
				u8::try_from(id).map(Self).map_err(|_| InvalidId(id))
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				self.0.fmt(f)
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				self.0.fmt(f)
			}
		}

		impl Encode for $name {
			fn encode<W: bytes::BufMut>(&self, w: &mut W) {
				self.0.encode(w)
			}
		}

		impl Decode for $name {
			fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
				Ok(Self(u8::decode(r)?))
			}
		}
	};
}

small_id!(
	/// A logical input source on a member, ex. a hand tracker.
	DeviceId
);

small_id!(
	/// A logical signal on a device, ex. a trigger or a pose.
	ControlId
);

small_id!(
	/// A partition of the multicast session.
	Subgroup
);

/// Well-known device ids.
impl DeviceId {
	pub const HEAD_TRACKER: Self = Self(0);
	pub const LEFT_HAND_TRACKER: Self = Self(1);
	pub const RIGHT_HAND_TRACKER: Self = Self(2);
	pub const CONTROLLER: Self = Self(3);
	pub const TOUCH_SCREEN: Self = Self(4);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_range() {
		assert_eq!(DeviceId::try_from(0i32), Ok(DeviceId(0)));
		assert_eq!(ControlId::try_from(255u32), Ok(ControlId(255)));
		assert_eq!(DeviceId::try_from(256u32), Err(InvalidId(256)));
		assert_eq!(ControlId::try_from(-1i32), Err(InvalidId(-1)));
		assert_eq!(Subgroup::try_from(i64::MAX), Err(InvalidId(i64::MAX)));
	}
}
