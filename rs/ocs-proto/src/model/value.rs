use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::coding::{Decode, DecodeError, Encode};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vec2 {
	pub x: f32,
	pub y: f32,
}

impl Vec2 {
	pub const fn new(x: f32, y: f32) -> Self {
		Self { x, y }
	}

	pub fn length(self) -> f32 {
		self.x.hypot(self.y)
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vec3 {
	pub x: f32,
	pub y: f32,
	pub z: f32,
}

impl Vec3 {
	pub const fn new(x: f32, y: f32, z: f32) -> Self {
		Self { x, y, z }
	}
}

/// A rotation quaternion.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vec4 {
	pub x: f32,
	pub y: f32,
	pub z: f32,
	pub w: f32,
}

impl Vec4 {
	pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

	pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
		Self { x, y, z, w }
	}
}

impl Default for Vec4 {
	fn default() -> Self {
		Self::IDENTITY
	}
}

/// The wire tag for each [InputValue] variant.
///
/// The set is closed: any other tag is rejected while decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ValueKind {
	State = 0,
	ByteAxis = 1,
	Axis = 2,
	Axis2D = 3,
	Pose = 4,
	Touch2D = 5,
}

/// A single control update.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InputValue {
	/// A discrete state, ex. a button or tracker status.
	State(u8),

	/// An axis quantized to a byte.
	ByteAxis(u8),

	/// A float axis, ex. a trigger.
	Axis(f32),

	/// A 2D axis, ex. a thumbstick.
	Axis2D(Vec2),

	/// A position and rotation, ex. a head or hand pose.
	Pose { position: Vec3, rotation: Vec4 },

	/// A touch point with its phase and whether it is currently touching.
	Touch2D { position: Vec2, state: u8, active: bool },
}

/// A cardinal direction of a 2D axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Direction {
	Up = 0,
	Down = 1,
	Left = 2,
	Right = 3,
}

impl InputValue {
	pub fn kind(&self) -> ValueKind {
		match self {
			Self::State(_) => ValueKind::State,
			Self::ByteAxis(_) => ValueKind::ByteAxis,
			Self::Axis(_) => ValueKind::Axis,
			Self::Axis2D(_) => ValueKind::Axis2D,
			Self::Pose { .. } => ValueKind::Pose,
			Self::Touch2D { .. } => ValueKind::Touch2D,
		}
	}

	/// Whether the control is held, pushed or touched.
	///
	/// Float axes use `threshold` on their magnitude; poses are never active.
	pub fn is_active(&self, threshold: f32) -> bool {
		match *self {
			Self::State(state) => state != 0,
			Self::ByteAxis(axis) => axis != 0,
			Self::Axis(axis) => axis.abs() >= threshold,
			Self::Axis2D(axis) => axis.length() >= threshold,
			Self::Pose { .. } => false,
			Self::Touch2D { active, .. } => active,
		}
	}

	/// Whether a 2D value points in `direction` by at least `threshold`.
	pub fn is_direction_active(&self, direction: Direction, threshold: f32) -> bool {
		let axis = match *self {
			Self::Axis2D(axis) => axis,
			Self::Touch2D { position, active: true, .. } => position,
			_ => return false,
		};

		match direction {
			Direction::Up => axis.y >= threshold,
			Direction::Down => axis.y <= -threshold,
			Direction::Left => axis.x <= -threshold,
			Direction::Right => axis.x >= threshold,
		}
	}
}

impl Encode for InputValue {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		u8::from(self.kind()).encode(w);

		match self {
			Self::State(state) => state.encode(w),
			Self::ByteAxis(axis) => axis.encode(w),
			Self::Axis(axis) => axis.encode(w),
			Self::Axis2D(axis) => {
				axis.x.encode(w);
				axis.y.encode(w);
			}
			Self::Pose { position, rotation } => {
				position.x.encode(w);
				position.y.encode(w);
				position.z.encode(w);
				rotation.x.encode(w);
				rotation.y.encode(w);
				rotation.z.encode(w);
				rotation.w.encode(w);
			}
			Self::Touch2D { position, state, active } => {
				position.x.encode(w);
				position.y.encode(w);
				state.encode(w);
				active.encode(w);
			}
		}
	}
}

impl Decode for InputValue {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let kind = ValueKind::try_from(u8::decode(r)?).map_err(|_| DecodeError::InvalidValue)?;

		Ok(match kind {
			ValueKind::State => Self::State(u8::decode(r)?),
			ValueKind::ByteAxis => Self::ByteAxis(u8::decode(r)?),
			ValueKind::Axis => Self::Axis(f32::decode(r)?),
			ValueKind::Axis2D => Self::Axis2D(Vec2::new(f32::decode(r)?, f32::decode(r)?)),
			ValueKind::Pose => Self::Pose {
				position: Vec3::new(f32::decode(r)?, f32::decode(r)?, f32::decode(r)?),
				rotation: Vec4::new(f32::decode(r)?, f32::decode(r)?, f32::decode(r)?, f32::decode(r)?),
			},
			ValueKind::Touch2D => Self::Touch2D {
				position: Vec2::new(f32::decode(r)?, f32::decode(r)?),
				state: u8::decode(r)?,
				active: bool::decode(r)?,
			},
		})
	}
}
