use crate::coding::{Decode, DecodeError, Encode};
use crate::{ControlId, DeviceId, InputValue, InvalidId, Subgroup, Timestamp};

/// One control update from one member, stamped with its send cycle.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputFrame {
	pub member: String,
	pub device: DeviceId,
	pub control: ControlId,
	pub value: InputValue,
	pub timestamp: Timestamp,
}

impl InputFrame {
	/// Create a frame, rejecting device or control ids outside of 0-255.
	///
	/// No deduplication happens here; the receiver keeps the last write per key.
	pub fn new<D, C>(
		member: impl Into<String>,
		device: D,
		control: C,
		value: InputValue,
		timestamp: Timestamp,
	) -> Result<Self, InvalidId>
	where
		D: TryInto<DeviceId>,
		C: TryInto<ControlId>,
		InvalidId: From<D::Error> + From<C::Error>,
	{
		Ok(Self {
			member: member.into(),
			device: device.try_into().map_err(InvalidId::from)?,
			control: control.try_into().map_err(InvalidId::from)?,
			value,
			timestamp,
		})
	}

	fn encode_record<W: bytes::BufMut>(&self, w: &mut W) {
		self.member.encode(w);
		self.device.encode(w);
		self.control.encode(w);
		self.value.encode(w);
	}

	fn decode_record<R: bytes::Buf>(r: &mut R, timestamp: Timestamp) -> Result<Self, DecodeError> {
		Ok(Self {
			member: String::decode(r)?,
			device: DeviceId::decode(r)?,
			control: ControlId::decode(r)?,
			value: InputValue::decode(r)?,
			timestamp,
		})
	}
}

/// A standalone record carries its own timestamp.
impl Encode for InputFrame {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.encode_record(w);
		self.timestamp.encode(w);
	}
}

impl Decode for InputFrame {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let mut frame = Self::decode_record(r, Timestamp::ZERO)?;
		frame.timestamp = Timestamp::decode(r)?;
		Ok(frame)
	}
}

/// The frames of one send cycle, applied by receivers as a unit.
///
/// The shared timestamp is written once and restored into every frame on decode.
#[derive(Clone, Debug, PartialEq)]
pub struct InputBatch {
	/// The subgroup the sender was targeting.
	pub subgroup: Subgroup,

	/// The subgroup epoch of the receiving end, see [crate::Control::Subgroup].
	pub epoch: u64,

	/// Monotonically increasing per sending session.
	pub sequence: u64,

	pub timestamp: Timestamp,
	pub frames: Vec<InputFrame>,
}

impl InputBatch {
	pub fn new(subgroup: Subgroup, sequence: u64, timestamp: Timestamp) -> Self {
		Self {
			subgroup,
			epoch: 0,
			sequence,
			timestamp,
			frames: Vec::new(),
		}
	}

	pub fn len(&self) -> usize {
		self.frames.len()
	}

	pub fn is_empty(&self) -> bool {
		self.frames.is_empty()
	}
}

impl Encode for InputBatch {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.subgroup.encode(w);
		self.epoch.encode(w);
		self.sequence.encode(w);
		self.timestamp.encode(w);
		self.frames.len().encode(w);

		for frame in &self.frames {
			debug_assert_eq!(frame.timestamp, self.timestamp, "frame from another send cycle");
			frame.encode_record(w);
		}
	}
}

impl Decode for InputBatch {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let subgroup = Subgroup::decode(r)?;
		let epoch = u64::decode(r)?;
		let sequence = u64::decode(r)?;
		let timestamp = Timestamp::decode(r)?;
		let count = usize::decode(r)?;

		// The smallest record is an empty member name plus ids and a state value.
		if count > r.remaining() / 5 {
			return Err(DecodeError::Short);
		}

		let mut frames = Vec::with_capacity(count);
		for _ in 0..count {
			frames.push(InputFrame::decode_record(r, timestamp)?);
		}

		Ok(Self {
			subgroup,
			epoch,
			sequence,
			timestamp,
			frames,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{Vec2, ValueKind};

	fn frame(member: &str, device: u8, control: u8, value: InputValue, ts: i64) -> InputFrame {
		InputFrame::new(member, device as u32, control as u32, value, Timestamp::from_micros(ts)).unwrap()
	}

	#[test]
	fn test_new_rejects_out_of_range() {
		let ts = Timestamp::ZERO;
		assert_eq!(
			InputFrame::new("alice", 256u32, 0u32, InputValue::State(1), ts),
			Err(InvalidId(256))
		);
		assert_eq!(
			InputFrame::new("alice", 0i32, -3i32, InputValue::State(1), ts),
			Err(InvalidId(-3))
		);
	}

	#[test]
	fn test_record_shape() {
		let frame = frame("al", 3, 7, InputValue::ByteAxis(9), 100);
		let bytes = frame.encode_bytes();

		// member (len + 2 bytes), device, control, tag, value, timestamp
		assert_eq!(&bytes[..7], &[2, b'a', b'l', 3, 7, ValueKind::ByteAxis as u8, 9]);
		assert_eq!(bytes.len(), 7 + 8);
		assert_eq!(InputFrame::decode(&mut bytes.clone()).unwrap(), frame);
	}

	#[test]
	fn test_batch_shares_timestamp() {
		let mut batch = InputBatch::new(Subgroup(2), 11, Timestamp::from_micros(100));
		batch.epoch = 3;
		batch.frames.push(frame("alice", 0, 1, InputValue::Axis(0.5), 100));
		batch.frames.push(frame("alice", 0, 1, InputValue::Axis(0.75), 100));
		batch.frames.push(frame("alice", 1, 0, InputValue::Axis2D(Vec2::new(0.0, 1.0)), 100));

		let mut bytes = batch.encode_bytes();
		let decoded = InputBatch::decode(&mut bytes).unwrap();

		// Both updates of the same key survive, in order.
		assert_eq!(decoded, batch);
		assert!(decoded.frames.iter().all(|f| f.timestamp == decoded.timestamp));
		assert_eq!(decoded.frames[0].value, InputValue::Axis(0.5));
		assert_eq!(decoded.frames[1].value, InputValue::Axis(0.75));
	}

	#[test]
	fn test_batch_bogus_count() {
		let mut batch = InputBatch::new(Subgroup(0), 0, Timestamp::ZERO).encode_bytes().to_vec();
		// Replace the zero count with a large one-byte varint.
		*batch.last_mut().unwrap() = 63;

		let mut buf = &batch[..];
		assert_eq!(InputBatch::decode(&mut buf), Err(DecodeError::Short));
	}
}
