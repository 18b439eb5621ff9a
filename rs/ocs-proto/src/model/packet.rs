use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::coding::{Decode, DecodeError, Encode};
use crate::{AudioFormat, InputBatch, Subgroup, Timestamp, VideoFormat};

/// The first byte of every packet, used to demultiplex the streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PacketKind {
	Control = 0,
	Video = 1,
	Audio = 2,
	Input = 3,
}

/// Everything exchanged with the host.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
	Control(Control),
	Video(VideoSample),
	Audio(AudioPacket),
	Input(InputBatch),
}

impl Packet {
	pub fn kind(&self) -> PacketKind {
		match self {
			Self::Control(_) => PacketKind::Control,
			Self::Video(_) => PacketKind::Video,
			Self::Audio(_) => PacketKind::Audio,
			Self::Input(_) => PacketKind::Input,
		}
	}
}

impl Encode for Packet {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		u8::from(self.kind()).encode(w);

		match self {
			Self::Control(control) => control.encode(w),
			Self::Video(sample) => sample.encode(w),
			Self::Audio(packet) => packet.encode(w),
			Self::Input(batch) => batch.encode(w),
		}
	}
}

impl Decode for Packet {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let tag = u8::decode(r)?;
		let kind = PacketKind::try_from(tag).map_err(|_| DecodeError::InvalidMessage(tag.into()))?;

		let packet = match kind {
			PacketKind::Control => Self::Control(Control::decode(r)?),
			PacketKind::Video => Self::Video(VideoSample::decode(r)?),
			PacketKind::Audio => Self::Audio(AudioPacket::decode(r)?),
			PacketKind::Input => Self::Input(InputBatch::decode(r)?),
		};

		// A packet is exactly one message.
		if r.has_remaining() {
			return Err(DecodeError::Long);
		}

		Ok(packet)
	}
}

/// An encoded video sample, handed to the decoder untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoSample {
	pub subgroup: Subgroup,

	/// The subgroup epoch of the receiving end, see [Control::Subgroup].
	pub epoch: u64,

	pub timestamp: Timestamp,
	pub keyframe: bool,
	pub payload: Bytes,
}

impl Encode for VideoSample {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.subgroup.encode(w);
		self.epoch.encode(w);
		self.timestamp.encode(w);
		self.keyframe.encode(w);
		self.payload.encode(w);
	}
}

impl Decode for VideoSample {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			subgroup: Subgroup::decode(r)?,
			epoch: u64::decode(r)?,
			timestamp: Timestamp::decode(r)?,
			keyframe: bool::decode(r)?,
			payload: Bytes::decode(r)?,
		})
	}
}

/// A packet of PCM samples in the negotiated [AudioFormat].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioPacket {
	pub timestamp: Timestamp,
	pub payload: Bytes,
}

impl Encode for AudioPacket {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.timestamp.encode(w);
		self.payload.encode(w);
	}
}

impl Decode for AudioPacket {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			timestamp: Timestamp::decode(r)?,
			payload: Bytes::decode(r)?,
		})
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
enum ControlKind {
	Hello = 0,
	Welcome = 1,
	Play = 2,
	Stop = 3,
	Subgroup = 4,
	Join = 5,
	Leave = 6,
	Bye = 7,
}

/// Session signalling between the client and the host.
#[derive(Clone, Debug, PartialEq)]
pub enum Control {
	/// Sent by the client as soon as the transport is open.
	Hello {
		member: String,
		subgroup: Subgroup,
		/// The session options, as a JSON object.
		config: String,
	},

	/// Sent by the host to accept the session.
	Welcome {
		video: Option<VideoFormat>,
		audio: Option<AudioFormat>,
	},

	Play,
	Stop,

	/// The client now targets `subgroup`.
	///
	/// Every change carries a new epoch, starting from 0 at `Hello`. The host tags the input
	/// and video it forwards with the epoch it last saw, so the client can drop data that was
	/// sent before a change even if the subgroup id is the same again.
	Subgroup { subgroup: Subgroup, epoch: u64 },
	Join,
	Leave,

	/// Either side is closing the session.
	Bye { reason: String },
}

impl Control {
	fn kind(&self) -> ControlKind {
		match self {
			Self::Hello { .. } => ControlKind::Hello,
			Self::Welcome { .. } => ControlKind::Welcome,
			Self::Play => ControlKind::Play,
			Self::Stop => ControlKind::Stop,
			Self::Subgroup { .. } => ControlKind::Subgroup,
			Self::Join => ControlKind::Join,
			Self::Leave => ControlKind::Leave,
			Self::Bye { .. } => ControlKind::Bye,
		}
	}
}

impl Encode for Control {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		u8::from(self.kind()).encode(w);

		match self {
			Self::Hello {
				member,
				subgroup,
				config,
			} => {
				member.encode(w);
				subgroup.encode(w);
				config.encode(w);
			}
			Self::Welcome { video, audio } => {
				video.encode(w);
				audio.encode(w);
			}
			Self::Subgroup { subgroup, epoch } => {
				subgroup.encode(w);
				epoch.encode(w);
			}
			Self::Bye { reason } => reason.encode(w),
			Self::Play | Self::Stop | Self::Join | Self::Leave => {}
		}
	}
}

impl Decode for Control {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let tag = u8::decode(r)?;
		let kind = ControlKind::try_from(tag).map_err(|_| DecodeError::InvalidMessage(tag.into()))?;

		Ok(match kind {
			ControlKind::Hello => Self::Hello {
				member: String::decode(r)?,
				subgroup: Subgroup::decode(r)?,
				config: String::decode(r)?,
			},
			ControlKind::Welcome => Self::Welcome {
				video: Option::<VideoFormat>::decode(r)?,
				audio: Option::<AudioFormat>::decode(r)?,
			},
			ControlKind::Play => Self::Play,
			ControlKind::Stop => Self::Stop,
			ControlKind::Subgroup => Self::Subgroup {
				subgroup: Subgroup::decode(r)?,
				epoch: u64::decode(r)?,
			},
			ControlKind::Join => Self::Join,
			ControlKind::Leave => Self::Leave,
			ControlKind::Bye => Self::Bye {
				reason: String::decode(r)?,
			},
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{InputFrame, InputValue};

	#[test]
	fn test_demux_tags() {
		let video = Packet::Video(VideoSample {
			subgroup: Subgroup(1),
			epoch: 2,
			timestamp: Timestamp::from_micros(10),
			keyframe: true,
			payload: Bytes::from_static(b"nal"),
		});
		assert_eq!(video.encode_bytes()[0], 1);

		let audio = Packet::Audio(AudioPacket {
			timestamp: Timestamp::from_micros(10),
			payload: Bytes::from_static(&[0; 16]),
		});
		assert_eq!(audio.encode_bytes()[0], 2);

		for packet in [video, audio] {
			let mut bytes = packet.encode_bytes();
			assert_eq!(Packet::decode(&mut bytes).unwrap(), packet);
		}
	}

	#[test]
	fn test_unknown_packet() {
		let mut buf = &[9u8, 0, 0][..];
		assert_eq!(Packet::decode(&mut buf), Err(DecodeError::InvalidMessage(9)));

		let mut buf = &[0u8, 42][..];
		assert_eq!(Packet::decode(&mut buf), Err(DecodeError::InvalidMessage(42)));
	}

	#[test]
	fn test_trailing_bytes() {
		let mut bytes = Packet::Control(Control::Play).encode_bytes().to_vec();
		bytes.push(0);

		let mut buf = &bytes[..];
		assert_eq!(Packet::decode(&mut buf), Err(DecodeError::Long));
	}

	#[test]
	fn test_input_packet() {
		let ts = Timestamp::from_micros(100);
		let mut batch = InputBatch::new(Subgroup(0), 1, ts);
		batch
			.frames
			.push(InputFrame::new("alice", 0u32, 1u32, InputValue::Axis(0.5), ts).unwrap());

		let packet = Packet::Input(batch);
		let mut bytes = packet.encode_bytes();
		assert_eq!(Packet::decode(&mut bytes).unwrap(), packet);
	}

	#[test]
	fn test_subgroup_epoch() {
		let control = Packet::Control(Control::Subgroup {
			subgroup: Subgroup(3),
			epoch: 7,
		});

		let bytes = control.encode_bytes();
		assert_eq!(&bytes[..], &[0, 4, 3, 7]);
		assert_eq!(Packet::decode(&mut bytes.clone()).unwrap(), control);
	}

	#[test]
	fn test_welcome() {
		let welcome = Packet::Control(Control::Welcome {
			video: Some(VideoFormat {
				codec: "hvc1".to_string(),
				width: 3840,
				height: 1920,
				flipped: false,
				description: None,
			}),
			audio: None,
		});

		let mut bytes = welcome.encode_bytes();
		assert_eq!(Packet::decode(&mut bytes).unwrap(), welcome);
	}
}
