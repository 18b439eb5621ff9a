use bytes::Bytes;

use crate::coding::{Decode, DecodeError, Encode};

/// The negotiated video stream, sent by the host once connected.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VideoFormat {
	/// The codec string, ex. `hvc1` or `avc1.64001f`.
	pub codec: String,

	pub width: u32,
	pub height: u32,

	/// Whether the decoded image must be drawn upside down.
	pub flipped: bool,

	/// Codec specific initialization data, ex. the parameter sets.
	pub description: Option<Bytes>,
}

impl VideoFormat {
	/// The aspect ratio to hand to the renderer.
	pub fn aspect(&self) -> Option<f32> {
		match self.height {
			0 => None,
			height => Some(self.width as f32 / height as f32),
		}
	}
}

impl Encode for VideoFormat {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.codec.encode(w);
		self.width.encode(w);
		self.height.encode(w);
		self.flipped.encode(w);
		self.description.encode(w);
	}
}

impl Decode for VideoFormat {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			codec: String::decode(r)?,
			width: u32::decode(r)?,
			height: u32::decode(r)?,
			flipped: bool::decode(r)?,
			description: Option::<Bytes>::decode(r)?,
		})
	}
}

/// The negotiated PCM audio stream.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AudioFormat {
	pub codec: String,
	pub sample_rate: u32,
	pub channels: u32,
	pub bits_per_sample: u32,
}

impl Encode for AudioFormat {
	fn encode<W: bytes::BufMut>(&self, w: &mut W) {
		self.codec.encode(w);
		self.sample_rate.encode(w);
		self.channels.encode(w);
		self.bits_per_sample.encode(w);
	}
}

impl Decode for AudioFormat {
	fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			codec: String::decode(r)?,
			sample_rate: u32::decode(r)?,
			channels: u32::decode(r)?,
			bits_per_sample: u32::decode(r)?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_aspect() {
		let mut format = VideoFormat {
			codec: "hvc1".to_string(),
			width: 1920,
			height: 1080,
			flipped: false,
			description: None,
		};
		assert_eq!(format.aspect(), Some(1920.0 / 1080.0));

		format.height = 0;
		assert_eq!(format.aspect(), None);
	}

	#[test]
	fn test_description_survives() {
		let format = VideoFormat {
			codec: "avc1.64001f".to_string(),
			width: 1280,
			height: 720,
			flipped: true,
			description: Some(Bytes::from_static(&[0x01, 0x64, 0x00, 0x1f])),
		};

		let mut bytes = format.encode_bytes();
		assert_eq!(VideoFormat::decode(&mut bytes).unwrap(), format);
	}
}
