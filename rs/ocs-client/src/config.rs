use std::time::Duration;

use ocs_proto::Subgroup;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// Local settings of a [crate::Client], independent of any session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClientConfig {
	/// The name of the local member, announced in the handshake.
	pub member: String,

	/// The subgroup targeted when a session starts.
	pub subgroup: Subgroup,

	/// The number of queued messages before per-sample messages are evicted.
	pub queue_capacity: usize,

	/// How long to wait for the transport and the host's welcome.
	#[serde(with = "humantime_serde")]
	pub connect_timeout: Duration,

	/// Input send cycles per second.
	pub send_rate: f32,

	/// The magnitude at which float and 2D axes count as active.
	pub axis_threshold: f32,

	/// The offset at which a 2D axis counts as pointing in a direction.
	pub direction_threshold: f32,

	/// The number of media samples buffered per stream before dropping.
	pub media_buffer: usize,

	/// The number of outgoing packets buffered while the transport is busy.
	pub send_buffer: usize,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			member: "local".to_string(),
			subgroup: Subgroup(0),
			queue_capacity: 64,
			connect_timeout: Duration::from_secs(10),
			send_rate: 90.0,
			axis_threshold: 0.1,
			direction_threshold: 0.5,
			media_buffer: 32,
			send_buffer: 64,
		}
	}
}

/// Arbitrary session options forwarded to the host, ex. resolution or bitrate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionConfig(Map<String, Value>);

impl SessionConfig {
	pub const WIDTH: &str = "width";
	pub const HEIGHT: &str = "height";
	pub const BITRATE: &str = "bitrate";
	pub const FRAME_RATE: &str = "frame_rate";
	pub const LICENSE: &str = "license";

	pub fn new() -> Self {
		Self::default()
	}

	/// Parse a JSON object.
	pub fn from_json(json: &str) -> Result<Self, Error> {
		Ok(serde_json::from_str(json)?)
	}

	pub fn to_json(&self) -> String {
		Value::Object(self.0.clone()).to_string()
	}

	pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.set(key, value);
		self
	}

	pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
		self.0.insert(key.into(), value.into());
		self
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn resolution(&self) -> Option<(u32, u32)> {
		let width = self.get_u32(Self::WIDTH)?;
		let height = self.get_u32(Self::HEIGHT)?;
		Some((width, height))
	}

	pub fn bitrate(&self) -> Option<u64> {
		self.get(Self::BITRATE)?.as_u64()
	}

	pub fn frame_rate(&self) -> Option<f64> {
		self.get(Self::FRAME_RATE)?.as_f64()
	}

	pub fn license(&self) -> Option<&str> {
		self.get(Self::LICENSE)?.as_str()
	}

	fn get_u32(&self, key: &str) -> Option<u32> {
		u32::try_from(self.get(key)?.as_u64()?).ok()
	}
}
