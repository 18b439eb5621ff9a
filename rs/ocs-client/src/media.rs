//! Interfaces to the external media services.
//!
//! The client never decodes, plays or draws anything itself; it sequences calls into these.

use std::any::Any;
use std::sync::Arc;

use ocs_proto::{AudioFormat, AudioPacket, VideoFormat, VideoSample};

use crate::DecodeCallback;

/// A decoded image, owned by the decoder that produced it.
///
/// The renderer downcasts it to whatever its decoder produces.
pub type Image = Arc<dyn Any + Send + Sync>;

/// Decodes video samples asynchronously.
pub trait VideoDecoder: Send + 'static {
	fn configure(&mut self, format: &VideoFormat) -> anyhow::Result<()>;

	/// Start decoding a sample.
	///
	/// The callback must eventually be consumed, from any thread, exactly once;
	/// dropping it is treated as a cancelled decode.
	fn submit(&mut self, sample: VideoSample, callback: DecodeCallback);
}

/// Plays PCM packets in the order they are given.
pub trait AudioPlayer: Send + 'static {
	fn configure(&mut self, format: &AudioFormat) -> anyhow::Result<()>;

	fn play(&mut self, packet: AudioPacket);
}

/// Draws decoded images onto a surface.
pub trait Renderer {
	type Target;

	fn upload_frame(&mut self, image: &Image);
	fn draw(&mut self, target: &mut Self::Target, flipped: bool);
	fn set_aspect(&mut self, aspect: f32);
}

/// Whether this platform ships a hardware decoder for the streamed codecs.
pub const fn supports_hardware_video_codec() -> bool {
	cfg!(any(target_os = "macos", target_os = "ios", target_os = "android"))
}
