use std::sync::Arc;

use ocs_proto::{Timestamp, VideoFormat, VideoSample};
use parking_lot::Mutex;

use crate::{ClientStats, Error, GenerationSlab, Handle, Image, Message, MessageProducer, Renderer, VideoDecoder};

/// A decoded image, delivered through [Message::VideoReady].
#[derive(Clone, Debug)]
pub struct DecodedVideo {
	/// The request that produced this image.
	pub handle: Handle,
	pub timestamp: Timestamp,
	pub image: Image,

	/// Whether the image must be drawn upside down.
	pub flipped: bool,
}

struct Request {
	timestamp: Timestamp,
}

#[derive(Default)]
struct State {
	requests: GenerationSlab<Request>,
	flipped: bool,
	aspect: Option<f32>,
}

/// Sequences samples into the decoder and decoded images into the message queue.
///
/// Requests are tagged with a generation that advances on every session teardown and
/// subgroup change; callbacks that resolve after [DecodeOrchestrator::discard] are dropped and counted.
#[derive(Clone)]
pub struct DecodeOrchestrator {
	state: Arc<Mutex<State>>,
	queue: MessageProducer,
	stats: ClientStats,
}

impl DecodeOrchestrator {
	pub fn new(queue: MessageProducer, stats: ClientStats) -> Self {
		Self {
			state: Default::default(),
			queue,
			stats,
		}
	}

	/// Use the orientation and aspect ratio of a negotiated stream.
	pub fn configure(&self, format: &VideoFormat) {
		let mut state = self.state.lock();
		state.flipped = format.flipped;
		state.aspect = format.aspect();
	}

	/// The current generation, captured with each sample before it is queued for the decoder.
	pub fn generation(&self) -> u64 {
		self.state.lock().requests.generation()
	}

	/// Drop every in-flight request; their callbacks will be ignored.
	pub fn discard(&self) {
		let dropped = self.state.lock().requests.advance();
		if dropped > 0 {
			tracing::debug!(dropped, "discarding in-flight decodes");
		}
	}

	/// Forget the stream, discarding in-flight requests and the negotiated aspect ratio.
	pub fn reset(&self) {
		self.discard();
		self.state.lock().aspect = None;
	}

	/// The number of requests waiting on the decoder.
	pub fn in_flight(&self) -> usize {
		self.state.lock().requests.len()
	}

	/// Hand a sample to the decoder, unless `generation` was reset in the meantime.
	pub fn submit<D: VideoDecoder + ?Sized>(&self, decoder: &mut D, sample: VideoSample, generation: u64) -> Option<Handle> {
		let handle = {
			let mut state = self.state.lock();
			if state.requests.generation() != generation {
				self.stats.inc_stale_decodes();
				return None;
			}

			state.requests.insert(Request {
				timestamp: sample.timestamp,
			})
		};

		let callback = DecodeCallback {
			handle,
			orchestrator: Some(self.clone()),
		};

		// The decoder may resolve the callback before returning, so don't hold the lock.
		decoder.submit(sample, callback);

		Some(handle)
	}

	fn complete(&self, handle: Handle, result: anyhow::Result<Image>) {
		// Queue while locked so messages follow completion order.
		let mut state = self.state.lock();

		let Some(request) = state.requests.remove(handle) else {
			tracing::trace!(%handle, "dropping stale decode");
			self.stats.inc_stale_decodes();
			return;
		};

		let message = match result {
			Ok(image) => Message::VideoReady(DecodedVideo {
				handle,
				timestamp: request.timestamp,
				image,
				flipped: state.flipped,
			}),
			Err(err) => {
				tracing::debug!(%handle, timestamp = %request.timestamp, ?err, "decode failed");
				self.stats.inc_decode_failures();

				Message::VideoError {
					timestamp: request.timestamp,
					error: Error::DecodeFailed(Arc::new(err)),
				}
			}
		};

		self.queue.push(message);
	}

	fn cancel(&self, handle: Handle) {
		if self.state.lock().requests.remove(handle).is_some() {
			tracing::trace!(%handle, "decode cancelled");
		}
	}

	/// Upload and draw a decoded image.
	pub fn render<R: Renderer>(&self, renderer: &mut R, video: &DecodedVideo, target: &mut R::Target) {
		let aspect = self.state.lock().aspect;
		if let Some(aspect) = aspect {
			renderer.set_aspect(aspect);
		}

		renderer.upload_frame(&video.image);
		renderer.draw(target, video.flipped);
	}
}

/// Resolves one decode request, from any thread.
pub struct DecodeCallback {
	handle: Handle,
	orchestrator: Option<DecodeOrchestrator>,
}

impl DecodeCallback {
	pub fn handle(&self) -> Handle {
		self.handle
	}

	pub fn decoded(mut self, image: Image) {
		if let Some(orchestrator) = self.orchestrator.take() {
			orchestrator.complete(self.handle, Ok(image));
		}
	}

	pub fn failed(mut self, err: anyhow::Error) {
		if let Some(orchestrator) = self.orchestrator.take() {
			orchestrator.complete(self.handle, Err(err));
		}
	}
}

impl Drop for DecodeCallback {
	fn drop(&mut self) {
		if let Some(orchestrator) = self.orchestrator.take() {
			orchestrator.cancel(self.handle);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{MessageConsumer, MessageKind, queue};
	use bytes::Bytes;
	use ocs_proto::Subgroup;

	#[derive(Default)]
	struct Deferred {
		pending: Vec<(VideoSample, DecodeCallback)>,
	}

	impl VideoDecoder for Deferred {
		fn configure(&mut self, _format: &VideoFormat) -> anyhow::Result<()> {
			Ok(())
		}

		fn submit(&mut self, sample: VideoSample, callback: DecodeCallback) {
			self.pending.push((sample, callback));
		}
	}

	// Resolves immediately, failing empty samples.
	struct Inline;

	impl VideoDecoder for Inline {
		fn configure(&mut self, _format: &VideoFormat) -> anyhow::Result<()> {
			Ok(())
		}

		fn submit(&mut self, sample: VideoSample, callback: DecodeCallback) {
			match sample.payload.is_empty() {
				true => callback.failed(anyhow::anyhow!("empty sample")),
				false => callback.decoded(Arc::new(sample.payload)),
			}
		}
	}

	#[derive(Default)]
	struct Recorder {
		calls: Vec<String>,
	}

	impl Renderer for Recorder {
		type Target = Vec<u8>;

		fn upload_frame(&mut self, image: &Image) {
			let payload = image.downcast_ref::<Bytes>().unwrap();
			self.calls.push(format!("upload {}", payload.len()));
		}

		fn draw(&mut self, target: &mut Vec<u8>, flipped: bool) {
			target.push(1);
			self.calls.push(format!("draw {flipped}"));
		}

		fn set_aspect(&mut self, aspect: f32) {
			self.calls.push(format!("aspect {aspect}"));
		}
	}

	fn sample(ts: i64, payload: &'static [u8]) -> VideoSample {
		VideoSample {
			subgroup: Subgroup(0),
			epoch: 0,
			timestamp: Timestamp::from_micros(ts),
			keyframe: false,
			payload: Bytes::from_static(payload),
		}
	}

	fn setup() -> (DecodeOrchestrator, MessageConsumer, ClientStats) {
		let stats = ClientStats::new();
		let (producer, consumer) = queue(16, stats.clone());
		(DecodeOrchestrator::new(producer, stats.clone()), consumer, stats)
	}

	fn next_timestamp(consumer: &mut MessageConsumer) -> Option<(MessageKind, i64)> {
		let message = consumer.peek()?;
		let result = match message {
			Message::VideoReady(video) => (MessageKind::VideoReady, video.timestamp.as_micros()),
			Message::VideoError { timestamp, .. } => (MessageKind::VideoError, timestamp.as_micros()),
			other => panic!("unexpected {other:?}"),
		};
		consumer.pop();
		Some(result)
	}

	#[test]
	fn test_completion_order() {
		let (orchestrator, mut consumer, _) = setup();
		let mut decoder = Deferred::default();
		let generation = orchestrator.generation();

		orchestrator.submit(&mut decoder, sample(1, b"a"), generation).unwrap();
		orchestrator.submit(&mut decoder, sample(2, b"b"), generation).unwrap();
		assert_eq!(orchestrator.in_flight(), 2);

		// The decoder finishes out of order.
		let (_, second) = decoder.pending.pop().unwrap();
		let (_, first) = decoder.pending.pop().unwrap();
		second.decoded(Arc::new(Bytes::from_static(b"b")));
		first.failed(anyhow::anyhow!("corrupt"));

		assert_eq!(next_timestamp(&mut consumer), Some((MessageKind::VideoReady, 2)));
		assert_eq!(next_timestamp(&mut consumer), Some((MessageKind::VideoError, 1)));
		assert_eq!(orchestrator.in_flight(), 0);
	}

	#[test]
	fn test_reset_drops_late_callbacks() {
		let (orchestrator, mut consumer, stats) = setup();
		let mut decoder = Deferred::default();
		let generation = orchestrator.generation();

		orchestrator.submit(&mut decoder, sample(1, b"a"), generation).unwrap();
		orchestrator.reset();

		// A new session submits into the same slot.
		let next = orchestrator.generation();
		orchestrator.submit(&mut decoder, sample(2, b"b"), next).unwrap();

		let (_, late) = decoder.pending.remove(0);
		late.decoded(Arc::new(Bytes::from_static(b"a")));

		assert!(consumer.peek().is_none());
		assert_eq!(stats.snapshot().stale_decodes, 1);
		assert_eq!(orchestrator.in_flight(), 1);

		// Submitting with the old generation is refused.
		assert!(orchestrator.submit(&mut decoder, sample(3, b"c"), generation).is_none());
		assert_eq!(stats.snapshot().stale_decodes, 2);
	}

	#[test]
	fn test_dropped_callback() {
		let (orchestrator, mut consumer, _) = setup();
		let mut decoder = Deferred::default();
		let generation = orchestrator.generation();

		orchestrator.submit(&mut decoder, sample(1, b"a"), generation).unwrap();
		decoder.pending.clear();

		assert_eq!(orchestrator.in_flight(), 0);
		assert!(consumer.peek().is_none());
	}

	#[test]
	fn test_inline_decoder() {
		let (orchestrator, mut consumer, stats) = setup();
		let generation = orchestrator.generation();

		orchestrator.submit(&mut Inline, sample(1, b"abc"), generation).unwrap();
		orchestrator.submit(&mut Inline, sample(2, b""), generation).unwrap();

		assert_eq!(next_timestamp(&mut consumer), Some((MessageKind::VideoReady, 1)));
		assert_eq!(next_timestamp(&mut consumer), Some((MessageKind::VideoError, 2)));
		assert_eq!(stats.snapshot().decode_failures, 1);
	}

	#[test]
	fn test_render() {
		let (orchestrator, mut consumer, _) = setup();
		orchestrator.configure(&VideoFormat {
			codec: "hvc1".to_string(),
			width: 200,
			height: 100,
			flipped: true,
			description: None,
		});

		let generation = orchestrator.generation();
		orchestrator.submit(&mut Inline, sample(1, b"abc"), generation).unwrap();

		let message = consumer.peek().cloned();
		let Some(Message::VideoReady(video)) = message else {
			panic!("expected a decoded image");
		};

		let mut renderer = Recorder::default();
		let mut target = Vec::new();
		orchestrator.render(&mut renderer, &video, &mut target);

		assert_eq!(renderer.calls, ["aspect 2", "upload 3", "draw true"]);
		assert_eq!(target, [1]);
	}

	#[test]
	fn test_discard_keeps_format() {
		let (orchestrator, mut consumer, stats) = setup();
		orchestrator.configure(&VideoFormat {
			codec: "hvc1".to_string(),
			width: 200,
			height: 100,
			flipped: false,
			description: None,
		});

		let mut decoder = Deferred::default();
		let generation = orchestrator.generation();
		orchestrator.submit(&mut decoder, sample(1, b"a"), generation).unwrap();

		orchestrator.discard();
		assert_eq!(orchestrator.in_flight(), 0);

		let (_, late) = decoder.pending.remove(0);
		late.decoded(Arc::new(Bytes::from_static(b"a")));
		assert!(consumer.peek().is_none());
		assert_eq!(stats.snapshot().stale_decodes, 1);

		// The stream itself is unchanged.
		orchestrator.submit(&mut Inline, sample(2, b"b"), orchestrator.generation()).unwrap();
		let Some(Message::VideoReady(video)) = consumer.peek().cloned() else {
			panic!("expected a decoded image");
		};

		let mut renderer = Recorder::default();
		orchestrator.render(&mut renderer, &video, &mut Vec::new());
		assert_eq!(renderer.calls, ["aspect 2", "upload 1", "draw false"]);
	}
}
