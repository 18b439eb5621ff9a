use std::collections::VecDeque;
use std::sync::Arc;

use ocs_proto::{AudioFormat, Timestamp, VideoFormat};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{ClientStats, DecodedVideo, Error};

/// A notification for the embedding application, polled once per frame.
#[derive(Clone, Debug)]
pub enum Message {
	/// The host accepted the session.
	Connected {
		video: Option<VideoFormat>,
		audio: Option<AudioFormat>,
	},

	/// The session ended, locally or not.
	Disconnected { reason: Error },

	PlayStateChanged(bool),

	/// A decoded image is ready to render.
	VideoReady(DecodedVideo),

	/// A sample could not be decoded; the session continues.
	VideoError { timestamp: Timestamp, error: Error },

	/// An audio packet was handed to the player.
	AudioReady { timestamp: Timestamp },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
	Connected,
	Disconnected,
	PlayStateChanged,
	VideoReady,
	VideoError,
	AudioReady,
}

impl Message {
	pub fn kind(&self) -> MessageKind {
		match self {
			Self::Connected { .. } => MessageKind::Connected,
			Self::Disconnected { .. } => MessageKind::Disconnected,
			Self::PlayStateChanged(_) => MessageKind::PlayStateChanged,
			Self::VideoReady(_) => MessageKind::VideoReady,
			Self::VideoError { .. } => MessageKind::VideoError,
			Self::AudioReady { .. } => MessageKind::AudioReady,
		}
	}

	/// Per-sample messages may be evicted when the consumer falls behind.
	pub fn is_per_sample(&self) -> bool {
		matches!(
			self,
			Self::VideoReady(_) | Self::VideoError { .. } | Self::AudioReady { .. }
		)
	}
}

struct Queue {
	messages: VecDeque<Message>,
	capacity: usize,
}

/// Create a message queue holding up to `capacity` messages before evicting per-sample messages.
pub fn queue(capacity: usize, stats: ClientStats) -> (MessageProducer, MessageConsumer) {
	let queue = Arc::new(Mutex::new(Queue {
		messages: VecDeque::new(),
		capacity: capacity.max(1),
	}));
	let notify = Arc::new(Notify::new());

	let producer = MessageProducer {
		queue: queue.clone(),
		notify: notify.clone(),
		stats,
	};

	let consumer = MessageConsumer {
		queue,
		notify,
		peeked: None,
	};

	(producer, consumer)
}

/// The producing half, used by the network and decode contexts.
#[derive(Clone)]
pub struct MessageProducer {
	queue: Arc<Mutex<Queue>>,
	notify: Arc<Notify>,
	stats: ClientStats,
}

impl MessageProducer {
	/// Queue a message without blocking.
	///
	/// When the queue is full, a per-sample message (video, decode error or audio) evicts
	/// the oldest queued per-sample message, or is dropped itself if there is none.
	/// Lifecycle messages are always queued.
	pub fn push(&self, message: Message) {
		let mut queue = self.queue.lock();

		if message.is_per_sample() && queue.messages.len() >= queue.capacity {
			match queue.messages.iter().position(Message::is_per_sample) {
				Some(index) => {
					queue.messages.remove(index);
				}
				None => {
					tracing::trace!(kind = ?message.kind(), "queue full, dropping message");
					self.stats.inc_messages_dropped();
					return;
				}
			}

			tracing::trace!("queue full, evicted oldest per-sample message");
			self.stats.inc_messages_dropped();
		}

		queue.messages.push_back(message);
		drop(queue);

		self.notify.notify_one();
	}
}

/// The consuming half, polled by the frame loop.
pub struct MessageConsumer {
	queue: Arc<Mutex<Queue>>,
	notify: Arc<Notify>,

	// The message returned by peek, owned here until it is popped.
	peeked: Option<Message>,
}

impl MessageConsumer {
	/// Return the oldest message without removing it.
	///
	/// Repeated calls return the same message until [Self::pop].
	pub fn peek(&mut self) -> Option<&Message> {
		if self.peeked.is_none() {
			self.peeked = self.queue.lock().messages.pop_front();
		}

		self.peeked.as_ref()
	}

	/// Remove the message returned by the last [Self::peek].
	///
	/// Without a preceding peek this does nothing and returns None.
	pub fn pop(&mut self) -> Option<Message> {
		self.peeked.take()
	}

	/// Wait for the next message and remove it.
	pub async fn next(&mut self) -> Message {
		loop {
			if let Some(message) = self.peeked.take() {
				return message;
			}

			if let Some(message) = self.queue.lock().messages.pop_front() {
				return message;
			}

			// A push stores a permit, so one made before this point isn't missed.
			self.notify.notified().await;
		}
	}

	/// The number of unconsumed messages, including a peeked one.
	pub fn len(&self) -> usize {
		self.queue.lock().messages.len() + usize::from(self.peeked.is_some())
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use std::any::Any;

	use super::*;
	use crate::GenerationSlab;

	fn video(ts: i64) -> Message {
		Message::VideoReady(DecodedVideo {
			handle: GenerationSlab::default().insert(()),
			timestamp: Timestamp::from_micros(ts),
			image: Arc::new(ts) as Arc<dyn Any + Send + Sync>,
			flipped: false,
		})
	}

	fn timestamp(message: &Message) -> i64 {
		match message {
			Message::VideoReady(video) => video.timestamp.as_micros(),
			Message::AudioReady { timestamp } => timestamp.as_micros(),
			other => panic!("unexpected {other:?}"),
		}
	}

	#[test]
	fn test_peek_is_idempotent() {
		let (producer, mut consumer) = queue(8, ClientStats::new());
		producer.push(Message::PlayStateChanged(true));
		producer.push(Message::PlayStateChanged(false));

		assert!(matches!(consumer.peek(), Some(Message::PlayStateChanged(true))));
		assert!(matches!(consumer.peek(), Some(Message::PlayStateChanged(true))));
		assert!(matches!(consumer.pop(), Some(Message::PlayStateChanged(true))));
		assert!(matches!(consumer.peek(), Some(Message::PlayStateChanged(false))));
	}

	#[test]
	fn test_pop_without_peek() {
		let (producer, mut consumer) = queue(8, ClientStats::new());
		producer.push(Message::PlayStateChanged(true));

		assert!(consumer.pop().is_none());
		assert_eq!(consumer.len(), 1);

		consumer.peek();
		assert!(consumer.pop().is_some());
		assert!(consumer.pop().is_none());
		assert!(consumer.is_empty());
	}

	#[test]
	fn test_fifo_across_producers() {
		let (producer, mut consumer) = queue(8, ClientStats::new());
		let decoder = producer.clone();

		producer.push(Message::Connected { video: None, audio: None });
		decoder.push(video(1));
		decoder.push(video(2));

		let mut kinds = Vec::new();
		while let Some(message) = consumer.peek() {
			kinds.push(message.kind());
			consumer.pop();
		}

		assert_eq!(
			kinds,
			[MessageKind::Connected, MessageKind::VideoReady, MessageKind::VideoReady]
		);
	}

	#[test]
	fn test_backpressure_evicts_media() {
		let stats = ClientStats::new();
		let (producer, mut consumer) = queue(3, stats.clone());

		producer.push(Message::Connected { video: None, audio: None });
		producer.push(video(1));
		producer.push(video(2));
		producer.push(video(3));
		producer.push(Message::PlayStateChanged(true));

		assert_eq!(stats.snapshot().messages_dropped, 1);
		assert_eq!(consumer.len(), 4);

		assert_eq!(consumer.peek().map(Message::kind), Some(MessageKind::Connected));
		consumer.pop();
		assert_eq!(consumer.peek().map(timestamp), Some(2));
		consumer.pop();
		assert_eq!(consumer.peek().map(timestamp), Some(3));
		consumer.pop();
		assert_eq!(consumer.peek().map(Message::kind), Some(MessageKind::PlayStateChanged));
	}

	#[test]
	fn test_lifecycle_never_dropped() {
		let stats = ClientStats::new();
		let (producer, consumer) = queue(1, stats.clone());

		producer.push(Message::PlayStateChanged(true));
		producer.push(Message::PlayStateChanged(false));
		producer.push(Message::AudioReady {
			timestamp: Timestamp::ZERO,
		});

		// The audio message had nothing to evict.
		assert_eq!(consumer.len(), 2);
		assert_eq!(stats.snapshot().messages_dropped, 1);
	}

	#[test]
	fn test_backpressure_evicts_errors() {
		let stats = ClientStats::new();
		let (producer, mut consumer) = queue(4, stats.clone());

		producer.push(Message::Connected { video: None, audio: None });

		for ts in 0..1000 {
			producer.push(Message::VideoError {
				timestamp: Timestamp::from_micros(ts),
				error: Error::Closed,
			});
		}

		producer.push(Message::Disconnected { reason: Error::Closed });

		assert_eq!(consumer.len(), 5);
		assert_eq!(stats.snapshot().messages_dropped, 997);

		assert_eq!(consumer.peek().map(Message::kind), Some(MessageKind::Connected));
		consumer.pop();

		for expected in 997..1000 {
			match consumer.peek() {
				Some(Message::VideoError { timestamp, .. }) => assert_eq!(timestamp.as_micros(), expected),
				other => panic!("unexpected {other:?}"),
			}
			consumer.pop();
		}

		assert_eq!(consumer.peek().map(Message::kind), Some(MessageKind::Disconnected));
	}

	#[test]
	fn test_peeked_survives_eviction() {
		let (producer, mut consumer) = queue(1, ClientStats::new());
		producer.push(video(1));
		assert_eq!(consumer.peek().map(timestamp), Some(1));

		// The peeked message is owned by the consumer and can't be evicted.
		producer.push(video(2));
		producer.push(video(3));
		assert_eq!(consumer.pop().as_ref().map(timestamp), Some(1));

		consumer.peek();
		assert_eq!(consumer.pop().as_ref().map(timestamp), Some(3));
	}

	#[tokio::test]
	async fn test_next_waits() {
		let (producer, mut consumer) = queue(8, ClientStats::new());

		let task = tokio::spawn(async move { consumer.next().await });
		tokio::task::yield_now().await;

		producer.push(Message::PlayStateChanged(true));
		assert!(matches!(task.await.unwrap(), Message::PlayStateChanged(true)));
	}
}
