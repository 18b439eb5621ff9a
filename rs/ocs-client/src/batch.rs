use std::collections::HashMap;
use std::sync::Arc;

use ocs_proto::{ControlId, DeviceId, InputFrame, InputValue, InvalidId, Timestamp};
use parking_lot::Mutex;

use crate::Error;

/// When a pended value is worth sending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SendPolicy {
	/// Never send the value.
	Never,

	/// Send every value.
	#[default]
	Always,

	/// Send only if it differs from the last value sent for the control.
	OnChange,

	/// Send active values, and the first inactive value after them.
	NonzeroAlwaysZeroOnce,
}

#[derive(Default)]
struct State {
	// The token of the open batch, if any.
	timestamp: Option<Timestamp>,

	// The last token handed out, so tokens strictly increase.
	issued: Option<Timestamp>,

	frames: Vec<InputFrame>,

	// The last value accepted per control, used by the send policies.
	history: HashMap<(DeviceId, ControlId), InputValue>,
}

/// Accumulates local input between two send cycles.
///
/// Any thread may append; each append takes a short exclusive section.
#[derive(Clone)]
pub struct PendingBatch {
	state: Arc<Mutex<State>>,
	member: Arc<str>,
	threshold: f32,
}

impl PendingBatch {
	/// `threshold` decides which values count as active for [SendPolicy::NonzeroAlwaysZeroOnce].
	pub fn new(member: impl Into<Arc<str>>, threshold: f32) -> Self {
		Self {
			state: Default::default(),
			member: member.into(),
			threshold,
		}
	}

	/// Start a new batch and return its token, discarding any unsent batch.
	pub fn begin(&self) -> Timestamp {
		let mut state = self.state.lock();

		let now = Timestamp::now();
		let timestamp = match state.issued {
			Some(issued) => now.max(issued.next()),
			None => now,
		};

		if !state.frames.is_empty() {
			tracing::debug!(count = state.frames.len(), "discarding unsent batch");
		}

		state.issued = Some(timestamp);
		state.timestamp = Some(timestamp);
		state.frames.clear();

		timestamp
	}

	/// Append a frame to the open batch.
	pub fn append<D, C>(&self, device: D, control: C, value: InputValue) -> Result<(), Error>
	where
		D: TryInto<DeviceId>,
		C: TryInto<ControlId>,
		InvalidId: From<D::Error> + From<C::Error>,
	{
		self.append_with_policy(device, control, value, SendPolicy::Always)
			.map(|_| ())
	}

	/// Append a frame if `policy` says it is worth sending, returning whether it was kept.
	pub fn append_with_policy<D, C>(&self, device: D, control: C, value: InputValue, policy: SendPolicy) -> Result<bool, Error>
	where
		D: TryInto<DeviceId>,
		C: TryInto<ControlId>,
		InvalidId: From<D::Error> + From<C::Error>,
	{
		let device = device.try_into().map_err(InvalidId::from)?;
		let control = control.try_into().map_err(InvalidId::from)?;

		let mut state = self.state.lock();
		let timestamp = state.timestamp.ok_or(Error::NoBatch)?;

		let last = state.history.get(&(device, control));
		let keep = match policy {
			SendPolicy::Never => false,
			SendPolicy::Always => true,
			SendPolicy::OnChange => last != Some(&value),
			SendPolicy::NonzeroAlwaysZeroOnce => {
				value.is_active(self.threshold) || last.is_some_and(|last| last.is_active(self.threshold))
			}
		};

		if !keep {
			return Ok(false);
		}

		state.history.insert((device, control), value);
		state.frames.push(InputFrame {
			member: self.member.to_string(),
			device,
			control,
			value,
			timestamp,
		});

		Ok(true)
	}

	/// Remove and return the frames of the batch opened with `timestamp`.
	///
	/// A mismatched token leaves the batch untouched.
	pub fn take(&self, timestamp: Timestamp) -> Result<Vec<InputFrame>, Error> {
		let mut state = self.state.lock();

		match state.timestamp {
			None => Err(Error::NoBatch),
			Some(expected) if expected != timestamp => Err(Error::StaleBatch {
				expected,
				got: timestamp,
			}),
			Some(_) => {
				state.timestamp = None;
				Ok(std::mem::take(&mut state.frames))
			}
		}
	}

	/// The number of frames waiting to be sent.
	pub fn len(&self) -> usize {
		self.state.lock().frames.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Drop the open batch and the policy history.
	pub fn clear(&self) {
		let mut state = self.state.lock();
		state.timestamp = None;
		state.frames.clear();
		state.history.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn batch() -> PendingBatch {
		PendingBatch::new("alice", 0.1)
	}

	#[tokio::test(start_paused = true)]
	async fn test_begin_increases() {
		let batch = batch();
		let a = batch.begin();
		let b = batch.begin();
		assert!(b > a);

		tokio::time::advance(std::time::Duration::from_secs(1)).await;
		let c = batch.begin();
		assert!(c.as_micros() >= b.as_micros() + 1_000_000 - 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_take_in_order() {
		let batch = batch();
		let ts = batch.begin();
		for i in 0..5 {
			batch.append(0, i, InputValue::ByteAxis(i as u8)).unwrap();
		}
		assert_eq!(batch.len(), 5);

		let frames = batch.take(ts).unwrap();
		assert_eq!(frames.len(), 5);
		assert!(batch.is_empty());

		for (i, frame) in frames.iter().enumerate() {
			assert_eq!(frame.member, "alice");
			assert_eq!(frame.control, ControlId(i as u8));
			assert_eq!(frame.value, InputValue::ByteAxis(i as u8));
			assert_eq!(frame.timestamp, ts);
		}

		// The batch is single-shot.
		assert!(matches!(batch.take(ts), Err(Error::NoBatch)));
	}

	#[tokio::test(start_paused = true)]
	async fn test_stale_token() {
		let batch = batch();
		let old = batch.begin();
		let ts = batch.begin();
		batch.append(0, 0, InputValue::State(1)).unwrap();

		match batch.take(old) {
			Err(Error::StaleBatch { expected, got }) => {
				assert_eq!(expected, ts);
				assert_eq!(got, old);
			}
			other => panic!("unexpected {other:?}"),
		}

		// Untouched.
		assert_eq!(batch.len(), 1);
		assert_eq!(batch.take(ts).unwrap().len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_begin_discards() {
		let batch = batch();
		batch.begin();
		batch.append(0, 0, InputValue::State(1)).unwrap();

		let ts = batch.begin();
		assert!(batch.is_empty());
		assert!(batch.take(ts).unwrap().is_empty());
	}

	#[test]
	fn test_no_batch() {
		let batch = batch();
		assert!(matches!(batch.append(0, 0, InputValue::State(1)), Err(Error::NoBatch)));
	}

	#[tokio::test(start_paused = true)]
	async fn test_invalid_id() {
		let batch = batch();
		batch.begin();

		assert!(matches!(
			batch.append(300, 0, InputValue::State(1)),
			Err(Error::InvalidId(InvalidId(300)))
		));
		assert!(matches!(
			batch.append(0, -1, InputValue::State(1)),
			Err(Error::InvalidId(InvalidId(-1)))
		));
		assert!(batch.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_concurrent_appends() {
		let batch = batch();
		let ts = batch.begin();

		std::thread::scope(|scope| {
			for device in 0..4 {
				let batch = batch.clone();
				scope.spawn(move || {
					for control in 0..25 {
						batch.append(device, control, InputValue::State(1)).unwrap();
					}
				});
			}
		});

		assert_eq!(batch.take(ts).unwrap().len(), 100);
	}

	#[tokio::test(start_paused = true)]
	async fn test_policies() {
		let batch = batch();
		let ts = batch.begin();

		let pend = |value, policy| batch.append_with_policy(0, 0, value, policy).unwrap();

		assert!(!pend(InputValue::State(1), SendPolicy::Never));

		// Nothing to follow up on yet.
		assert!(!pend(InputValue::State(0), SendPolicy::NonzeroAlwaysZeroOnce));
		assert!(pend(InputValue::State(1), SendPolicy::NonzeroAlwaysZeroOnce));
		assert!(pend(InputValue::State(1), SendPolicy::NonzeroAlwaysZeroOnce));
		assert!(pend(InputValue::State(0), SendPolicy::NonzeroAlwaysZeroOnce));
		assert!(!pend(InputValue::State(0), SendPolicy::NonzeroAlwaysZeroOnce));

		assert!(!pend(InputValue::State(0), SendPolicy::OnChange));
		assert!(pend(InputValue::State(2), SendPolicy::OnChange));
		assert!(!pend(InputValue::State(2), SendPolicy::OnChange));
		assert!(pend(InputValue::State(2), SendPolicy::Always));

		assert_eq!(batch.take(ts).unwrap().len(), 5);

		// History survives send cycles but not a clear.
		batch.clear();
		batch.begin();
		assert!(batch.append_with_policy(0, 0, InputValue::State(2), SendPolicy::OnChange).unwrap());
	}
}
