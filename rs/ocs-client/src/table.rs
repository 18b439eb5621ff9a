use std::collections::HashMap;
use std::sync::Arc;

use ocs_proto::{ControlId, DeviceId, Direction, InputBatch, InputFrame, InputValue, Timestamp};
use parking_lot::RwLock;

use crate::ClientStats;

/// The last applied value for a (member, device, control) key.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Entry {
	pub value: InputValue,
	pub timestamp: Timestamp,
}

type Controls = HashMap<(DeviceId, ControlId), Entry>;

#[derive(Default)]
struct Frames {
	// Written by incoming batches.
	latest: Arc<Controls>,

	// Captured by [MemberTable::update_frame] for edge queries.
	current: Arc<Controls>,
	previous: Arc<Controls>,

	// The most recent batch applied for this member.
	timestamp: Option<Timestamp>,
}

#[derive(Default)]
struct Member {
	frames: RwLock<Frames>,
}

/// The queryable input state of every member in the session.
///
/// Each member is locked independently, and a member's share of a batch is
/// installed under a single write so readers never see half a batch.
/// Snapshots are copy-on-write, so capturing a frame is a pointer copy.
#[derive(Clone)]
pub struct MemberTable {
	members: Arc<RwLock<HashMap<String, Arc<Member>>>>,
	axis_threshold: f32,
	direction_threshold: f32,
	stats: ClientStats,
}

impl MemberTable {
	pub fn new(axis_threshold: f32, direction_threshold: f32, stats: ClientStats) -> Self {
		Self {
			members: Default::default(),
			axis_threshold,
			direction_threshold,
			stats,
		}
	}

	fn member(&self, name: &str) -> Option<Arc<Member>> {
		self.members.read().get(name).cloned()
	}

	fn member_or_insert(&self, name: &str) -> Arc<Member> {
		if let Some(member) = self.member(name) {
			return member;
		}

		self.members.write().entry(name.to_string()).or_default().clone()
	}

	/// Apply a single frame, returning false if it was older than the stored value.
	pub fn apply(&self, frame: &InputFrame) -> bool {
		let member = self.member_or_insert(&frame.member);
		let mut frames = member.frames.write();

		frames.timestamp = Some(frames.timestamp.map_or(frame.timestamp, |ts| ts.max(frame.timestamp)));

		let applied = Self::write(Arc::make_mut(&mut frames.latest), frame);
		match applied {
			true => self.stats.record_frames_applied(1),
			false => self.stats.record_stale_frames(1),
		}

		applied
	}

	/// Apply every frame of a batch, in batch order.
	///
	/// Frames are grouped by member and each group becomes visible at once.
	/// Returns the number of frames that were not stale.
	pub fn apply_batch(&self, batch: &InputBatch) -> usize {
		let mut groups: Vec<(&str, Vec<&InputFrame>)> = Vec::new();
		for frame in &batch.frames {
			match groups.iter_mut().find(|(member, _)| *member == frame.member) {
				Some((_, frames)) => frames.push(frame),
				None => groups.push((frame.member.as_str(), vec![frame])),
			}
		}

		let mut applied = 0;
		let mut stale = 0;

		for (name, group) in groups {
			let member = self.member_or_insert(name);
			let mut frames = member.frames.write();

			frames.timestamp = Some(frames.timestamp.map_or(batch.timestamp, |ts| ts.max(batch.timestamp)));

			let latest = Arc::make_mut(&mut frames.latest);
			for frame in group {
				match Self::write(latest, frame) {
					true => applied += 1,
					false => stale += 1,
				}
			}
		}

		self.stats.inc_batches_applied();
		self.stats.record_frames_applied(applied as u64);

		if stale > 0 {
			tracing::trace!(stale, timestamp = %batch.timestamp, "dropped stale frames");
			self.stats.record_stale_frames(stale as u64);
		}

		applied
	}

	fn write(controls: &mut Controls, frame: &InputFrame) -> bool {
		let entry = Entry {
			value: frame.value,
			timestamp: frame.timestamp,
		};

		match controls.get_mut(&(frame.device, frame.control)) {
			Some(existing) if existing.timestamp > frame.timestamp => false,
			Some(existing) => {
				*existing = entry;
				true
			}
			None => {
				controls.insert((frame.device, frame.control), entry);
				true
			}
		}
	}

	/// The latest value of a control, or None if it was never observed.
	pub fn query(&self, member: &str, device: DeviceId, control: ControlId) -> Option<InputValue> {
		self.entry(member, device, control).map(|entry| entry.value)
	}

	/// The latest value of a control along with its timestamp.
	pub fn entry(&self, member: &str, device: DeviceId, control: ControlId) -> Option<Entry> {
		let member = self.member(member)?;
		let frames = member.frames.read();
		frames.latest.get(&(device, control)).copied()
	}

	/// The timestamp of the most recent batch applied for a member.
	pub fn last_timestamp(&self, member: &str) -> Option<Timestamp> {
		self.member(member)?.frames.read().timestamp
	}

	pub fn members(&self) -> Vec<String> {
		self.members.read().keys().cloned().collect()
	}

	pub fn contains(&self, member: &str) -> bool {
		self.members.read().contains_key(member)
	}

	/// Forget every member.
	pub fn clear(&self) {
		self.members.write().clear();
	}

	/// Capture the latest values as the current frame, used by the activity queries.
	///
	/// Called once per rendered frame; the previous capture becomes the previous frame.
	pub fn update_frame(&self) {
		let members: Vec<_> = self.members.read().values().cloned().collect();

		for member in members {
			let mut frames = member.frames.write();
			let latest = frames.latest.clone();
			frames.previous = std::mem::replace(&mut frames.current, latest);
		}
	}

	// Returns the value in the (current, previous) frame.
	fn captured(&self, member: &str, device: DeviceId, control: ControlId) -> (Option<InputValue>, Option<InputValue>) {
		let Some(member) = self.member(member) else {
			return (None, None);
		};

		let frames = member.frames.read();
		let key = (device, control);

		(
			frames.current.get(&key).map(|entry| entry.value),
			frames.previous.get(&key).map(|entry| entry.value),
		)
	}

	fn active(&self, value: Option<InputValue>) -> bool {
		value.is_some_and(|value| value.is_active(self.axis_threshold))
	}

	fn direction_active(&self, value: Option<InputValue>, direction: Direction) -> bool {
		value.is_some_and(|value| value.is_direction_active(direction, self.direction_threshold))
	}

	pub fn is_active(&self, member: &str, device: DeviceId, control: ControlId) -> bool {
		let (current, _) = self.captured(member, device, control);
		self.active(current)
	}

	pub fn is_direction_active(&self, member: &str, device: DeviceId, control: ControlId, direction: Direction) -> bool {
		let (current, _) = self.captured(member, device, control);
		self.direction_active(current, direction)
	}

	/// Active in the current frame but not in the previous one.
	pub fn activated(&self, member: &str, device: DeviceId, control: ControlId) -> bool {
		let (current, previous) = self.captured(member, device, control);
		self.active(current) && !self.active(previous)
	}

	pub fn activated_direction(&self, member: &str, device: DeviceId, control: ControlId, direction: Direction) -> bool {
		let (current, previous) = self.captured(member, device, control);
		self.direction_active(current, direction) && !self.direction_active(previous, direction)
	}

	/// Active in the previous frame but not in the current one.
	pub fn deactivated(&self, member: &str, device: DeviceId, control: ControlId) -> bool {
		let (current, previous) = self.captured(member, device, control);
		!self.active(current) && self.active(previous)
	}

	pub fn deactivated_direction(&self, member: &str, device: DeviceId, control: ControlId, direction: Direction) -> bool {
		let (current, previous) = self.captured(member, device, control);
		!self.direction_active(current, direction) && self.direction_active(previous, direction)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ocs_proto::{Subgroup, Vec2};

	const HAND: DeviceId = DeviceId(1);
	const TRIGGER: ControlId = ControlId(1);
	const STICK: ControlId = ControlId(2);

	fn table() -> MemberTable {
		MemberTable::new(0.1, 0.5, ClientStats::new())
	}

	fn frame(member: &str, control: ControlId, value: InputValue, ts: i64) -> InputFrame {
		InputFrame {
			member: member.to_string(),
			device: HAND,
			control,
			value,
			timestamp: Timestamp::from_micros(ts),
		}
	}

	fn batch(ts: i64, frames: Vec<InputFrame>) -> InputBatch {
		let mut batch = InputBatch::new(Subgroup(0), 0, Timestamp::from_micros(ts));
		batch.frames = frames;
		batch
	}

	#[test]
	fn test_monotonic_writes() {
		let table = table();
		for ts in 1..=5 {
			let value = InputValue::Axis(ts as f32 / 10.0);
			assert!(table.apply(&frame("alice", TRIGGER, value, ts)));
			assert_eq!(table.query("alice", HAND, TRIGGER), Some(value));
		}

		// Equal timestamps still overwrite.
		assert!(table.apply(&frame("alice", TRIGGER, InputValue::Axis(1.0), 5)));
		assert_eq!(table.query("alice", HAND, TRIGGER), Some(InputValue::Axis(1.0)));
	}

	#[test]
	fn test_stale_is_noop() {
		let table = table();
		table.apply(&frame("alice", TRIGGER, InputValue::Axis(0.5), 100));
		assert!(!table.apply(&frame("alice", TRIGGER, InputValue::Axis(0.9), 50)));

		let entry = table.entry("alice", HAND, TRIGGER).unwrap();
		assert_eq!(entry.value, InputValue::Axis(0.5));
		assert_eq!(entry.timestamp, Timestamp::from_micros(100));
		assert_eq!(table.stats.snapshot().stale_frames, 1);
	}

	#[test]
	fn test_unknown_is_none() {
		let table = table();
		assert_eq!(table.query("nobody", HAND, TRIGGER), None);

		table.apply(&frame("alice", TRIGGER, InputValue::State(1), 1));
		assert_eq!(table.query("alice", HAND, STICK), None);
		assert_eq!(table.query("alice", DeviceId(9), TRIGGER), None);
	}

	#[test]
	fn test_batch_last_write_wins() {
		let table = table();
		let applied = table.apply_batch(&batch(
			10,
			vec![
				frame("alice", TRIGGER, InputValue::Axis(0.1), 10),
				frame("bob", TRIGGER, InputValue::Axis(0.2), 10),
				frame("alice", TRIGGER, InputValue::Axis(0.3), 10),
			],
		));

		assert_eq!(applied, 3);
		assert_eq!(table.query("alice", HAND, TRIGGER), Some(InputValue::Axis(0.3)));
		assert_eq!(table.query("bob", HAND, TRIGGER), Some(InputValue::Axis(0.2)));
		assert_eq!(table.last_timestamp("alice"), Some(Timestamp::from_micros(10)));

		let mut members = table.members();
		members.sort();
		assert_eq!(members, ["alice", "bob"]);
	}

	#[test]
	fn test_batch_stale_per_key() {
		let table = table();
		table.apply_batch(&batch(100, vec![frame("alice", TRIGGER, InputValue::Axis(0.5), 100)]));

		let applied = table.apply_batch(&batch(
			50,
			vec![
				frame("alice", TRIGGER, InputValue::Axis(0.9), 50),
				frame("alice", STICK, InputValue::Axis2D(Vec2::new(0.0, 1.0)), 50),
			],
		));

		// Only the key without a newer value is written.
		assert_eq!(applied, 1);
		assert_eq!(table.query("alice", HAND, TRIGGER), Some(InputValue::Axis(0.5)));
		assert!(table.query("alice", HAND, STICK).is_some());
		assert_eq!(table.last_timestamp("alice"), Some(Timestamp::from_micros(100)));
	}

	#[test]
	fn test_clear() {
		let table = table();
		table.apply(&frame("alice", TRIGGER, InputValue::State(1), 1));
		assert!(table.contains("alice"));

		let clone = table.clone();
		clone.clear();
		assert_eq!(table.query("alice", HAND, TRIGGER), None);
		assert_eq!(table.last_timestamp("alice"), None);
		assert!(table.members().is_empty());
	}

	#[test]
	fn test_edges() {
		let table = table();
		table.apply(&frame("alice", TRIGGER, InputValue::State(1), 1));

		// Nothing is captured until the frame is updated.
		assert!(!table.is_active("alice", HAND, TRIGGER));

		table.update_frame();
		assert!(table.is_active("alice", HAND, TRIGGER));
		assert!(table.activated("alice", HAND, TRIGGER));
		assert!(!table.deactivated("alice", HAND, TRIGGER));

		table.update_frame();
		assert!(table.is_active("alice", HAND, TRIGGER));
		assert!(!table.activated("alice", HAND, TRIGGER));

		table.apply(&frame("alice", TRIGGER, InputValue::State(0), 2));
		table.update_frame();
		assert!(!table.is_active("alice", HAND, TRIGGER));
		assert!(table.deactivated("alice", HAND, TRIGGER));
	}

	#[test]
	fn test_direction_edges() {
		let table = table();
		table.apply(&frame("alice", STICK, InputValue::Axis2D(Vec2::new(0.0, 0.7)), 1));
		table.update_frame();

		assert!(table.is_direction_active("alice", HAND, STICK, Direction::Up));
		assert!(!table.is_direction_active("alice", HAND, STICK, Direction::Down));
		assert!(table.activated_direction("alice", HAND, STICK, Direction::Up));

		// Below the direction threshold but still an active axis.
		table.apply(&frame("alice", STICK, InputValue::Axis2D(Vec2::new(0.0, 0.3)), 2));
		table.update_frame();

		assert!(table.is_active("alice", HAND, STICK));
		assert!(table.deactivated_direction("alice", HAND, STICK, Direction::Up));
		assert!(!table.activated_direction("alice", HAND, STICK, Direction::Up));
	}

	#[test]
	fn test_snapshot_is_stable() {
		let table = table();
		table.apply(&frame("alice", TRIGGER, InputValue::State(1), 1));
		table.update_frame();

		// Writing after the capture doesn't leak into the captured frame.
		table.apply(&frame("alice", TRIGGER, InputValue::State(0), 2));
		assert!(table.is_active("alice", HAND, TRIGGER));
		assert_eq!(table.query("alice", HAND, TRIGGER), Some(InputValue::State(0)));
	}
}
