use std::num::NonZero;

/// A non-owning reference to an in-flight request, tagged with the generation it was issued in.
///
/// Handles from a previous generation never resolve, even if their slot was reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
	index: NonZero<usize>,
	generation: u64,
}

impl Handle {
	pub fn generation(&self) -> u64 {
		self.generation
	}
}

impl std::fmt::Display for Handle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}@{}", self.index.get(), self.generation)
	}
}

// We purposely don't return 0 for slab indexes.
pub(crate) struct GenerationSlab<T> {
	slab: slab::Slab<(u64, T)>,
	generation: u64,
}

impl<T> GenerationSlab<T> {
	pub fn insert(&mut self, value: T) -> Handle {
		let index = self.slab.insert((self.generation, value));
		Handle {
			index: NonZero::<usize>::MIN.saturating_add(index),
			generation: self.generation,
		}
	}

	pub fn remove(&mut self, handle: Handle) -> Option<T> {
		let index = handle.index.get() - 1;
		match self.slab.get(index) {
			Some((generation, _)) if *generation == handle.generation => self.slab.try_remove(index).map(|(_, v)| v),
			_ => None,
		}
	}

	/// Invalidate every outstanding handle, returning how many were dropped.
	pub fn advance(&mut self) -> usize {
		let dropped = self.slab.len();
		self.slab.clear();
		self.generation += 1;
		dropped
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn len(&self) -> usize {
		self.slab.len()
	}
}

impl<T> Default for GenerationSlab<T> {
	fn default() -> Self {
		Self {
			slab: slab::Slab::new(),
			generation: 0,
		}
	}
}
