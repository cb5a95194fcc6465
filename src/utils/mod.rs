
/// Fixed-capacity ring buffer that overwrites its oldest element when full.
/// Index 0 is always the oldest retained element.
pub struct CircularBuffer<T> {
	arena: Vec<T>,
	head: usize,
	capacity: usize,
}

impl<T> CircularBuffer<T> {

	pub fn with_capacity(capacity: usize) -> Self {
		assert!(capacity > 0, "capacity must be nonzero");
		Self { arena: Vec::with_capacity(capacity), head: 0, capacity }
	}

	pub fn capacity(&self) -> usize { self.capacity }
	pub fn len(&self) -> usize { self.arena.len() }
	pub fn is_empty(&self) -> bool { self.arena.is_empty() }
	pub fn is_full(&self) -> bool { self.arena.len() == self.capacity }

	pub fn push(&mut self, t: T) {
		if self.arena.len() < self.capacity {
			self.arena.push(t);
		} else {
			self.arena[self.head] = t;
			self.head = (self.head + 1) % self.capacity;
		}
	}

	pub fn at(&self, i: usize) -> Option<&T> {
		if i >= self.arena.len() { None } else {
			Some(&self.arena[(self.head + i) % self.capacity])
		}
	}

	/// Oldest retained element
	pub fn front(&self) -> Option<&T> { self.at(0) }

	/// Most recently pushed element
	pub fn back(&self) -> Option<&T> {
		if self.arena.is_empty() { None } else { self.at(self.arena.len() - 1) }
	}

	pub fn clear(&mut self) {
		self.arena.clear();
		self.head = 0;
	}

	pub fn iter(&self) -> impl Iterator<Item=&T> {
		(0..self.arena.len()).map(move |i| &self.arena[(self.head + i) % self.capacity])
	}

}
