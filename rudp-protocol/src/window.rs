//! Fixed-capacity sliding window indexed by sequence number
//!
//! The window maps the range `[base_seq, base_seq + capacity)` onto a ring of
//! slots: sequence number `s` always lives at index `s % capacity`. Each slot
//! is tagged with the sequence number that last reserved it, so a slot left
//! behind by [`SlidingWindow::advance_to`] is simply treated as absent once
//! its tag falls out of range. Storage is allocated once and never grows.

/// A ring slot: the tag of the sequence number stored here plus its value
#[derive(Debug, Clone, Default)]
struct Slot<T> {
    tag: Option<u32>,
    value: T,
}

/// Sequence-indexed circular container
#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    slots: Box<[Slot<T>]>,
    base_seq: u32,
    /// Index of `base_seq` in `slots`
    base: usize,
}

impl<T: Default> SlidingWindow<T> {
    /// Create a new window
    ///
    /// # Panics
    /// Panics if `capacity` is zero
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Sliding window capacity must be non-zero");

        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);

        SlidingWindow {
            slots: slots.into_boxed_slice(),
            base_seq: 0,
            base: 0,
        }
    }
}

impl<T> SlidingWindow<T> {
    /// Number of slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Lowest sequence number currently representable
    #[inline]
    pub fn base_seq(&self) -> u32 {
        self.base_seq
    }

    /// Ring index of `base_seq`
    #[inline]
    pub fn base_index(&self) -> usize {
        self.base
    }

    #[inline]
    fn index_of(&self, seq: u32) -> usize {
        seq as usize % self.slots.len()
    }

    /// Check whether `seq` falls inside `[base_seq, base_seq + capacity)`
    #[inline]
    pub fn in_bounds(&self, seq: u32) -> bool {
        seq >= self.base_seq && ((seq - self.base_seq) as usize) < self.slots.len()
    }

    /// Claim the slot for `seq` and return its value.
    ///
    /// Returns `None` if `seq` is outside the window. The previous value of
    /// the slot is left in place for the caller to overwrite.
    pub fn reserve(&mut self, seq: u32) -> Option<&mut T> {
        if !self.in_bounds(seq) {
            return None;
        }
        let idx = self.index_of(seq);
        let slot = &mut self.slots[idx];
        slot.tag = Some(seq);
        Some(&mut slot.value)
    }

    /// Check if `seq` is in range and currently stored
    pub fn contains(&self, seq: u32) -> bool {
        self.in_bounds(seq) && self.slots[self.index_of(seq)].tag == Some(seq)
    }

    /// Get the value stored for `seq`
    pub fn get(&self, seq: u32) -> Option<&T> {
        if !self.in_bounds(seq) {
            return None;
        }
        let slot = &self.slots[self.index_of(seq)];
        (slot.tag == Some(seq)).then_some(&slot.value)
    }

    /// Get the value stored for `seq` mutably
    pub fn get_mut(&mut self, seq: u32) -> Option<&mut T> {
        if !self.in_bounds(seq) {
            return None;
        }
        let idx = self.index_of(seq);
        let slot = &mut self.slots[idx];
        if slot.tag == Some(seq) {
            Some(&mut slot.value)
        } else {
            None
        }
    }

    /// Invalidate the slot for `seq`. Returns `false` if `seq` is out of range.
    pub fn erase(&mut self, seq: u32) -> bool {
        if !self.in_bounds(seq) {
            return false;
        }
        let idx = self.index_of(seq);
        self.slots[idx].tag = None;
        true
    }

    /// Move the window forward so that `seq` becomes the base.
    ///
    /// Returns `false` without changing anything if `seq <= base_seq`.
    pub fn advance_to(&mut self, seq: u32) -> bool {
        if seq <= self.base_seq {
            return false;
        }
        self.base_seq = seq;
        self.base = self.index_of(seq);
        true
    }

    /// Reset to the initial empty state
    pub fn clear(&mut self) {
        self.base_seq = 0;
        self.base = 0;
        for slot in self.slots.iter_mut() {
            slot.tag = None;
        }
    }
}
