//! Slot allocator
//!
//! A growable array of slots plus a free list. Freed slots are reused
//! most-recently-freed first (the free list is a stack), which keeps hot rows
//! clustered at the front of the array. The backing array only grows when the
//! free list is empty and never shrinks.

/// Arena of values addressed by stable slot ids.
#[derive(Debug)]
pub struct SlotAllocator<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
    live: usize,
}

impl<T> Default for SlotAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotAllocator<T> {
    /// Create an empty allocator.
    pub fn new() -> Self {
        SlotAllocator {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Store `value` and return its slot id.
    pub fn alloc(&mut self, value: T) -> usize {
        self.alloc_with(|_| value)
    }

    /// Store the value built by `make` from the id it will occupy.
    ///
    /// Lets the stored value carry its own slot id.
    pub fn alloc_with(&mut self, make: impl FnOnce(usize) -> T) -> usize {
        self.live += 1;
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(make(id));
                id
            }
            None => {
                let id = self.slots.len();
                self.slots.push(Some(make(id)));
                id
            }
        }
    }

    /// Release slot `id`, returning its value.
    ///
    /// Out-of-range and already-free ids are ignored.
    pub fn free(&mut self, id: usize) -> Option<T> {
        let value = self.slots.get_mut(id)?.take()?;
        self.free.push(id);
        self.live -= 1;
        Some(value)
    }

    /// Value in slot `id`, or `None` if the slot is free or out of range.
    pub fn get(&self, id: usize) -> Option<&T> {
        self.slots.get(id)?.as_ref()
    }

    /// Mutable access to the value in slot `id`.
    pub fn get_mut(&mut self, id: usize) -> Option<&mut T> {
        self.slots.get_mut(id)?.as_mut()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.live
    }

    /// True if no slot is alive.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Size of the backing array (live + free slots).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Live values with their ids, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|v| (id, v)))
    }

    /// Drop every value and reset to empty.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }
}
