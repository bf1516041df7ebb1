// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity ring buffer.
//!
//! Once the buffer holds `capacity` entries, every push overwrites the oldest
//! one. Iteration always starts from the logically oldest entry, wherever the
//! write position currently is:
//!
//! ```text
//!   capacity 4, pushed 1..=6
//!
//!   slots: [5] [6] [3] [4]
//!                   ^ head (next write)
//!   iter:  3, 4, 5, 6
//! ```

/// Ring buffer holding at most `capacity` entries.
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    slots: Vec<Option<T>>,
    /// Slot written by the next push
    head: usize,
    len: usize,
}

impl<T> CircularBuffer<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        CircularBuffer {
            slots,
            head: 0,
            len: 0,
        }
    }

    /// Appends `item`, returning the entry it overwrote once the buffer is full.
    ///
    /// A zero-capacity buffer hands `item` straight back.
    pub fn push(&mut self, item: T) -> Option<T> {
        let capacity = self.capacity();
        if capacity == 0 {
            return Some(item);
        }

        let evicted = self.slots[self.head].replace(item);
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
        evicted
    }

    /// Oldest-first iterator. Cheap to create; call again to restart.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, T> {
        let capacity = self.capacity();
        let start = if capacity == 0 {
            0
        } else {
            (self.head + capacity - self.len) % capacity
        };
        Iter {
            buffer: self,
            offset: start,
            remaining: self.len,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
    }
}

impl<'a, T> IntoIterator for &'a CircularBuffer<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy oldest-first iterator over a [`CircularBuffer`].
#[derive(Debug)]
pub struct Iter<'a, T> {
    buffer: &'a CircularBuffer<T>,
    offset: usize,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.buffer.slots.get(self.offset)?.as_ref();
        self.offset = (self.offset + 1) % self.buffer.capacity();
        self.remaining -= 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
