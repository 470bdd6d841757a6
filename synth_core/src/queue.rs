//! Bounded FIFOs used between pipeline stages.
//!
//! Pushes never block: a full queue rejects the item and reports
//! [`SynthError::QueueFull`]. Pops never block either; an empty queue
//! reports [`SynthError::QueueEmpty`] and is left untouched.

use std::collections::VecDeque;

use crate::error::{Result, SynthError};
use crate::label::Label;
use crate::model::Frame;

#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

pub type LabelQueue = BoundedQueue<Label>;
pub type FrameQueue = BoundedQueue<Frame>;

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) -> Result<()> {
        if self.is_full() {
            return Err(SynthError::QueueFull);
        }
        self.items.push_back(item);
        Ok(())
    }

    /// Push every item or none of them.
    pub fn push_all(&mut self, items: Vec<T>) -> Result<()> {
        if items.len() > self.free() {
            return Err(SynthError::QueueFull);
        }
        self.items.extend(items);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<T> {
        self.items.pop_front().ok_or(SynthError::QueueEmpty)
    }

    /// Move up to `n` items, oldest first, onto the end of `out`.
    ///
    /// Returns how many were moved; an empty queue is reported as
    /// `QueueEmpty` rather than a zero count.
    pub fn pop_into(&mut self, out: &mut Vec<T>, n: usize) -> Result<usize> {
        if self.items.is_empty() {
            return Err(SynthError::QueueEmpty);
        }
        let n = n.min(self.items.len());
        out.extend(self.items.drain(..n));
        Ok(n)
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free(&self) -> usize {
        self.capacity - self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }
}
