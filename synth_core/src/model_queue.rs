//! Bounded queue of model snapshots and the windowed optimizer.
//!
//! The queue decides which snapshots take part in a smoothing pass and which
//! one is rendered next; the smoothing itself belongs to the [`Engine`].
//!
//! Callers must optimize an entry before rendering it and render it before
//! popping it. The queue keeps no per-entry state to enforce that; the
//! [`Scheduler`](crate::scheduler::Scheduler) is the one caller that does.

use std::collections::VecDeque;

use tracing::debug;

use crate::engine::Engine;
use crate::error::{Result, SynthError};
use crate::model::{Frame, Model};
use crate::queue::FrameQueue;

/// An owned snapshot of the model accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEntry {
    pub model: Model,
    pub weight: f64,
}

#[derive(Debug)]
pub struct ModelQueue {
    entries: VecDeque<ModelEntry>,
    capacity: usize,
}

impl ModelQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Snapshot `model` onto the tail.
    pub fn push(&mut self, model: &Model, weight: f64) -> Result<()> {
        if self.is_full() {
            return Err(SynthError::QueueFull);
        }
        self.entries.push_back(ModelEntry {
            model: model.clone(),
            weight,
        });
        Ok(())
    }

    /// Smooth over every queued entry.
    pub fn optimize<E: Engine + ?Sized>(&mut self, engine: &E) {
        let len = self.entries.len();
        self.optimize_tail(engine, len);
    }

    /// Smooth over the newest `backup + lookup + 1` entries: `backup` entries
    /// of context behind the entry being finalized and `lookup` entries of
    /// lookahead that remain open to revision.
    pub fn optimize_window<E: Engine + ?Sized>(&mut self, engine: &E, backup: usize, lookup: usize) {
        self.optimize_tail(engine, backup + lookup + 1);
    }

    fn optimize_tail<E: Engine + ?Sized>(&mut self, engine: &E, width: usize) {
        let len = self.entries.len();
        let width = width.min(len);
        if width == 0 {
            return;
        }
        debug!(start = len - width, width, "optimizing window");
        let window = &mut self.entries.make_contiguous()[len - width..];
        engine.optimize(window);
    }

    /// Render the `n`-th oldest entry (1-based) into `frames`.
    ///
    /// The `n - 1` entries ahead of it are backup context that has already
    /// been rendered. `n == 0` renders nothing. The entry's frames are pushed
    /// all together or not at all; on `QueueFull` the caller retries later.
    pub fn generate<E: Engine + ?Sized>(
        &self,
        engine: &E,
        frames: &mut FrameQueue,
        n: usize,
    ) -> Result<usize> {
        if n == 0 {
            return Ok(0);
        }
        let entry = self.entries.get(n - 1).ok_or(SynthError::QueueEmpty)?;
        let mut rendered: Vec<Frame> = Vec::with_capacity(entry.model.trajectory.len());
        engine.render(&entry.model, &mut rendered);
        let count = rendered.len();
        frames.push_all(rendered)?;
        Ok(count)
    }

    /// Drop the oldest entry.
    pub fn pop(&mut self) -> Result<()> {
        self.entries.pop_front().map(|_| ()).ok_or(SynthError::QueueEmpty)
    }

    pub fn get(&self, index: usize) -> Option<&ModelEntry> {
        self.entries.get(index)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }
}
