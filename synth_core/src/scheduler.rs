//! Drives labels through the engine and decides, after every push, which
//! snapshot in the model queue is final enough to render.
//!
//! Both window policies share this one implementation. Under
//! [`WindowPolicy::TwoTierBackup`] the window grows from the head of the
//! queue until `n_lookup + n_backup` snapshots are buffered; from then on
//! every new label finalizes exactly one snapshot and retires the oldest one.
//! Under [`WindowPolicy::Simple`] the whole queue is smoothed after each push
//! and the head is rendered and retired as soon as more than `n_lookup`
//! snapshots are waiting.
//!
//! Rendering goes through a single pending step: when the frame queue cannot
//! take an entry's frames the step is kept and retried before any further
//! label is consumed, so frames always come out in label order.

use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, WindowPolicy};
use crate::engine::Engine;
use crate::error::{Result, SynthError};
use crate::label::Label;
use crate::model::{DurationUpdate, Model};
use crate::model_queue::ModelQueue;
use crate::queue::{FrameQueue, LabelQueue};

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No label was waiting.
    Idle,
    /// A label was buffered without finalizing anything.
    Buffered,
    /// Startup ramp: the `position`-th snapshot was rendered, nothing retired.
    Ramp { position: usize },
    /// The `position`-th snapshot was rendered and the oldest one retired.
    Steady { position: usize },
}

#[derive(Debug, Clone, Copy)]
struct RenderStep {
    position: usize,
    pop: bool,
    tick: Tick,
}

#[derive(Debug)]
pub struct Scheduler<E> {
    engine: E,
    model: Model,
    queue: ModelQueue,
    policy: WindowPolicy,
    n_lookup: usize,
    n_backup: usize,
    /// Set once the backup window is full; cleared only at session boundaries.
    steady: bool,
    /// Snapshots at the head of the queue that have already been rendered.
    rendered: usize,
    pending: Option<RenderStep>,
    /// The unrendered tail has been smoothed for a flush.
    flush_ready: bool,
    speed: f64,
}

impl<E: Engine> Scheduler<E> {
    /// Validate the configuration and the engine's interpolation weights.
    pub fn new(engine: E, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let mut model = Model::new();
        engine.check_interpolation_weights(&mut model)?;
        info!(
            policy = %config.policy,
            n_lookup = config.n_lookup,
            n_backup = config.n_backup,
            "scheduler ready"
        );
        Ok(Self {
            engine,
            model,
            queue: ModelQueue::new(config.max_model_queue_len),
            policy: config.policy,
            n_lookup: config.n_lookup,
            n_backup: config.n_backup,
            steady: false,
            rendered: 0,
            pending: None,
            flush_ready: false,
            speed: 1.0,
        })
    }

    /// One non-blocking step: consume at most one label and finalize at most
    /// one snapshot. A render left over from an earlier tick is retried first
    /// and no label is consumed while it is outstanding.
    pub fn tick(&mut self, labels: &mut LabelQueue, frames: &mut FrameQueue) -> Result<Tick> {
        if self.pending.is_some() {
            return self.render(frames);
        }
        let label = match labels.pop() {
            Ok(label) => label,
            Err(SynthError::QueueEmpty) => return Ok(Tick::Idle),
            Err(e) => return Err(e),
        };
        self.process(label)?;
        self.render(frames)
    }

    /// Compute the label into the model, snapshot it and plan the next render.
    pub(crate) fn process(&mut self, mut label: Label) -> Result<()> {
        debug_assert!(self.pending.is_none(), "label processed over a pending render");
        label.set_speed(self.speed);
        self.engine.compute_duration(&mut self.model, &label)?;
        self.model.apply_duration_update();
        self.engine.compute_parameters(&mut self.model, &label)?;
        self.engine.compute_global_variance(&mut self.model, &label)?;
        if let Err(e) = self.queue.push(&self.model, 1.0) {
            warn!(label = %label, "model queue rejected snapshot: {e}");
            return Err(e);
        }
        self.flush_ready = false;
        self.pending = self.plan();
        Ok(())
    }

    fn plan(&mut self) -> Option<RenderStep> {
        let count = self.queue.len();
        match self.policy {
            WindowPolicy::TwoTierBackup => {
                if count > self.n_lookup + self.n_backup {
                    if !self.steady {
                        debug!(count, "steady-state window reached");
                    }
                    self.steady = true;
                    self.queue
                        .optimize_window(&self.engine, self.n_backup, self.n_lookup);
                    Some(RenderStep {
                        position: self.n_backup,
                        pop: true,
                        tick: Tick::Steady {
                            position: self.n_backup,
                        },
                    })
                } else if count > self.n_lookup && !self.steady {
                    let n = count - self.n_lookup - 1;
                    if n == 0 {
                        return None;
                    }
                    self.queue.optimize_window(&self.engine, n, self.n_lookup);
                    Some(RenderStep {
                        position: n,
                        pop: false,
                        tick: Tick::Ramp { position: n },
                    })
                } else {
                    None
                }
            }
            WindowPolicy::Simple => {
                self.queue.optimize(&self.engine);
                if count > self.n_lookup {
                    Some(RenderStep {
                        position: 1,
                        pop: true,
                        tick: Tick::Steady { position: 1 },
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Carry out the planned render, if any.
    pub(crate) fn render(&mut self, frames: &mut FrameQueue) -> Result<Tick> {
        let Some(step) = self.pending else {
            return Ok(Tick::Buffered);
        };
        debug_assert_eq!(step.position, self.rendered + 1, "snapshots must render in order");
        match self.queue.generate(&self.engine, frames, step.position) {
            Ok(count) => debug!(position = step.position, frames = count, "rendered snapshot"),
            Err(SynthError::QueueFull) => {
                debug!(position = step.position, "frame queue full, render deferred");
                return Err(SynthError::QueueFull);
            }
            Err(e) => {
                self.pending = None;
                return Err(e);
            }
        }
        self.pending = None;
        self.rendered = step.position;
        if step.pop {
            self.queue.pop()?;
            self.rendered -= 1;
        }
        Ok(step.tick)
    }

    /// Render every buffered snapshot that has not been rendered yet, then
    /// empty the queue and start a new session.
    ///
    /// On `QueueFull` the flush stops where it is; calling it again once the
    /// frame queue has room resumes without rendering anything twice.
    pub fn flush(&mut self, frames: &mut FrameQueue) -> Result<usize> {
        if self.pending.is_some() {
            self.render(frames)?;
        }
        let mut count = 0;
        if self.rendered < self.queue.len() {
            self.prepare_flush();
            while self.rendered < self.queue.len() {
                count += self.queue.generate(&self.engine, frames, self.rendered + 1)?;
                self.rendered += 1;
            }
        }
        debug!(frames = count, "flushed model queue");
        self.reset_session();
        Ok(count)
    }

    /// Smooth the whole queue ahead of [`flush`](Self::flush). Needs no frame
    /// queue, so a threaded caller can run it without holding the frame lock.
    /// Does nothing while a render is pending or when already done.
    pub fn prepare_flush(&mut self) {
        if self.pending.is_some() || self.flush_ready || self.rendered >= self.queue.len() {
            return;
        }
        self.queue.optimize(&self.engine);
        self.flush_ready = true;
    }

    /// Drop every buffered snapshot and re-arm the startup ramp.
    pub fn reset_session(&mut self) {
        self.queue.clear();
        self.flush_ready = false;
        self.pending = None;
        self.rendered = 0;
        self.steady = false;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_steady(&self) -> bool {
        self.steady
    }

    pub fn queue(&self) -> &ModelQueue {
        &self.queue
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Speed factor stamped onto every label at dequeue time.
    pub fn set_speed(&mut self, speed: f64) {
        if speed.is_finite() && speed > 0.0 {
            self.speed = speed;
        } else {
            warn!(speed, "ignoring non-positive speed");
        }
    }

    /// Total frames of the unit most recently computed.
    pub fn duration(&self) -> usize {
        self.model.duration()
    }

    pub fn set_duration_update(&mut self, update: Option<DurationUpdate>) {
        self.model.set_duration_update(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceEngine;

    fn ramp_config() -> PipelineConfig {
        PipelineConfig {
            max_label_queue_len: 32,
            max_model_queue_len: 10,
            max_frame_queue_len: 4096,
            n_lookup: 2,
            n_backup: 3,
            ..PipelineConfig::default()
        }
    }

    fn labels(n: usize) -> LabelQueue {
        let mut q = LabelQueue::new(32);
        for i in 0..n {
            q.push(Label::new(format!("a^b-p{i}+c=d"))).unwrap();
        }
        q
    }

    #[test]
    fn test_idle_tick_does_nothing() {
        let mut scheduler = Scheduler::new(ReferenceEngine::new(), &ramp_config()).unwrap();
        let mut labels = LabelQueue::new(4);
        let mut frames = FrameQueue::new(64);
        assert_eq!(scheduler.tick(&mut labels, &mut frames).unwrap(), Tick::Idle);
        assert!(scheduler.queue().is_empty());
        assert!(frames.is_empty());
    }

    #[test]
    fn test_startup_ramp_then_steady_state() {
        let mut scheduler = Scheduler::new(ReferenceEngine::new(), &ramp_config()).unwrap();
        let mut labels = labels(7);
        let mut frames = FrameQueue::new(4096);

        for _ in 0..3 {
            assert_eq!(scheduler.tick(&mut labels, &mut frames).unwrap(), Tick::Buffered);
        }
        assert_eq!(scheduler.queue().len(), 3);
        assert!(frames.is_empty());

        assert_eq!(
            scheduler.tick(&mut labels, &mut frames).unwrap(),
            Tick::Ramp { position: 1 }
        );
        assert_eq!(scheduler.queue().len(), 4);
        assert!(!frames.is_empty());
        assert!(!scheduler.is_steady());

        assert_eq!(
            scheduler.tick(&mut labels, &mut frames).unwrap(),
            Tick::Ramp { position: 2 }
        );
        assert_eq!(scheduler.queue().len(), 5);

        assert_eq!(
            scheduler.tick(&mut labels, &mut frames).unwrap(),
            Tick::Steady { position: 3 }
        );
        assert!(scheduler.is_steady());
        assert_eq!(scheduler.queue().len(), 5);

        assert_eq!(
            scheduler.tick(&mut labels, &mut frames).unwrap(),
            Tick::Steady { position: 3 }
        );
        assert_eq!(scheduler.queue().len(), 5);
    }

    #[test]
    fn test_simple_policy_renders_head() {
        let config = PipelineConfig {
            policy: WindowPolicy::Simple,
            ..ramp_config()
        };
        let mut scheduler = Scheduler::new(ReferenceEngine::new(), &config).unwrap();
        let mut labels = labels(4);
        let mut frames = FrameQueue::new(4096);
        assert_eq!(scheduler.tick(&mut labels, &mut frames).unwrap(), Tick::Buffered);
        assert_eq!(scheduler.tick(&mut labels, &mut frames).unwrap(), Tick::Buffered);
        assert_eq!(
            scheduler.tick(&mut labels, &mut frames).unwrap(),
            Tick::Steady { position: 1 }
        );
        assert_eq!(scheduler.queue().len(), 2);
        assert_eq!(
            scheduler.tick(&mut labels, &mut frames).unwrap(),
            Tick::Steady { position: 1 }
        );
        assert_eq!(scheduler.queue().len(), 2);
    }

    #[test]
    fn test_full_frame_queue_defers_without_consuming_labels() {
        let config = PipelineConfig {
            n_lookup: 0,
            n_backup: 1,
            ..ramp_config()
        };
        let mut scheduler = Scheduler::new(ReferenceEngine::new(), &config).unwrap();
        let mut labels = labels(3);
        let mut frames = FrameQueue::new(1);

        assert_eq!(scheduler.tick(&mut labels, &mut frames).unwrap(), Tick::Buffered);
        assert!(matches!(
            scheduler.tick(&mut labels, &mut frames),
            Err(SynthError::QueueFull)
        ));
        assert!(scheduler.has_pending());
        assert_eq!(labels.len(), 1);

        // Still no room: the same step is retried and the label stays queued.
        assert!(scheduler.tick(&mut labels, &mut frames).is_err());
        assert_eq!(labels.len(), 1);
        assert_eq!(scheduler.queue().len(), 2);
    }

    #[test]
    fn test_flush_rearms_ramp() {
        let mut scheduler = Scheduler::new(ReferenceEngine::new(), &ramp_config()).unwrap();
        let mut labels = labels(7);
        let mut frames = FrameQueue::new(4096);
        while scheduler.tick(&mut labels, &mut frames).unwrap() != Tick::Idle {}
        assert!(scheduler.is_steady());
        scheduler.flush(&mut frames).unwrap();
        assert!(scheduler.queue().is_empty());
        assert!(!scheduler.is_steady());
        assert_eq!(scheduler.flush(&mut frames).unwrap(), 0);
    }

    #[test]
    fn test_speed_stamped_on_labels() {
        let mut slow = Scheduler::new(ReferenceEngine::new(), &ramp_config()).unwrap();
        let mut fast = Scheduler::new(ReferenceEngine::new(), &ramp_config()).unwrap();
        fast.set_speed(2.0);
        fast.set_speed(-1.0);
        assert_eq!(fast.speed(), 2.0);

        let mut frames = FrameQueue::new(64);
        slow.tick(&mut labels(1), &mut frames).unwrap();
        fast.tick(&mut labels(1), &mut frames).unwrap();
        assert!(fast.duration() < slow.duration());
    }

    fn drain_frames(frames: &mut FrameQueue) -> Vec<crate::model::Frame> {
        let mut out = Vec::new();
        while let Ok(frame) = frames.pop() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn test_prepared_flush_matches_plain_flush() {
        let mut plain = Scheduler::new(ReferenceEngine::new(), &ramp_config()).unwrap();
        let mut prepared = Scheduler::new(ReferenceEngine::new(), &ramp_config()).unwrap();
        let mut plain_frames = FrameQueue::new(4096);
        let mut prepared_frames = FrameQueue::new(4096);
        let (mut a, mut b) = (labels(4), labels(4));
        while plain.tick(&mut a, &mut plain_frames).unwrap() != Tick::Idle {}
        while prepared.tick(&mut b, &mut prepared_frames).unwrap() != Tick::Idle {}

        prepared.prepare_flush();
        assert!(prepared.flush_ready);
        prepared.prepare_flush();

        let n = plain.flush(&mut plain_frames).unwrap();
        assert_eq!(prepared.flush(&mut prepared_frames).unwrap(), n);
        assert!(n > 0);
        assert!(!prepared.flush_ready);
        assert_eq!(
            drain_frames(&mut plain_frames),
            drain_frames(&mut prepared_frames)
        );
    }

    #[test]
    fn test_prepare_flush_waits_for_pending_render() {
        let config = PipelineConfig {
            n_lookup: 0,
            n_backup: 1,
            ..ramp_config()
        };
        let mut scheduler = Scheduler::new(ReferenceEngine::new(), &config).unwrap();
        let mut labels = labels(2);
        let mut frames = FrameQueue::new(1);
        scheduler.tick(&mut labels, &mut frames).unwrap();
        assert!(scheduler.tick(&mut labels, &mut frames).is_err());
        assert!(scheduler.has_pending());

        scheduler.prepare_flush();
        assert!(!scheduler.flush_ready);
    }

    #[test]
    fn test_new_label_invalidates_prepared_flush() {
        let mut scheduler = Scheduler::new(ReferenceEngine::new(), &ramp_config()).unwrap();
        let mut queued = labels(3);
        let mut frames = FrameQueue::new(4096);
        scheduler.tick(&mut queued, &mut frames).unwrap();
        scheduler.prepare_flush();
        assert!(scheduler.flush_ready);
        scheduler.tick(&mut queued, &mut frames).unwrap();
        assert!(!scheduler.flush_ready);
    }
}
