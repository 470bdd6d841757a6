//! Continuous discipline: a dedicated thread owns the [`Scheduler`] and
//! consumes labels as they arrive, while any number of callers push labels
//! and a single [`Playback`] pulls frames into a vocoder.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::engine::Engine;
use crate::error::{Result, SynthError};
use crate::label::Label;
use crate::model::{DurationUpdate, Frame};
use crate::queue::{FrameQueue, LabelQueue};
use crate::scheduler::Scheduler;
use crate::vocoder::{next_sample, Vocoder};

const RUNNING: u8 = 0;
const FINISHING: u8 = 1;
const STOPPED: u8 = 2;

/// Lifecycle of the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    /// Draining: remaining labels are processed, then the model queue is
    /// flushed and the thread exits.
    Finishing,
    Stopped,
}

#[derive(Debug)]
struct Controls {
    speed: f64,
    duration_update: Option<DurationUpdate>,
    dirty: bool,
}

struct Shared {
    labels: Mutex<LabelQueue>,
    label_ready: Condvar,
    frames: Mutex<FrameQueue>,
    frame_space: Condvar,
    state: AtomicU8,
    controls: Mutex<Controls>,
    processed: AtomicU64,
    last_duration: AtomicUsize,
    idle_delay: Duration,
}

impl Shared {
    fn state(&self) -> WorkerState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => WorkerState::Running,
            FINISHING => WorkerState::Finishing,
            _ => WorkerState::Stopped,
        }
    }

    fn wake_all(&self) {
        self.label_ready.notify_all();
        self.frame_space.notify_all();
    }

    fn apply_controls<E: Engine>(&self, scheduler: &mut Scheduler<E>) {
        let mut controls = self.controls.lock();
        if controls.dirty {
            scheduler.set_speed(controls.speed);
            scheduler.set_duration_update(controls.duration_update.clone());
            controls.dirty = false;
        }
    }
}

/// Handle to the synthesis thread. Dropping it stops and joins the thread.
pub struct Worker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Move `scheduler` onto a new thread named `synth-worker`.
    pub fn spawn<E: Engine + 'static>(scheduler: Scheduler<E>, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared {
            labels: Mutex::new(LabelQueue::new(config.max_label_queue_len)),
            label_ready: Condvar::new(),
            frames: Mutex::new(FrameQueue::new(config.max_frame_queue_len)),
            frame_space: Condvar::new(),
            state: AtomicU8::new(RUNNING),
            controls: Mutex::new(Controls {
                speed: scheduler.speed(),
                duration_update: None,
                dirty: false,
            }),
            processed: AtomicU64::new(0),
            last_duration: AtomicUsize::new(0),
            idle_delay: config.idle_delay(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("synth-worker".to_string())
            .spawn(move || run_loop(scheduler, thread_shared))?;

        info!(policy = %config.policy, "synthesis worker started");
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    pub fn push_label(&self, label: Label) -> Result<()> {
        self.shared.labels.lock().push(label)?;
        self.shared.label_ready.notify_one();
        Ok(())
    }

    /// Queue a batch; either every label is accepted or none is.
    pub fn push_labels(&self, labels: Vec<Label>) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        self.shared.labels.lock().push_all(labels)?;
        self.shared.label_ready.notify_one();
        Ok(())
    }

    /// Take the oldest rendered frame, if any.
    pub fn pop_frame(&self) -> Option<Frame> {
        let frame = self.shared.frames.lock().pop().ok()?;
        self.shared.frame_space.notify_one();
        Some(frame)
    }

    pub fn pending_labels(&self) -> usize {
        self.shared.labels.lock().len()
    }

    pub fn label_capacity(&self) -> usize {
        self.shared.labels.lock().capacity()
    }

    pub fn buffered_frames(&self) -> usize {
        self.shared.frames.lock().len()
    }

    pub fn frame_capacity(&self) -> usize {
        self.shared.frames.lock().capacity()
    }

    /// Labels the worker has turned into model snapshots so far.
    pub fn processed_labels(&self) -> u64 {
        self.shared.processed.load(Ordering::Relaxed)
    }

    /// Total frames of the label most recently processed.
    pub fn duration(&self) -> usize {
        self.shared.last_duration.load(Ordering::Relaxed)
    }

    pub fn speed(&self) -> f64 {
        self.shared.controls.lock().speed
    }

    /// Applied to labels the worker dequeues from now on.
    pub fn set_speed(&self, speed: f64) -> Result<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(SynthError::InvalidConfig(format!(
                "speed must be a positive number, got {speed}"
            )));
        }
        let mut controls = self.shared.controls.lock();
        controls.speed = speed;
        controls.dirty = true;
        Ok(())
    }

    pub fn duration_update(&self) -> Option<DurationUpdate> {
        self.shared.controls.lock().duration_update.clone()
    }

    pub fn set_duration_update(&self, update: Option<DurationUpdate>) {
        let mut controls = self.shared.controls.lock();
        controls.duration_update = update;
        controls.dirty = true;
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Process what is queued, flush, then exit.
    pub fn finish(&self) {
        let _ = self.shared.state.compare_exchange(
            RUNNING,
            FINISHING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.shared.wake_all();
    }

    /// Exit at the top of the next loop iteration, dropping buffered work.
    pub fn stop(&self) {
        self.shared.state.store(STOPPED, Ordering::Release);
        self.shared.wake_all();
    }

    /// Wait for the thread to exit. Call [`finish`](Self::finish) or
    /// [`stop`](Self::stop) first.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("synthesis worker panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

fn run_loop<E: Engine>(mut scheduler: Scheduler<E>, shared: Arc<Shared>) {
    loop {
        let state = shared.state();
        if state == WorkerState::Stopped {
            break;
        }

        if scheduler.has_pending() {
            let mut frames = shared.frames.lock();
            match scheduler.render(&mut frames) {
                Ok(_) => {}
                Err(SynthError::QueueFull) => {
                    shared.frame_space.wait_for(&mut frames, shared.idle_delay);
                }
                Err(e) => warn!("render failed: {e}"),
            }
            continue;
        }

        let label = {
            let mut labels = shared.labels.lock();
            match labels.pop() {
                Ok(label) => Some(label),
                Err(_) if state == WorkerState::Finishing => None,
                Err(_) => {
                    shared.label_ready.wait_for(&mut labels, shared.idle_delay);
                    continue;
                }
            }
        };

        let Some(label) = label else {
            drain(&mut scheduler, &shared);
            shared.state.store(STOPPED, Ordering::Release);
            break;
        };

        shared.apply_controls(&mut scheduler);
        if let Err(e) = scheduler.process(label) {
            warn!("label skipped: {e}");
            continue;
        }
        shared.processed.fetch_add(1, Ordering::Relaxed);
        shared
            .last_duration
            .store(scheduler.duration(), Ordering::Relaxed);

        let mut frames = shared.frames.lock();
        match scheduler.render(&mut frames) {
            Ok(tick) => debug!(?tick, "label processed"),
            Err(SynthError::QueueFull) => {}
            Err(e) => warn!("render failed: {e}"),
        }
    }
    info!(
        processed = shared.processed.load(Ordering::Relaxed),
        "synthesis worker stopped"
    );
}

/// Flush the scheduler into the shared frame queue. Smoothing happens with
/// the frame lock released; the lock is held only while frames are written.
fn drain<E: Engine>(scheduler: &mut Scheduler<E>, shared: &Shared) {
    loop {
        if !scheduler.has_pending() {
            scheduler.prepare_flush();
        }
        let mut frames = shared.frames.lock();
        let result = if scheduler.has_pending() {
            scheduler.render(&mut frames).map(|_| None)
        } else {
            scheduler.flush(&mut frames).map(Some)
        };
        match result {
            Ok(Some(count)) => {
                debug!(frames = count, "worker drained");
                return;
            }
            Ok(None) => continue,
            Err(SynthError::QueueFull) => {
                if shared.state() == WorkerState::Stopped {
                    return;
                }
                shared.frame_space.wait_for(&mut frames, shared.idle_delay);
            }
            Err(e) => {
                warn!("flush failed: {e}");
                return;
            }
        }
    }
}

/// Consumer side: feeds frames from a [`Worker`] into a vocoder and hands
/// out normalized samples.
pub struct Playback<V> {
    vocoder: V,
}

impl<V: Vocoder> Playback<V> {
    pub fn new(vocoder: V) -> Self {
        Self { vocoder }
    }

    /// Give the vocoder the next frame if it has run dry. Returns whether
    /// samples are available.
    pub fn update(&mut self, worker: &Worker) -> bool {
        if !self.vocoder.ready() {
            if let Some(frame) = worker.pop_frame() {
                self.vocoder.push(frame);
            }
        }
        self.vocoder.ready()
    }

    pub fn pop_sample(&mut self) -> f64 {
        next_sample(&mut self.vocoder)
    }

    /// Fill `out` with samples, padding with silence once the worker has
    /// nothing rendered. Returns how many samples came from the vocoder.
    pub fn fill(&mut self, worker: &Worker, out: &mut [f32]) -> usize {
        let mut produced = 0;
        for sample in out.iter_mut() {
            if self.update(worker) {
                produced += 1;
            }
            *sample = self.pop_sample() as f32;
        }
        produced
    }

    pub fn reset(&mut self) {
        self.vocoder.reset();
    }

    pub fn vocoder(&self) -> &V {
        &self.vocoder
    }

    pub fn vocoder_mut(&mut self) -> &mut V {
        &mut self.vocoder
    }
}
