#![allow(dead_code)]

use synth_core::model::{State, StreamStats};
use synth_core::{
    Engine, EngineArgs, Frame, FrameQueue, Label, LabelQueue, Model, ModelEntry, Result, Scheduler,
    SynthError, Tick,
};

/// Frames per label emitted by [`TagEngine`].
pub const FRAMES_PER_LABEL: usize = 3;

/// Engine whose frames carry the label's tag as their f0, so the frame
/// stream can be checked for order and completeness.
#[derive(Debug, Default)]
pub struct TagEngine;

fn tag_of(label: &Label) -> Result<f64> {
    label
        .query
        .strip_prefix('L')
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| SynthError::InvalidLabel(label.query.clone()))
}

impl Engine for TagEngine {
    fn load(&mut self, _args: &EngineArgs) -> Result<()> {
        Ok(())
    }

    fn check_interpolation_weights(&self, _model: &mut Model) -> Result<()> {
        Ok(())
    }

    fn compute_duration(&self, model: &mut Model, _label: &Label) -> Result<()> {
        model.states = vec![State {
            duration: FRAMES_PER_LABEL,
            ..State::default()
        }];
        Ok(())
    }

    fn compute_parameters(&self, model: &mut Model, label: &Label) -> Result<()> {
        let tag = tag_of(label)?;
        model.states[0].lf0 = StreamStats::new(vec![tag], vec![1.0]);
        Ok(())
    }

    fn compute_global_variance(&self, _model: &mut Model, _label: &Label) -> Result<()> {
        Ok(())
    }

    fn optimize(&self, window: &mut [ModelEntry]) {
        for entry in window {
            let model = &mut entry.model;
            let tag = model.states[0].lf0.mean[0];
            let frames = model.duration();
            model.trajectory.lf0 = vec![tag; frames];
            model.trajectory.voiced = vec![true; frames];
            model.trajectory.spectrum = vec![Vec::new(); frames];
        }
    }

    fn render(&self, model: &Model, out: &mut Vec<Frame>) {
        out.extend(model.trajectory.lf0.iter().map(|&f0| Frame {
            f0,
            spectrum: Vec::new(),
        }));
    }
}

pub fn tagged_labels(count: usize, capacity: usize) -> LabelQueue {
    let mut labels = LabelQueue::new(capacity);
    for i in 1..=count {
        labels.push(Label::new(format!("L{i}"))).unwrap();
    }
    labels
}

pub fn expected_tags(count: usize) -> Vec<f64> {
    (1..=count)
        .flat_map(|i| std::iter::repeat(i as f64).take(FRAMES_PER_LABEL))
        .collect()
}

pub fn drain_frames(frames: &mut FrameQueue, out: &mut Vec<f64>) {
    let mut popped = Vec::new();
    let n = frames.len();
    if n > 0 {
        frames.pop_into(&mut popped, n).unwrap();
    }
    out.extend(popped.into_iter().map(|f| f.f0));
}

/// Tick until every label is consumed, draining the frame queue whenever it
/// pushes back, then flush.
pub fn run_to_end<E: Engine>(
    scheduler: &mut Scheduler<E>,
    labels: &mut LabelQueue,
    frames: &mut FrameQueue,
) -> Vec<f64> {
    let mut out = Vec::new();
    loop {
        match scheduler.tick(labels, frames) {
            Ok(Tick::Idle) => break,
            Ok(_) => {}
            Err(SynthError::QueueFull) => drain_frames(frames, &mut out),
            Err(e) => panic!("tick failed: {e}"),
        }
    }
    loop {
        match scheduler.flush(frames) {
            Ok(_) => break,
            Err(SynthError::QueueFull) => drain_frames(frames, &mut out),
            Err(e) => panic!("flush failed: {e}"),
        }
    }
    drain_frames(frames, &mut out);
    out
}
