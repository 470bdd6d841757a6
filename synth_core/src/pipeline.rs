//! Single-threaded embedding surface.
//!
//! The caller owns the loop: push labels, call [`Pipeline::run`] whenever
//! there is time to spare, and pull audio with [`Pipeline::update_samples`]
//! and [`Pipeline::pop_sample`]. Nothing here blocks or spawns threads.

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::engine::{Engine, EngineArgs};
use crate::error::Result;
use crate::label::Label;
use crate::model::{Action, DurationUpdate};
use crate::queue::{FrameQueue, LabelQueue};
use crate::scheduler::{Scheduler, Tick};
use crate::vocoder::{next_sample, Vocoder};

pub struct Pipeline<E, V> {
    labels: LabelQueue,
    frames: FrameQueue,
    scheduler: Scheduler<E>,
    vocoder: V,
}

impl<E: Engine, V: Vocoder> Pipeline<E, V> {
    /// Build around an engine that is already loaded.
    pub fn new(config: &PipelineConfig, engine: E, vocoder: V) -> Result<Self> {
        let scheduler = Scheduler::new(engine, config)?;
        Ok(Self {
            labels: LabelQueue::new(config.max_label_queue_len),
            frames: FrameQueue::new(config.max_frame_queue_len),
            scheduler,
            vocoder,
        })
    }

    /// Load the engine with `args`, then build.
    pub fn from_args(
        config: &PipelineConfig,
        mut engine: E,
        args: &EngineArgs,
        vocoder: V,
    ) -> Result<Self> {
        engine.load(args)?;
        info!(args = args.len(), "engine loaded");
        Self::new(config, engine, vocoder)
    }

    /// Queue a label for synthesis. Fails with `QueueFull` at capacity.
    pub fn push_label(&mut self, label: Label) -> Result<()> {
        self.labels.push(label).inspect_err(|e| {
            warn!("label queue rejected label: {e}");
        })
    }

    /// One scheduler tick.
    pub fn run(&mut self) -> Result<Tick> {
        self.scheduler.tick(&mut self.labels, &mut self.frames)
    }

    /// Render everything still buffered in the model queue and start a new
    /// session. Labels still waiting in the label queue are left alone.
    pub fn flush(&mut self) -> Result<usize> {
        self.scheduler.flush(&mut self.frames)
    }

    /// Feed the vocoder one frame if it has run dry. Returns whether samples
    /// are available afterwards.
    ///
    /// A frame is pulled only once the vocoder's buffer is empty, so the
    /// vocoder holds at most one frame of audio and the rest stays in the
    /// frame queue where backpressure can see it.
    pub fn update_samples(&mut self) -> bool {
        if !self.vocoder.ready() {
            if let Ok(frame) = self.frames.pop() {
                self.vocoder.push(frame);
            }
        }
        self.vocoder.ready()
    }

    /// Next sample in `[-1, 1]`, or silence.
    pub fn pop_sample(&mut self) -> f64 {
        next_sample(&mut self.vocoder)
    }

    pub fn reset_vocoder(&mut self) {
        self.vocoder.reset();
    }

    pub fn pitch(&self) -> f64 {
        self.vocoder.pitch()
    }

    pub fn set_pitch(&mut self, pitch: f64, action: Action) {
        self.vocoder.set_pitch(pitch, action);
    }

    pub fn alpha(&self) -> f64 {
        self.vocoder.alpha()
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.vocoder.set_alpha(alpha);
    }

    pub fn gamma(&self) -> f64 {
        self.vocoder.gamma()
    }

    pub fn set_gamma(&mut self, gamma: f64) {
        self.vocoder.set_gamma(gamma);
    }

    pub fn volume(&self) -> f64 {
        self.vocoder.volume()
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.vocoder.set_volume(volume);
    }

    pub fn speed(&self) -> f64 {
        self.scheduler.speed()
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.scheduler.set_speed(speed);
    }

    pub fn duration(&self) -> usize {
        self.scheduler.duration()
    }

    /// Install (or clear, with `None`) a per-state duration override.
    pub fn set_duration(&mut self, update: Option<DurationUpdate>) {
        self.scheduler.set_duration_update(update);
    }

    pub fn labels(&self) -> &LabelQueue {
        &self.labels
    }

    pub fn frames(&self) -> &FrameQueue {
        &self.frames
    }

    pub fn scheduler(&self) -> &Scheduler<E> {
        &self.scheduler
    }

    pub fn vocoder(&self) -> &V {
        &self.vocoder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SynthError;
    use crate::model::Frame;
    use crate::reference::{PulseVocoder, ReferenceEngine};

    /// Emits `raw` once per pushed frame.
    #[derive(Default)]
    struct ConstVocoder {
        raw: f64,
        waiting: usize,
        volume: f64,
    }

    impl Vocoder for ConstVocoder {
        fn push(&mut self, _frame: Frame) {
            self.waiting += 1;
        }
        fn pop(&mut self) -> f64 {
            self.waiting = self.waiting.saturating_sub(1);
            self.raw
        }
        fn ready(&self) -> bool {
            self.waiting > 0
        }
        fn reset(&mut self) {
            self.waiting = 0;
        }
        fn pitch(&self) -> f64 {
            0.0
        }
        fn set_pitch(&mut self, _pitch: f64, _action: Action) {}
        fn alpha(&self) -> f64 {
            0.0
        }
        fn set_alpha(&mut self, _alpha: f64) {}
        fn gamma(&self) -> f64 {
            0.0
        }
        fn set_gamma(&mut self, _gamma: f64) {}
        fn volume(&self) -> f64 {
            self.volume
        }
        fn set_volume(&mut self, volume: f64) {
            self.volume = volume;
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            max_label_queue_len: 4,
            max_model_queue_len: 4,
            max_frame_queue_len: 2048,
            n_lookup: 1,
            n_backup: 1,
            ..PipelineConfig::default()
        }
    }

    fn sample_for(raw: f64) -> f64 {
        let vocoder = ConstVocoder {
            raw,
            ..ConstVocoder::default()
        };
        let mut pipeline = Pipeline::new(&config(), ReferenceEngine::new(), vocoder).unwrap();
        pipeline.push_label(Label::new("x^y-a+b=c")).unwrap();
        pipeline.run().unwrap();
        pipeline.flush().unwrap();
        assert!(pipeline.update_samples());
        pipeline.pop_sample()
    }

    #[test]
    fn test_samples_are_clamped() {
        assert_eq!(sample_for(65536.0), 1.0);
        assert_eq!(sample_for(-65536.0), -1.0);
        assert_eq!(sample_for(0.0), 0.0);
    }

    #[test]
    fn test_empty_pipeline_is_resilient() {
        let mut pipeline =
            Pipeline::new(&config(), ReferenceEngine::new(), ConstVocoder::default()).unwrap();
        assert_eq!(pipeline.run().unwrap(), Tick::Idle);
        assert!(!pipeline.update_samples());
        assert_eq!(pipeline.pop_sample(), 0.0);
        assert_eq!(pipeline.flush().unwrap(), 0);
        assert!(pipeline.labels().is_empty());
        assert!(pipeline.frames().is_empty());
    }

    #[test]
    fn test_label_queue_full() {
        let mut pipeline =
            Pipeline::new(&config(), ReferenceEngine::new(), ConstVocoder::default()).unwrap();
        for i in 0..4 {
            pipeline.push_label(Label::new(format!("p{i}"))).unwrap();
        }
        assert!(matches!(
            pipeline.push_label(Label::new("overflow")),
            Err(SynthError::QueueFull)
        ));
        assert_eq!(pipeline.labels().len(), 4);
    }

    #[test]
    fn test_from_args_rejects_bad_engine_config() {
        let args = EngineArgs::parse("-s 0").unwrap();
        let result = Pipeline::from_args(
            &config(),
            ReferenceEngine::new(),
            &args,
            PulseVocoder::new(48_000, 240),
        );
        assert!(matches!(result, Err(SynthError::ConfigLoad(_))));
    }

    #[test]
    fn test_controls_pass_through() {
        let mut pipeline = Pipeline::new(
            &config(),
            ReferenceEngine::new(),
            PulseVocoder::new(48_000, 240),
        )
        .unwrap();
        pipeline.set_pitch(20.0, Action::Shift);
        pipeline.set_alpha(0.55);
        pipeline.set_gamma(-0.5);
        pipeline.set_volume(0.5);
        pipeline.set_speed(1.5);
        assert_eq!(pipeline.pitch(), 20.0);
        assert_eq!(pipeline.vocoder().pitch_action(), Action::Shift);
        assert_eq!(pipeline.alpha(), 0.55);
        assert_eq!(pipeline.gamma(), -0.5);
        assert_eq!(pipeline.volume(), 0.5);
        assert_eq!(pipeline.speed(), 1.5);
    }

    #[test]
    fn test_reset_vocoder_keeps_frames() {
        let mut pipeline = Pipeline::new(
            &config(),
            ReferenceEngine::new(),
            PulseVocoder::new(48_000, 240),
        )
        .unwrap();
        pipeline.push_label(Label::new("a")).unwrap();
        pipeline.run().unwrap();
        pipeline.flush().unwrap();
        let frames = pipeline.frames().len();
        assert!(frames > 1);
        assert!(pipeline.update_samples());
        pipeline.reset_vocoder();
        assert_eq!(pipeline.vocoder().buffered(), 0);
        assert_eq!(pipeline.frames().len(), frames - 1);
    }

    #[test]
    fn test_update_samples_pulls_only_when_dry() {
        let mut pipeline = Pipeline::new(
            &config(),
            ReferenceEngine::new(),
            PulseVocoder::new(48_000, 240),
        )
        .unwrap();
        pipeline.push_label(Label::new("a")).unwrap();
        pipeline.run().unwrap();
        pipeline.flush().unwrap();
        let frames = pipeline.frames().len();
        assert!(frames > 1);

        assert!(pipeline.update_samples());
        assert!(pipeline.update_samples());
        assert_eq!(pipeline.frames().len(), frames - 1);
        assert_eq!(pipeline.vocoder().buffered(), 240);

        for _ in 0..240 {
            pipeline.pop_sample();
        }
        assert!(pipeline.update_samples());
        assert_eq!(pipeline.frames().len(), frames - 2);
    }

    #[test]
    fn test_reset_vocoder_keeps_steady_state() {
        let config = PipelineConfig {
            max_label_queue_len: 8,
            ..config()
        };
        let mut pipeline = Pipeline::new(
            &config,
            ReferenceEngine::new(),
            PulseVocoder::new(48_000, 240),
        )
        .unwrap();
        for i in 0..4 {
            pipeline.push_label(Label::new(format!("a^b-p{i}+c=d"))).unwrap();
        }
        while pipeline.run().unwrap() != Tick::Idle {}
        assert!(pipeline.scheduler().is_steady());
        assert!(pipeline.update_samples());

        pipeline.reset_vocoder();
        assert!(pipeline.scheduler().is_steady());
        assert_eq!(pipeline.vocoder().buffered(), 0);

        pipeline.flush().unwrap();
        assert!(!pipeline.scheduler().is_steady());
    }
}
