//! Streaming parametric speech synthesis.
//!
//! Context labels go in one end; an [`Engine`] turns each into a model
//! snapshot, the [`Scheduler`] smooths windows of snapshots and renders the
//! ones that are final into frames, and a [`Vocoder`] turns frames into
//! samples. [`Pipeline`] runs all of it on the caller's thread; [`Worker`]
//! and [`Playback`] split it across a synthesis thread and a consumer.

pub mod config;
pub mod engine;
pub mod error;
pub mod label;
pub mod model;
pub mod model_queue;
pub mod pipeline;
pub mod queue;
pub mod reference;
pub mod scheduler;
pub mod vocoder;
pub mod wav;
pub mod worker;

pub use config::{PipelineConfig, WindowPolicy};
pub use engine::{Engine, EngineArgs, MAX_ARGS, MAX_ARG_LEN};
pub use error::{Result, SynthError};
pub use label::Label;
pub use model::{Action, DurationUpdate, Frame, Model};
pub use model_queue::{ModelEntry, ModelQueue};
pub use pipeline::Pipeline;
pub use queue::{BoundedQueue, FrameQueue, LabelQueue};
pub use reference::{PulseVocoder, ReferenceEngine};
pub use scheduler::{Scheduler, Tick};
pub use vocoder::{next_sample, normalize_sample, Vocoder};
pub use wav::{duration_ms, encode_wav, encode_wav_base64};
pub use worker::{Playback, Worker, WorkerState};
