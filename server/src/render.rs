//! Offline rendering: a private tick-driven pipeline turns a batch of labels
//! into one WAV file without touching the live worker.

use std::time::Instant;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use synth_core::{
    duration_ms, encode_wav_base64, Action, Engine, EngineArgs, Label, Pipeline, PipelineConfig,
    PulseVocoder, ReferenceEngine, SynthError, Tick, Vocoder,
};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::validation::{validate_label_lines, validate_speed};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub lines: String,
    pub speed: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenderResponse {
    pub audio_base64: String,
    pub sample_rate: u32,
    pub duration_ms: u64,
    pub frames: usize,
    pub labels: usize,
}

/// Vocoder settings copied from the live playback.
#[derive(Debug, Clone, Copy)]
pub struct VoiceSettings {
    pub pitch: f64,
    pub pitch_action: Action,
    pub alpha: f64,
    pub gamma: f64,
    pub volume: f64,
}

impl VoiceSettings {
    fn from_vocoder(vocoder: &PulseVocoder) -> Self {
        Self {
            pitch: vocoder.pitch(),
            pitch_action: vocoder.pitch_action(),
            alpha: vocoder.alpha(),
            gamma: vocoder.gamma(),
            volume: vocoder.volume(),
        }
    }
}

pub struct RenderedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub frames: usize,
}

fn drain_samples(pipeline: &mut Pipeline<ReferenceEngine, PulseVocoder>, out: &mut Vec<f32>) {
    while pipeline.update_samples() {
        out.push(pipeline.pop_sample() as f32);
    }
}

/// Run `labels` through a fresh pipeline until everything is flushed.
pub fn render_labels(
    config: &PipelineConfig,
    args: &EngineArgs,
    labels: Vec<Label>,
    speed: Option<f64>,
    voice: VoiceSettings,
) -> synth_core::Result<RenderedAudio> {
    let config = PipelineConfig {
        max_label_queue_len: config.max_label_queue_len.max(labels.len()),
        ..config.clone()
    };
    let mut engine = ReferenceEngine::new();
    engine.load(args)?;
    let sample_rate = engine.sample_rate();
    let fperiod = engine.fperiod();

    let mut pipeline = Pipeline::new(&config, engine, PulseVocoder::new(sample_rate, fperiod))?;
    pipeline.set_pitch(voice.pitch, voice.pitch_action);
    pipeline.set_alpha(voice.alpha);
    pipeline.set_gamma(voice.gamma);
    pipeline.set_volume(voice.volume);
    if let Some(speed) = speed {
        pipeline.set_speed(speed);
    }
    for label in labels {
        pipeline.push_label(label)?;
    }

    let mut samples = Vec::new();
    loop {
        match pipeline.run() {
            Ok(Tick::Idle) => break,
            Ok(_) => {}
            Err(SynthError::QueueFull) if pipeline.frames().is_empty() => {
                return Err(SynthError::InvalidConfig(
                    "frame queue cannot hold the frames of one label".to_string(),
                ));
            }
            Err(SynthError::QueueFull) => {}
            Err(e) if e.is_recoverable() => warn!("skipping label: {e}"),
            Err(e) => return Err(e),
        }
        drain_samples(&mut pipeline, &mut samples);
    }
    loop {
        match pipeline.flush() {
            Ok(_) => break,
            Err(SynthError::QueueFull) if !pipeline.frames().is_empty() => {
                drain_samples(&mut pipeline, &mut samples)
            }
            Err(e) => return Err(e),
        }
    }
    drain_samples(&mut pipeline, &mut samples);

    Ok(RenderedAudio {
        frames: samples.len() / fperiod,
        samples,
        sample_rate,
    })
}

pub async fn render_endpoint(
    State(state): State<AppState>,
    Json(req): Json<RenderRequest>,
) -> Result<Json<RenderResponse>, ApiError> {
    let start = Instant::now();
    let result = render(&state, req).await;
    match &result {
        Ok(_) => state
            .metrics
            .render
            .record_request(start.elapsed().as_millis() as u64),
        Err(_) => state.metrics.render.record_error(),
    }
    result.map(Json)
}

async fn render(state: &AppState, req: RenderRequest) -> Result<RenderResponse, ApiError> {
    let labels = validate_label_lines(&req.lines)?;
    if let Some(speed) = req.speed {
        validate_speed(speed)?;
    }
    let label_count = labels.len();
    let voice = VoiceSettings::from_vocoder(state.playback().vocoder());
    let config = state.pipeline.clone();
    let args = state.engine_args.clone();

    let audio = tokio::task::spawn_blocking(move || {
        render_labels(&config, &args, labels, req.speed, voice)
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("render task failed: {e}")))??;

    let audio_base64 = encode_wav_base64(&audio.samples, audio.sample_rate)?;
    state.metrics.synth.record_render(audio.samples.len());
    info!(
        labels = label_count,
        samples = audio.samples.len(),
        "offline render complete"
    );

    Ok(RenderResponse {
        audio_base64,
        sample_rate: audio.sample_rate,
        duration_ms: duration_ms(audio.samples.len(), audio.sample_rate),
        frames: audio.frames,
        labels: label_count,
    })
}
