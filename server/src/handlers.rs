use std::time::Instant;

use axum::{extract::State, http::Uri, Json};
use serde::{Deserialize, Serialize};
use synth_core::{Action, DurationUpdate, Vocoder};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::metrics::{EndpointMetricsResponse, MetricsResponse, PipelineStats};
use crate::validation::{validate_controls, validate_duration_update, validate_label_lines};
use crate::AppState;

/// Either a single `label` (optionally annotated with `text`) or a batch of
/// newline-separated `lines`.
#[derive(Debug, Deserialize)]
pub struct LabelsRequest {
    pub label: Option<String>,
    pub text: Option<String>,
    pub lines: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LabelsResponse {
    pub accepted: usize,
    pub pending: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ControlsRequest {
    pub pitch: Option<f64>,
    pub pitch_action: Option<Action>,
    pub alpha: Option<f64>,
    pub gamma: Option<f64>,
    pub volume: Option<f64>,
    pub speed: Option<f64>,
    pub duration_update: Option<DurationUpdate>,
    #[serde(default)]
    pub clear_duration_update: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlsResponse {
    pub pitch: f64,
    pub pitch_action: Action,
    pub alpha: f64,
    pub gamma: f64,
    pub volume: f64,
    pub speed: f64,
    /// Frames of the label processed most recently.
    pub duration: usize,
    pub duration_update: Option<DurationUpdate>,
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}

pub async fn push_labels(
    State(state): State<AppState>,
    Json(req): Json<LabelsRequest>,
) -> Result<Json<LabelsResponse>, ApiError> {
    let start = Instant::now();
    let result = enqueue(&state, req);
    match &result {
        Ok(_) => state
            .metrics
            .labels
            .record_request(start.elapsed().as_millis() as u64),
        Err(_) => state.metrics.labels.record_error(),
    }
    result.map(Json)
}

fn enqueue(state: &AppState, req: LabelsRequest) -> Result<LabelsResponse, ApiError> {
    let labels = match (req.label, req.lines) {
        (Some(line), None) => {
            let mut labels = validate_label_lines(&line)?;
            if labels.len() != 1 {
                return Err(ApiError::InvalidInput(
                    "`label` must hold exactly one label; use `lines` for batches".to_string(),
                ));
            }
            if let Some(text) = req.text {
                labels[0].text = Some(text);
            }
            labels
        }
        (None, Some(lines)) => validate_label_lines(&lines)?,
        _ => {
            return Err(ApiError::InvalidInput(
                "Provide exactly one of `label` or `lines`".to_string(),
            ))
        }
    };

    let count = labels.len();
    if let Err(e) = state.worker.push_labels(labels) {
        state.metrics.synth.record_rejected(count);
        return Err(e.into());
    }
    state.metrics.synth.record_accepted(count);
    debug!(count, "labels queued");

    Ok(LabelsResponse {
        accepted: count,
        pending: state.worker.pending_labels(),
    })
}

fn current_controls(state: &AppState) -> ControlsResponse {
    let playback = state.playback();
    let vocoder = playback.vocoder();
    ControlsResponse {
        pitch: vocoder.pitch(),
        pitch_action: vocoder.pitch_action(),
        alpha: vocoder.alpha(),
        gamma: vocoder.gamma(),
        volume: vocoder.volume(),
        speed: state.worker.speed(),
        duration: state.worker.duration(),
        duration_update: state.worker.duration_update(),
    }
}

pub async fn get_controls(State(state): State<AppState>) -> Json<ControlsResponse> {
    Json(current_controls(&state))
}

pub async fn set_controls(
    State(state): State<AppState>,
    Json(req): Json<ControlsRequest>,
) -> Result<Json<ControlsResponse>, ApiError> {
    validate_controls(req.pitch, req.alpha, req.gamma, req.volume, req.speed)?;
    if let Some(update) = &req.duration_update {
        validate_duration_update(update)?;
    }
    if req.clear_duration_update && req.duration_update.is_some() {
        return Err(ApiError::InvalidInput(
            "Cannot set and clear the duration update at once".to_string(),
        ));
    }

    if let Some(speed) = req.speed {
        state.worker.set_speed(speed)?;
    }
    if let Some(update) = req.duration_update {
        state.worker.set_duration_update(Some(update));
    } else if req.clear_duration_update {
        state.worker.set_duration_update(None);
    }

    {
        let mut playback = state.playback();
        let vocoder = playback.vocoder_mut();
        if req.pitch.is_some() || req.pitch_action.is_some() {
            let pitch = req.pitch.unwrap_or_else(|| vocoder.pitch());
            let action = req.pitch_action.unwrap_or_else(|| vocoder.pitch_action());
            vocoder.set_pitch(pitch, action);
        }
        if let Some(alpha) = req.alpha {
            vocoder.set_alpha(alpha);
        }
        if let Some(gamma) = req.gamma {
            vocoder.set_gamma(gamma);
        }
        if let Some(volume) = req.volume {
            vocoder.set_volume(volume);
        }
    }

    let controls = current_controls(&state);
    info!(
        pitch = controls.pitch,
        volume = controls.volume,
        speed = controls.speed,
        "controls updated"
    );
    Ok(Json(controls))
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let worker = &state.worker;
    let synth = &state.metrics.synth;
    let load = |c: &std::sync::atomic::AtomicU64| c.load(std::sync::atomic::Ordering::Relaxed);

    Json(MetricsResponse {
        timestamp: chrono::Utc::now(),
        uptime_seconds: state.metrics.uptime_seconds(),
        pipeline: PipelineStats {
            worker_state: format!("{:?}", worker.state()).to_lowercase(),
            labels_accepted: load(&synth.labels_accepted),
            labels_rejected: load(&synth.labels_rejected),
            labels_processed: worker.processed_labels(),
            pending_labels: worker.pending_labels(),
            label_capacity: worker.label_capacity(),
            buffered_frames: worker.buffered_frames(),
            frame_capacity: worker.frame_capacity(),
            samples_streamed: load(&synth.samples_streamed),
            renders: load(&synth.renders),
            rendered_samples: load(&synth.rendered_samples),
        },
        endpoints: EndpointMetricsResponse {
            labels: state.metrics.labels.snapshot(),
            render: state.metrics.render.snapshot(),
        },
    })
}
