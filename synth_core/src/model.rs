//! The model accumulator and the frames rendered from it.
//!
//! A [`Model`] is scratch state: the engine overwrites it for every label,
//! then the model queue takes an owned snapshot. Nothing downstream ever
//! holds a reference into the live accumulator.

use serde::{Deserialize, Serialize};

/// How a control value combines with the value the model produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Replace the model value.
    Overwrite,
    /// Add to the model value.
    Shift,
    /// Multiply the model value.
    Scale,
    /// Leave the model value alone.
    #[default]
    Synthetic,
}

impl Action {
    pub fn apply(self, model_value: f64, control: f64) -> f64 {
        match self {
            Action::Overwrite => control,
            Action::Shift => model_value + control,
            Action::Scale => model_value * control,
            Action::Synthetic => model_value,
        }
    }
}

/// Gaussian statistics of one stream: a mean and a diagonal variance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    pub mean: Vec<f64>,
    pub variance: Vec<f64>,
}

impl StreamStats {
    pub fn new(mean: Vec<f64>, variance: Vec<f64>) -> Self {
        Self { mean, variance }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

/// One HMM state of the current unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    /// Duration in frames.
    pub duration: usize,
    /// Spectral (mel-cepstral) statistics.
    pub spectrum: StreamStats,
    /// Log-F0 statistics, one dimension.
    pub lf0: StreamStats,
    /// Probability that the state is voiced.
    pub voicing: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalVariance {
    pub spectrum: StreamStats,
    pub lf0: StreamStats,
}

/// Per-stream weights when several voices are blended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolationWeights {
    pub duration: Vec<f64>,
    pub spectrum: Vec<f64>,
    pub lf0: Vec<f64>,
}

impl Default for InterpolationWeights {
    fn default() -> Self {
        Self::uniform(1)
    }
}

impl InterpolationWeights {
    pub fn uniform(voices: usize) -> Self {
        let w = if voices == 0 { 0.0 } else { 1.0 / voices as f64 };
        Self {
            duration: vec![w; voices],
            spectrum: vec![w; voices],
            lf0: vec![w; voices],
        }
    }

    pub fn streams(&self) -> [(&'static str, &Vec<f64>); 3] {
        [
            ("duration", &self.duration),
            ("spectrum", &self.spectrum),
            ("lf0", &self.lf0),
        ]
    }

    pub fn streams_mut(&mut self) -> [(&'static str, &mut Vec<f64>); 3] {
        [
            ("duration", &mut self.duration),
            ("spectrum", &mut self.spectrum),
            ("lf0", &mut self.lf0),
        ]
    }
}

/// Smoothed per-frame parameters written by the engine's optimizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    pub spectrum: Vec<Vec<f64>>,
    pub lf0: Vec<f64>,
    pub voiced: Vec<bool>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.lf0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lf0.is_empty()
    }

    pub fn clear(&mut self) {
        self.spectrum.clear();
        self.lf0.clear();
        self.voiced.clear();
    }
}

/// A per-state duration profile applied after the engine computes durations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationUpdate {
    pub values: Vec<f64>,
    pub action: Action,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub states: Vec<State>,
    pub gv: GlobalVariance,
    pub weights: InterpolationWeights,
    pub trajectory: Trajectory,
    duration_update: Option<DurationUpdate>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total duration of the current unit, in frames.
    pub fn duration(&self) -> usize {
        self.states.iter().map(|s| s.duration).sum()
    }

    pub fn duration_update(&self) -> Option<&DurationUpdate> {
        self.duration_update.as_ref()
    }

    /// Install (or clear) the duration profile used for subsequent units.
    pub fn set_duration_update(&mut self, update: Option<DurationUpdate>) {
        self.duration_update = update;
    }

    /// Apply the installed profile to the durations the engine just computed.
    /// Values beyond the last state are ignored; a state never drops below
    /// one frame.
    pub fn apply_duration_update(&mut self) {
        let Some(update) = &self.duration_update else {
            return;
        };
        for (state, &value) in self.states.iter_mut().zip(&update.values) {
            let updated = update.action.apply(state.duration as f64, value);
            state.duration = updated.round().max(1.0) as usize;
        }
    }
}

/// One frame period of synthesis parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Fundamental frequency in Hz; `0.0` marks an unvoiced frame.
    pub f0: f64,
    pub spectrum: Vec<f64>,
}

impl Frame {
    pub fn is_voiced(&self) -> bool {
        self.f0 > 0.0
    }
}
