use std::hash::{Hash, Hasher};
use std::str::FromStr;

use ahash::AHasher;
use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineArgs};
use crate::error::{Result, SynthError};
use crate::label::Label;
use crate::model::{Frame, InterpolationWeights, Model, State, StreamStats, Trajectory};
use crate::model_queue::ModelEntry;

const SMOOTHING_KERNEL: [f64; 5] = [1.0, 2.0, 4.0, 2.0, 1.0];
const VOICING_THRESHOLD: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct ReferenceEngine {
    sample_rate: u32,
    fperiod: usize,
    n_states: usize,
    order: usize,
    voices: usize,
    weights: Option<InterpolationWeights>,
    gv_weight: f64,
}

impl Default for ReferenceEngine {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            fperiod: 240,
            n_states: 5,
            order: 24,
            voices: 1,
            weights: None,
            gv_weight: 1.0,
        }
    }
}

fn parse_value<T: FromStr>(flag: &str, value: Option<&str>) -> Result<T> {
    let value = value.ok_or_else(|| SynthError::ConfigLoad(format!("missing value for {flag}")))?;
    value
        .parse()
        .map_err(|_| SynthError::ConfigLoad(format!("invalid value {value:?} for {flag}")))
}

impl ReferenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per frame.
    pub fn fperiod(&self) -> usize {
        self.fperiod
    }

    pub fn voices(&self) -> usize {
        self.voices
    }

    /// Deterministic value in `[0, 1)` for a query, voice and slot.
    fn unit(query: &str, voice: usize, slot: (&str, usize)) -> f64 {
        let mut hasher = AHasher::default();
        query.hash(&mut hasher);
        voice.hash(&mut hasher);
        slot.hash(&mut hasher);
        (hasher.finish() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Weighted blend over voices of a per-voice value.
    fn blend(weights: &[f64], f: impl Fn(usize) -> f64) -> f64 {
        weights.iter().enumerate().map(|(v, w)| w * f(v)).sum()
    }

    fn ensure_states(&self, model: &mut Model) {
        model.states.resize_with(self.n_states, State::default);
    }
}

impl Engine for ReferenceEngine {
    fn load(&mut self, args: &EngineArgs) -> Result<()> {
        let mut it = args.iter();
        while let Some(flag) = it.next() {
            match flag {
                "-s" => self.sample_rate = parse_value(flag, it.next())?,
                "-p" => self.fperiod = parse_value(flag, it.next())?,
                "-n" => self.n_states = parse_value(flag, it.next())?,
                "-m" => self.order = parse_value(flag, it.next())?,
                "-j" => self.gv_weight = parse_value(flag, it.next())?,
                "-i" => {
                    let voices: usize = parse_value(flag, it.next())?;
                    let mut weights = Vec::with_capacity(voices);
                    for _ in 0..voices {
                        weights.push(parse_value::<f64>(flag, it.next())?);
                    }
                    self.voices = voices;
                    self.weights = Some(InterpolationWeights {
                        duration: weights.clone(),
                        spectrum: weights.clone(),
                        lf0: weights,
                    });
                }
                other if other.starts_with('-') => {
                    let value = it.next();
                    debug!(option = other, ?value, "ignoring engine option");
                }
                other => {
                    return Err(SynthError::ConfigLoad(format!("unexpected token {other:?}")));
                }
            }
        }

        if self.sample_rate == 0 || self.fperiod == 0 || self.n_states == 0 || self.voices == 0 {
            return Err(SynthError::ConfigLoad(
                "sample rate, frame period, state count and voice count must be positive"
                    .to_string(),
            ));
        }
        info!(
            sample_rate = self.sample_rate,
            fperiod = self.fperiod,
            states = self.n_states,
            voices = self.voices,
            "reference engine loaded"
        );
        Ok(())
    }

    fn check_interpolation_weights(&self, model: &mut Model) -> Result<()> {
        model.weights = self
            .weights
            .clone()
            .unwrap_or_else(|| InterpolationWeights::uniform(self.voices));

        for (stream, weights) in model.weights.streams_mut() {
            if weights.len() != self.voices {
                return Err(SynthError::InterpolationMismatch(format!(
                    "{stream}: expected {} weights, got {}",
                    self.voices,
                    weights.len()
                )));
            }
            if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(SynthError::InterpolationMismatch(format!(
                    "{stream}: weights must be finite and non-negative"
                )));
            }
            let sum: f64 = weights.iter().sum();
            if sum <= 0.0 {
                return Err(SynthError::InterpolationMismatch(format!(
                    "{stream}: weights sum to zero"
                )));
            }
            if (sum - 1.0).abs() > 1e-6 {
                warn!(stream, sum, "normalizing interpolation weights");
                for w in weights.iter_mut() {
                    *w /= sum;
                }
            }
        }
        Ok(())
    }

    fn compute_duration(&self, model: &mut Model, label: &Label) -> Result<()> {
        if !(label.speed.is_finite() && label.speed > 0.0) {
            return Err(SynthError::Engine(format!("invalid speed {}", label.speed)));
        }
        self.ensure_states(model);
        let weights = model.weights.duration.clone();
        for (i, state) in model.states.iter_mut().enumerate() {
            let frames = Self::blend(&weights, |v| {
                3.0 + 6.0 * Self::unit(&label.query, v, ("duration", i))
            });
            state.duration = (frames / label.speed).round().max(1.0) as usize;
        }
        Ok(())
    }

    fn compute_parameters(&self, model: &mut Model, label: &Label) -> Result<()> {
        self.ensure_states(model);
        let dim = self.order + 1;
        let spectrum_w = model.weights.spectrum.clone();
        let lf0_w = model.weights.lf0.clone();
        for (i, state) in model.states.iter_mut().enumerate() {
            let mean = (0..dim)
                .map(|k| {
                    Self::blend(&spectrum_w, |v| {
                        let u = Self::unit(&label.query, v, ("spectrum", i * dim + k));
                        if k == 0 {
                            7.0 + 0.5 * u
                        } else {
                            0.4 * (u - 0.5) / k as f64
                        }
                    })
                })
                .collect();
            state.spectrum = StreamStats::new(mean, vec![0.02; dim]);

            let f0 = Self::blend(&lf0_w, |v| 100.0 + 120.0 * Self::unit(&label.query, v, ("lf0", i)));
            state.lf0 = StreamStats::new(vec![f0.ln()], vec![0.01]);
            state.voicing = Self::blend(&lf0_w, |v| Self::unit(&label.query, v, ("voicing", i)));
        }
        Ok(())
    }

    fn compute_global_variance(&self, model: &mut Model, label: &Label) -> Result<()> {
        let dim = self.order + 1;
        let spectrum_w = &model.weights.spectrum;
        let mean = (0..dim)
            .map(|k| {
                let base = if k == 0 { 0.3 } else { 0.02 / k as f64 };
                Self::blend(spectrum_w, |v| {
                    base * (0.75 + 0.5 * Self::unit(&label.query, v, ("gv", k)))
                })
            })
            .collect();
        model.gv.spectrum = StreamStats::new(mean, vec![1e-3; dim]);
        model.gv.lf0 = StreamStats::new(vec![0.02], vec![1e-3]);
        Ok(())
    }

    fn optimize(&self, window: &mut [ModelEntry]) {
        let dim = self.order + 1;
        let mut spectrum: Vec<Vec<f64>> = Vec::new();
        let mut spectrum_prec: Vec<Vec<f64>> = Vec::new();
        let mut lf0: Vec<f64> = Vec::new();
        let mut lf0_prec: Vec<f64> = Vec::new();
        let mut voiced: Vec<bool> = Vec::new();
        let mut lengths = Vec::with_capacity(window.len());

        for entry in window.iter() {
            let start = lf0.len();
            for state in &entry.model.states {
                for _ in 0..state.duration {
                    spectrum.push(state.spectrum.mean.clone());
                    spectrum_prec.push(state.spectrum.variance.iter().map(|v| 1.0 / v).collect());
                    lf0.push(state.lf0.mean.first().copied().unwrap_or(0.0));
                    lf0_prec.push(1.0 / state.lf0.variance.first().copied().unwrap_or(1.0));
                    voiced.push(state.voicing > VOICING_THRESHOLD);
                }
            }
            lengths.push(lf0.len() - start);
        }
        if lf0.is_empty() {
            return;
        }

        for k in 0..dim {
            let column: Vec<f64> = spectrum.iter().map(|f| f[k]).collect();
            let prec: Vec<f64> = spectrum_prec.iter().map(|p| p[k]).collect();
            let mut smoothed = smooth(&column, &prec);
            let target = weighted_mean(window, |e| {
                e.model.gv.spectrum.mean.get(k).copied().unwrap_or(0.0)
            });
            apply_gv(&mut smoothed, target, self.gv_weight);
            for (frame, value) in spectrum.iter_mut().zip(smoothed) {
                frame[k] = value;
            }
        }
        let mut lf0 = smooth(&lf0, &lf0_prec);
        let target = weighted_mean(window, |e| e.model.gv.lf0.mean.first().copied().unwrap_or(0.0));
        apply_gv(&mut lf0, target, self.gv_weight);

        let mut offset = 0;
        for (entry, len) in window.iter_mut().zip(lengths) {
            let range = offset..offset + len;
            entry.model.trajectory = Trajectory {
                spectrum: spectrum[range.clone()].to_vec(),
                lf0: lf0[range.clone()].to_vec(),
                voiced: voiced[range].to_vec(),
            };
            offset += len;
        }
    }

    fn render(&self, model: &Model, out: &mut Vec<Frame>) {
        let trajectory = &model.trajectory;
        out.extend((0..trajectory.len()).map(|t| Frame {
            f0: if trajectory.voiced[t] {
                trajectory.lf0[t].exp()
            } else {
                0.0
            },
            spectrum: trajectory.spectrum[t].clone(),
        }));
    }
}

/// Mean of a per-entry value, weighted by each entry's blend weight.
fn weighted_mean(window: &[ModelEntry], pick: impl Fn(&ModelEntry) -> f64) -> f64 {
    let total: f64 = window.iter().map(|e| e.weight).sum::<f64>().max(f64::EPSILON);
    window.iter().map(|e| e.weight * pick(e)).sum::<f64>() / total
}

/// Precision-weighted moving average.
fn smooth(mean: &[f64], precision: &[f64]) -> Vec<f64> {
    let radius = SMOOTHING_KERNEL.len() / 2;
    (0..mean.len())
        .map(|t| {
            let lo = t.saturating_sub(radius);
            let hi = (t + radius + 1).min(mean.len());
            let (mut num, mut den) = (0.0, 0.0);
            for s in lo..hi {
                let w = SMOOTHING_KERNEL[s + radius - t] * precision[s];
                num += w * mean[s];
                den += w;
            }
            if den > 0.0 {
                num / den
            } else {
                mean[t]
            }
        })
        .collect()
}

/// Stretch a trajectory around its mean toward the target variance.
fn apply_gv(values: &mut [f64], target: f64, weight: f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    if var <= 1e-12 || target <= 0.0 {
        return;
    }
    let scale = (1.0 + weight * ((target / var).sqrt() - 1.0)).clamp(0.5, 2.0);
    for v in values.iter_mut() {
        *v = mean + (*v - mean) * scale;
    }
}
