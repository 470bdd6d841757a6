use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::{Action, Frame};
use crate::vocoder::Vocoder;

const NOISE_SEED: u64 = 0x5eed;

/// Pulse-train / white-noise excitation shaped by the frame gain (`c0`)
/// and a one-pole low-pass whose coefficient is `alpha`.
///
/// `gamma` is carried for callers that report it; the excitation has no
/// generalized-log filter to apply it to.
#[derive(Debug, Clone)]
pub struct PulseVocoder {
    sample_rate: u32,
    fperiod: usize,
    samples: VecDeque<f64>,
    phase: f64,
    last: f64,
    pitch: f64,
    pitch_action: Action,
    alpha: f64,
    gamma: f64,
    volume: f64,
    rng: StdRng,
}

impl PulseVocoder {
    pub fn new(sample_rate: u32, fperiod: usize) -> Self {
        Self {
            sample_rate,
            fperiod,
            samples: VecDeque::with_capacity(fperiod * 4),
            phase: 0.0,
            last: 0.0,
            pitch: 0.0,
            pitch_action: Action::Synthetic,
            alpha: 0.42,
            gamma: 0.0,
            volume: 1.0,
            rng: StdRng::seed_from_u64(NOISE_SEED),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn pitch_action(&self) -> Action {
        self.pitch_action
    }

    /// Samples synthesized but not yet popped.
    pub fn buffered(&self) -> usize {
        self.samples.len()
    }
}

impl Vocoder for PulseVocoder {
    fn push(&mut self, frame: Frame) {
        let voiced = frame.is_voiced();
        let rate = self.sample_rate as f64;
        // Pulses above Nyquist alias; cap the train there.
        let f0 = if voiced {
            self.pitch_action
                .apply(frame.f0, self.pitch)
                .max(0.0)
                .min(rate / 2.0)
        } else {
            0.0
        };
        let gain = frame.spectrum.first().map_or(0.0, |c0| c0.exp()) * self.volume;
        let smoothing = self.alpha.abs().min(0.99);

        for _ in 0..self.fperiod {
            let excitation = if voiced {
                if f0 > 0.0 {
                    self.phase += f0 / rate;
                    if self.phase >= 1.0 {
                        self.phase = self.phase.fract();
                        (rate / f0).sqrt()
                    } else {
                        0.0
                    }
                } else {
                    0.0
                }
            } else {
                self.rng.gen_range(-1.0..1.0)
            };
            self.last = (1.0 - smoothing) * gain * excitation + smoothing * self.last;
            if !self.last.is_finite() {
                self.last = 0.0;
            }
            self.samples.push_back(self.last);
        }
    }

    fn pop(&mut self) -> f64 {
        self.samples.pop_front().unwrap_or(0.0)
    }

    fn ready(&self) -> bool {
        !self.samples.is_empty()
    }

    fn reset(&mut self) {
        self.samples.clear();
        self.phase = 0.0;
        self.last = 0.0;
        self.rng = StdRng::seed_from_u64(NOISE_SEED);
    }

    fn pitch(&self) -> f64 {
        self.pitch
    }

    fn set_pitch(&mut self, pitch: f64, action: Action) {
        self.pitch = pitch;
        self.pitch_action = action;
    }

    fn alpha(&self) -> f64 {
        self.alpha
    }

    fn set_alpha(&mut self, alpha: f64) {
        self.alpha = alpha;
    }

    fn gamma(&self) -> f64 {
        self.gamma
    }

    fn set_gamma(&mut self, gamma: f64) {
        self.gamma = gamma;
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voiced(f0: f64) -> Frame {
        Frame {
            f0,
            spectrum: vec![7.0, 0.1],
        }
    }

    #[test]
    fn test_one_frame_yields_fperiod_samples() {
        let mut vocoder = PulseVocoder::new(16_000, 80);
        assert!(!vocoder.ready());
        vocoder.push(voiced(120.0));
        assert_eq!(vocoder.buffered(), 80);
        for _ in 0..80 {
            assert!(vocoder.ready());
            vocoder.pop();
        }
        assert!(!vocoder.ready());
        assert_eq!(vocoder.pop(), 0.0);
    }

    #[test]
    fn test_reset_clears_buffer_and_is_reproducible() {
        let mut vocoder = PulseVocoder::new(16_000, 40);
        vocoder.push(Frame {
            f0: 0.0,
            spectrum: vec![6.0],
        });
        let first: Vec<f64> = (0..40).map(|_| vocoder.pop()).collect();
        vocoder.push(voiced(200.0));
        vocoder.reset();
        assert!(!vocoder.ready());
        vocoder.push(Frame {
            f0: 0.0,
            spectrum: vec![6.0],
        });
        let second: Vec<f64> = (0..40).map(|_| vocoder.pop()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_volume_is_silent() {
        let mut vocoder = PulseVocoder::new(16_000, 160);
        vocoder.set_volume(0.0);
        vocoder.push(voiced(150.0));
        while vocoder.ready() {
            assert_eq!(vocoder.pop(), 0.0);
        }
    }

    #[test]
    fn test_pitch_overwrite_only_touches_voiced_frames() {
        let mut vocoder = PulseVocoder::new(16_000, 160);
        vocoder.set_pitch(0.0, Action::Overwrite);
        assert_eq!(vocoder.pitch_action(), Action::Overwrite);
        // Overwriting with 0 Hz silences the pulse train entirely.
        vocoder.push(voiced(150.0));
        while vocoder.ready() {
            assert_eq!(vocoder.pop(), 0.0);
        }
    }

    #[test]
    fn test_pitch_above_nyquist_then_zero_recovers() {
        let mut vocoder = PulseVocoder::new(16_000, 160);
        vocoder.set_pitch(40_000.0, Action::Overwrite);
        vocoder.push(voiced(150.0));
        vocoder.set_pitch(0.0, Action::Overwrite);
        vocoder.push(voiced(150.0));
        while vocoder.ready() {
            assert!(vocoder.pop().is_finite());
        }

        vocoder.set_pitch(0.0, Action::Synthetic);
        vocoder.set_volume(0.0);
        vocoder.push(voiced(150.0));
        assert_eq!(vocoder.buffered(), 160);
        let tail: Vec<f64> = (0..160).map(|_| vocoder.pop()).collect();
        assert!(tail.iter().all(|s| s.is_finite()));
        // Silent input decays; it does not stick at full scale.
        assert!(tail.last().unwrap().abs() < 1.0);
        assert!(crate::vocoder::normalize_sample(*tail.last().unwrap()).abs() < 1.0);
    }

    #[test]
    fn test_phase_stays_bounded_at_extreme_pitch() {
        let mut vocoder = PulseVocoder::new(16_000, 320);
        vocoder.set_pitch(1.0e9, Action::Overwrite);
        vocoder.push(voiced(150.0));
        assert!(vocoder.phase < 1.0);
        while vocoder.ready() {
            assert!(vocoder.pop().is_finite());
        }
    }
}
