use crate::model::{Action, Frame};

/// Waveform synthesis from frames, with a small internal sample buffer.
pub trait Vocoder: Send {
    /// Queue one frame for synthesis.
    fn push(&mut self, frame: Frame);

    /// Next raw sample on the 16-bit integer scale. Only meaningful when
    /// [`ready`](Vocoder::ready) is true.
    fn pop(&mut self) -> f64;

    fn ready(&self) -> bool;

    /// Drop buffered samples and filter state.
    fn reset(&mut self);

    fn pitch(&self) -> f64;
    fn set_pitch(&mut self, pitch: f64, action: Action);
    fn alpha(&self) -> f64;
    fn set_alpha(&mut self, alpha: f64);
    fn gamma(&self) -> f64;
    fn set_gamma(&mut self, gamma: f64);
    fn volume(&self) -> f64;
    fn set_volume(&mut self, volume: f64);
}

/// Rescale a raw vocoder sample to the unit range with 6 dB of headroom.
/// Non-finite input maps to silence.
pub fn normalize_sample(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    (0.5 * raw / 32768.0).clamp(-1.0, 1.0)
}

/// Pop one normalized sample, or silence when the vocoder has nothing.
pub fn next_sample<V: Vocoder + ?Sized>(vocoder: &mut V) -> f64 {
    if vocoder.ready() {
        normalize_sample(vocoder.pop())
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sample_clamps() {
        assert_eq!(normalize_sample(65536.0), 1.0);
        assert_eq!(normalize_sample(-65536.0), -1.0);
        assert_eq!(normalize_sample(0.0), 0.0);
        assert_eq!(normalize_sample(1e9), 1.0);
        assert_eq!(normalize_sample(-1e9), -1.0);
        assert_eq!(normalize_sample(32768.0), 0.5);
    }

    #[test]
    fn test_normalize_sample_silences_non_finite() {
        assert_eq!(normalize_sample(f64::NAN), 0.0);
        assert_eq!(normalize_sample(f64::INFINITY), 0.0);
        assert_eq!(normalize_sample(f64::NEG_INFINITY), 0.0);
    }
}
