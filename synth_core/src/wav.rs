use std::io::Cursor;

use base64::Engine as _;

use crate::error::{Result, SynthError};

/// Encode normalized samples as a mono 16-bit PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    // 44-byte header plus two bytes per sample
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| SynthError::Encode(format!("wav header: {e}")))?;
        const I16_MAX_F32: f32 = i16::MAX as f32;
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16;
            writer
                .write_sample(v)
                .map_err(|e| SynthError::Encode(format!("wav sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| SynthError::Encode(format!("wav finalize: {e}")))?;
    }
    Ok(cursor.into_inner())
}

pub fn encode_wav_base64(samples: &[f32], sample_rate: u32) -> Result<String> {
    let wav = encode_wav(samples, sample_rate)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(wav))
}

/// Playback length of `samples` at `sample_rate`, in milliseconds.
pub fn duration_ms(samples: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (samples as u64 * 1000) / sample_rate as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_header_and_length() {
        let samples = vec![0.0f32, 0.5, -0.5, 2.0];
        let wav = encode_wav(&samples, 16_000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + samples.len() * 2);

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded[3], i16::MAX);
    }

    #[test]
    fn test_duration_ms() {
        assert_eq!(duration_ms(48_000, 48_000), 1000);
        assert_eq!(duration_ms(240, 48_000), 5);
        assert_eq!(duration_ms(10, 0), 0);
    }
}
