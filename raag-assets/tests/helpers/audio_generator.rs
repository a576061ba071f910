//! Audio Test Fixture Generator
//!
//! WAV payloads for mock transfers. The pipeline sniffs audio by magic bytes,
//! so these only need a valid RIFF/WAVE header and enough samples to clear
//! the genuine-size threshold.

use std::io::Cursor;

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            // 2 s of 16-bit stereo at 44.1 kHz is ~352 KB, above the 300 KB threshold
            duration_seconds: 2.0,
            sample_rate: 44100,
            channels: 2,
        }
    }
}

/// Encode a 440 Hz tone as an in-memory WAV file
pub fn wav_bytes(config: &AudioConfig) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buf = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec).unwrap();
        let total_samples = (config.duration_seconds * config.sample_rate as f64) as usize;
        for i in 0..total_samples {
            let t = i as f32 / config.sample_rate as f32;
            let sample =
                (0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin() * i16::MAX as f32) as i16;
            for _ in 0..config.channels {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    buf
}

/// WAV bytes large enough to classify as genuine audio
pub fn genuine_wav_bytes() -> Vec<u8> {
    wav_bytes(&AudioConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_wav_clears_threshold() {
        let bytes = genuine_wav_bytes();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert!(bytes.len() > 300_000, "got {} bytes", bytes.len());
    }

    #[test]
    fn test_short_wav_is_small() {
        let bytes = wav_bytes(&AudioConfig {
            duration_seconds: 0.1,
            ..Default::default()
        });
        assert!(bytes.len() < 300_000);
    }
}
