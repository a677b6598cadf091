//! Classical signal primitives for audio analysis.
//!
//! Everything here works on a mono [`AudioBuffer`] and produces
//! frame-indexed feature arrays (see [`FeatureFrames`]). The chord
//! pipeline uses these when no transcription backend is available.

pub mod chroma;
pub mod decode;
pub mod features;
pub mod hpss;
pub mod onset;
pub mod pitch;
pub mod spectrum;
pub mod tempo;

pub use decode::{decode_bytes, decode_file};
pub use features::{extract, FeatureFrames, FeatureParams};
pub use hpss::{energy_balance, EnergyBalance};
pub use tempo::{estimate_tempo, TempoEstimate};

/// Errors from decoding or analysing audio.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("audio I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Mono PCM samples at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.sample_rate as f64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_signals {
    use super::AudioBuffer;
    use std::f32::consts::PI;

    /// Sum of sine waves, each `(frequency, amplitude)`.
    pub fn tones(freqs: &[(f32, f32)], sample_rate: u32, seconds: f32) -> AudioBuffer {
        let n = (sample_rate as f32 * seconds) as usize;
        let samples = (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                freqs
                    .iter()
                    .map(|&(f, a)| a * (2.0 * PI * f * t).sin())
                    .sum::<f32>()
            })
            .collect();
        AudioBuffer::new(samples, sample_rate)
    }

    /// Short decaying clicks at a fixed tempo.
    pub fn clicks(bpm: f32, sample_rate: u32, seconds: f32) -> AudioBuffer {
        let n = (sample_rate as f32 * seconds) as usize;
        let mut samples = vec![0.0f32; n];
        let period = (60.0 / bpm * sample_rate as f32) as usize;
        let click_len = (sample_rate as f32 * 0.02) as usize;
        let mut start = 0;
        while start < n {
            for i in 0..click_len.min(n - start) {
                let env = 1.0 - i as f32 / click_len as f32;
                let t = i as f32 / sample_rate as f32;
                samples[start + i] = env * (2.0 * PI * 1000.0 * t).sin();
            }
            start += period;
        }
        AudioBuffer::new(samples, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_from_sample_count() {
        let audio = AudioBuffer::new(vec![0.0; 44100], 22050);
        assert_eq!(audio.duration_seconds(), 2.0);
    }

    #[test]
    fn zero_rate_has_zero_duration() {
        let audio = AudioBuffer::new(vec![0.0; 10], 0);
        assert_eq!(audio.duration_seconds(), 0.0);
    }
}
