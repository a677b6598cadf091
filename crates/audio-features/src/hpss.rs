//! Harmonic/percussive separation by median filtering the STFT magnitudes.
//!
//! Sustained partials are smooth along time, transients are smooth along
//! frequency. Median filtering in each direction gives two estimates, which
//! become Wiener-style soft masks over the original spectrogram.

use tracing::debug;

use crate::features::FeatureParams;
use crate::spectrum::{stft, Spectrogram};
use crate::AudioBuffer;

/// Median filter length, in frames for the harmonic pass and bins for the percussive pass.
pub const DEFAULT_KERNEL: usize = 31;

/// Mean RMS of the harmonic and percussive parts of a signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyBalance {
    pub harmonic: f64,
    pub percussive: f64,
}

impl EnergyBalance {
    /// Harmonic share of the total, 0 for silence.
    pub fn ratio(&self) -> f64 {
        let total = self.harmonic + self.percussive;
        if total > 0.0 {
            self.harmonic / total
        } else {
            0.0
        }
    }

    pub fn is_harmonic(&self) -> bool {
        self.ratio() > 0.5
    }
}

/// Masked magnitude spectrograms, same shape as the input.
#[derive(Debug, Clone)]
pub struct Separation {
    pub harmonic: Vec<Vec<f32>>,
    pub percussive: Vec<Vec<f32>>,
}

/// Split a magnitude spectrogram into harmonic and percussive parts.
pub fn separate(spec: &Spectrogram, kernel: usize) -> Separation {
    let kernel = kernel.max(1);
    let n_frames = spec.frames.len();
    let n_bins = spec.frames.first().map_or(0, Vec::len);

    let mut scratch = Vec::with_capacity(kernel);
    let mut along_time = vec![vec![0.0f32; n_bins]; n_frames];
    for bin in 0..n_bins {
        for (frame, out) in along_time.iter_mut().enumerate() {
            let (lo, hi) = centred(frame, kernel, n_frames);
            scratch.clear();
            scratch.extend(spec.frames[lo..hi].iter().map(|f| f[bin]));
            out[bin] = median(&mut scratch);
        }
    }

    let along_freq: Vec<Vec<f32>> = spec
        .frames
        .iter()
        .map(|frame| {
            (0..n_bins)
                .map(|bin| {
                    let (lo, hi) = centred(bin, kernel, n_bins);
                    scratch.clear();
                    scratch.extend_from_slice(&frame[lo..hi]);
                    median(&mut scratch)
                })
                .collect()
        })
        .collect();

    let mut harmonic = Vec::with_capacity(n_frames);
    let mut percussive = Vec::with_capacity(n_frames);
    for ((frame, h), p) in spec.frames.iter().zip(&along_time).zip(&along_freq) {
        let (hf, pf): (Vec<f32>, Vec<f32>) = frame
            .iter()
            .zip(h.iter().zip(p))
            .map(|(&mag, (&h, &p))| {
                let (h2, p2) = (h * h, p * p);
                let total = h2 + p2;
                if total > 0.0 {
                    (mag * h2 / total, mag * p2 / total)
                } else {
                    (0.0, 0.0)
                }
            })
            .unzip();
        harmonic.push(hf);
        percussive.push(pf);
    }

    Separation {
        harmonic,
        percussive,
    }
}

/// Harmonic vs percussive energy of `audio`, framed as in [`FeatureParams`].
pub fn energy_balance(audio: &AudioBuffer, params: &FeatureParams) -> EnergyBalance {
    let spec = stft(&audio.samples, audio.sample_rate, params.frame_size, params.hop);
    let parts = separate(&spec, DEFAULT_KERNEL);
    let balance = EnergyBalance {
        harmonic: mean_rms(&parts.harmonic, spec.frame_size),
        percussive: mean_rms(&parts.percussive, spec.frame_size),
    };
    debug!(
        harmonic = balance.harmonic,
        percussive = balance.percussive,
        "energy balance"
    );
    balance
}

/// Mean per-frame time-domain RMS, recovered from one-sided Hann-windowed
/// magnitudes via Parseval.
fn mean_rms(frames: &[Vec<f32>], frame_size: usize) -> f64 {
    if frames.is_empty() || frame_size == 0 {
        return 0.0;
    }
    // Hann mean square is 3/8
    let norm = (frame_size as f64).powi(2) * 0.375;
    let last = frame_size / 2;
    let total: f64 = frames
        .iter()
        .map(|frame| {
            let energy: f64 = frame
                .iter()
                .enumerate()
                .map(|(bin, &m)| {
                    let e = (m as f64).powi(2);
                    if bin == 0 || bin == last {
                        e
                    } else {
                        2.0 * e
                    }
                })
                .sum();
            (energy / norm).sqrt()
        })
        .sum();
    total / frames.len() as f64
}

fn centred(index: usize, kernel: usize, len: usize) -> (usize, usize) {
    let half = kernel / 2;
    (index.saturating_sub(half), (index + half + 1).min(len))
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1
}
