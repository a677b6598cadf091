//! Global tempo and beat positions from the onset envelope.
//!
//! The envelope is smoothed, autocorrelated over lags covering 60–200 BPM and
//! weighted with a log-normal prior centred on 120 BPM. Beats are then laid on
//! a grid at that period, phase-aligned to the envelope's energy.

use tracing::debug;

use crate::FeatureFrames;

pub const DEFAULT_BPM: f64 = 120.0;
pub const MIN_BPM: f64 = 60.0;
pub const MAX_BPM: f64 = 200.0;

/// Width of the tempo prior in octaves.
const PRIOR_OCTAVES: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TempoEstimate {
    pub bpm: f64,
    /// Beat positions in seconds, ascending.
    pub beat_times: Vec<f64>,
}

impl TempoEstimate {
    fn fallback() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            beat_times: Vec::new(),
        }
    }
}

pub fn estimate_tempo(frames: &FeatureFrames) -> TempoEstimate {
    let hop = frames.hop_seconds;
    let env = smooth(&frames.onset_envelope);
    if hop <= 0.0 || env.iter().all(|&v| v <= 0.0) {
        return TempoEstimate::fallback();
    }

    let lag_min = (60.0 / (MAX_BPM * hop)).ceil() as usize;
    let lag_max = ((60.0 / (MIN_BPM * hop)).floor() as usize).min(env.len().saturating_sub(2));
    if lag_min < 1 || lag_min + 1 >= lag_max {
        return TempoEstimate::fallback();
    }

    let mean = env.iter().sum::<f32>() / env.len() as f32;
    let centred: Vec<f32> = env.iter().map(|&v| v - mean).collect();

    let score: Vec<f64> = (0..=lag_max + 1)
        .map(|lag| {
            if lag == 0 || lag >= centred.len() {
                return 0.0;
            }
            let n = centred.len() - lag;
            let ac: f32 = (0..n).map(|i| centred[i] * centred[i + lag]).sum();
            let bpm = 60.0 / (lag as f64 * hop);
            let prior = (-0.5 * ((bpm / DEFAULT_BPM).log2() / PRIOR_OCTAVES).powi(2)).exp();
            (ac / n as f32) as f64 * prior
        })
        .collect();

    let best = (lag_min..=lag_max).fold(lag_min, |best, lag| {
        if score[lag] > score[best] {
            lag
        } else {
            best
        }
    });
    if score[best] <= 0.0 {
        return TempoEstimate::fallback();
    }

    let (y1, y2, y3) = (score[best - 1], score[best], score[best + 1]);
    let denom = y1 - 2.0 * y2 + y3;
    let shift = if denom.abs() > f64::EPSILON {
        (0.5 * (y1 - y3) / denom).clamp(-0.5, 0.5)
    } else {
        0.0
    };
    let period = best as f64 + shift;
    let bpm = 60.0 / (period * hop);

    let beat_times = align_beats(&env, period, hop, frames.duration);
    debug!(bpm, beats = beat_times.len(), "estimated tempo");

    TempoEstimate { bpm, beat_times }
}

/// Pick the grid phase that collects the most envelope energy.
fn align_beats(env: &[f32], period: f64, hop: f64, duration: f64) -> Vec<f64> {
    let grid = |phase: f64| {
        let mut pos = phase;
        std::iter::from_fn(move || {
            let here = pos;
            pos += period;
            Some(here)
        })
    };

    let phases = period.ceil() as usize;
    let best_phase = (0..phases)
        .map(|p| {
            let energy: f32 = grid(p as f64)
                .map(|f| f.round() as usize)
                .take_while(|&i| i < env.len())
                .map(|i| env[i])
                .sum();
            (p, energy)
        })
        .fold((0usize, f32::MIN), |acc, (p, e)| if e > acc.1 { (p, e) } else { acc });

    grid(best_phase.0 as f64)
        .map(|f| f * hop)
        .take_while(|&t| t < duration)
        .collect()
}

/// Five-tap triangular smoothing so near-miss lags still correlate.
fn smooth(env: &[f32]) -> Vec<f32> {
    const KERNEL: [f32; 5] = [1.0, 2.0, 3.0, 2.0, 1.0];
    let norm: f32 = KERNEL.iter().sum();
    (0..env.len())
        .map(|i| {
            KERNEL
                .iter()
                .enumerate()
                .filter_map(|(k, &w)| {
                    let idx = (i + k).checked_sub(2)?;
                    env.get(idx).map(|&v| v * w)
                })
                .sum::<f32>()
                / norm
        })
        .collect()
}
