//! Spectral-flux onset envelope and peak picking.

use crate::spectrum::Spectrogram;

/// Peak-picking parameters, in frames.
#[derive(Debug, Clone, Copy)]
pub struct PeakPicking {
    /// A peak must be the maximum within this many frames either side.
    pub max_radius: usize,
    /// Frames before the candidate used for the local mean.
    pub mean_window: usize,
    /// Added to the local mean, as a fraction of the envelope's global maximum.
    pub delta: f32,
    /// Minimum distance between consecutive onsets.
    pub min_gap: usize,
}

impl Default for PeakPicking {
    fn default() -> Self {
        Self {
            max_radius: 3,
            mean_window: 10,
            delta: 0.07,
            min_gap: 3,
        }
    }
}

/// Half-wave rectified log-magnitude flux. Frame 0 is measured against silence.
pub fn onset_envelope(spec: &Spectrogram) -> Vec<f32> {
    let mut prev = vec![0.0f32; spec.bin_count()];
    spec.frames
        .iter()
        .map(|frame| {
            let mut flux = 0.0f32;
            for (p, &mag) in prev.iter_mut().zip(frame) {
                let log_mag = (1.0 + mag).ln();
                flux += (log_mag - *p).max(0.0);
                *p = log_mag;
            }
            flux
        })
        .collect()
}

/// Indices of frames where the envelope peaks above its local mean.
pub fn pick_onsets(envelope: &[f32], params: &PeakPicking) -> Vec<usize> {
    let global_max = envelope.iter().copied().fold(0.0f32, f32::max);
    if global_max <= 0.0 {
        return Vec::new();
    }
    let delta = params.delta * global_max;

    let mut onsets: Vec<usize> = Vec::new();
    for (i, &value) in envelope.iter().enumerate() {
        let lo = i.saturating_sub(params.max_radius);
        let hi = (i + params.max_radius + 1).min(envelope.len());
        let is_local_max = envelope[lo..hi].iter().all(|&v| v <= value);
        if !is_local_max {
            continue;
        }

        let mlo = i.saturating_sub(params.mean_window);
        let window = &envelope[mlo..hi];
        let mean = window.iter().sum::<f32>() / window.len() as f32;
        if value < mean + delta {
            continue;
        }

        if let Some(&last) = onsets.last() {
            if i - last < params.min_gap {
                continue;
            }
        }
        onsets.push(i);
    }
    onsets
}
