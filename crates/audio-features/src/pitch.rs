//! Monophonic pitch tracking with YIN.

/// Frames quieter than this RMS are treated as unvoiced.
pub const DEFAULT_RMS_GATE: f32 = 0.01;

/// Aperiodicity threshold for the first dip in the normalised difference.
const YIN_THRESHOLD: f32 = 0.15;

/// Search bounds in Hz.
pub const MIN_PITCH_HZ: f32 = 65.0;
pub const MAX_PITCH_HZ: f32 = 2000.0;

/// Estimate the fundamental of one frame, `None` if silent or aperiodic.
pub fn yin(frame: &[f32], sample_rate: u32, rms_gate: f32) -> Option<f32> {
    let half = frame.len() / 2;
    if half < 2 || sample_rate == 0 {
        return None;
    }

    let rms = (frame.iter().map(|&s| s * s).sum::<f32>() / frame.len() as f32).sqrt();
    if rms < rms_gate {
        return None;
    }

    let tau_min = ((sample_rate as f32 / MAX_PITCH_HZ).floor() as usize).max(2);
    let tau_max = ((sample_rate as f32 / MIN_PITCH_HZ).ceil() as usize).min(half - 1);
    if tau_min >= tau_max {
        return None;
    }

    // Difference function d(tau) followed by cumulative mean normalisation
    let mut cmnd = vec![1.0f32; tau_max + 1];
    let mut running = 0.0f32;
    for tau in 1..=tau_max {
        let d: f32 = (0..half)
            .map(|i| {
                let delta = frame[i] - frame[i + tau];
                delta * delta
            })
            .sum();
        running += d;
        cmnd[tau] = if running > 0.0 {
            d * tau as f32 / running
        } else {
            1.0
        };
    }

    let mut period = None;
    let mut tau = tau_min;
    while tau < tau_max {
        if cmnd[tau] < YIN_THRESHOLD {
            // walk down to the bottom of this dip
            while tau + 1 < tau_max && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }
            period = Some(tau);
            break;
        }
        tau += 1;
    }
    let period = period?;

    let refined = if period > 0 && period + 1 <= tau_max {
        let (y1, y2, y3) = (cmnd[period - 1], cmnd[period], cmnd[period + 1]);
        let denom = y1 - 2.0 * y2 + y3;
        if denom.abs() > f32::EPSILON {
            period as f32 + (y1 - y3) / (2.0 * denom)
        } else {
            period as f32
        }
    } else {
        period as f32
    };

    let freq = sample_rate as f32 / refined;
    (freq.is_finite() && (MIN_PITCH_HZ..=MAX_PITCH_HZ).contains(&freq)).then_some(freq)
}

/// Run [`yin`] over every analysis frame.
pub fn track(samples: &[f32], sample_rate: u32, frame_size: usize, hop: usize) -> Vec<Option<f32>> {
    let n = crate::spectrum::frame_count(samples.len(), frame_size, hop);
    (0..n)
        .map(|i| {
            let start = i * hop;
            yin(&samples[start..start + frame_size], sample_rate, DEFAULT_RMS_GATE)
        })
        .collect()
}

/// Convert Hz to the nearest MIDI note number.
pub fn hz_to_midi(freq: f32) -> i32 {
    (69.0 + 12.0 * (freq / 440.0).log2()).round() as i32
}
