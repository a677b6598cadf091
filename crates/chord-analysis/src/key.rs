use crate::chord_templates::{note_name, FLAT_KEY_ROOTS};
use crate::note::NoteEvent;
use crate::types::{KeyEstimate, KeyMode};

/// Krumhansl-Kessler major key profile (duration-weighted perception studies).
const MAJOR_PROFILE: [f64; 12] = [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];

/// Krumhansl-Kessler minor key profile.
const MINOR_PROFILE: [f64; 12] = [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];

/// Estimate the key of a note stream from its duration-weighted pitch-class histogram.
pub fn estimate_key(notes: &[NoteEvent]) -> KeyEstimate {
    let mut histogram = [0.0_f64; 12];
    for note in notes {
        histogram[note.pitch_class() as usize] += note.duration().max(0.0);
    }
    estimate_key_from_histogram(&histogram)
}

/// Krumhansl-Schmuckler over any 12-bin pitch-class weighting (note durations, mean chroma).
///
/// An all-zero histogram gives C major with zero confidence.
pub fn estimate_key_from_histogram(histogram: &[f64; 12]) -> KeyEstimate {
    let total: f64 = histogram.iter().sum();
    if !(total > 0.0) {
        return KeyEstimate::default();
    }

    let mut best_root: u8 = 0;
    let mut best_mode = KeyMode::Major;
    let mut best_corr = -1.0_f64;

    for root in 0..12u8 {
        // Rotate histogram so root = index 0
        let mut rotated = [0.0; 12];
        for (i, slot) in rotated.iter_mut().enumerate() {
            *slot = histogram[(i + root as usize) % 12] / total;
        }

        let major_corr = pearson(&rotated, &MAJOR_PROFILE);
        if major_corr > best_corr {
            best_corr = major_corr;
            best_root = root;
            best_mode = KeyMode::Major;
        }

        let minor_corr = pearson(&rotated, &MINOR_PROFILE);
        if minor_corr > best_corr {
            best_corr = minor_corr;
            best_root = root;
            best_mode = KeyMode::Minor;
        }
    }

    KeyEstimate {
        root: note_name(best_root, FLAT_KEY_ROOTS.contains(&best_root)).to_string(),
        root_pitch_class: best_root,
        mode: best_mode,
        confidence: (best_corr.max(0.0) * 10000.0).round() / 10000.0,
        dominant_notes: dominant_notes(histogram, 3),
    }
}

/// Names of the `count` heaviest pitch classes, heaviest first. Empty bins are skipped.
fn dominant_notes(histogram: &[f64; 12], count: usize) -> Vec<String> {
    let mut order: Vec<usize> = (0..12).filter(|&pc| histogram[pc] > 0.0).collect();
    order.sort_by(|&a, &b| histogram[b].total_cmp(&histogram[a]).then(a.cmp(&b)));
    order
        .into_iter()
        .take(count)
        .map(|pc| note_name(pc as u8, false).to_string())
        .collect()
}

/// Pearson correlation coefficient between two 12-element arrays.
fn pearson(x: &[f64; 12], y: &[f64; 12]) -> f64 {
    let x_mean: f64 = x.iter().sum::<f64>() / 12.0;
    let y_mean: f64 = y.iter().sum::<f64>() / 12.0;

    let mut num = 0.0;
    let mut x_sq = 0.0;
    let mut y_sq = 0.0;

    for i in 0..12 {
        let xd = x[i] - x_mean;
        let yd = y[i] - y_mean;
        num += xd * yd;
        x_sq += xd * xd;
        y_sq += yd * yd;
    }

    let denom = (x_sq * y_sq).sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    num / denom
}
