//! Per-frame 12-bin chroma vectors.

use crate::spectrum::Spectrogram;

/// Lowest frequency folded into chroma (about C2).
pub const MIN_FREQ: f32 = 65.0;
/// Above this, harmonics dominate the fundamentals.
pub const MAX_FREQ: f32 = 2000.0;

/// Map an FFT bin to its pitch class (C = 0), or `None` outside the chroma band.
pub fn bin_pitch_class(freq: f32) -> Option<usize> {
    if !(MIN_FREQ..=MAX_FREQ).contains(&freq) {
        return None;
    }
    let semitones_from_a = 12.0 * (freq / 440.0).log2();
    let pc = (semitones_from_a.round() as i32 + 9).rem_euclid(12);
    Some(pc as usize)
}

/// Chroma for every spectrogram frame, each normalised so its largest bin is 1.
/// Silent frames stay all-zero.
pub fn chromagram(spec: &Spectrogram) -> Vec<[f32; 12]> {
    let map: Vec<Option<usize>> = (0..spec.bin_count())
        .map(|bin| bin_pitch_class(spec.bin_frequency(bin)))
        .collect();

    spec.frames
        .iter()
        .map(|frame| {
            let mut chroma = [0.0f32; 12];
            for (mag, pc) in frame.iter().zip(&map) {
                if let Some(pc) = pc {
                    chroma[*pc] += mag * mag;
                }
            }
            normalize_max(&mut chroma);
            chroma
        })
        .collect()
}

pub(crate) fn normalize_max(chroma: &mut [f32; 12]) {
    let max = chroma.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        for v in chroma.iter_mut() {
            *v /= max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::stft;
    use crate::test_signals::tones;

    #[test]
    fn a440_is_pitch_class_nine() {
        assert_eq!(bin_pitch_class(440.0), Some(9));
        assert_eq!(bin_pitch_class(261.63), Some(0));
        assert_eq!(bin_pitch_class(30.0), None);
        assert_eq!(bin_pitch_class(5000.0), None);
    }

    #[test]
    fn c_major_triad_lights_c_e_g() {
        // C4, E4, G4
        let audio = tones(&[(261.63, 0.3), (329.63, 0.3), (392.0, 0.3)], 22050, 1.0);
        let spec = stft(&audio.samples, 22050, 2048, 512);
        let chroma = chromagram(&spec);
        let frame = chroma[chroma.len() / 2];

        let mut ranked: Vec<usize> = (0..12).collect();
        ranked.sort_by(|&a, &b| frame[b].total_cmp(&frame[a]));
        let mut top: Vec<usize> = ranked[..3].to_vec();
        top.sort();
        assert_eq!(top, vec![0, 4, 7]);
        assert!(frame.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn silent_frames_are_zero() {
        let spec = stft(&vec![0.0; 4096], 22050, 2048, 512);
        let chroma = chromagram(&spec);
        assert!(chroma.iter().all(|c| c.iter().all(|&v| v == 0.0)));
    }
}
