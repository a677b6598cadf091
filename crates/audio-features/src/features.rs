use tracing::debug;

use crate::onset::{onset_envelope, pick_onsets, PeakPicking};
use crate::spectrum::{spectral_centroid, stft};
use crate::{chroma, pitch, AudioBuffer};

/// STFT framing and onset-picking settings.
#[derive(Debug, Clone, Copy)]
pub struct FeatureParams {
    pub frame_size: usize,
    pub hop: usize,
    pub peaks: PeakPicking,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop: 512,
            peaks: PeakPicking::default(),
        }
    }
}

/// Frame-indexed features. Frame `i` starts at `i * hop_seconds`.
#[derive(Debug, Clone, Default)]
pub struct FeatureFrames {
    pub hop_seconds: f64,
    /// Duration of the source audio, not of the framed region.
    pub duration: f64,
    pub chroma: Vec<[f32; 12]>,
    pub onset_envelope: Vec<f32>,
    pub onsets: Vec<usize>,
    pub pitch: Vec<Option<f32>>,
    pub centroid: Vec<f32>,
}

impl FeatureFrames {
    pub fn len(&self) -> usize {
        self.chroma.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chroma.is_empty()
    }

    pub fn frame_time(&self, frame: usize) -> f64 {
        frame as f64 * self.hop_seconds
    }

    pub fn onset_times(&self) -> Vec<f64> {
        self.onsets.iter().map(|&f| self.frame_time(f)).collect()
    }

    /// Mean spectral centroid over non-silent frames, in Hz.
    pub fn mean_centroid(&self) -> f64 {
        let voiced: Vec<f32> = self.centroid.iter().copied().filter(|&c| c > 0.0).collect();
        if voiced.is_empty() {
            0.0
        } else {
            voiced.iter().map(|&c| c as f64).sum::<f64>() / voiced.len() as f64
        }
    }
}

/// Compute every frame feature in one STFT pass.
///
/// Audio shorter than one frame yields empty arrays.
pub fn extract(audio: &AudioBuffer, params: &FeatureParams) -> FeatureFrames {
    let hop_seconds = if audio.sample_rate == 0 {
        0.0
    } else {
        params.hop as f64 / audio.sample_rate as f64
    };

    let spec = stft(&audio.samples, audio.sample_rate, params.frame_size, params.hop);
    let chroma = chroma::chromagram(&spec);
    let onset_envelope = onset_envelope(&spec);
    let onsets = pick_onsets(&onset_envelope, &params.peaks);
    let centroid = spec
        .frames
        .iter()
        .map(|frame| spectral_centroid(frame, &spec))
        .collect();
    let pitch = pitch::track(&audio.samples, audio.sample_rate, params.frame_size, params.hop);

    debug!(
        frames = chroma.len(),
        onsets = onsets.len(),
        voiced = pitch.iter().filter(|p| p.is_some()).count(),
        "extracted audio features"
    );

    FeatureFrames {
        hop_seconds,
        duration: audio.duration_seconds(),
        chroma,
        onset_envelope,
        onsets,
        pitch,
        centroid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_signals::tones;

    #[test]
    fn arrays_share_frame_count() {
        let audio = tones(&[(440.0, 0.4)], 22050, 1.0);
        let frames = extract(&audio, &FeatureParams::default());
        let n = frames.len();
        assert!(n > 0);
        assert_eq!(frames.onset_envelope.len(), n);
        assert_eq!(frames.pitch.len(), n);
        assert_eq!(frames.centroid.len(), n);
        assert!((frames.duration - 1.0).abs() < 1e-3);
    }

    #[test]
    fn short_audio_yields_no_frames() {
        let audio = AudioBuffer::new(vec![0.1; 100], 22050);
        let frames = extract(&audio, &FeatureParams::default());
        assert!(frames.is_empty());
        assert!(frames.onsets.is_empty());
        assert_eq!(frames.mean_centroid(), 0.0);
    }

    #[test]
    fn frame_time_uses_hop() {
        let audio = tones(&[(440.0, 0.4)], 22050, 0.5);
        let frames = extract(&audio, &FeatureParams::default());
        assert!((frames.frame_time(10) - 10.0 * 512.0 / 22050.0).abs() < 1e-9);
    }
}
