//! Conversion of backend output into one canonical, sorted note stream.
//!
//! Both sources end in [`normalize`]: pitches clipped to the MIDI range,
//! degenerate or non-finite events dropped, confidence clamped, sorted by
//! start time then pitch. An empty result is reported as
//! [`Error::EmptyTranscription`].

use audio_features::pitch::hz_to_midi;
use audio_features::FeatureFrames;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::note::{NoteEvent, RawNote};
use crate::{Error, Result};

/// Octave the fallback places chroma notes in; pitch class `pc` becomes `anchor + pc`.
pub const CHROMA_ANCHOR: i32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackParams {
    /// A pitch class becomes a note when its mean energy reaches this
    /// fraction of the segment's strongest class.
    pub chroma_threshold: f32,
}

impl Default for FallbackParams {
    fn default() -> Self {
        Self {
            chroma_threshold: 0.6,
        }
    }
}

/// Validate and order detections from a transcription backend.
pub fn from_transcription(raw: &[RawNote]) -> Result<Vec<NoteEvent>> {
    let candidates = raw.iter().map(|r| (r.onset, r.offset, r.pitch, r.confidence));
    let notes = normalize(candidates)?;
    debug!(raw = raw.len(), kept = notes.len(), "normalized transcription");
    Ok(notes)
}

/// Derive note events from chroma, onsets and the pitch track.
///
/// The timeline is split at every detected onset. Within each segment the
/// averaged chroma yields one note per strong pitch class, and the median
/// tracked pitch, if any frame was voiced, yields one more at its true height.
pub fn from_features(frames: &FeatureFrames, params: &FallbackParams) -> Result<Vec<NoteEvent>> {
    let n = frames.len();
    if n == 0 || frames.hop_seconds <= 0.0 {
        return Err(Error::EmptyTranscription);
    }

    let mut bounds: Vec<usize> = std::iter::once(0)
        .chain(frames.onsets.iter().copied().filter(|&f| f < n))
        .chain(std::iter::once(n))
        .collect();
    bounds.sort_unstable();
    bounds.dedup();

    let timeline_end = frames.duration.max(frames.frame_time(n));
    let threshold = params.chroma_threshold.clamp(0.0, 1.0);
    let mut candidates = Vec::new();

    for (i, pair) in bounds.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        let start = frames.frame_time(a);
        let end = if i + 2 == bounds.len() {
            timeline_end
        } else {
            frames.frame_time(b)
        };

        let mut mean = [0.0f32; 12];
        for chroma in &frames.chroma[a..b] {
            for (m, v) in mean.iter_mut().zip(chroma) {
                *m += v;
            }
        }
        let max = mean.iter().copied().fold(0.0f32, f32::max);
        if max <= 0.0 {
            continue;
        }

        let mut emitted = Vec::new();
        for (pc, &energy) in mean.iter().enumerate() {
            let relative = energy / max;
            if relative >= threshold {
                let pitch = CHROMA_ANCHOR + pc as i32;
                emitted.push(pitch);
                candidates.push((start, end, pitch, relative as f64));
            }
        }

        let mut voiced: Vec<f32> = frames
            .pitch
            .get(a..b.min(frames.pitch.len()))
            .unwrap_or_default()
            .iter()
            .flatten()
            .copied()
            .collect();
        if let Some(hz) = median(&mut voiced) {
            let pitch = hz_to_midi(hz);
            if !emitted.contains(&pitch) {
                let coverage = voiced.len() as f64 / (b - a) as f64;
                candidates.push((start, end, pitch, coverage));
            }
        }
    }

    let notes = normalize(candidates)?;
    debug!(
        segments = bounds.len().saturating_sub(1),
        notes = notes.len(),
        "derived notes from audio features"
    );
    Ok(notes)
}

/// Shared cleanup for `(start, end, pitch, confidence)` candidates.
pub fn normalize(candidates: impl IntoIterator<Item = (f64, f64, i32, f64)>) -> Result<Vec<NoteEvent>> {
    let mut notes: Vec<NoteEvent> = candidates
        .into_iter()
        .filter_map(|(start, end, pitch, confidence)| {
            if !start.is_finite() || !end.is_finite() {
                return None;
            }
            let start = start.max(0.0);
            if end <= start {
                return None;
            }
            let velocity = if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            Some(NoteEvent {
                start,
                end,
                pitch: pitch.clamp(0, 127) as u8,
                velocity,
            })
        })
        .collect();

    if notes.is_empty() {
        return Err(Error::EmptyTranscription);
    }

    notes.sort_by(|a, b| {
        a.start
            .total_cmp(&b.start)
            .then(a.pitch.cmp(&b.pitch))
            .then(a.end.total_cmp(&b.end))
    });
    Ok(notes)
}

fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Some(values[values.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw(pitch: i32, onset: f64, offset: f64) -> RawNote {
        RawNote {
            pitch,
            onset,
            offset,
            confidence: 0.9,
        }
    }

    #[test]
    fn transcription_is_sorted_and_clipped() {
        let notes = from_transcription(&[
            raw(64, 1.0, 2.0),
            raw(200, 0.0, 1.0),
            raw(-5, 0.0, 1.0),
            raw(60, 1.0, 1.5),
        ])
        .unwrap();

        let summary: Vec<(f64, u8)> = notes.iter().map(|n| (n.start, n.pitch)).collect();
        assert_eq!(summary, vec![(0.0, 0), (0.0, 127), (1.0, 60), (1.0, 64)]);
    }

    #[test]
    fn degenerate_events_are_dropped() {
        let notes = from_transcription(&[
            raw(60, 1.0, 1.0),
            raw(61, 2.0, 1.0),
            raw(62, f64::NAN, 1.0),
            raw(63, 0.5, 1.0),
        ])
        .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pitch, 63);
    }

    #[test]
    fn negative_start_is_clamped() {
        let notes = from_transcription(&[raw(60, -0.5, 0.5)]).unwrap();
        assert_eq!(notes[0].start, 0.0);
        assert_eq!(notes[0].end, 0.5);
    }

    #[test]
    fn confidence_is_clamped() {
        let mut r = raw(60, 0.0, 1.0);
        r.confidence = 3.0;
        assert_eq!(from_transcription(&[r]).unwrap()[0].velocity, 1.0);
    }

    #[test]
    fn nothing_usable_is_empty_transcription() {
        assert!(matches!(from_transcription(&[]), Err(Error::EmptyTranscription)));
        assert!(matches!(
            from_transcription(&[raw(60, 1.0, 0.5)]),
            Err(Error::EmptyTranscription)
        ));
    }

    fn frames_with(chroma: Vec<[f32; 12]>, onsets: Vec<usize>, pitch: Vec<Option<f32>>) -> FeatureFrames {
        let n = chroma.len();
        FeatureFrames {
            hop_seconds: 0.5,
            duration: n as f64 * 0.5,
            centroid: vec![0.0; n],
            onset_envelope: vec![0.0; n],
            chroma,
            onsets,
            pitch,
        }
    }

    fn chroma_of(pcs: &[usize]) -> [f32; 12] {
        let mut c = [0.05f32; 12];
        for &pc in pcs {
            c[pc] = 1.0;
        }
        c
    }

    #[test]
    fn chroma_segments_become_notes() {
        // C major for two frames, then A minor for two frames
        let chroma = vec![
            chroma_of(&[0, 4, 7]),
            chroma_of(&[0, 4, 7]),
            chroma_of(&[9, 0, 4]),
            chroma_of(&[9, 0, 4]),
        ];
        let frames = frames_with(chroma, vec![2], vec![None; 4]);
        let notes = from_features(&frames, &FallbackParams::default()).unwrap();

        let first: Vec<u8> = notes.iter().filter(|n| n.start == 0.0).map(|n| n.pitch).collect();
        let second: Vec<u8> = notes.iter().filter(|n| n.start == 1.0).map(|n| n.pitch).collect();
        assert_eq!(first, vec![60, 64, 67]);
        assert_eq!(second, vec![60, 64, 69]);
        assert!(notes.iter().filter(|n| n.start == 1.0).all(|n| n.end == 2.0));
    }

    #[test]
    fn voiced_pitch_adds_lead_note() {
        let chroma = vec![chroma_of(&[0, 4, 7]); 3];
        let pitch = vec![Some(880.0), Some(880.0), None];
        let frames = frames_with(chroma, vec![], pitch);
        let notes = from_features(&frames, &FallbackParams::default()).unwrap();

        let lead = notes.iter().find(|n| n.pitch == 81).unwrap();
        assert!((lead.velocity - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn silent_features_are_empty() {
        let frames = frames_with(vec![[0.0; 12]; 4], vec![1], vec![None; 4]);
        assert!(matches!(
            from_features(&frames, &FallbackParams::default()),
            Err(Error::EmptyTranscription)
        ));
        assert!(matches!(
            from_features(&FeatureFrames::default(), &FallbackParams::default()),
            Err(Error::EmptyTranscription)
        ));
    }
}
