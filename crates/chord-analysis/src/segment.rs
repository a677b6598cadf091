use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::note::NoteEvent;

pub const DEFAULT_WINDOW_SECONDS: f64 = 1.0;
pub const DEFAULT_MIN_OVERLAP: f64 = 0.5;

/// Window width, either absolute or in beats of the run's tempo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowWidth {
    Seconds(f64),
    Beats(f64),
}

impl WindowWidth {
    /// Width in seconds at `tempo` BPM. Non-positive results fall back to the default.
    pub fn seconds(&self, tempo: f64) -> f64 {
        let secs = match *self {
            WindowWidth::Seconds(s) => s,
            WindowWidth::Beats(b) if tempo > 0.0 => b * 60.0 / tempo,
            WindowWidth::Beats(_) => f64::NAN,
        };
        if secs.is_finite() && secs > 0.0 {
            secs
        } else {
            warn!(?self, tempo, "invalid window width, using default");
            DEFAULT_WINDOW_SECONDS
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentParams {
    pub width: WindowWidth,
    /// Fraction of the shorter of (window, note) that must overlap.
    pub min_overlap: f64,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            width: WindowWidth::Seconds(DEFAULT_WINDOW_SECONDS),
            min_overlap: DEFAULT_MIN_OVERLAP,
        }
    }
}

/// A time span and the notes that sound in it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordWindow {
    pub start: f64,
    pub end: f64,
    pub notes: Vec<NoteEvent>,
}

impl ChordWindow {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Cut `[0, duration)` into consecutive windows of `width` seconds and collect
/// the notes that overlap each one by at least `min_overlap`.
///
/// Overlap is measured against the shorter of the window and the note, so a
/// short note wholly inside a window always qualifies. A note may land in
/// several windows. Windows without qualifying notes are skipped; the last
/// window may be short. `notes` must be sorted by start time.
pub fn segment(notes: &[NoteEvent], duration: f64, width: f64, min_overlap: f64) -> Vec<ChordWindow> {
    let total = notes.iter().map(|n| n.end).fold(duration.max(0.0), f64::max);
    if notes.is_empty() || !(width > 0.0) || !total.is_finite() {
        return Vec::new();
    }
    let min_overlap = min_overlap.clamp(0.0, 1.0);

    let mut windows = Vec::new();
    let mut index = 0u64;
    loop {
        let start = index as f64 * width;
        if start >= total {
            break;
        }
        let end = (start + width).min(total);
        index += 1;

        let window_len = end - start;
        let selected: Vec<NoteEvent> = notes
            .iter()
            .take_while(|n| n.start < end)
            .filter(|n| {
                let overlap = n.overlap(start, end);
                let reference = window_len.min(n.duration());
                overlap > 0.0 && reference > 0.0 && overlap / reference >= min_overlap
            })
            .copied()
            .collect();

        if !selected.is_empty() {
            windows.push(ChordWindow {
                start,
                end,
                notes: selected,
            });
        }
    }
    windows
}
