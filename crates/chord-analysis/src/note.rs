use serde::{Deserialize, Serialize};

/// A pitched sound with onset/offset in seconds.
///
/// `velocity` doubles as detection confidence and is always in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub start: f64,
    pub end: f64,
    pub pitch: u8,
    pub velocity: f64,
}

impl NoteEvent {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn pitch_class(&self) -> u8 {
        self.pitch % 12
    }

    /// Length of the intersection with `[start, end)`, zero if disjoint.
    pub fn overlap(&self, start: f64, end: f64) -> f64 {
        (self.end.min(end) - self.start.max(start)).max(0.0)
    }
}

/// A detection as reported by a transcription backend, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawNote {
    pub pitch: i32,
    pub onset: f64,
    pub offset: f64,
    #[serde(default = "RawNote::default_confidence")]
    pub confidence: f64,
}

impl RawNote {
    fn default_confidence() -> f64 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_clamped() {
        let n = NoteEvent {
            start: 1.0,
            end: 2.0,
            pitch: 61,
            velocity: 0.5,
        };
        assert_eq!(n.overlap(0.0, 1.5), 0.5);
        assert!((n.overlap(1.2, 1.4) - 0.2).abs() < 1e-12);
        assert_eq!(n.overlap(3.0, 4.0), 0.0);
        assert_eq!(n.pitch_class(), 1);
        assert_eq!(n.duration(), 1.0);
    }

    #[test]
    fn raw_note_confidence_defaults_to_one() {
        let raw: RawNote = serde_json::from_str(r#"{"pitch": 60, "onset": 0.0, "offset": 1.0}"#).unwrap();
        assert_eq!(raw.confidence, 1.0);
    }
}
