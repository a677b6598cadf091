use serde::{Deserialize, Serialize};

use crate::chord_templates::note_name;
use crate::tracks::{TrackName, Tracks};

/// Which note source produced an [`AnalysisResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Primary,
    Fallback,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Primary => write!(f, "primary"),
            Method::Fallback => write!(f, "fallback"),
        }
    }
}

/// Chord dictionary entries. Serialized by variant name ("Major", "Minor7", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChordType {
    Power,
    Major,
    Minor,
    Diminished,
    Augmented,
    Sus2,
    Sus4,
    Major6,
    Minor6,
    Dominant7,
    Major7,
    Minor7,
    MinorMajor7,
    Diminished7,
    HalfDiminished7,
    Add9,
    Dominant9,
    Major9,
    Minor9,
}

impl ChordType {
    /// Suffix for chord symbol display
    pub fn suffix(&self) -> &'static str {
        match self {
            ChordType::Power => "5",
            ChordType::Major => "",
            ChordType::Minor => "m",
            ChordType::Diminished => "dim",
            ChordType::Augmented => "aug",
            ChordType::Sus2 => "sus2",
            ChordType::Sus4 => "sus4",
            ChordType::Major6 => "6",
            ChordType::Minor6 => "m6",
            ChordType::Dominant7 => "7",
            ChordType::Major7 => "maj7",
            ChordType::Minor7 => "m7",
            ChordType::MinorMajor7 => "m(maj7)",
            ChordType::Diminished7 => "dim7",
            ChordType::HalfDiminished7 => "m7b5",
            ChordType::Add9 => "add9",
            ChordType::Dominant9 => "9",
            ChordType::Major9 => "maj9",
            ChordType::Minor9 => "m9",
        }
    }
}

/// One classified chord window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordSymbol {
    /// Window start in seconds
    pub time: f64,
    pub duration: f64,
    /// Full chord symbol: "C", "Am", "G7"
    pub chord_name: String,
    /// Root note name
    pub root: String,
    /// Pitch class 0–11 (C=0)
    pub root_pitch_class: u8,
    pub chord_type: ChordType,
    /// Chord tone names in template order
    pub notes: Vec<String>,
    pub note_pitch_classes: Vec<u8>,
    /// Playback voicing, ascending
    pub midi_notes: Vec<u8>,
    pub confidence: f64,
}

impl ChordSymbol {
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }

    /// Same root and chord type, ignoring timing and confidence.
    pub fn same_chord(&self, other: &ChordSymbol) -> bool {
        self.root_pitch_class == other.root_pitch_class && self.chord_type == other.chord_type
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    Major,
    Minor,
}

impl std::fmt::Display for KeyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMode::Major => write!(f, "major"),
            KeyMode::Minor => write!(f, "minor"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEstimate {
    /// Root note name: "C", "Db", "F#", etc.
    pub root: String,
    pub root_pitch_class: u8,
    pub mode: KeyMode,
    /// Pearson correlation with the best-matching key profile
    pub confidence: f64,
    /// The three strongest pitch classes, strongest first
    pub dominant_notes: Vec<String>,
}

impl KeyEstimate {
    /// "A minor", "Eb major"
    pub fn label(&self) -> String {
        format!("{} {}", self.root, self.mode)
    }
}

impl Default for KeyEstimate {
    fn default() -> Self {
        Self {
            root: note_name(0, true).to_string(),
            root_pitch_class: 0,
            mode: KeyMode::Major,
            confidence: 0.0,
            dominant_notes: Vec::new(),
        }
    }
}

/// Complete output of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub method: Method,
    /// Why the primary backend was abandoned, only set for fallback runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub tempo: f64,
    pub duration: f64,
    pub tracks_included: Vec<TrackName>,
    pub estimated_key: KeyEstimate,
    pub chord_progression: Vec<ChordSymbol>,
    pub tracks: Tracks,
}

impl AnalysisResult {
    pub fn total_chords(&self) -> usize {
        self.chord_progression.len()
    }
}
