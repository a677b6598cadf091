use crate::types::ChordType;

/// A chord template: type + semitone intervals from the root.
///
/// `intervals` may exceed an octave (ninths) so voicings spread naturally;
/// `mask` folds them into a 12-bit pitch-class set relative to the root.
#[derive(Debug)]
pub struct ChordTemplate {
    pub chord_type: ChordType,
    pub intervals: &'static [u8],
    pub mask: u16, // bit i set means interval i (mod 12) is in the template
    pub size: usize,
}

impl ChordTemplate {
    const fn new(chord_type: ChordType, intervals: &'static [u8]) -> Self {
        let mut mask = 0u16;
        let mut i = 0;
        while i < intervals.len() {
            mask |= 1 << (intervals[i] % 12);
            i += 1;
        }
        Self {
            chord_type,
            intervals,
            mask,
            size: mask.count_ones() as usize,
        }
    }

    /// Absolute pitch-class mask with the template rooted at `root`.
    pub fn rooted_mask(&self, root: u8) -> u16 {
        rotate_mask(self.mask, root % 12)
    }

    /// Pitch classes in chord-tone order.
    pub fn pitch_classes(&self, root: u8) -> Vec<u8> {
        self.intervals.iter().map(|&i| (root + i) % 12).collect()
    }

    /// Voicing with the root at `anchor + root`, ascending.
    pub fn midi_notes(&self, root: u8, anchor: u8) -> Vec<u8> {
        let mut notes: Vec<u8> = self
            .intervals
            .iter()
            .map(|&i| (anchor as u16 + root as u16 + i as u16).min(127) as u8)
            .collect();
        notes.sort_unstable();
        notes.dedup();
        notes
    }
}

/// Chord dictionary. Order is the final tie-break, so simpler shapes come first.
pub static TEMPLATES: &[ChordTemplate] = &[
    // Dyad
    ChordTemplate::new(ChordType::Power, &[0, 7]),
    // Triads
    ChordTemplate::new(ChordType::Major, &[0, 4, 7]),
    ChordTemplate::new(ChordType::Minor, &[0, 3, 7]),
    ChordTemplate::new(ChordType::Diminished, &[0, 3, 6]),
    ChordTemplate::new(ChordType::Augmented, &[0, 4, 8]),
    ChordTemplate::new(ChordType::Sus2, &[0, 2, 7]),
    ChordTemplate::new(ChordType::Sus4, &[0, 5, 7]),
    // Sixths and sevenths
    ChordTemplate::new(ChordType::Major6, &[0, 4, 7, 9]),
    ChordTemplate::new(ChordType::Minor6, &[0, 3, 7, 9]),
    ChordTemplate::new(ChordType::Dominant7, &[0, 4, 7, 10]),
    ChordTemplate::new(ChordType::Major7, &[0, 4, 7, 11]),
    ChordTemplate::new(ChordType::Minor7, &[0, 3, 7, 10]),
    ChordTemplate::new(ChordType::MinorMajor7, &[0, 3, 7, 11]),
    ChordTemplate::new(ChordType::Diminished7, &[0, 3, 6, 9]),
    ChordTemplate::new(ChordType::HalfDiminished7, &[0, 3, 6, 10]),
    // Ninths
    ChordTemplate::new(ChordType::Add9, &[0, 4, 7, 14]),
    ChordTemplate::new(ChordType::Dominant9, &[0, 4, 7, 10, 14]),
    ChordTemplate::new(ChordType::Major9, &[0, 4, 7, 11, 14]),
    ChordTemplate::new(ChordType::Minor9, &[0, 3, 7, 10, 14]),
];

const NOTE_NAMES_SHARP: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const NOTE_NAMES_FLAT: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Pitch classes conventionally spelled with flats in key names.
pub static FLAT_KEY_ROOTS: [u8; 6] = [1, 3, 5, 6, 8, 10];

pub fn note_name(pitch_class: u8, use_flats: bool) -> &'static str {
    let idx = (pitch_class % 12) as usize;
    if use_flats {
        NOTE_NAMES_FLAT[idx]
    } else {
        NOTE_NAMES_SHARP[idx]
    }
}

/// Rotate a 12-bit pitch-class mask up by `semitones`.
pub fn rotate_mask(mask: u16, semitones: u8) -> u16 {
    let s = (semitones % 12) as u32;
    let mask = mask & 0x0FFF;
    ((mask << s) | (mask >> ((12 - s) % 12))) & 0x0FFF
}

/// Collapse pitch classes into a 12-bit set.
pub fn pitch_class_mask(pitch_classes: impl IntoIterator<Item = u8>) -> u16 {
    pitch_classes
        .into_iter()
        .fold(0u16, |mask, pc| mask | 1 << (pc % 12))
}
