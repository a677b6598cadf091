//! Template matching of a window's pitch-class set against the chord dictionary.
//!
//! Every (root, template) pair is scored by the size of the symmetric
//! difference between its pitch classes and the observed set. Ties are broken
//! in order by: fewer template notes, the root pitch class that occurs most
//! often among the window's notes, the lowest root, dictionary order.

use std::cmp::Reverse;

use tracing::trace;

use crate::chord_templates::{note_name, pitch_class_mask, ChordTemplate, TEMPLATES};
use crate::segment::ChordWindow;
use crate::types::ChordSymbol;

/// Register of the chord voicing: the root sits at `CHORD_ANCHOR + root`.
pub const CHORD_ANCHOR: u8 = 60;

/// Best (root, template) for an observed set.
#[derive(Debug, Clone, Copy)]
pub struct TemplateMatch {
    pub root: u8,
    pub template: &'static ChordTemplate,
    pub distance: u32,
    pub confidence: f64,
}

/// Find the best template for `observed` (a 12-bit pitch-class mask).
///
/// `root_counts[pc]` is how many of the window's notes have pitch class `pc`.
/// Returns `None` only for an empty set.
pub fn best_match(observed: u16, root_counts: &[u32; 12]) -> Option<TemplateMatch> {
    let observed = observed & 0x0FFF;
    if observed == 0 {
        return None;
    }
    let observed_size = observed.count_ones() as usize;

    let (_, root, template) = TEMPLATES
        .iter()
        .enumerate()
        .flat_map(|(order, template)| (0..12u8).map(move |root| (order, root, template)))
        .map(|(order, root, template)| {
            let distance = (template.rooted_mask(root) ^ observed).count_ones();
            let key = (
                distance,
                template.size,
                Reverse(root_counts[root as usize]),
                root,
                order,
            );
            (key, root, template)
        })
        .min_by_key(|(key, _, _)| *key)?;

    let distance = (template.rooted_mask(root) ^ observed).count_ones();
    let confidence = confidence(distance, template.size, observed_size);
    Some(TemplateMatch {
        root,
        template,
        distance,
        confidence,
    })
}

/// `1 - distance / max(template, observed)`, clamped to `[0, 1]`.
pub fn confidence(distance: u32, template_size: usize, observed_size: usize) -> f64 {
    let denom = template_size.max(observed_size);
    if denom == 0 {
        return 0.0;
    }
    (1.0 - distance as f64 / denom as f64).clamp(0.0, 1.0)
}

/// Classify one window. Windows without notes yield `None`.
pub fn classify_window(window: &ChordWindow) -> Option<ChordSymbol> {
    let mut root_counts = [0u32; 12];
    for note in &window.notes {
        root_counts[note.pitch_class() as usize] += 1;
    }
    let observed = pitch_class_mask(window.notes.iter().map(|n| n.pitch_class()));

    let m = best_match(observed, &root_counts)?;
    let chord_type = m.template.chord_type;
    let root_name = note_name(m.root, false);
    let note_pitch_classes = m.template.pitch_classes(m.root);
    let chord_name = format!("{root_name}{}", chord_type.suffix());

    trace!(
        start = window.start,
        observed,
        chord = %chord_name,
        distance = m.distance,
        "classified window"
    );

    Some(ChordSymbol {
        time: window.start,
        duration: window.duration(),
        chord_name,
        root: root_name.to_string(),
        root_pitch_class: m.root,
        chord_type,
        notes: note_pitch_classes
            .iter()
            .map(|&pc| note_name(pc, false).to_string())
            .collect(),
        note_pitch_classes,
        midi_notes: m.template.midi_notes(m.root, CHORD_ANCHOR),
        confidence: m.confidence,
    })
}

/// Classify windows in order, dropping any that yield no chord.
pub fn classify_windows(windows: &[ChordWindow]) -> Vec<ChordSymbol> {
    windows.iter().filter_map(classify_window).collect()
}

/// Collapse runs of the same chord in contiguous windows into one symbol.
pub fn merge_repeats(chords: Vec<ChordSymbol>) -> Vec<ChordSymbol> {
    const GAP_TOLERANCE: f64 = 1e-6;
    let mut merged: Vec<ChordSymbol> = Vec::with_capacity(chords.len());
    for chord in chords {
        match merged.last_mut() {
            Some(prev) if prev.same_chord(&chord) && chord.time - prev.end() <= GAP_TOLERANCE => {
                prev.duration = chord.end() - prev.time;
                prev.confidence = prev.confidence.max(chord.confidence);
            }
            _ => merged.push(chord),
        }
    }
    merged
}
