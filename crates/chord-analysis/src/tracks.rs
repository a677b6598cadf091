use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::note::NoteEvent;
use crate::types::ChordSymbol;
use crate::{Error, Result};

/// Output track names. `Ord` follows declaration order, which is also MIDI track order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackName {
    Chords,
    Bass,
    Melody,
}

impl TrackName {
    pub const ALL: [TrackName; 3] = [TrackName::Chords, TrackName::Bass, TrackName::Melody];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackName::Chords => "chords",
            TrackName::Bass => "bass",
            TrackName::Melody => "melody",
        }
    }
}

impl std::fmt::Display for TrackName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chords" => Ok(TrackName::Chords),
            "bass" => Ok(TrackName::Bass),
            "melody" => Ok(TrackName::Melody),
            other => Err(Error::InvalidTrackSelection(format!("unknown track '{other}'"))),
        }
    }
}

/// The set of tracks a caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSelection(BTreeSet<TrackName>);

impl TrackSelection {
    pub fn all() -> Self {
        Self(TrackName::ALL.into_iter().collect())
    }

    /// Parse track names. Duplicates collapse; an empty list is rejected.
    pub fn parse<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = names
            .into_iter()
            .map(|n| n.as_ref().parse::<TrackName>())
            .collect::<Result<BTreeSet<_>>>()?;
        if set.is_empty() {
            return Err(Error::InvalidTrackSelection("no tracks requested".into()));
        }
        Ok(Self(set))
    }

    pub fn contains(&self, name: TrackName) -> bool {
        self.0.contains(&name)
    }

    /// Selected names in track order.
    pub fn names(&self) -> Vec<TrackName> {
        self.0.iter().copied().collect()
    }
}

impl Default for TrackSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for TrackSelection {
    type Err = Error;

    /// Comma-separated list, e.g. `"chords,bass"`.
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s.split(',').filter(|part| !part.trim().is_empty()))
    }
}

/// Track name → notes in start order. Only selected tracks are present.
pub type Tracks = BTreeMap<TrackName, Vec<NoteEvent>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackParams {
    /// Bass notes sit at `bass_anchor + root`, two octaves under the chords.
    pub bass_anchor: u8,
    pub bass_velocity: f64,
    /// Keep only the highest sounding note at each moment.
    pub melody_monophonic: bool,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            bass_anchor: 36,
            bass_velocity: 0.9,
            melody_monophonic: true,
        }
    }
}

/// Build the selected tracks from a chord progression and the raw note stream.
pub fn assemble_tracks(
    chords: &[ChordSymbol],
    notes: &[NoteEvent],
    selection: &TrackSelection,
    params: &TrackParams,
) -> Tracks {
    let mut tracks = Tracks::new();

    if selection.contains(TrackName::Chords) {
        let events = chords
            .iter()
            .flat_map(|chord| {
                chord.midi_notes.iter().map(move |&pitch| NoteEvent {
                    start: chord.time,
                    end: chord.end(),
                    pitch,
                    velocity: chord.confidence,
                })
            })
            .collect();
        tracks.insert(TrackName::Chords, events);
    }

    if selection.contains(TrackName::Bass) {
        let events = chords
            .iter()
            .map(|chord| NoteEvent {
                start: chord.time,
                end: chord.end(),
                pitch: (params.bass_anchor as u16 + chord.root_pitch_class as u16).min(127) as u8,
                velocity: params.bass_velocity,
            })
            .collect();
        tracks.insert(TrackName::Bass, events);
    }

    if selection.contains(TrackName::Melody) {
        let events = if params.melody_monophonic {
            skyline(notes)
        } else {
            notes.to_vec()
        };
        tracks.insert(TrackName::Melody, events);
    }

    tracks
}

/// Monophonic reduction: the highest active note at every instant.
///
/// The timeline is cut at every note boundary; consecutive pieces taken from
/// the same source note are joined again, so an uninterrupted note survives
/// whole and a note interrupted by a higher one is split around it.
pub fn skyline(notes: &[NoteEvent]) -> Vec<NoteEvent> {
    let mut bounds: Vec<f64> = notes.iter().flat_map(|n| [n.start, n.end]).collect();
    bounds.sort_by(|a, b| a.total_cmp(b));
    bounds.dedup();

    let mut out: Vec<(usize, NoteEvent)> = Vec::new();
    for pair in bounds.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        let top = notes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.start <= lo && n.end >= hi)
            .max_by(|(ia, a), (ib, b)| {
                a.pitch
                    .cmp(&b.pitch)
                    .then(a.velocity.total_cmp(&b.velocity))
                    .then(ib.cmp(ia))
            });
        let Some((idx, note)) = top else { continue };

        match out.last_mut() {
            Some((last_idx, last)) if *last_idx == idx && last.end == lo => last.end = hi,
            _ => out.push((
                idx,
                NoteEvent {
                    start: lo,
                    end: hi,
                    ..*note
                },
            )),
        }
    }
    out.into_iter().map(|(_, n)| n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_window;
    use crate::segment::ChordWindow;
    use pretty_assertions::assert_eq;

    fn note(start: f64, end: f64, pitch: u8) -> NoteEvent {
        NoteEvent {
            start,
            end,
            pitch,
            velocity: 0.7,
        }
    }

    fn chord_at(time: f64, pitches: &[u8]) -> ChordSymbol {
        classify_window(&ChordWindow {
            start: time,
            end: time + 1.0,
            notes: pitches.iter().map(|&p| note(time, time + 1.0, p)).collect(),
        })
        .unwrap()
    }

    #[test]
    fn parse_selection() {
        let sel = TrackSelection::parse(["Bass", " chords ", "bass"]).unwrap();
        assert_eq!(sel.names(), vec![TrackName::Chords, TrackName::Bass]);

        let sel: TrackSelection = "melody".parse().unwrap();
        assert_eq!(sel.names(), vec![TrackName::Melody]);
    }

    #[test]
    fn unknown_track_is_rejected() {
        let err = TrackSelection::parse(["chords", "drums"]).unwrap_err();
        assert!(matches!(err, Error::InvalidTrackSelection(msg) if msg.contains("drums")));
    }

    #[test]
    fn empty_selection_is_rejected() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            TrackSelection::parse(empty),
            Err(Error::InvalidTrackSelection(_))
        ));
        assert!("".parse::<TrackSelection>().is_err());
    }

    #[test]
    fn bass_only_selection() {
        let chords = vec![chord_at(0.0, &[60, 64, 67])];
        let sel = TrackSelection::parse(["bass"]).unwrap();
        let tracks = assemble_tracks(&chords, &[], &sel, &TrackParams::default());
        assert_eq!(tracks.keys().copied().collect::<Vec<_>>(), vec![TrackName::Bass]);
        assert_eq!(tracks[&TrackName::Bass], vec![NoteEvent {
            start: 0.0,
            end: 1.0,
            pitch: 36,
            velocity: 0.9,
        }]);
    }

    #[test]
    fn chords_track_voices_each_symbol() {
        let chords = vec![chord_at(0.0, &[60, 64, 67]), chord_at(1.0, &[57, 60, 64])];
        let tracks = assemble_tracks(&chords, &[], &TrackSelection::all(), &TrackParams::default());
        let pitches: Vec<(f64, u8)> = tracks[&TrackName::Chords]
            .iter()
            .map(|n| (n.start, n.pitch))
            .collect();
        assert_eq!(
            pitches,
            vec![(0.0, 60), (0.0, 64), (0.0, 67), (1.0, 69), (1.0, 72), (1.0, 76)]
        );
        assert_eq!(tracks[&TrackName::Bass][1].pitch, 45);
    }

    #[test]
    fn melody_is_polyphonic_when_requested() {
        let notes = vec![note(0.0, 1.0, 60), note(0.0, 1.0, 72)];
        let params = TrackParams {
            melody_monophonic: false,
            ..TrackParams::default()
        };
        let tracks = assemble_tracks(&[], &notes, &TrackSelection::all(), &params);
        assert_eq!(tracks[&TrackName::Melody].len(), 2);
    }

    #[test]
    fn skyline_keeps_top_line() {
        let notes = vec![
            note(0.0, 2.0, 60),
            note(0.5, 1.0, 72),
            note(1.5, 3.0, 55),
        ];
        let line: Vec<(f64, f64, u8)> = skyline(&notes)
            .iter()
            .map(|n| (n.start, n.end, n.pitch))
            .collect();
        assert_eq!(
            line,
            vec![
                (0.0, 0.5, 60),
                (0.5, 1.0, 72),
                (1.0, 2.0, 60),
                (2.0, 3.0, 55),
            ]
        );
    }

    #[test]
    fn skyline_skips_gaps() {
        let notes = vec![note(0.0, 1.0, 60), note(2.0, 3.0, 62)];
        assert_eq!(skyline(&notes).len(), 2);
        assert!(skyline(&[]).is_empty());
    }
}
