use crate::note::NoteEvent;
use crate::tracks::{TrackName, Tracks};
use crate::{Error, Result};

/// Ticks per quarter note.
pub const PPQ: u16 = 480;

/// Largest delta a MIDI variable-length quantity can hold.
const MAX_VLQ: u64 = 0x0FFF_FFFF;

impl TrackName {
    /// Display name written as the track-name meta event.
    pub fn title(&self) -> &'static str {
        match self {
            TrackName::Chords => "Chords",
            TrackName::Bass => "Bass",
            TrackName::Melody => "Melody",
        }
    }

    /// General MIDI program: acoustic grand, fingered bass, flute.
    pub fn program(&self) -> u8 {
        match self {
            TrackName::Chords => 0,
            TrackName::Bass => 33,
            TrackName::Melody => 73,
        }
    }

    pub fn channel(&self) -> u8 {
        match self {
            TrackName::Chords => 0,
            TrackName::Bass => 1,
            TrackName::Melody => 2,
        }
    }
}

/// Write tracks to Standard MIDI File format 1 bytes.
///
/// Track 0: tempo + 4/4 time signature.
/// Tracks 1+: one per named track in chords, bass, melody order, each with a
/// track name, a program change, and its notes on a dedicated channel.
pub fn tracks_to_midi(tracks: &Tracks, tempo: f64) -> Result<Vec<u8>> {
    if !tempo.is_finite() || tempo <= 0.0 {
        return Err(Error::Serialization(format!("invalid tempo {tempo}")));
    }
    let usec = (60_000_000.0 / tempo).round();
    if !(1.0..=16_777_215.0).contains(&usec) {
        return Err(Error::Serialization(format!("tempo {tempo} BPM out of MIDI range")));
    }

    let mut chunks = vec![build_tempo_track(usec as u32)];
    for (name, notes) in tracks {
        chunks.push(build_note_track(*name, notes, tempo)?);
    }

    if chunks.len() > u16::MAX as usize {
        return Err(Error::Serialization("too many tracks".into()));
    }
    Ok(build_midi_file(PPQ, &chunks))
}

/// Seconds to ticks at a constant tempo.
fn to_ticks(seconds: f64, tempo: f64) -> Result<u64> {
    let ticks = (seconds * tempo / 60.0 * PPQ as f64).round();
    if !ticks.is_finite() || ticks < 0.0 || ticks >= MAX_VLQ as f64 {
        return Err(Error::Serialization(format!(
            "time {seconds}s does not fit in a MIDI tick"
        )));
    }
    Ok(ticks as u64)
}

/// round(velocity × 127), never zero (a zero note-on is a note-off).
fn midi_velocity(velocity: f64) -> u8 {
    let v = if velocity.is_finite() {
        (velocity.clamp(0.0, 1.0) * 127.0).round() as u8
    } else {
        0
    };
    v.max(1)
}

fn build_tempo_track(usec: u32) -> Vec<u8> {
    let mut track_data = Vec::new();

    write_vlq(&mut track_data, 0);
    track_data.extend_from_slice(&[
        0xFF,
        0x51,
        0x03,
        (usec >> 16) as u8,
        (usec >> 8) as u8,
        usec as u8,
    ]);

    // 4/4, 24 clocks per click, 8 thirty-seconds per quarter
    write_vlq(&mut track_data, 0);
    track_data.extend_from_slice(&[0xFF, 0x58, 0x04, 4, 2, 0x18, 0x08]);

    write_vlq(&mut track_data, 0);
    track_data.extend_from_slice(&[0xFF, 0x2F, 0x00]);

    track_data
}

fn build_note_track(name: TrackName, notes: &[NoteEvent], tempo: f64) -> Result<Vec<u8>> {
    let channel = name.channel() & 0x0F;
    let mut events: Vec<(u64, Vec<u8>)> = Vec::new();

    let title = name.title().as_bytes();
    let mut name_event = vec![0xFF, 0x03];
    write_vlq(&mut name_event, title.len() as u32);
    name_event.extend_from_slice(title);
    events.push((0, name_event));

    events.push((0, vec![0xC0 | channel, name.program()]));

    for note in notes {
        let on = to_ticks(note.start, tempo)?;
        // at least one tick so rounding never swallows a note
        let off = to_ticks(note.end, tempo)?.max(on + 1);
        let pitch = note.pitch.min(127);
        events.push((on, vec![0x90 | channel, pitch, midi_velocity(note.velocity)]));
        events.push((off, vec![0x80 | channel, pitch, 0]));
    }

    // Sort by tick, with note-offs before note-ons at the same tick
    events.sort_by(|a, b| {
        a.0.cmp(&b.0).then_with(|| {
            let a_is_off = a.1.first().is_some_and(|b| b & 0xF0 == 0x80);
            let b_is_off = b.1.first().is_some_and(|b| b & 0xF0 == 0x80);
            b_is_off.cmp(&a_is_off)
        })
    });

    let mut track_data = Vec::new();
    let mut last_tick = 0u64;

    for (tick, data) in events {
        let delta = tick.saturating_sub(last_tick);
        write_vlq(&mut track_data, delta as u32);
        track_data.extend_from_slice(&data);
        last_tick = tick;
    }

    // End of track
    write_vlq(&mut track_data, 0);
    track_data.extend_from_slice(&[0xFF, 0x2F, 0x00]);

    Ok(track_data)
}

/// Assemble a complete MIDI file from track data blobs.
fn build_midi_file(ppq: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();

    buf.extend_from_slice(b"MThd");
    buf.extend_from_slice(&6u32.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes()); // format 1
    buf.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    buf.extend_from_slice(&ppq.to_be_bytes());

    for track_data in tracks {
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track_data.len() as u32).to_be_bytes());
        buf.extend_from_slice(track_data);
    }

    buf
}

/// Write a variable-length quantity to a byte buffer.
fn write_vlq(buf: &mut Vec<u8>, mut value: u32) {
    if value == 0 {
        buf.push(0);
        return;
    }

    let mut bytes = Vec::new();
    bytes.push((value & 0x7F) as u8);
    value >>= 7;

    while value > 0 {
        bytes.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }

    bytes.reverse();
    buf.extend_from_slice(&bytes);
}
