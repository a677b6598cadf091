//! Chord extraction and multi-track note assembly.
//!
//! Note events come from a transcription backend or, when that fails, from
//! classical audio features. They are cut into time windows, each window is
//! classified against a chord dictionary, and the resulting progression is
//! turned into chord, bass and melody tracks ready for a MIDI writer.

pub mod chord_templates;
pub mod classify;
pub mod key;
pub mod midi_writer;
pub mod note;
pub mod note_source;
pub mod pipeline;
pub mod segment;
pub mod tracks;
pub mod types;

use std::time::Duration;

pub use classify::{classify_window, classify_windows};
pub use key::estimate_key;
pub use midi_writer::tracks_to_midi;
pub use note::{NoteEvent, RawNote};
pub use note_source::FallbackParams;
pub use pipeline::{
    BackendState, Cancellation, ClassicalAnalyzer, Orchestrator, PipelineConfig, SignalAnalysis,
    SignalAnalyzer, Transcriber,
};
pub use segment::{segment, ChordWindow, SegmentParams, WindowWidth};
pub use tracks::{assemble_tracks, TrackName, TrackParams, TrackSelection, Tracks};
pub use types::{AnalysisResult, ChordSymbol, ChordType, KeyEstimate, KeyMode, Method};

/// Errors from chord analysis.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The note source produced nothing usable. Internal signal for fallback.
    #[error("transcription produced no note events")]
    EmptyTranscription,

    #[error("invalid track selection: {0}")]
    InvalidTrackSelection(String),

    #[error("MIDI serialization failed: {0}")]
    Serialization(String),

    #[error("fallback analysis failed: {0}")]
    Fallback(String),

    #[error("analysis cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the primary transcription backend. Always absorbed into fallback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("transcription backend unavailable: {0}")]
    Unavailable(String),

    #[error("transcription timed out after {0:?}")]
    Timeout(Duration),

    #[error("transcription failed: {0}")]
    Processing(String),
}
