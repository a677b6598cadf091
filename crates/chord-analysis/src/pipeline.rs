//! Backend orchestration: primary transcription with classical fallback.
//!
//! A run starts in [`BackendState::Primary`]. Any backend error, or a
//! transcription that normalizes to nothing, moves it to
//! [`BackendState::Fallback`] exactly once; there are no retries. Both paths
//! then share segmentation, classification and track assembly, and the
//! result always records which path produced it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use audio_features::{AudioBuffer, FeatureFrames, FeatureParams, TempoEstimate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::{classify_windows, merge_repeats};
use crate::key::estimate_key;
use crate::note::{NoteEvent, RawNote};
use crate::note_source::{self, FallbackParams};
use crate::segment::{segment, SegmentParams};
use crate::tracks::{assemble_tracks, TrackParams, TrackSelection};
use crate::types::{AnalysisResult, Method};
use crate::{BackendError, Error, Result};

const DEFAULT_TEMPO: f64 = 120.0;

/// A primary transcription backend.
///
/// Implementations are shared across concurrent runs and must not keep
/// per-run state.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &AudioBuffer) -> std::result::Result<Vec<RawNote>, BackendError>;
}

/// Frame features and tempo for one audio buffer.
#[derive(Debug, Clone)]
pub struct SignalAnalysis {
    pub frames: FeatureFrames,
    pub tempo: TempoEstimate,
}

/// Source of classical signal features.
///
/// `ClassicalAnalyzer` computes them from the audio; tests substitute
/// canned features.
pub trait SignalAnalyzer: Send + Sync {
    fn analyze(&self, audio: &AudioBuffer) -> Result<SignalAnalysis>;
}

/// STFT-based chroma, onsets, pitch and tempo.
#[derive(Debug, Clone, Default)]
pub struct ClassicalAnalyzer {
    pub params: FeatureParams,
}

impl SignalAnalyzer for ClassicalAnalyzer {
    fn analyze(&self, audio: &AudioBuffer) -> Result<SignalAnalysis> {
        let frames = audio_features::extract(audio, &self.params);
        let tempo = audio_features::estimate_tempo(&frames);
        Ok(SignalAnalysis { frames, tempo })
    }
}

/// Cooperative cancellation flag, checked between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Which note source a run ended up using.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendState {
    Primary,
    Fallback { reason: String },
}

impl BackendState {
    pub fn method(&self) -> Method {
        match self {
            BackendState::Primary => Method::Primary,
            BackendState::Fallback { .. } => Method::Fallback,
        }
    }

    fn reason(&self) -> Option<String> {
        match self {
            BackendState::Primary => None,
            BackendState::Fallback { reason } => Some(reason.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub segment: SegmentParams,
    pub tracks: TrackParams,
    pub fallback: FallbackParams,
    /// Collapse consecutive identical chords into one symbol.
    pub merge_repeats: bool,
}

/// Runs one audio buffer through note sourcing, segmentation, classification
/// and track assembly.
pub struct Orchestrator {
    analyzer: Box<dyn SignalAnalyzer>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_analyzer(ClassicalAnalyzer::default(), config)
    }

    pub fn with_analyzer(analyzer: impl SignalAnalyzer + 'static, config: PipelineConfig) -> Self {
        Self {
            analyzer: Box::new(analyzer),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run with a synchronous primary backend, or straight to fallback when none is given.
    pub fn run(
        &self,
        transcriber: Option<&dyn Transcriber>,
        audio: &AudioBuffer,
        selection: &TrackSelection,
        cancel: &Cancellation,
    ) -> Result<AnalysisResult> {
        cancel.check()?;
        let primary = match transcriber {
            Some(t) => t.transcribe(audio),
            None => Err(BackendError::Unavailable(
                "no transcription backend configured".into(),
            )),
        };
        self.resolve(primary, audio, selection, cancel)
    }

    /// Finish a run given the primary backend's outcome.
    ///
    /// Async callers await the backend themselves and hand the outcome over here.
    pub fn resolve(
        &self,
        primary: std::result::Result<Vec<RawNote>, BackendError>,
        audio: &AudioBuffer,
        selection: &TrackSelection,
        cancel: &Cancellation,
    ) -> Result<AnalysisResult> {
        cancel.check()?;

        let (state, primary_notes) = match primary
            .map_err(|e| e.to_string())
            .and_then(|raw| note_source::from_transcription(&raw).map_err(|e| e.to_string()))
        {
            Ok(notes) => (BackendState::Primary, notes),
            Err(reason) => (BackendState::Fallback { reason }, Vec::new()),
        };

        let signal = match (&state, self.analyzer.analyze(audio)) {
            (_, Ok(signal)) => Some(signal),
            (BackendState::Primary, Err(e)) => {
                warn!(error = %e, "signal analysis failed, using default tempo");
                None
            }
            (BackendState::Fallback { .. }, Err(e)) => {
                return Err(Error::Fallback(e.to_string()));
            }
        };
        cancel.check()?;

        let notes = match &state {
            BackendState::Primary => primary_notes,
            BackendState::Fallback { reason } => {
                warn!(reason = %reason, "primary transcription unusable, falling back");
                let frames = signal.as_ref().map(|s| &s.frames);
                match frames.map(|f| note_source::from_features(f, &self.config.fallback)) {
                    Some(Ok(notes)) => notes,
                    Some(Err(Error::EmptyTranscription)) | None => {
                        debug!("fallback found no notes, returning an empty progression");
                        Vec::new()
                    }
                    Some(Err(e)) => return Err(Error::Fallback(e.to_string())),
                }
            }
        };

        let tempo = signal
            .as_ref()
            .map(|s| s.tempo.bpm)
            .filter(|bpm| bpm.is_finite() && *bpm > 0.0)
            .unwrap_or(DEFAULT_TEMPO);

        self.assemble(state, notes, tempo, audio, selection, cancel)
    }

    fn assemble(
        &self,
        state: BackendState,
        notes: Vec<NoteEvent>,
        tempo: f64,
        audio: &AudioBuffer,
        selection: &TrackSelection,
        cancel: &Cancellation,
    ) -> Result<AnalysisResult> {
        let duration = notes
            .iter()
            .map(|n| n.end)
            .fold(audio.duration_seconds(), f64::max);

        let width = self.config.segment.width.seconds(tempo);
        let windows = segment(&notes, duration, width, self.config.segment.min_overlap);
        cancel.check()?;

        let mut chords = classify_windows(&windows);
        if self.config.merge_repeats {
            chords = merge_repeats(chords);
        }
        cancel.check()?;

        let tracks = assemble_tracks(&chords, &notes, selection, &self.config.tracks);
        let estimated_key = estimate_key(&notes);

        info!(
            method = %state.method(),
            notes = notes.len(),
            windows = windows.len(),
            chords = chords.len(),
            tempo,
            key = %estimated_key.label(),
            "chord analysis complete"
        );

        Ok(AnalysisResult {
            method: state.method(),
            fallback_reason: state.reason(),
            tempo,
            duration,
            tracks_included: selection.names(),
            estimated_key,
            chord_progression: chords,
            tracks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_shared_between_clones() {
        let a = Cancellation::new();
        let b = a.clone();
        assert!(a.check().is_ok());
        b.cancel();
        assert!(a.is_cancelled());
        assert!(matches!(a.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn state_maps_to_method() {
        assert_eq!(BackendState::Primary.method(), Method::Primary);
        let fb = BackendState::Fallback {
            reason: "timeout".into(),
        };
        assert_eq!(fb.method(), Method::Fallback);
        assert_eq!(fb.reason().as_deref(), Some("timeout"));
    }

    #[test]
    fn classical_analyzer_handles_short_audio() {
        let audio = AudioBuffer::new(vec![0.0; 100], 22050);
        let signal = ClassicalAnalyzer::default().analyze(&audio).unwrap();
        assert!(signal.frames.is_empty());
        assert_eq!(signal.tempo.bpm, 120.0);
    }
}
