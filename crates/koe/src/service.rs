//! The work behind each endpoint, independent of HTTP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use audio_features::{AudioBuffer, FeatureParams};
use chord_analysis::key::estimate_key_from_histogram;
use chord_analysis::{
    tracks_to_midi, AnalysisResult, BackendError, Cancellation, ClassicalAnalyzer, FallbackParams,
    Orchestrator, PipelineConfig, SegmentParams, SignalAnalyzer, TrackParams, TrackSelection,
    WindowWidth,
};
use koe_conf::{AnalysisConfig, KoeConfig};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::ApiError;
use crate::transcriber::RemoteTranscriber;

/// Translate the `[analysis]` config section into pipeline parameters.
pub fn pipeline_config(analysis: &AnalysisConfig) -> PipelineConfig {
    let width = match analysis.window_beats {
        Some(beats) => WindowWidth::Beats(beats),
        None => WindowWidth::Seconds(analysis.window_seconds),
    };
    PipelineConfig {
        segment: SegmentParams {
            width,
            min_overlap: analysis.min_overlap,
        },
        tracks: TrackParams {
            melody_monophonic: analysis.melody_monophonic,
            ..TrackParams::default()
        },
        fallback: FallbackParams {
            chroma_threshold: analysis.chroma_threshold,
        },
        merge_repeats: analysis.merge_repeats,
    }
}

/// A finished chord extraction and its MIDI rendering.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub result: AnalysisResult,
    pub midi: Vec<u8>,
}

/// Signal-level summary returned by `/analyze`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioSummary {
    pub duration: f64,
    pub tempo: f64,
    pub estimated_key: String,
    pub dominant_notes: Vec<String>,
    pub energy_balance: EnergySummary,
    pub brightness: Brightness,
    pub beat_count: usize,
    /// The first ten beats, in seconds
    pub beat_times: Vec<f64>,
}

/// Harmonic vs percussive RMS after median-filter separation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergySummary {
    pub harmonic: f64,
    pub percussive: f64,
    /// harmonic / (harmonic + percussive)
    pub ratio: f64,
    /// "harmonic" when the ratio is above 0.5, else "percussive"
    pub dominant: &'static str,
}

impl From<audio_features::EnergyBalance> for EnergySummary {
    fn from(balance: audio_features::EnergyBalance) -> Self {
        Self {
            harmonic: round_to(balance.harmonic, 3),
            percussive: round_to(balance.percussive, 3),
            ratio: round_to(balance.ratio(), 3),
            dominant: if balance.is_harmonic() {
                "harmonic"
            } else {
                "percussive"
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Brightness {
    /// Mean spectral centroid in Hz
    pub average: f64,
}

/// Decoding, oracle calls and pipeline runs, shared by the HTTP service and the CLI.
#[derive(Clone)]
pub struct ChordService {
    orchestrator: Arc<Orchestrator>,
    transcriber: Option<RemoteTranscriber>,
    sample_rate: u32,
}

impl ChordService {
    pub fn from_config(config: &KoeConfig) -> Result<Self, BackendError> {
        let transcriber = config
            .transcriber
            .endpoint
            .as_deref()
            .map(|endpoint| {
                RemoteTranscriber::new(endpoint, Duration::from_millis(config.transcriber.timeout_ms))
            })
            .transpose()?;
        Ok(Self::new(
            Orchestrator::new(pipeline_config(&config.analysis)),
            transcriber,
            config.analysis.sample_rate,
        ))
    }

    pub fn new(orchestrator: Orchestrator, transcriber: Option<RemoteTranscriber>, sample_rate: u32) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            transcriber,
            sample_rate,
        }
    }

    pub fn has_transcriber(&self) -> bool {
        self.transcriber.is_some()
    }

    /// Decode a spooled audio file on the blocking pool.
    pub async fn decode(&self, path: PathBuf) -> Result<AudioBuffer, ApiError> {
        let rate = self.sample_rate;
        let audio = tokio::task::spawn_blocking(move || audio_features::decode_file(&path, rate)).await??;
        Ok(audio)
    }

    /// Primary transcription (if configured), then the pipeline and MIDI writer.
    #[instrument(skip_all, fields(samples = audio.samples.len()))]
    pub async fn extract(
        &self,
        audio: AudioBuffer,
        selection: TrackSelection,
        cancel: Cancellation,
    ) -> Result<Extraction, ApiError> {
        let primary = match &self.transcriber {
            Some(transcriber) => transcriber.transcribe(&audio).await,
            None => Err(BackendError::Unavailable("no transcription backend configured".into())),
        };
        if let Err(e) = &primary {
            warn!(error = %e, "primary transcription failed");
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let extraction = tokio::task::spawn_blocking(move || {
            let result = orchestrator.resolve(primary, &audio, &selection, &cancel)?;
            cancel.check()?;
            let midi = tracks_to_midi(&result.tracks, result.tempo)?;
            Ok::<_, chord_analysis::Error>(Extraction { result, midi })
        })
        .await??;

        info!(
            method = %extraction.result.method,
            chords = extraction.result.total_chords(),
            midi_bytes = extraction.midi.len(),
            "chord extraction finished"
        );
        Ok(extraction)
    }

    /// Tempo, key, brightness and beats straight from the signal.
    pub async fn summarize(&self, audio: AudioBuffer) -> Result<AudioSummary, ApiError> {
        let summary = tokio::task::spawn_blocking(move || summarize(&audio)).await??;
        Ok(summary)
    }
}

fn summarize(audio: &AudioBuffer) -> Result<AudioSummary, ApiError> {
    let signal = ClassicalAnalyzer::default().analyze(audio)?;

    let mut histogram = [0.0_f64; 12];
    for frame in &signal.frames.chroma {
        for (bin, &energy) in histogram.iter_mut().zip(frame) {
            *bin += energy as f64;
        }
    }
    let key = estimate_key_from_histogram(&histogram);
    let energy = audio_features::energy_balance(audio, &FeatureParams::default());

    Ok(AudioSummary {
        duration: round_to(audio.duration_seconds(), 2),
        tempo: round_to(signal.tempo.bpm, 1),
        estimated_key: key.label(),
        dominant_notes: key.dominant_notes,
        energy_balance: energy.into(),
        brightness: Brightness {
            average: round_to(signal.frames.mean_centroid(), 1),
        },
        beat_count: signal.tempo.beat_times.len(),
        beat_times: signal.tempo.beat_times.iter().take(10).copied().collect(),
    })
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
