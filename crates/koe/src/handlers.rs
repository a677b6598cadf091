use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chord_analysis::{ChordSymbol, Method, TrackName, TrackSelection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::artifacts::ArtifactId;
use crate::context::RunContext;
use crate::error::ApiError;
use crate::serve::AppState;
use crate::service::AudioSummary;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub audio_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub audio_url: Option<String>,
    /// Omitted means all tracks.
    pub include_tracks: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub method: Method,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub tempo: f64,
    pub duration: f64,
    pub tracks_included: Vec<TrackName>,
    pub midi_artifact: ArtifactId,
    pub midi_download_url: String,
    pub total_chords: usize,
    pub estimated_key: String,
    pub dominant_notes: Vec<String>,
    pub chord_progression: Vec<ChordSymbol>,
}

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "status": "KOE chord API is running!",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "transcriber": state.service.has_transcriber(),
    }))
}

fn require_url(url: Option<String>) -> Result<String, ApiError> {
    url.filter(|u| !u.trim().is_empty())
        .ok_or(ApiError::MissingAudioUrl)
}

#[instrument(skip_all)]
pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AudioSummary>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let url = require_url(request.audio_url)?;

    let ctx = RunContext::new().map_err(|e| ApiError::Internal(e.to_string()))?;
    let path = state.fetcher.download(&url, ctx.scratch_dir()).await?;
    let audio = state.service.decode(path).await?;
    let summary = state.service.summarize(audio).await?;

    info!(tempo = summary.tempo, key = %summary.estimated_key, "audio analyzed");
    Ok(Json(summary))
}

#[instrument(skip_all)]
pub async fn extract_chords_midi(
    State(state): State<AppState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let url = require_url(request.audio_url)?;
    let selection = match request.include_tracks {
        Some(names) => TrackSelection::parse(names)?,
        None => TrackSelection::all(),
    };

    // Dropped with this future: removes the spooled audio and cancels the run
    let ctx = RunContext::new().map_err(|e| ApiError::Internal(e.to_string()))?;
    let path = state.fetcher.download(&url, ctx.scratch_dir()).await?;
    let audio = state.service.decode(path).await?;
    let extraction = state
        .service
        .extract(audio, selection, ctx.cancellation())
        .await?;

    let midi_artifact = state
        .artifacts
        .store(&extraction.midi)
        .map_err(|e| ApiError::Internal(format!("{e:#}")))?;
    info!(artifact = %midi_artifact, "MIDI artifact stored");

    let result = extraction.result;
    Ok(Json(ExtractResponse {
        method: result.method,
        fallback_reason: result.fallback_reason,
        tempo: result.tempo,
        duration: result.duration,
        tracks_included: result.tracks_included,
        midi_download_url: midi_artifact.download_url(),
        midi_artifact,
        total_chords: result.chord_progression.len(),
        estimated_key: result.estimated_key.label(),
        dominant_notes: result.estimated_key.dominant_notes,
        chord_progression: result.chord_progression,
    }))
}

pub async fn download_midi(
    State(state): State<AppState>,
    Path(artifact): Path<String>,
) -> Result<Response, ApiError> {
    let id: ArtifactId = artifact.parse().map_err(|_| ApiError::NotFound)?;
    let data = state
        .artifacts
        .retrieve(&id)
        .map_err(|e| ApiError::Internal(format!("{e:#}")))?
        .ok_or(ApiError::NotFound)?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/midi".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"chords_{id}.mid\""),
            ),
        ],
        data,
    )
        .into_response())
}
