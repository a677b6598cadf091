//! HTTP contract tests: the router driven with `oneshot`, audio and the
//! transcription backend served by wiremock.

use std::f32::consts::PI;
use std::io::Cursor;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use koe::{router, AppState, FsArtifactStore};
use koe_conf::KoeConfig;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "test123";

struct Harness {
    app: Router,
    audio: MockServer,
    _artifacts: TempDir,
}

/// Two seconds of a C major triad as 16-bit mono WAV.
fn triad_wav() -> Vec<u8> {
    let rate = 22050;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..(rate * 2) {
            let t = i as f32 / rate as f32;
            let s: f32 = [261.63f32, 329.63, 392.0]
                .iter()
                .map(|f| 0.25 * (2.0 * PI * f * t).sin())
                .sum();
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

async fn harness(api_key: Option<&str>, transcriber: Option<&MockServer>) -> Harness {
    let audio = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/song.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(triad_wav()))
        .mount(&audio)
        .await;
    Mock::given(method("GET"))
        .and(path("/notes.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("definitely not audio"))
        .mount(&audio)
        .await;

    let artifacts = tempfile::tempdir().unwrap();
    let mut config = KoeConfig::default();
    config.server.api_key = api_key.map(str::to_string);
    config.paths.artifact_dir = artifacts.path().to_path_buf();
    config.transcriber.endpoint = transcriber.map(|t| t.uri());
    config.transcriber.timeout_ms = 2_000;

    let store = FsArtifactStore::open(artifacts.path()).unwrap();
    let state = AppState::with_store(config, Arc::new(store)).unwrap();
    Harness {
        app: router(state),
        audio,
        _artifacts: artifacts,
    }
}

impl Harness {
    fn url(&self, file: &str) -> String {
        format!("{}/{}", self.audio.uri(), file)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn post(&self, uri: &str, key: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        let (status, bytes) = self
            .send(builder.body(Body::from(body.to_string())).unwrap())
            .await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get(&self, uri: &str, key: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

async fn transcriber_with(notes: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transcribe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "notes": notes })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn root_and_health_are_public() {
    let h = harness(None, None).await;

    let (status, body) = h.get("/", None).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["status"].as_str().unwrap().contains("running"));
    assert!(body["version"].is_string());

    let (status, body) = h.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["transcriber"], json!(false));
}

#[tokio::test]
async fn missing_server_key_is_500() {
    let h = harness(None, None).await;
    let (status, body) = h
        .post("/extract-chords-midi", Some(KEY), json!({ "audio_url": h.url("song.wav") }))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "API key not configured on server" }));
}

#[tokio::test]
async fn wrong_or_missing_key_is_401() {
    let h = harness(Some(KEY), None).await;
    for key in [None, Some("nope")] {
        let (status, body) = h
            .post("/analyze", key, json!({ "audio_url": h.url("song.wav") }))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or missing API key");
    }
    let (status, _) = h.get("/download-midi/00000000000000000000000000000000", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn client_errors_are_400() {
    let h = harness(Some(KEY), None).await;

    let (status, body) = h.post("/extract-chords-midi", Some(KEY), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No audio_url provided");

    let (status, body) = h
        .post(
            "/extract-chords-midi",
            Some(KEY),
            json!({ "audio_url": h.url("song.wav"), "include_tracks": ["drums"] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("drums"));

    let (status, body) = h
        .post("/extract-chords-midi", Some(KEY), json!({ "audio_url": h.url("missing.wav") }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Failed to download audio file"));

    let (status, body) = h
        .post("/extract-chords-midi", Some(KEY), json!({ "audio_url": h.url("notes.txt") }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("unsupported audio format"));
}

#[tokio::test]
async fn primary_transcription_end_to_end() {
    let oracle = transcriber_with(json!([
        { "pitch": 60, "onset": 0.0, "offset": 1.0, "confidence": 0.9 },
        { "pitch": 64, "onset": 0.0, "offset": 1.0, "confidence": 0.9 },
        { "pitch": 67, "onset": 0.0, "offset": 1.0, "confidence": 0.9 },
        { "pitch": 55, "onset": 1.0, "offset": 2.0, "confidence": 0.8 },
        { "pitch": 59, "onset": 1.0, "offset": 2.0, "confidence": 0.8 },
        { "pitch": 62, "onset": 1.0, "offset": 2.0, "confidence": 0.8 }
    ]))
    .await;
    let h = harness(Some(KEY), Some(&oracle)).await;

    let (status, body) = h
        .post(
            "/extract-chords-midi",
            Some(KEY),
            json!({ "audio_url": h.url("song.wav"), "include_tracks": ["bass", "chords"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["method"], "primary");
    assert!(body.get("fallback_reason").is_none());
    assert_eq!(body["tracks_included"], json!(["chords", "bass"]));
    assert_eq!(body["total_chords"], 2);

    let names: Vec<&str> = body["chord_progression"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["chord_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["C", "G"]);
    assert_eq!(body["chord_progression"][0]["midi_notes"], json!([60, 64, 67]));

    let artifact = body["midi_artifact"].as_str().unwrap();
    assert_eq!(artifact.len(), 32);
    let url = body["midi_download_url"].as_str().unwrap();
    assert_eq!(url, format!("/download-midi/{artifact}"));

    let (status, midi) = h.get(url, Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    let smf = midly::Smf::parse(&midi).unwrap();
    // tempo track + chords + bass
    assert_eq!(smf.tracks.len(), 3);
}

#[tokio::test]
async fn failing_transcriber_falls_back() {
    let oracle = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transcribe"))
        .respond_with(ResponseTemplate::new(500).set_body_string("CUDA out of memory"))
        .mount(&oracle)
        .await;
    let h = harness(Some(KEY), Some(&oracle)).await;

    let (status, body) = h
        .post("/extract-chords-midi", Some(KEY), json!({ "audio_url": h.url("song.wav") }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["method"], "fallback");
    assert!(body["fallback_reason"].as_str().unwrap().contains("CUDA"));
    assert_eq!(body["tracks_included"], json!(["chords", "bass", "melody"]));
    assert!(body["chord_progression"].is_array());
}

#[tokio::test]
async fn empty_transcription_falls_back() {
    let oracle = transcriber_with(json!([])).await;
    let h = harness(Some(KEY), Some(&oracle)).await;

    let (status, body) = h
        .post("/extract-chords-midi", Some(KEY), json!({ "audio_url": h.url("song.wav") }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["method"], "fallback");
}

#[tokio::test]
async fn unknown_artifacts_are_404() {
    let h = harness(Some(KEY), None).await;
    let (status, _) = h
        .get("/download-midi/0123456789abcdef0123456789abcdef", Some(KEY))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = h.get("/download-midi/not-a-hash", Some(KEY)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn analyze_reports_signal_summary() {
    let h = harness(Some(KEY), None).await;
    let (status, body) = h
        .post("/analyze", Some(KEY), json!({ "audio_url": h.url("song.wav") }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["duration"], json!(2.0));
    assert!(body["tempo"].as_f64().unwrap() > 0.0);
    assert!(body["estimated_key"].as_str().unwrap().ends_with("major")
        || body["estimated_key"].as_str().unwrap().ends_with("minor"));
    assert_eq!(body["dominant_notes"].as_array().unwrap().len(), 3);
    assert!(body["brightness"]["average"].as_f64().unwrap() > 0.0);
    assert_eq!(body["energy_balance"]["dominant"], "harmonic");
    assert!(body["energy_balance"]["ratio"].as_f64().unwrap() > 0.5);
    assert!(body["beat_times"].as_array().unwrap().len() <= 10);
}
